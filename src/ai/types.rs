//! AI モジュールの公開型定義

use anyhow::Result;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// 会話ターンの話者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 会話の 1 ターン。チャットログの永続化形式も兼ねる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 補完リクエスト
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// チャット補完を提供するバックエンド。
///
/// 実装はストリーミングで受け取ったデルタを連結し、
/// 終端マーカーを除去した全文を返す。
pub trait CompletionBackend: Send + Sync {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>>;
}
