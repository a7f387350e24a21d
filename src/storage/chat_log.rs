//! 会話履歴 — 追記専用のターン列と JSON ファイルへの永続化
//!
//! 保存するのは切り詰め前の全履歴。切り詰めは呼び出し時に
//! `ConversationWindow::suffix` で末尾だけを取り出して行う。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai::ChatTurn;

/// 追記専用の会話ターン列
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationWindow {
    turns: Vec<ChatTurn>,
}

impl ConversationWindow {
    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// 末尾 `keep` ターンを返す。
    pub fn suffix(&self, keep: usize) -> &[ChatTurn] {
        let start = self.turns.len().saturating_sub(keep);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// JSON 配列 `[{role, content}, ...]` として保存されるチャットログ
#[derive(Debug, Clone)]
pub struct ChatLog {
    path: PathBuf,
}

impl ChatLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ログを読み込む。
    ///
    /// ファイルがなければ空の履歴を返す。
    /// 解析できない場合は警告を出し、空の履歴で上書きしてから返す。
    pub fn load_or_reset(&self) -> ConversationWindow {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Chat log not found, starting empty");
                return ConversationWindow::default();
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read chat log, starting empty"
                );
                return ConversationWindow::default();
            }
        };

        match serde_json::from_str::<ConversationWindow>(&content) {
            Ok(window) => {
                debug!(path = %self.path.display(), turns = window.len(), "Chat log loaded");
                window
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Chat log is corrupt, resetting");
                eprintln!("friday: warning: chat log is corrupt, resetting: {e}");
                let empty = ConversationWindow::default();
                if let Err(save_err) = self.save(&empty) {
                    warn!(error = %save_err, "Failed to persist chat log reset");
                }
                empty
            }
        }
    }

    /// 全履歴を書き直す。
    pub fn save(&self, window: &ConversationWindow) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(window).context("failed to serialize chat log")?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write chat log: {}", self.path.display()))?;
        Ok(())
    }
}
