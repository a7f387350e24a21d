//! 通常会話の応答生成
//!
//! 人格プロンプト + 現在日時 + 直近履歴で補完を呼ぶ。
//! 失敗した場合はセッションを消去・保存し、空の履歴で 1 回だけ再試行する。

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, warn};

use super::realtime_block;
use crate::ai::prompts::chat_system_prompt;
use crate::ai::stream::{strip_eos_marker, tidy_answer};
use crate::ai::{ChatTurn, CompletionBackend, CompletionRequest};
use crate::config::{AiConfig, AssistantConfig};
use crate::storage::SharedSession;

const CHAT_MAX_TOKENS: u32 = 1024;

pub struct ChatResolver {
    backend: Option<Arc<dyn CompletionBackend>>,
    session: SharedSession,
    system_prompt: String,
    model: String,
    temperature: f32,
    history_window: usize,
}

impl ChatResolver {
    pub fn new(
        backend: Option<Arc<dyn CompletionBackend>>,
        session: SharedSession,
        assistant: &AssistantConfig,
        ai: &AiConfig,
        history_window: usize,
    ) -> Self {
        Self {
            backend,
            session,
            system_prompt: chat_system_prompt(&assistant.username, &assistant.name),
            model: ai.chat_model.clone(),
            temperature: ai.temperature,
            history_window,
        }
    }

    /// 発話に応答する。
    ///
    /// 補完呼び出しの失敗時だけセッションを消去して再試行する。
    /// 履歴の保存失敗は警告のみで、得られた応答はそのまま返す。
    pub async fn answer(&self, query: &str) -> Result<String> {
        let backend = self
            .backend
            .as_ref()
            .context("AI backend is not configured")?;

        let raw = match self.complete(backend.as_ref(), query).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Chat completion failed, wiping session and retrying once");
                if let Err(reset_err) = self.session.lock().await.reset() {
                    warn!(error = %reset_err, "Failed to persist session reset");
                }
                self.complete(backend.as_ref(), query)
                    .await
                    .context("Chat completion failed after session reset")?
            }
        };

        let answer = strip_eos_marker(&raw);
        let answer = answer.trim();
        if let Err(e) = self.session.lock().await.commit_exchange(query, answer) {
            warn!(error = %e, "Failed to persist chat exchange");
        }
        Ok(tidy_answer(answer))
    }

    async fn complete(&self, backend: &dyn CompletionBackend, query: &str) -> Result<String> {
        let history = self.session.lock().await.snapshot(self.history_window);

        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(ChatTurn::system(self.system_prompt.as_str()));
        messages.push(ChatTurn::system(realtime_block(Local::now())));
        messages.extend(history);
        messages.push(ChatTurn::user(query));

        debug!(query = %query, message_count = messages.len(), "Requesting chat answer");
        backend
            .complete(CompletionRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: CHAT_MAX_TOKENS,
            })
            .await
    }
}
