//! 分類器・ディスパッチャ・リマインダー帳をまとめたアシスタント本体
//!
//! REPL と `friday ask` の両方から使う。API キーが無い場合も起動はでき、
//! 分類はキーワードルールのみ、AI を使うハンドラは個別に失敗する。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use tracing::{info, warn};

use crate::ai::{CompletionBackend, FridayAI};
use crate::config::FridayConfig;
use crate::engine::classifier::IntentClassifier;
use crate::engine::command::CommandList;
use crate::engine::dispatch::{DispatchStream, Dispatcher};
use crate::engine::handlers::{standard_registry, HandlerDeps, SelfWorkerSpawner, SystemLauncher};
use crate::resolver::chat::ChatResolver;
use crate::resolver::content::ContentWriter;
use crate::resolver::http_client;
use crate::resolver::search::SearchResolver;
use crate::storage::chat_log::ChatLog;
use crate::storage::handoff::RequestHandoff;
use crate::storage::reminders::{Reminder, ReminderBook};
use crate::storage::{DataDir, Session};

pub struct Friday {
    classifier: IntentClassifier,
    dispatcher: Dispatcher,
    reminders: ReminderBook,
}

impl Friday {
    pub fn new(
        classifier: IntentClassifier,
        dispatcher: Dispatcher,
        reminders: ReminderBook,
    ) -> Self {
        Self {
            classifier,
            dispatcher,
            reminders,
        }
    }

    /// 設定とデータディレクトリから標準構成を組み立てる。
    pub fn build(config: &FridayConfig, data: &DataDir) -> Result<Self> {
        let backend: Option<Arc<dyn CompletionBackend>> = match FridayAI::new(&config.ai) {
            Ok(ai) => {
                info!("AI client initialized successfully");
                Some(Arc::new(ai))
            }
            Err(e) => {
                warn!(error = %e, "AI disabled");
                eprintln!("friday: warning: AI disabled: {e}");
                None
            }
        };

        let session = Session::load(ChatLog::new(data.chat_log())).shared();
        let http = http_client(Duration::from_secs(config.search.timeout_secs))?;

        let chat = ChatResolver::new(
            backend.clone(),
            Arc::clone(&session),
            &config.assistant,
            &config.ai,
            config.chat.history_window,
        );
        let search = SearchResolver::new(
            backend.clone(),
            SearchResolver::standard_chain(&config.search, http.clone()),
            session,
            &config.assistant,
            &config.ai,
            &config.search,
        );
        let content = ContentWriter::new(
            backend.clone(),
            &config.assistant,
            &config.ai,
            data.content_dir(),
        );
        let reminders = ReminderBook::new(data.reminders_file());

        let registry = standard_registry(HandlerDeps {
            launcher: Arc::new(SystemLauncher::detect()),
            spawner: Arc::new(SelfWorkerSpawner),
            http,
            chat: Arc::new(chat),
            search: Arc::new(search),
            content: Arc::new(content),
            reminders: reminders.clone(),
            handoff: RequestHandoff::new(data.handoff_file()),
        });
        info!(handlers = registry.len(), "Handler registry ready");

        Ok(Self::new(
            IntentClassifier::new(backend, config.ai.classifier_model.clone()),
            Dispatcher::new(registry),
            reminders,
        ))
    }

    pub async fn classify(&self, text: &str) -> CommandList {
        self.classifier.classify(text).await
    }

    pub fn dispatch(&self, commands: CommandList) -> DispatchStream {
        self.dispatcher.dispatch(commands)
    }

    /// 期限を過ぎたリマインダーを取り出す。読み書きの失敗は警告のみ。
    pub fn due_reminders(&self) -> Vec<Reminder> {
        match self.reminders.take_due(Local::now()) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "Failed to read reminders");
                eprintln!("friday: warning: failed to read reminders: {e}");
                Vec::new()
            }
        }
    }
}
