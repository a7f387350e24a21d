//! AI とデータディレクトリを使うハンドラ

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Local;
use futures_util::future::BoxFuture;
use tracing::info;

use super::{Launcher, WorkerSpawner};
use crate::engine::command::Command;
use crate::engine::dispatch::CommandHandler;
use crate::resolver::chat::ChatResolver;
use crate::resolver::content::ContentWriter;
use crate::resolver::search::SearchResolver;
use crate::storage::handoff::RequestHandoff;
use crate::storage::reminders::{parse_reminder, ReminderBook};

/// General → 通常会話
pub struct ChatHandler {
    chat: Arc<ChatResolver>,
}

impl ChatHandler {
    pub fn new(chat: Arc<ChatResolver>) -> Self {
        Self { chat }
    }
}

impl CommandHandler for ChatHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.chat.answer(&command.argument))
    }
}

/// Realtime → 検索付き回答
pub struct RealtimeHandler {
    search: Arc<SearchResolver>,
}

impl RealtimeHandler {
    pub fn new(search: Arc<SearchResolver>) -> Self {
        Self { search }
    }
}

impl CommandHandler for RealtimeHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(self.search.answer(&command.argument).await) })
    }
}

/// ContentWrite → 文章を保存して開く
pub struct ContentHandler {
    writer: Arc<ContentWriter>,
    launcher: Arc<dyn Launcher>,
}

impl ContentHandler {
    pub fn new(writer: Arc<ContentWriter>, launcher: Arc<dyn Launcher>) -> Self {
        Self { writer, launcher }
    }
}

impl CommandHandler for ContentHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let path = self.writer.write(&command.argument).await?;
            self.launcher.open(&path.to_string_lossy())?;
            Ok(format!("Content saved to {}", path.display()))
        })
    }
}

/// Reminder → リマインダー帳に追加
pub struct ReminderHandler {
    book: ReminderBook,
}

impl ReminderHandler {
    pub fn new(book: ReminderBook) -> Self {
        Self { book }
    }
}

impl CommandHandler for ReminderHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let Some(reminder) = parse_reminder(&command.argument, Local::now()) else {
                bail!("could not find a time in '{}'", command.argument.trim());
            };
            let message = format!(
                "Reminder set for {}: {}",
                reminder.due.format("%a %H:%M"),
                reminder.message
            );
            self.book.add(reminder)?;
            Ok(message)
        })
    }
}

/// GenerateImage → ハンドオフファイルに書き込み、ワーカーを起動する
pub struct ImageHandler {
    handoff: RequestHandoff,
    spawner: Arc<dyn WorkerSpawner>,
}

impl ImageHandler {
    pub fn new(handoff: RequestHandoff, spawner: Arc<dyn WorkerSpawner>) -> Self {
        Self { handoff, spawner }
    }
}

/// 末尾の句読点を落とす（ファイル名とプロンプトに残さない）
fn image_prompt(argument: &str) -> &str {
    argument
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
}

impl CommandHandler for ImageHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let prompt = image_prompt(&command.argument);
            if prompt.is_empty() {
                bail!("nothing to draw");
            }
            self.handoff.write_request(prompt)?;
            self.spawner.spawn_worker()?;
            info!(prompt = %prompt, "Image request handed off");
            Ok(format!("Generating images for '{prompt}'"))
        })
    }
}
