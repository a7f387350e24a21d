//! コマンド種別ごとのハンドラ
//!
//! OS に触れる操作（URL / ファイルを開く、プログラム起動、ワーカー起動）は
//! `Launcher` / `WorkerSpawner` の裏に隠し、テストでは記録用の実装に差し替える。

mod apps;
mod assistant;
mod system;
mod web;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

pub use apps::{web_url_for, CloseAppHandler, OpenAppHandler};
pub use assistant::{ChatHandler, ContentHandler, ImageHandler, RealtimeHandler, ReminderHandler};
pub use system::{mixer_invocation, SystemActionHandler, VolumeAction};
pub use web::{first_video_id, PlayMediaHandler, WebSearchHandler, VideoSearchHandler};

use super::command::CommandKind;
use super::dispatch::HandlerRegistry;
use crate::resolver::chat::ChatResolver;
use crate::resolver::content::ContentWriter;
use crate::resolver::search::SearchResolver;
use crate::storage::handoff::RequestHandoff;
use crate::storage::reminders::ReminderBook;

/// URL・ファイル・プログラムを開く OS 機能
pub trait Launcher: Send + Sync {
    /// URL またはファイルを既定のアプリで開く。
    fn open(&self, target: &str) -> Result<()>;

    /// 実行ファイルを切り離して起動する。
    fn launch(&self, program: &Path) -> Result<()>;
}

/// `xdg-open`（Linux）/ `open`（macOS）を使う実装。
/// オープナーが見つからない環境では `open` だけが失敗する。
pub struct SystemLauncher {
    opener: Option<PathBuf>,
}

impl SystemLauncher {
    pub fn detect() -> Self {
        let candidates: &[&str] = if cfg!(target_os = "macos") {
            &["open"]
        } else {
            &["xdg-open", "gio", "open"]
        };
        let opener = candidates.iter().find_map(|name| which::which(name).ok());
        match &opener {
            Some(path) => info!(opener = %path.display(), "System opener detected"),
            None => warn!(tried = %candidates.join(", "), "No system opener found"),
        }
        Self { opener }
    }
}

impl Launcher for SystemLauncher {
    fn open(&self, target: &str) -> Result<()> {
        let opener = self
            .opener
            .as_ref()
            .context("no system opener (xdg-open / open) is available")?;
        debug!(target = %target, "Opening with system opener");
        let mut command = std::process::Command::new(opener);
        // gio は `gio open <target>` 形式
        if opener.file_name().is_some_and(|n| n == "gio") {
            command.arg("open");
        }
        spawn_detached(command.arg(target)).with_context(|| format!("failed to open {target}"))
    }

    fn launch(&self, program: &Path) -> Result<()> {
        debug!(program = %program.display(), "Launching program");
        spawn_detached(&mut std::process::Command::new(program))
            .with_context(|| format!("failed to launch {}", program.display()))
    }
}

fn spawn_detached(command: &mut std::process::Command) -> Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}

/// 画像生成ワーカーを起動する機能
pub trait WorkerSpawner: Send + Sync {
    fn spawn_worker(&self) -> Result<()>;
}

/// 自分自身の実行ファイルを `image-worker` サブコマンドで起動する。
pub struct SelfWorkerSpawner;

impl WorkerSpawner for SelfWorkerSpawner {
    fn spawn_worker(&self) -> Result<()> {
        let exe = std::env::current_exe().context("failed to locate current executable")?;
        if !exe.exists() {
            bail!("current executable no longer exists: {}", exe.display());
        }
        info!(exe = %exe.display(), "Spawning image worker");
        spawn_detached(std::process::Command::new(&exe).arg("image-worker"))
            .context("failed to spawn image worker")
    }
}

/// 標準ハンドラ群の依存
pub struct HandlerDeps {
    pub launcher: Arc<dyn Launcher>,
    pub spawner: Arc<dyn WorkerSpawner>,
    pub http: reqwest::Client,
    pub chat: Arc<ChatResolver>,
    pub search: Arc<SearchResolver>,
    pub content: Arc<ContentWriter>,
    pub reminders: ReminderBook,
    pub handoff: RequestHandoff,
}

/// 全種別（Exit を除く）のハンドラを登録した表を作る。
pub fn standard_registry(deps: HandlerDeps) -> HandlerRegistry {
    let HandlerDeps {
        launcher,
        spawner,
        http,
        chat,
        search,
        content,
        reminders,
        handoff,
    } = deps;

    HandlerRegistry::new()
        .with(CommandKind::General, ChatHandler::new(chat))
        .with(CommandKind::Realtime, RealtimeHandler::new(search))
        .with(CommandKind::OpenApp, OpenAppHandler::new(Arc::clone(&launcher)))
        .with(CommandKind::CloseApp, CloseAppHandler)
        .with(
            CommandKind::PlayMedia,
            PlayMediaHandler::new(http, Arc::clone(&launcher)),
        )
        .with(
            CommandKind::GenerateImage,
            ImageHandler::new(handoff, spawner),
        )
        .with(CommandKind::Reminder, ReminderHandler::new(reminders))
        .with(CommandKind::SystemAction, SystemActionHandler)
        .with(
            CommandKind::ContentWrite,
            ContentHandler::new(content, Arc::clone(&launcher)),
        )
        .with(CommandKind::WebSearch, WebSearchHandler::new(Arc::clone(&launcher)))
        .with(CommandKind::VideoSearch, VideoSearchHandler::new(launcher))
}
