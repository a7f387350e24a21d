//! アプリの起動・終了

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures_util::future::BoxFuture;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use super::Launcher;
use crate::engine::command::Command;
use crate::engine::dispatch::CommandHandler;

/// よく使う Web アプリ（完全一致 → 部分一致の順に照合）
const WEB_APPS: &[(&str, &str)] = &[
    ("whatsapp", "https://web.whatsapp.com"),
    ("whatsapp web", "https://web.whatsapp.com"),
    ("telegram", "https://web.telegram.org"),
    ("discord", "https://discord.com/app"),
    ("slack", "https://app.slack.com"),
    ("teams", "https://teams.microsoft.com"),
    ("microsoft teams", "https://teams.microsoft.com"),
    ("zoom", "https://zoom.us/join"),
    ("facebook", "https://www.facebook.com"),
    ("instagram", "https://www.instagram.com"),
    ("twitter", "https://www.twitter.com"),
    ("x", "https://www.x.com"),
    ("linkedin", "https://www.linkedin.com"),
    ("tiktok", "https://www.tiktok.com"),
    ("pinterest", "https://www.pinterest.com"),
    ("gmail", "https://mail.google.com"),
    ("google", "https://www.google.com"),
    ("google drive", "https://drive.google.com"),
    ("drive", "https://drive.google.com"),
    ("google docs", "https://docs.google.com"),
    ("docs", "https://docs.google.com"),
    ("google sheets", "https://sheets.google.com"),
    ("sheets", "https://sheets.google.com"),
    ("google calendar", "https://calendar.google.com"),
    ("calendar", "https://calendar.google.com"),
    ("google maps", "https://maps.google.com"),
    ("maps", "https://maps.google.com"),
    ("youtube", "https://www.youtube.com"),
    ("youtube music", "https://music.youtube.com"),
    ("outlook", "https://outlook.live.com"),
    ("onedrive", "https://onedrive.live.com"),
    ("office", "https://office.com"),
    ("netflix", "https://www.netflix.com"),
    ("prime video", "https://www.primevideo.com"),
    ("disney plus", "https://www.disneyplus.com"),
    ("spotify", "https://open.spotify.com"),
    ("apple music", "https://music.apple.com"),
    ("amazon", "https://www.amazon.com"),
    ("ebay", "https://www.ebay.com"),
    ("paypal", "https://www.paypal.com"),
    ("github", "https://github.com"),
    ("stack overflow", "https://stackoverflow.com"),
    ("stackoverflow", "https://stackoverflow.com"),
    ("figma", "https://www.figma.com"),
    ("notion", "https://www.notion.so"),
    ("trello", "https://trello.com"),
    ("reddit", "https://www.reddit.com"),
    ("wikipedia", "https://www.wikipedia.org"),
    ("medium", "https://medium.com"),
];

/// アプリ名から開く URL を決める。
///
/// 完全一致 → 語単位の部分一致 → `https://www.<name>.com` の順。
pub fn web_url_for(app: &str) -> String {
    let name = app.trim().to_lowercase();

    if let Some((_, url)) = WEB_APPS.iter().find(|(key, _)| *key == name) {
        return (*url).to_string();
    }

    // 語境界で比較する（"x" が "firefox" に当たらないように）
    let padded = format!(" {} ", name.split_whitespace().collect::<Vec<_>>().join(" "));
    if let Some((key, url)) = WEB_APPS
        .iter()
        .find(|(key, _)| padded.contains(&format!(" {key} ")))
    {
        debug!(app = %name, key = %key, "Web app matched partially");
        return (*url).to_string();
    }

    let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    format!("https://www.{compact}.com")
}

/// 発話からは起動しないプログラム
const DENIED_PROGRAMS: &[&str] = &[
    "shutdown", "reboot", "poweroff", "halt", "init", "systemctl", "rm", "dd", "mkfs", "sudo",
    "su", "doas", "kill", "killall", "pkill",
];

/// 起動対象として受け付けない名前なら理由を返す。
fn refusal_reason(app: &str) -> Option<&'static str> {
    let name = app.trim();
    if name.contains(['/', '\\']) || name.starts_with(['.', '~']) {
        return Some("paths are not launched");
    }
    let program = name.split_whitespace().next().unwrap_or_default().to_lowercase();
    if DENIED_PROGRAMS.contains(&program.as_str()) {
        return Some("this program is never launched by voice");
    }
    None
}

/// PATH 上の実行ファイル名の候補
fn executable_candidates(app: &str) -> Vec<String> {
    let name = app.trim().to_lowercase();
    let mut candidates = vec![name.clone()];
    if name.contains(' ') {
        candidates.push(name.replace(' ', "-"));
        candidates.push(name.replace(' ', ""));
    }
    candidates
}

pub struct OpenAppHandler {
    launcher: Arc<dyn Launcher>,
}

impl OpenAppHandler {
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self { launcher }
    }

    fn open(&self, app: &str) -> Result<String> {
        if let Some(reason) = refusal_reason(app) {
            warn!(app = %app, reason, "Refusing to open app");
            bail!("refusing to open '{app}': {reason}");
        }

        if let Some(path) = executable_candidates(app)
            .iter()
            .find_map(|name| which::which(name).ok())
        {
            info!(app = %app, path = %path.display(), "Launching local application");
            self.launcher.launch(&path)?;
            return Ok(format!("Launched {app}"));
        }

        let url = web_url_for(app);
        info!(app = %app, url = %url, "App not found locally, opening web version");
        self.launcher.open(&url)?;
        Ok(format!("Opened {url}"))
    }
}

impl CommandHandler for OpenAppHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.open(command.argument.trim()) })
    }
}

/// 終了を拒否するアプリ
const PROTECTED_APPS: &[&str] = &["chrome"];

/// プロセス名が対象アプリに一致するか（大文字小文字・空白を無視）
fn process_matches(process_name: &str, app: &str) -> bool {
    let process = process_name.to_lowercase();
    let process = process.trim_end_matches(".exe");
    let target: String = app
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    !target.is_empty() && (process == target || process.starts_with(&format!("{target}-")))
}

pub struct CloseAppHandler;

fn close_processes(app: String) -> Result<String> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut killed = 0usize;
    for (pid, process) in system.processes() {
        let name = process.name().to_string_lossy();
        if process_matches(&name, &app) {
            debug!(pid = %pid, name = %name, "Terminating process");
            if process.kill() {
                killed += 1;
            }
        }
    }

    if killed == 0 {
        bail!("no running process matches '{app}'");
    }
    info!(app = %app, killed, "Application closed");
    Ok(format!("Closed {app} ({killed} process(es))"))
}

impl CommandHandler for CloseAppHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let app = command.argument.trim().to_string();
            let lower = app.to_lowercase();
            if PROTECTED_APPS.iter().any(|p| lower.contains(p)) {
                info!(app = %app, "Close request ignored for protected application");
                return Ok(format!("Left {app} running for safety"));
            }
            tokio::task::spawn_blocking(move || close_processes(app))
                .await
                .context("process scan task failed")?
        })
    }
}
