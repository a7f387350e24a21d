//! 音量操作
//!
//! Linux は `pactl`、macOS は `osascript` を使う。未知の操作はエラー。

use anyhow::{bail, Context, Result};
use futures_util::future::BoxFuture;
use tracing::info;

use crate::engine::command::Command;
use crate::engine::dispatch::CommandHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeAction {
    Mute,
    Unmute,
    Up,
    Down,
}

impl VolumeAction {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "mute" => Some(Self::Mute),
            "unmute" => Some(Self::Unmute),
            "volume up" | "increase volume" => Some(Self::Up),
            "volume down" | "decrease volume" => Some(Self::Down),
            _ => None,
        }
    }
}

/// 操作に対応するミキサーコマンド（プログラム, 引数）。非対応 OS なら None。
pub fn mixer_invocation(
    action: VolumeAction,
    os: &str,
) -> Option<(&'static str, Vec<&'static str>)> {
    match os {
        "linux" => {
            let args = match action {
                VolumeAction::Mute => vec!["set-sink-mute", "@DEFAULT_SINK@", "1"],
                VolumeAction::Unmute => vec!["set-sink-mute", "@DEFAULT_SINK@", "0"],
                VolumeAction::Up => vec!["set-sink-volume", "@DEFAULT_SINK@", "+10%"],
                VolumeAction::Down => vec!["set-sink-volume", "@DEFAULT_SINK@", "-10%"],
            };
            Some(("pactl", args))
        }
        "macos" => {
            let script = match action {
                VolumeAction::Mute => "set volume with output muted",
                VolumeAction::Unmute => "set volume without output muted",
                VolumeAction::Up => {
                    "set volume output volume ((output volume of (get volume settings)) + 10)"
                }
                VolumeAction::Down => {
                    "set volume output volume ((output volume of (get volume settings)) - 10)"
                }
            };
            Some(("osascript", vec!["-e", script]))
        }
        _ => None,
    }
}

pub struct SystemActionHandler;

impl CommandHandler for SystemActionHandler {
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let Some(action) = VolumeAction::parse(&command.argument) else {
                bail!("unknown system command: '{}'", command.argument.trim());
            };
            let os = std::env::consts::OS;
            let (program, args) = mixer_invocation(action, os)
                .with_context(|| format!("volume control is not supported on {os}"))?;

            info!(action = ?action, program = %program, "Running mixer command");
            let status = tokio::process::Command::new(program)
                .args(&args)
                .status()
                .await
                .with_context(|| format!("failed to run {program}"))?;
            if !status.success() {
                bail!("{program} exited with {status}");
            }
            Ok(format!("Done: {}", command.argument.trim()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::CommandKind;

    #[test]
    fn parses_known_actions() {
        assert_eq!(VolumeAction::parse("Mute"), Some(VolumeAction::Mute));
        assert_eq!(VolumeAction::parse(" increase volume "), Some(VolumeAction::Up));
        assert_eq!(VolumeAction::parse("volume down"), Some(VolumeAction::Down));
        assert_eq!(VolumeAction::parse("shutdown"), None);
    }

    #[test]
    fn linux_uses_pactl() {
        let (program, args) = mixer_invocation(VolumeAction::Up, "linux").unwrap();
        assert_eq!(program, "pactl");
        assert_eq!(args, vec!["set-sink-volume", "@DEFAULT_SINK@", "+10%"]);
    }

    #[test]
    fn macos_uses_osascript() {
        let (program, args) = mixer_invocation(VolumeAction::Mute, "macos").unwrap();
        assert_eq!(program, "osascript");
        assert_eq!(args[1], "set volume with output muted");
    }

    #[test]
    fn other_platforms_are_unsupported() {
        assert!(mixer_invocation(VolumeAction::Mute, "windows").is_none());
    }

    #[tokio::test]
    async fn unknown_action_fails_without_running_anything() {
        let command = Command::new(CommandKind::SystemAction, "reboot");
        let err = SystemActionHandler.handle(&command).await.unwrap_err();
        assert!(err.to_string().contains("unknown system command"));
    }
}
