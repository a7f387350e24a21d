use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use super::color::{cyan, dim, red, white, yellow};
use crate::engine::command::CommandList;
use crate::engine::dispatch::{TaskOutcome, TaskResult};
use crate::storage::reminders::Reminder;

/// Friday が発話するときに使う共通関数。
/// 先頭に 🤖 を付与し、白色テキストで表示する。
pub fn friday_talk(message: &str) {
    println!("🤖 {}", white(message));
}

/// 分類・実行中に表示するスピナーを生成・開始する。
pub fn friday_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("🤖 {spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// 分類結果を 1 行で表示する。
pub fn print_plan(commands: &CommandList) {
    let labels: Vec<String> = commands.as_slice().iter().map(|c| c.to_string()).collect();
    println!("{}", dim(&format!("👉 {}", labels.join(", "))));
}

/// 1 コマンドの結果を表示する。
pub fn print_result(result: &TaskResult) {
    match &result.outcome {
        TaskOutcome::Success(message) => {
            if message.contains('\n') {
                friday_talk("");
                for line in message.lines() {
                    println!("   {}", white(line));
                }
            } else {
                friday_talk(message);
            }
        }
        TaskOutcome::Failure(error) => {
            println!(
                "🤖 {} {}",
                red(&format!("[{}]", result.command.kind)),
                red(error)
            );
        }
        TaskOutcome::Skipped(reason) => {
            println!("{}", dim(&format!("   [{}] skipped: {reason}", result.command.kind)));
        }
    }
}

/// 期限になったリマインダーを知らせる。
pub fn announce_reminder(reminder: &Reminder) {
    println!(
        "⏰ {} {}",
        cyan(&reminder.due.format("%H:%M").to_string()),
        yellow(&reminder.message)
    );
}
