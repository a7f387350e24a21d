//! Shell モジュール — REPL ループ
//!
//! 1 行ごとに期限切れリマインダーの通知 → 分類 → 並行実行 → 完了順の表示を行う。
//! Exit コマンド・Ctrl-D で終了する。

mod editor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reedline::{Reedline, Signal};
use tracing::{debug, info, warn};

use crate::app::Friday;
use crate::cli::banner::{print_goodbye, print_welcome};
use crate::cli::friday::{announce_reminder, friday_spinner, print_plan, print_result};
use crate::cli::prompt::FridayPrompt;
use crate::config::AssistantConfig;
use crate::storage::DataDir;

/// 1 発話の処理結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSummary {
    pub failed: bool,
    pub exit: bool,
}

/// 発話を 1 つ処理し、結果を完了順に表示する。REPL と `friday ask` で共用。
pub async fn run_turn(friday: &Friday, line: &str) -> TurnSummary {
    let spinner = friday_spinner();
    spinner.set_message("thinking...");
    let commands = friday.classify(line).await;
    spinner.finish_and_clear();

    debug!(input = %line, commands = commands.len(), "Utterance classified");
    print_plan(&commands);

    let mut stream = friday.dispatch(commands);
    let exit = stream.exit_requested();
    let mut failed = false;

    let spinner = (stream.pending() > 0).then(friday_spinner);
    while let Some(result) = stream.next().await {
        if let Some(spinner) = &spinner {
            spinner.suspend(|| print_result(&result));
        } else {
            print_result(&result);
        }
        failed |= result.outcome.is_failure();
    }
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    TurnSummary { failed, exit }
}

/// Friday の REPL
pub struct Shell {
    editor: Reedline,
    prompt: FridayPrompt,
    friday: Friday,
    assistant: AssistantConfig,
    last_failed: Arc<AtomicBool>,
}

impl Shell {
    pub fn new(friday: Friday, assistant: AssistantConfig, data: &DataDir) -> anyhow::Result<Self> {
        let editor = editor::build_editor(data.repl_history())?;
        let last_failed = Arc::new(AtomicBool::new(false));
        let prompt = FridayPrompt::new(
            &assistant.username,
            &assistant.name,
            Arc::clone(&last_failed),
        );
        Ok(Self {
            editor,
            prompt,
            friday,
            assistant,
            last_failed,
        })
    }

    /// REPL ループを実行する。戻り値はプロセスの終了コード。
    pub async fn run(&mut self) -> i32 {
        print_welcome(&self.assistant.username, &self.assistant.name);

        let mut repl_error = false;
        loop {
            for reminder in self.friday.due_reminders() {
                announce_reminder(&reminder);
            }

            match self.editor.read_line(&self.prompt) {
                Ok(Signal::Success(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    info!(input = %line, "User input received");

                    let summary = run_turn(&self.friday, line).await;
                    self.last_failed.store(summary.failed, Ordering::Relaxed);
                    println!();

                    if summary.exit {
                        info!("Exit requested by utterance");
                        break;
                    }
                }
                Ok(Signal::CtrlC) => {
                    println!();
                }
                Ok(Signal::CtrlD) => {
                    info!("Ctrl-D received, exiting");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "REPL error, exiting");
                    eprintln!("friday: error: {e}");
                    repl_error = true;
                    break;
                }
            }
        }

        print_goodbye(&self.assistant.username);
        if repl_error {
            1
        } else {
            0
        }
    }
}
