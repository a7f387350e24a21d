//! コマンドディスパッチ
//!
//! 分類済みのコマンド列を種別ごとのハンドラに振り分け、独立したタスクとして並行実行する。
//! 結果は完了順に `DispatchStream` から 1 件ずつ取り出す。
//! ハンドラのエラーやパニックはそのコマンドの `Failure` になるだけで、他のタスクには影響しない。

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::command::{Command, CommandKind, CommandList};

/// 1 種別のコマンドを実行するハンドラ
pub trait CommandHandler: Send + Sync {
    /// コマンドを実行し、ユーザー向けの結果メッセージを返す。
    fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>>;
}

/// 1 コマンドの実行結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success(String),
    Failure(String),
    /// スケジュールされなかった（汎用 open、ハンドラ未登録）
    Skipped(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failure(_))
    }
}

/// コマンドとその結果の組
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub command: Command,
    pub outcome: TaskOutcome,
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            TaskOutcome::Success(message) => write!(f, "[{}] {message}", self.command.kind),
            TaskOutcome::Failure(error) => write!(f, "[{}] failed: {error}", self.command.kind),
            TaskOutcome::Skipped(reason) => write!(f, "[{}] skipped: {reason}", self.command.kind),
        }
    }
}

/// 種別 → ハンドラの対応表
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// ハンドラを登録する（同じ種別は上書き）。
    pub fn with(mut self, kind: CommandKind, handler: impl CommandHandler + 'static) -> Self {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn get(&self, kind: CommandKind) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// 対象が特定できない open（"open it" など）
const GENERIC_OPEN_TARGETS: &[&str] = &["", "it", "file", "that", "this", "them"];

fn is_generic_open(command: &Command) -> bool {
    command.kind == CommandKind::OpenApp
        && GENERIC_OPEN_TARGETS.contains(&command.argument.trim().to_lowercase().as_str())
}

pub struct Dispatcher {
    registry: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    /// コマンド列をスケジュールする。tokio ランタイム上で呼ぶこと。
    pub fn dispatch(&self, commands: CommandList) -> DispatchStream {
        let mut tasks = JoinSet::new();
        let mut ready = VecDeque::new();
        let mut exit_requested = false;

        for command in commands {
            if command.is_exit() {
                exit_requested = true;
                continue;
            }

            if is_generic_open(&command) {
                info!(command = %command, "Ignoring generic open command");
                ready.push_back(TaskResult {
                    command,
                    outcome: TaskOutcome::Skipped("nothing specific to open".to_string()),
                });
                continue;
            }

            let Some(handler) = self.registry.get(command.kind) else {
                warn!(command = %command, "No handler registered, skipping");
                ready.push_back(TaskResult {
                    command,
                    outcome: TaskOutcome::Skipped("no handler for this command".to_string()),
                });
                continue;
            };

            debug!(command = %command, "Scheduling command");
            let handler = Arc::clone(handler);
            tasks.spawn(run_handler(handler, command));
        }

        DispatchStream {
            ready,
            tasks,
            exit_requested,
        }
    }
}

async fn run_handler(handler: Arc<dyn CommandHandler>, command: Command) -> TaskResult {
    // handle() 内の同期パニックも捕捉する
    let result = AssertUnwindSafe(async { handler.handle(&command).await })
        .catch_unwind()
        .await;
    let outcome = match result {
        Ok(Ok(message)) => {
            info!(command = %command, "Command finished");
            TaskOutcome::Success(message)
        }
        Ok(Err(e)) => {
            let error = format!("{e:#}");
            warn!(command = %command, error = %error, "Command failed");
            TaskOutcome::Failure(error)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(command = %command, panic = %message, "Command handler panicked");
            TaskOutcome::Failure(format!("handler panicked: {message}"))
        }
    };
    TaskResult { command, outcome }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 完了順に結果を返す有限ストリーム。
///
/// drop すると未完了のタスクは中断される。
pub struct DispatchStream {
    ready: VecDeque<TaskResult>,
    tasks: JoinSet<TaskResult>,
    exit_requested: bool,
}

impl DispatchStream {
    /// 次の結果。すべて取り出し終えたら None。
    pub async fn next(&mut self) -> Option<TaskResult> {
        if let Some(result) = self.ready.pop_front() {
            return Some(result);
        }
        loop {
            match self.tasks.join_next().await? {
                Ok(result) => return Some(result),
                // パニックは run_handler 内で捕捉済み。ここに来るのはランタイム停止時の中断のみ
                Err(e) => warn!(error = %e, "Dispatch task did not complete"),
            }
        }
    }

    /// 入力に Exit が含まれていたか
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// 未取得の結果数
    pub fn pending(&self) -> usize {
        self.ready.len() + self.tasks.len()
    }

    /// 残りの結果をすべて待って返す（完了順）。
    pub async fn collect_all(mut self) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(self.pending());
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    struct Reply(&'static str);

    impl CommandHandler for Reply {
        fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move { Ok(format!("{} {}", self.0, command.argument)) })
        }
    }

    struct Fails;

    impl CommandHandler for Fails {
        fn handle<'a>(&'a self, _command: &'a Command) -> BoxFuture<'a, Result<String>> {
            Box::pin(async { anyhow::bail!("provider unavailable") })
        }
    }

    struct Panics;

    impl CommandHandler for Panics {
        fn handle<'a>(&'a self, _command: &'a Command) -> BoxFuture<'a, Result<String>> {
            Box::pin(async { panic!("handler bug") })
        }
    }

    struct PanicsBeforeFuture;

    impl CommandHandler for PanicsBeforeFuture {
        fn handle<'a>(&'a self, _command: &'a Command) -> BoxFuture<'a, Result<String>> {
            panic!("bad argument")
        }
    }

    /// 全員が揃うまで進まない。逐次実行ならデッドロックする。
    struct Rendezvous {
        barrier: Arc<Barrier>,
        delay: Duration,
    }

    impl CommandHandler for Rendezvous {
        fn handle<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move {
                self.barrier.wait().await;
                tokio::time::sleep(self.delay).await;
                Ok(command.argument.clone())
            })
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl CommandHandler for Counting {
        fn handle<'a>(&'a self, _command: &'a Command) -> BoxFuture<'a, Result<String>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(String::new()) })
        }
    }

    fn list(commands: Vec<Command>) -> CommandList {
        CommandList::from_vec(commands).unwrap()
    }

    #[tokio::test]
    async fn every_command_yields_a_result_even_when_one_fails() {
        let dispatcher = Dispatcher::new(
            HandlerRegistry::new()
                .with(CommandKind::General, Reply("chat"))
                .with(CommandKind::PlayMedia, Fails)
                .with(CommandKind::WebSearch, Reply("search")),
        );
        let commands = list(vec![
            Command::general("hi"),
            Command::new(CommandKind::PlayMedia, "song"),
            Command::new(CommandKind::WebSearch, "rust"),
        ]);

        let results = dispatcher.dispatch(commands).collect_all().await;

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.outcome.is_success()).count(), 2);
        let failed = results.iter().find(|r| r.outcome.is_failure()).unwrap();
        assert_eq!(failed.command.kind, CommandKind::PlayMedia);
        assert_eq!(
            failed.outcome,
            TaskOutcome::Failure("provider unavailable".to_string())
        );
    }

    #[tokio::test]
    async fn open_and_general_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let dispatcher = Dispatcher::new(
            HandlerRegistry::new()
                .with(
                    CommandKind::OpenApp,
                    Rendezvous {
                        barrier: Arc::clone(&barrier),
                        delay: Duration::from_millis(30),
                    },
                )
                .with(
                    CommandKind::General,
                    Rendezvous {
                        barrier,
                        delay: Duration::ZERO,
                    },
                ),
        );
        let commands = list(vec![
            Command::new(CommandKind::OpenApp, "chrome"),
            Command::general("tell me about mahatma gandhi"),
        ]);

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.dispatch(commands).collect_all(),
        )
        .await
        .expect("handlers should not wait on each other");

        assert_eq!(results.len(), 2);
        // 遅い方は後から届く
        assert_eq!(results[0].command.kind, CommandKind::General);
        assert_eq!(results[1].outcome, TaskOutcome::Success("chrome".to_string()));
    }

    #[tokio::test]
    async fn panic_becomes_failure() {
        let dispatcher = Dispatcher::new(
            HandlerRegistry::new()
                .with(CommandKind::CloseApp, Panics)
                .with(CommandKind::General, Reply("chat")),
        );
        let commands = list(vec![
            Command::new(CommandKind::CloseApp, "editor"),
            Command::general("still here"),
        ]);

        let results = dispatcher.dispatch(commands).collect_all().await;

        assert_eq!(results.len(), 2);
        let panicked = results
            .iter()
            .find(|r| r.command.kind == CommandKind::CloseApp)
            .unwrap();
        assert_eq!(
            panicked.outcome,
            TaskOutcome::Failure("handler panicked: handler bug".to_string())
        );
        assert!(results.iter().any(|r| r.outcome.is_success()));
    }

    #[tokio::test]
    async fn panic_while_building_the_future_becomes_failure() {
        let dispatcher = Dispatcher::new(
            HandlerRegistry::new()
                .with(CommandKind::SystemAction, PanicsBeforeFuture)
                .with(CommandKind::General, Reply("chat")),
        );
        let commands = list(vec![
            Command::new(CommandKind::SystemAction, "mute"),
            Command::general("still here"),
        ]);

        let results = dispatcher.dispatch(commands).collect_all().await;

        assert_eq!(results.len(), 2);
        let panicked = results
            .iter()
            .find(|r| r.command.kind == CommandKind::SystemAction)
            .unwrap();
        assert_eq!(
            panicked.outcome,
            TaskOutcome::Failure("handler panicked: bad argument".to_string())
        );
    }

    #[tokio::test]
    async fn generic_open_and_unknown_kind_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(
            HandlerRegistry::new().with(CommandKind::OpenApp, Counting(Arc::clone(&calls))),
        );
        let commands = list(vec![
            Command::new(CommandKind::OpenApp, "it"),
            Command::new(CommandKind::OpenApp, ""),
            Command::new(CommandKind::Reminder, "9pm meeting"),
            Command::new(CommandKind::OpenApp, "spotify"),
        ]);

        let results = dispatcher.dispatch(commands).collect_all().await;

        assert_eq!(results.len(), 4);
        let skipped = results
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Skipped(_)))
            .count();
        assert_eq!(skipped, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exit_is_surfaced_not_scheduled() {
        let dispatcher =
            Dispatcher::new(HandlerRegistry::new().with(CommandKind::General, Reply("chat")));
        let stream = dispatcher.dispatch(list(vec![Command::general("thanks"), Command::exit()]));

        assert!(stream.exit_requested());
        assert_eq!(stream.pending(), 1);
        assert_eq!(stream.collect_all().await.len(), 1);
    }

    #[tokio::test]
    async fn dropping_the_stream_aborts_handlers() {
        struct Slow(Arc<AtomicUsize>);

        impl CommandHandler for Slow {
            fn handle<'a>(&'a self, _command: &'a Command) -> BoxFuture<'a, Result<String>> {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    self.0.fetch_add(1, Ordering::SeqCst);
                    Ok(String::new())
                })
            }
        }

        let finished = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(
            HandlerRegistry::new().with(CommandKind::General, Slow(Arc::clone(&finished))),
        );
        let stream = dispatcher.dispatch(list(vec![Command::general("a")]));
        drop(stream);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn task_result_display() {
        let result = TaskResult {
            command: Command::new(CommandKind::OpenApp, "spotify"),
            outcome: TaskOutcome::Failure("not found".to_string()),
        };
        assert_eq!(result.to_string(), "[open] failed: not found");
    }
}
