//! ログ初期化モジュール
//!
//! `tracing` + `tracing-subscriber` でデバッグログをファイルに出力する。
//! ログファイルはデータディレクトリの `logs/` にローカル日付で日次ローテーションする。

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{fmt, EnvFilter};

/// ログレベルを指定する環境変数
pub const LOG_ENV: &str = "FRIDAY_LOG";

/// REPL のログファイル名
pub const REPL_LOG_PREFIX: &str = "friday.log";

/// 画像生成ワーカーのログファイル名
pub const WORKER_LOG_PREFIX: &str = "friday-worker.log";

/// ログ行のタイムスタンプをローカル時刻で出力するタイマー
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// ローカル日付で日次ローテーションするファイルアペンダー。
///
/// 書き込み時に日付を確認し、変わっていれば新しいファイルを開く。
struct DailyAppender {
    dir: PathBuf,
    prefix: String,
    current_date: NaiveDate,
    file: File,
}

impl DailyAppender {
    fn new(dir: PathBuf, prefix: &str) -> std::io::Result<Self> {
        let today = Local::now().date_naive();
        let file = Self::open_log_file(&dir, prefix, today)?;
        Ok(Self {
            dir,
            prefix: prefix.to_string(),
            current_date: today,
            file,
        })
    }

    fn open_log_file(dir: &Path, prefix: &str, date: NaiveDate) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(log_file_name(prefix, date)))
    }
}

fn log_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}.{}", prefix, date.format("%Y-%m-%d"))
}

impl Write for DailyAppender {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let today = Local::now().date_naive();
        if today != self.current_date {
            self.file = Self::open_log_file(&self.dir, &self.prefix, today)?;
            self.current_date = today;
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

/// ログシステムを初期化する。
///
/// - ログレベルは `FRIDAY_LOG` 環境変数で制御（デフォルト: `debug`）
/// - `<log_dir>/<prefix>.YYYY-MM-DD` に出力
///
/// 返り値のガードは `main()` の終了まで保持すること（ドロップするとログ出力が止まる）。
pub fn init_logging(
    log_dir: &Path,
    prefix: &str,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = DailyAppender::new(log_dir.to_path_buf(), prefix)
        .with_context(|| format!("failed to create log file in {}", log_dir.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("debug"));

    fmt()
        .with_env_filter(env_filter)
        .with_writer(non_blocking)
        .with_timer(LocalTimer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .with_file(true)
        .init();

    Ok(guard)
}
