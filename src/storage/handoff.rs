//! プロセス間リクエスト受け渡し
//!
//! 1 行のテキストファイル `<payload>,<True|False>` を介して、
//! 生成リクエストを切り離されたワーカープロセスへ渡す。
//! ファイルロックは使わない（単一の書き手・単一の読み手が前提）。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// 消費済み・未使用状態を表すレコード
pub const IDLE_RECORD: &str = "False,False";

/// ハンドオフファイルの 1 レコード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRecord {
    pub payload: String,
    pub pending: bool,
}

impl HandoffRecord {
    /// レコードを解析する。ペイロードにカンマを含められるよう最後のカンマで分割する。
    /// フラグが True / False のどちらでもなければ不正として None を返す。
    pub fn parse(line: &str) -> Option<Self> {
        let (payload, flag) = line.trim().rsplit_once(',')?;
        let flag = flag.trim();
        let pending = if flag.eq_ignore_ascii_case("true") {
            true
        } else if flag.eq_ignore_ascii_case("false") {
            false
        } else {
            return None;
        };
        Some(Self {
            payload: payload.trim().to_string(),
            pending,
        })
    }

    pub fn render(&self) -> String {
        let flag = if self.pending { "True" } else { "False" };
        format!("{},{flag}", self.payload)
    }
}

/// ハンドオフファイルへのアクセス
#[derive(Debug, Clone)]
pub struct RequestHandoff {
    path: PathBuf,
}

impl RequestHandoff {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// リクエストを書き込む。未消費のリクエストがあれば上書きする（後勝ち）。
    pub fn write_request(&self, payload: &str) -> Result<()> {
        if let Some(existing) = self.read().filter(|r| r.pending) {
            warn!(
                previous = %existing.payload,
                next = %payload,
                "Overwriting an unconsumed handoff request"
            );
        }
        let record = HandoffRecord {
            payload: payload.to_string(),
            pending: true,
        };
        self.write_record(&record.render())?;
        debug!(path = %self.path.display(), payload = %payload, "Handoff request written");
        Ok(())
    }

    /// 現在のレコードを読む。ファイルがない・不正な場合は None。
    pub fn read(&self) -> Option<HandoffRecord> {
        let content = fs::read_to_string(&self.path).ok()?;
        let record = HandoffRecord::parse(&content);
        if record.is_none() {
            debug!(
                path = %self.path.display(),
                content = %content.trim(),
                "Malformed handoff record ignored"
            );
        }
        record
    }

    /// 未消費のリクエストがあればペイロードを返す。
    pub fn pending(&self) -> Option<String> {
        self.read().filter(|r| r.pending).map(|r| r.payload)
    }

    /// レコードを `False,False` に戻す。
    pub fn reset(&self) -> Result<()> {
        self.write_record(IDLE_RECORD)?;
        debug!(path = %self.path.display(), "Handoff record reset");
        Ok(())
    }

    fn write_record(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        fs::write(&self.path, line)
            .with_context(|| format!("failed to write handoff file: {}", self.path.display()))
    }
}
