//! リマインダー帳 — 時刻付きメッセージを JSON ファイルに保存する

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// `9pm` / `21:30` / `7:15 am` 形式の時刻
static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm|a\.m\.|p\.m\.)?(?:\s|$|[,.!?])")
        .expect("invalid time pattern")
});

/// 1 件のリマインダー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub due: DateTime<Local>,
    pub message: String,
}

/// リマインダー指定文を解析する。
///
/// 時刻は `now` 以降で最も近い時点に解決する（過ぎていれば翌日）。
/// 時刻以外の部分がメッセージになる。時刻が見つからなければ None。
pub fn parse_reminder(text: &str, now: DateTime<Local>) -> Option<Reminder> {
    let (time, span) = TIME_PATTERN.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = match caps.get(2) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        let meridiem = caps.get(3).map(|m| m.as_str().to_ascii_lowercase());

        // "25th" や単なる数字は時刻として扱わない
        if caps.get(2).is_none() && meridiem.is_none() {
            return None;
        }

        let hour = match meridiem.as_deref() {
            Some(m) if m.starts_with('p') => {
                if !(1..=12).contains(&hour) {
                    return None;
                }
                hour % 12 + 12
            }
            Some(_) => {
                if !(1..=12).contains(&hour) {
                    return None;
                }
                hour % 12
            }
            None => hour,
        };
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
        Some((time, whole.start()..whole.end()))
    })?;

    let due = next_occurrence(time, now)?;
    let mut message = String::with_capacity(text.len());
    message.push_str(&text[..span.start]);
    message.push(' ');
    message.push_str(&text[span.end..]);
    let message = tidy_message(&message);

    Some(Reminder {
        due,
        message: if message.is_empty() {
            "Reminder".to_string()
        } else {
            message
        },
    })
}

fn next_occurrence(time: NaiveTime, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let today = now.date_naive().and_time(time);
    let candidate = Local.from_local_datetime(&today).earliest()?;
    if candidate > now {
        return Some(candidate);
    }
    let tomorrow = today + Duration::days(1);
    Local.from_local_datetime(&tomorrow).earliest()
}

fn tidy_message(raw: &str) -> String {
    let words: Vec<&str> = raw.split_whitespace().collect();
    let mut start = 0;
    while start < words.len()
        && matches!(words[start].to_ascii_lowercase().as_str(), "at" | "to" | "me")
    {
        start += 1;
    }
    let mut end = words.len();
    while end > start
        && matches!(words[end - 1].to_ascii_lowercase().as_str(), "at" | "by" | "on")
    {
        end -= 1;
    }
    words[start..end]
        .join(" ")
        .trim_matches(|c: char| c == ',' || c == '.' || c.is_whitespace())
        .to_string()
}

/// `reminders.json` に保存されたリマインダー一覧
///
/// 複製はファイルロックを共有する。読み込みから書き戻しまでを 1 つのロック内で行うので、
/// 並行する `add` / `take_due` が互いの書き込みを失わない。
#[derive(Debug, Clone)]
pub struct ReminderBook {
    path: PathBuf,
    file_lock: Arc<Mutex<()>>,
}

impl ReminderBook {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file_lock: Arc::new(Mutex::new(())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // 中身のない排他用ロックなので poison は無視してよい
        self.file_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 保存済みのリマインダーを読む。ファイルがない・壊れている場合は空。
    pub fn load(&self) -> Vec<Reminder> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Reminder file is corrupt, ignoring");
            Vec::new()
        })
    }

    pub fn add(&self, reminder: Reminder) -> Result<()> {
        let _guard = self.lock();
        let mut reminders = self.load();
        debug!(due = %reminder.due, message = %reminder.message, "Reminder added");
        reminders.push(reminder);
        reminders.sort_by_key(|r| r.due);
        self.save(&reminders)
    }

    /// 期限を過ぎたリマインダーを取り出し、残りを保存し直す。
    pub fn take_due(&self, now: DateTime<Local>) -> Result<Vec<Reminder>> {
        let _guard = self.lock();
        let reminders = self.load();
        let (due, pending): (Vec<_>, Vec<_>) = reminders.into_iter().partition(|r| r.due <= now);
        if !due.is_empty() {
            self.save(&pending)?;
        }
        Ok(due)
    }

    fn save(&self, reminders: &[Reminder]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(reminders).context("failed to serialize reminders")?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write reminders: {}", self.path.display()))
    }
}
