//! 外部サービスに依存する応答の解決
//!
//! - `chat`: 通常会話
//! - `search`: 検索結果付きのリアルタイム回答
//! - `media`: 画像生成
//! - `content`: 文章作成

pub mod chat;
pub mod content;
pub mod media;
pub mod search;

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::chain::ProviderError;

/// ブラウザ相当の User-Agent（HTML 検索ページ向け）
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// プロバイダ呼び出しに使う共通 HTTP クライアントを生成する。
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// 成功ステータス以外を `ProviderError` に変換する。
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status.as_u16(), body))
}

/// 通常会話に添える現在日時ブロック
pub fn realtime_block(now: DateTime<Local>) -> String {
    format!(
        "Please use this real-time information if needed.\n\
         Day: {}\nDate: {}\nMonth: {}\nYear: {}.\n\
         Time: {} hours:{} minutes:{} seconds.\n",
        now.format("%A"),
        now.format("%d"),
        now.format("%B"),
        now.format("%Y"),
        now.format("%H"),
        now.format("%M"),
        now.format("%S"),
    )
}

/// 検索回答に添える 1 行の現在日時
pub fn timestamp_line(now: DateTime<Local>) -> String {
    format!("Current Info: {}", now.format("%A, %B %d, %Y at %H:%M"))
}
