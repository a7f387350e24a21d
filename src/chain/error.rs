//! プロバイダ呼び出しの失敗分類

use thiserror::Error;

/// 1 回のプロバイダ呼び出しの失敗
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 推論モデルのロード中（HTTP 503 + ロード中ステータス）
    #[error("model is loading")]
    WarmingUp,

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("provider returned an empty payload")]
    EmptyPayload,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl ProviderError {
    /// ステータスコードと本文から失敗を組み立てる。
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if is_quota_exhausted(&body) {
            return Self::QuotaExhausted(body);
        }
        if status == 503 && body.to_ascii_lowercase().contains("loading") {
            return Self::WarmingUp;
        }
        Self::Http { status, body }
    }

    /// 同じ階層内で再試行する価値があるか。
    ///
    /// 429 / 408 / 5xx / ロード中 / タイムアウト / 接続失敗は一時的。
    /// それ以外の 4xx とクォータ枯渇は恒久的。
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::WarmingUp | Self::Timeout | Self::Network(_) => true,
            Self::QuotaExhausted(_) | Self::EmptyPayload | Self::InvalidPayload(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else if err.is_decode() || err.is_body() {
            Self::InvalidPayload(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

fn is_quota_exhausted(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("insufficient_quota")
        || lower.contains("exceeded your current quota")
        || lower.contains("billing")
}

/// 階層名付きの失敗
#[derive(Debug, Clone)]
pub struct TierFailure {
    pub tier: String,
    pub error: ProviderError,
}

/// フォールバックチェーン全体の失敗（全階層で成果ゼロ）
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("all provider tiers failed: {}", summarize(.failures))]
    Exhausted { failures: Vec<TierFailure> },
}

fn summarize(failures: &[TierFailure]) -> String {
    if failures.is_empty() {
        return "no tier was available".to_string();
    }
    failures
        .iter()
        .map(|f| format!("{}: {}", f.tier, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(ProviderError::from_status(status, "").is_transient(), "{status}");
        }
    }

    #[test]
    fn permanent_statuses() {
        for status in [400, 401, 403, 404, 422] {
            assert!(!ProviderError::from_status(status, "").is_transient(), "{status}");
        }
    }

    #[test]
    fn quota_exhaustion_is_permanent_even_with_429() {
        let err = ProviderError::from_status(429, r#"{"error":"insufficient_quota"}"#);
        assert!(matches!(err, ProviderError::QuotaExhausted(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn loading_503_is_warming_up() {
        let err = ProviderError::from_status(503, r#"{"error":"Model is currently loading"}"#);
        assert!(matches!(err, ProviderError::WarmingUp));
        assert!(err.is_transient());
    }

    #[test]
    fn exhausted_lists_every_failure() {
        let err = ChainError::Exhausted {
            failures: vec![
                TierFailure {
                    tier: "brave".to_string(),
                    error: ProviderError::from_status(401, "unauthorized"),
                },
                TierFailure {
                    tier: "wikipedia".to_string(),
                    error: ProviderError::Timeout,
                },
            ],
        };
        let message = err.to_string();
        assert!(message.contains("brave: HTTP 401"));
        assert!(message.contains("wikipedia: request timed out"));
    }
}
