//! 画像生成ワーカー（ハンドオフファイルの消費側）
//!
//! 一定間隔でハンドオフファイルを見に行き、未消費のリクエストを 1 件だけ処理して終了する。
//! 成否に関わらず処理後はレコードを `False,False` に戻す。
//! リクエストが来ないまま待ち時間を超えた場合も終了する。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::engine::handlers::Launcher;
use crate::resolver::media::MediaResolver;
use crate::storage::handoff::RequestHandoff;

/// 1 件のリクエストを処理する
pub trait RequestProcessor: Send + Sync {
    fn process<'a>(&'a self, payload: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// 1 回のポーリングの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// リクエストなし
    Idle,
    Processed,
    Failed(String),
}

/// ワーカー終了理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Handled(PollOutcome),
    IdleTimeout,
}

pub struct HandoffWorker<P> {
    handoff: RequestHandoff,
    processor: P,
    poll_interval: Duration,
    idle_timeout: Duration,
}

impl<P: RequestProcessor> HandoffWorker<P> {
    pub fn new(handoff: RequestHandoff, processor: P, config: &WorkerConfig) -> Self {
        Self {
            handoff,
            processor,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }

    /// ハンドオフファイルを 1 回確認し、リクエストがあれば処理する。
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let Some(payload) = self.handoff.pending() else {
            return Ok(PollOutcome::Idle);
        };

        info!(payload = %payload, "Handoff request picked up");
        let outcome = match self.processor.process(&payload).await {
            Ok(()) => PollOutcome::Processed,
            Err(e) => {
                let error = format!("{e:#}");
                warn!(payload = %payload, error = %error, "Handoff request failed");
                PollOutcome::Failed(error)
            }
        };
        self.handoff.reset()?;
        Ok(outcome)
    }

    /// リクエストを 1 件処理するか、待ち時間を超えるまでポーリングする。
    pub async fn run(&self) -> Result<WorkerExit> {
        let deadline = Instant::now() + self.idle_timeout;
        debug!(
            path = %self.handoff.path().display(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker polling started"
        );
        loop {
            match self.poll_once().await? {
                PollOutcome::Idle => {}
                handled => return Ok(WorkerExit::Handled(handled)),
            }
            if Instant::now() >= deadline {
                info!(
                    idle_timeout_secs = self.idle_timeout.as_secs(),
                    "Worker idle timeout reached"
                );
                return Ok(WorkerExit::IdleTimeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// 画像を生成して保存し、既定のビューアで開く。
pub struct ImageRequestProcessor {
    media: MediaResolver,
    launcher: Arc<dyn Launcher>,
}

impl ImageRequestProcessor {
    pub fn new(media: MediaResolver, launcher: Arc<dyn Launcher>) -> Self {
        Self { media, launcher }
    }
}

impl RequestProcessor for ImageRequestProcessor {
    fn process<'a>(&'a self, payload: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let paths = self.media.generate(payload).await?;
            for path in &paths {
                if let Err(e) = self.launcher.open(&path.to_string_lossy()) {
                    warn!(path = %path.display(), error = %e, "Failed to open generated image");
                }
            }
            info!(prompt = %payload, images = paths.len(), "Image request completed");
            Ok(())
        })
    }
}
