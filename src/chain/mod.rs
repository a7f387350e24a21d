//! フォールバックチェーン — 不安定な外部プロバイダを階層的に試行する
//!
//! 階層は優先順に 1 つずつ評価し、各階層では
//! `min(target − achieved, budget)` 個の試行を並行に発行する。
//! 一時的な失敗は同じ階層内で 1 回だけ遅延再試行し、恒久的な失敗は再試行しない。
//! 目標数に達した時点で打ち切り、部分的な成功も `Ok` として返す。

mod error;

use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use tracing::{debug, info, warn};

pub use error::{ChainError, ProviderError, TierFailure};

/// 1 つのプロバイダ階層
pub trait ProviderTier<Req, T>: Send + Sync {
    /// ログ用の階層名
    fn name(&self) -> &str;

    /// 1 パスあたりに発行できる最大試行数
    fn budget(&self) -> usize;

    /// 認証情報が必要な階層か
    fn requires_credentials(&self) -> bool {
        false
    }

    /// 認証情報が設定済みか（`requires_credentials` が true の場合のみ参照）
    fn has_credentials(&self) -> bool {
        true
    }

    /// 1 単位を取得する。`index` はチェーン内で一意の試行番号（シード等に使う）。
    fn attempt<'a>(
        &'a self,
        request: &'a Req,
        index: usize,
    ) -> BoxFuture<'a, Result<T, ProviderError>>;

    /// 失敗が一時的か（同じ階層で再試行するか）
    fn is_transient(&self, error: &ProviderError) -> bool {
        error.is_transient()
    }
}

/// 再試行ポリシー
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
    pub transient_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(30),
            transient_retries: 1,
        }
    }
}

/// 解決結果
#[derive(Debug)]
pub struct Resolution<T> {
    pub units: Vec<T>,
    pub achieved: usize,
}

/// 優先順の階層リストと再試行ポリシー
pub struct FallbackChain<Req, T> {
    tiers: Vec<Box<dyn ProviderTier<Req, T>>>,
    policy: RetryPolicy,
}

impl<Req, T> FallbackChain<Req, T>
where
    Req: Sync,
    T: Send,
{
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            tiers: Vec::new(),
            policy,
        }
    }

    /// 末尾（最も優先度の低い位置）に階層を追加する。
    pub fn with_tier(mut self, tier: impl ProviderTier<Req, T> + 'static) -> Self {
        self.tiers.push(Box::new(tier));
        self
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// `target` 単位を目標に階層を順に試す。
    ///
    /// 1 単位も得られなかった場合のみ `ChainError::Exhausted` を返す。
    pub async fn resolve(&self, request: &Req, target: usize) -> Result<Resolution<T>, ChainError> {
        let mut units: Vec<T> = Vec::with_capacity(target);
        let mut failures = Vec::new();
        let mut next_index = 0usize;

        for tier in &self.tiers {
            let remaining = target.saturating_sub(units.len());
            if remaining == 0 {
                break;
            }

            if tier.requires_credentials() && !tier.has_credentials() {
                info!(tier = tier.name(), "Skipping tier without credentials");
                continue;
            }

            let issue = remaining.min(tier.budget());
            if issue == 0 {
                continue;
            }

            debug!(tier = tier.name(), attempts = issue, remaining, "Issuing tier attempts");
            let attempts = (next_index..next_index + issue)
                .map(|index| self.attempt_with_retry(tier.as_ref(), request, index));
            next_index += issue;

            let before = units.len();
            for outcome in join_all(attempts).await {
                match outcome {
                    Ok(unit) => units.push(unit),
                    Err(error) => failures.push(TierFailure {
                        tier: tier.name().to_string(),
                        error,
                    }),
                }
            }

            info!(
                tier = tier.name(),
                gained = units.len() - before,
                achieved = units.len(),
                target,
                "Tier finished"
            );
        }

        if units.is_empty() && target > 0 {
            warn!(failures = failures.len(), "Every provider tier failed");
            return Err(ChainError::Exhausted { failures });
        }

        let achieved = units.len();
        Ok(Resolution { units, achieved })
    }

    async fn attempt_with_retry(
        &self,
        tier: &dyn ProviderTier<Req, T>,
        request: &Req,
        index: usize,
    ) -> Result<T, ProviderError> {
        let mut retries_left = self.policy.transient_retries;
        loop {
            let result = match tokio::time::timeout(
                self.policy.attempt_timeout,
                tier.attempt(request, index),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };

            match result {
                Ok(unit) => return Ok(unit),
                Err(error) if retries_left > 0 && tier.is_transient(&error) => {
                    warn!(
                        tier = tier.name(),
                        index,
                        error = %error,
                        delay_ms = self.policy.retry_delay.as_millis() as u64,
                        "Transient provider failure, retrying"
                    );
                    retries_left -= 1;
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                Err(error) => {
                    warn!(tier = tier.name(), index, error = %error, "Provider attempt failed");
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        FailPermanent,
        FailTransientOnce,
        FailTransientAlways,
        Hang,
    }

    struct MockTier {
        name: &'static str,
        budget: usize,
        behavior: Behavior,
        needs_key: bool,
        has_key: bool,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<HashSet<usize>>>,
    }

    impl MockTier {
        fn new(name: &'static str, budget: usize, behavior: Behavior) -> Self {
            Self {
                name,
                budget,
                behavior,
                needs_key: false,
                has_key: true,
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(HashSet::new())),
            }
        }

        fn credentialed(mut self, has_key: bool) -> Self {
            self.needs_key = true;
            self.has_key = has_key;
            self
        }

        fn counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }
    }

    impl ProviderTier<String, String> for MockTier {
        fn name(&self) -> &str {
            self.name
        }

        fn budget(&self) -> usize {
            self.budget
        }

        fn requires_credentials(&self) -> bool {
            self.needs_key
        }

        fn has_credentials(&self) -> bool {
            self.has_key
        }

        fn attempt<'a>(
            &'a self,
            request: &'a String,
            index: usize,
        ) -> BoxFuture<'a, Result<String, ProviderError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let first_try = self.seen.lock().unwrap().insert(index);
            Box::pin(async move {
                match self.behavior {
                    Behavior::Succeed => Ok(format!("{request}#{index}")),
                    Behavior::FailPermanent => Err(ProviderError::from_status(401, "bad key")),
                    Behavior::FailTransientOnce if first_try => {
                        Err(ProviderError::from_status(503, "busy"))
                    }
                    Behavior::FailTransientOnce => Ok(format!("{request}#{index}")),
                    Behavior::FailTransientAlways => {
                        Err(ProviderError::from_status(429, "slow down"))
                    }
                    Behavior::Hang => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok("late".to_string())
                    }
                }
            })
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            retry_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(200),
            transient_retries: 1,
        }
    }

    #[tokio::test]
    async fn permanent_tier_then_successful_tier_reaches_target() {
        let failing = MockTier::new("failing", 4, Behavior::FailPermanent);
        let working = MockTier::new("working", 10, Behavior::Succeed);
        let failing_calls = failing.counter();
        let working_calls = working.counter();

        let chain = FallbackChain::new(fast_policy())
            .with_tier(failing)
            .with_tier(working);
        let resolution = chain.resolve(&"cat".to_string(), 4).await.unwrap();

        assert_eq!(resolution.achieved, 4);
        assert_eq!(resolution.units.len(), 4);
        // 恒久的な失敗は再試行されない
        assert_eq!(failing_calls.load(Ordering::SeqCst), 4);
        assert_eq!(working_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let tier = MockTier::new("flaky", 2, Behavior::FailTransientOnce);
        let calls = tier.counter();
        let chain = FallbackChain::new(fast_policy()).with_tier(tier);

        let resolution = chain.resolve(&"q".to_string(), 2).await.unwrap();
        assert_eq!(resolution.achieved, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn transient_retry_is_bounded() {
        let tier = MockTier::new("throttled", 1, Behavior::FailTransientAlways);
        let calls = tier.counter();
        let chain = FallbackChain::new(fast_policy()).with_tier(tier);

        let err = chain.resolve(&"q".to_string(), 1).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let ChainError::Exhausted { failures } = err;
        assert_eq!(failures.len(), 1);
    }

    #[tokio::test]
    async fn tier_without_credentials_is_skipped() {
        let locked = MockTier::new("locked", 4, Behavior::Succeed).credentialed(false);
        let public = MockTier::new("public", 4, Behavior::Succeed);
        let locked_calls = locked.counter();

        let chain = FallbackChain::new(fast_policy())
            .with_tier(locked)
            .with_tier(public);
        let resolution = chain.resolve(&"q".to_string(), 3).await.unwrap();

        assert_eq!(resolution.achieved, 3);
        assert_eq!(locked_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn budget_caps_attempts_and_chain_carries_progress() {
        let small = MockTier::new("small", 1, Behavior::Succeed);
        let large = MockTier::new("large", 10, Behavior::Succeed);
        let small_calls = small.counter();
        let large_calls = large.counter();

        let chain = FallbackChain::new(fast_policy())
            .with_tier(small)
            .with_tier(large);
        let resolution = chain.resolve(&"q".to_string(), 4).await.unwrap();

        assert_eq!(resolution.achieved, 4);
        assert_eq!(small_calls.load(Ordering::SeqCst), 1);
        assert_eq!(large_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn target_reached_stops_the_chain() {
        let first = MockTier::new("first", 4, Behavior::Succeed);
        let second = MockTier::new("second", 4, Behavior::Succeed);
        let second_calls = second.counter();

        let chain = FallbackChain::new(fast_policy())
            .with_tier(first)
            .with_tier(second);
        chain.resolve(&"q".to_string(), 4).await.unwrap();
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn partial_success_is_ok() {
        let chain = FallbackChain::new(fast_policy())
            .with_tier(MockTier::new("one", 1, Behavior::Succeed))
            .with_tier(MockTier::new("broken", 4, Behavior::FailPermanent));

        let resolution = chain.resolve(&"q".to_string(), 4).await.unwrap();
        assert_eq!(resolution.achieved, 1);
    }

    #[tokio::test]
    async fn every_tier_failing_lists_all_failures() {
        let chain = FallbackChain::new(fast_policy())
            .with_tier(MockTier::new("a", 2, Behavior::FailPermanent))
            .with_tier(MockTier::new("b", 1, Behavior::FailPermanent));

        let ChainError::Exhausted { failures } =
            chain.resolve(&"q".to_string(), 2).await.unwrap_err();
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].tier, "a");
        assert_eq!(failures[2].tier, "b");
    }

    #[tokio::test]
    async fn attempt_timeout_counts_as_transient() {
        let tier = MockTier::new("slow", 1, Behavior::Hang);
        let calls = tier.counter();
        let chain = FallbackChain::new(fast_policy()).with_tier(tier);

        let ChainError::Exhausted { failures } =
            chain.resolve(&"q".to_string(), 1).await.unwrap_err();
        assert!(matches!(failures[0].error, ProviderError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn attempt_indices_are_unique_across_tiers() {
        let chain = FallbackChain::new(fast_policy())
            .with_tier(MockTier::new("a", 2, Behavior::Succeed))
            .with_tier(MockTier::new("b", 4, Behavior::Succeed));

        let resolution = chain.resolve(&"p".to_string(), 4).await.unwrap();
        let unique: HashSet<_> = resolution.units.iter().collect();
        assert_eq!(unique.len(), 4);
    }
}
