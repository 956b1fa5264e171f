//! Commit listing with rate-limit backoff.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use history_ingestor::{
    models::{channel::Channel, commit::Commit},
    providers::{HistoryProvider, ProviderError},
};

use crate::period::Period;

/// Commits requested per call.
pub const DEFAULT_PAGE_SIZE: u8 = 30;

/// Knobs for [`RateLimitedFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Commits requested per call.
    pub page_size: u8,
    /// Ceiling for a single backoff sleep.
    pub max_backoff: Duration,
    /// Give up after this many rate-limit retries for one call. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_backoff: Duration::from_secs(3600),
            max_retries: None,
        }
    }
}

/// Wraps a [`HistoryProvider`], sleeping through rate limits and swallowing other errors.
pub struct RateLimitedFetcher {
    provider: Arc<dyn HistoryProvider + Send + Sync>,
    policy: FetchPolicy,
    retries: AtomicU64,
}

fn round_up_secs(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs() + u64::from(d.subsec_nanos() > 0))
}

impl RateLimitedFetcher {
    /// Fetcher over `provider`.
    pub fn new(provider: Arc<dyn HistoryProvider + Send + Sync>, policy: FetchPolicy) -> Self {
        Self {
            provider,
            policy,
            retries: AtomicU64::new(0),
        }
    }

    /// Rate-limit retries performed so far, over all calls.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Newest commits of `channel` at or before `period.end`.
    ///
    /// Rate limits are waited out (rounded up to whole seconds, capped by the policy)
    /// and retried. Any other failure, or running out of retries, is logged and yields
    /// no commits.
    pub async fn commits_within(&self, channel: Channel, period: Period) -> Vec<Commit> {
        let mut attempt: u32 = 0;
        loop {
            let err = match self
                .provider
                .commits_until(channel.branch(), period.end, self.policy.page_size)
                .await
            {
                Ok(commits) => return commits,
                Err(err) => err,
            };

            let wait = match err {
                ProviderError::RateLimited { wait } => wait,
                other => {
                    tracing::warn!(%channel, %period, error = %other, "listing commits failed");
                    return Vec::new();
                }
            };

            if let Some(max) = self.policy.max_retries {
                if attempt >= max {
                    tracing::warn!(
                        %channel,
                        %period,
                        retries = attempt,
                        "giving up after rate-limit retries"
                    );
                    return Vec::new();
                }
            }
            attempt += 1;
            let total = self.retries.fetch_add(1, Ordering::Relaxed) + 1;
            let sleep = round_up_secs(wait).min(self.policy.max_backoff);
            tracing::warn!(
                %channel,
                %period,
                wait_secs = sleep.as_secs(),
                attempt,
                total_retries = total,
                "rate limited, backing off"
            );
            tokio::time::sleep(sleep).await;
        }
    }
}
