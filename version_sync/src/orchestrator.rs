//! The update run: find uncovered periods, pick a working commit for each, record it.
//!
//! Two nested [`stream::run`] pipelines do the work. The outer one walks the missing
//! `(channel, period)` pairs; each of its workers lists candidate commits and feeds
//! them one at a time into the inner pipeline, which extracts and stores package sets.
//! A [`CommitStateCache`] shared by both makes sure a commit wanted by several periods
//! is extracted once.

use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use history_ingestor::{
    extractor::PackageExtractor,
    models::{
        channel::Channel,
        commit::{Commit, CommitState},
    },
};
use tokio_util::sync::CancellationToken;

use crate::{
    cache::{CacheError, CommitStateCache},
    fetcher::RateLimitedFetcher,
    gaps,
    period::{Frequency, Period},
    storage::{CoverageRecord, Storage},
    stream::{self, Enqueuer},
};

/// Result for one `(channel, period)`: `Ok` names the verified commit, `Err` says why
/// none was found. Both are human-readable lines.
pub type Outcome = Result<String, String>;

/// Worker counts and candidate limits of an update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Periods processed concurrently.
    pub period_workers: usize,
    /// Commits extracted concurrently.
    pub commit_workers: usize,
    /// Candidates tried per period before giving up.
    pub max_candidates: usize,
}

/// Available parallelism minus one, at least 1. The most commit workers a run uses.
pub fn spare_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// [`spare_cores`] capped at 3. Extraction is CPU and memory heavy.
pub fn default_commit_workers() -> usize {
    spare_cores().min(3)
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            period_workers: 10,
            commit_workers: default_commit_workers(),
            max_candidates: 10,
        }
    }
}

/// Everything an update run talks to.
pub struct Updater {
    storage: Arc<dyn Storage>,
    extractor: Arc<dyn PackageExtractor + Send + Sync>,
    fetcher: Arc<RateLimitedFetcher>,
    options: UpdateOptions,
}

/// State shared by all workers of one run.
struct Run {
    storage: Arc<dyn Storage>,
    extractor: Arc<dyn PackageExtractor + Send + Sync>,
    fetcher: Arc<RateLimitedFetcher>,
    cache: CommitStateCache,
    completed: HashMap<Commit, CommitState>,
    /// Fires on `cancel` or on the first coverage write failure.
    halt: CancellationToken,
    max_candidates: usize,
    total: usize,
}

impl Updater {
    /// Bundles the collaborators of an update run.
    pub fn new(
        storage: Arc<dyn Storage>,
        extractor: Arc<dyn PackageExtractor + Send + Sync>,
        fetcher: Arc<RateLimitedFetcher>,
        options: UpdateOptions,
    ) -> Self {
        Self {
            storage,
            extractor,
            fetcher,
            options,
        }
    }

    /// Brings coverage of `channels` over `target` up to date.
    ///
    /// Returns one [`Outcome`] per period that needed work, in completion order. Once
    /// `cancel` fires no further periods are started; those in flight finish and their
    /// outcomes are returned.
    ///
    /// Failing to read coverage or commit states returns `Err` before any work starts.
    /// Failing to write a coverage record stops new periods from starting, and the run
    /// returns that `Err` once the periods already in flight have drained.
    ///
    /// Commits whose verdict is already persisted are not extracted again: a `Broken`
    /// commit is skipped and a `Success` commit covers the period straight away.
    pub async fn update_database(
        &self,
        channels: &[Channel],
        frequency: Frequency,
        target: Period,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<Outcome>> {
        let mut coverage: HashMap<Channel, Vec<CoverageRecord>> = HashMap::new();
        for &channel in channels {
            let records = self
                .storage
                .coverage(channel)
                .await
                .with_context(|| format!("loading coverage of {channel}"))?;
            coverage.insert(channel, records);
        }

        // Snapshot: states learned during this run live in the cache instead.
        let mut completed: HashMap<Commit, CommitState> = coverage
            .values()
            .flatten()
            .map(|r| (r.commit.clone(), r.state))
            .collect();
        completed.extend(
            self.storage
                .commit_states()
                .await
                .context("loading commit states")?,
        );

        let missing = gaps::missing(channels, &coverage, target, frequency);
        let total = missing.len();
        tracing::info!(
            total,
            %target,
            frequency_secs = frequency.duration().num_seconds(),
            "periods needing a verified commit"
        );
        if total == 0 {
            return Ok(Vec::new());
        }

        let run = Arc::new(Run {
            storage: Arc::clone(&self.storage),
            extractor: Arc::clone(&self.extractor),
            fetcher: Arc::clone(&self.fetcher),
            cache: CommitStateCache::new(),
            completed,
            halt: cancel.child_token(),
            max_candidates: self.options.max_candidates,
            total,
        });

        let period_workers = self.options.period_workers;
        let outer_run = Arc::clone(&run);
        let inner_run = Arc::clone(&run);
        let halt = run.halt.clone();

        let (outcomes, extractions) = stream::run(
            self.options.commit_workers,
            move |commits: Enqueuer<Commit>| async move {
                let (_, outcomes) = stream::run(
                    period_workers,
                    move |periods| enqueue_periods(periods, missing, halt),
                    move |(index, channel, period)| {
                        Arc::clone(&outer_run).verify_period(
                            commits.clone(),
                            index,
                            channel,
                            period,
                        )
                    },
                )
                .await;
                outcomes
            },
            move |commit| Arc::clone(&inner_run).process_commit(commit),
        )
        .await;

        for extraction in extractions {
            extraction.context("commit state published twice")?;
        }
        let outcomes = outcomes.into_iter().collect::<anyhow::Result<Vec<_>>>()?;

        let verified = outcomes.iter().filter(|o| o.is_ok()).count();
        tracing::info!(
            verified,
            failed = outcomes.len() - verified,
            skipped = total - outcomes.len(),
            commits_seen = run.cache.seen(),
            rate_limit_retries = run.fetcher.retries(),
            "update finished"
        );
        Ok(outcomes)
    }
}

async fn enqueue_periods(
    periods: Enqueuer<(usize, Channel, Period)>,
    missing: Vec<(Channel, Period)>,
    cancel: CancellationToken,
) {
    for (i, (channel, period)) in missing.into_iter().enumerate() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(enqueued = i, "stopping, not starting further periods");
                return;
            }
            sent = periods.enqueue((i + 1, channel, period)) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

impl Run {
    async fn verify_period(
        self: Arc<Self>,
        commits: Enqueuer<Commit>,
        index: usize,
        channel: Channel,
        period: Period,
    ) -> anyhow::Result<Outcome> {
        let progress = format!("{index}/{}", self.total);
        tracing::info!(%progress, %channel, %period, "verifying period");

        let candidates: Vec<Commit> = self
            .fetcher
            .commits_within(channel, period)
            .await
            .into_iter()
            .filter(|c| self.completed.get(c) != Some(&CommitState::Broken))
            .take(self.max_candidates)
            .collect();

        let tried = candidates.len();
        for commit in candidates {
            let state = match self.completed.get(&commit) {
                Some(&CommitState::Success) => CommitState::Success,
                _ => {
                    commits.enqueue(commit.clone()).await?;
                    self.cache.await_final(&commit).await
                }
            };
            if state == CommitState::Success {
                if let Err(e) = self.storage.write_coverage(period, channel, &commit).await {
                    self.halt.cancel();
                    return Err(e.context(format!("recording coverage of {channel} {period}")));
                }
                tracing::info!(%progress, %channel, %period, %commit, "period verified");
                return Ok(Ok(format!("{channel} {period}: {commit}")));
            }
            tracing::debug!(%channel, %period, %commit, %state, "candidate rejected");
        }

        tracing::warn!(%progress, %channel, %period, tried, "no working commit");
        Ok(Err(format!(
            "{channel} {period}: no working commit among {tried} candidates"
        )))
    }

    async fn process_commit(self: Arc<Self>, commit: Commit) -> Result<(), CacheError> {
        let (entry, created) = self.cache.get_or_create(&commit);
        if !created {
            tracing::debug!(%commit, "already claimed by another worker");
            return Ok(());
        }

        let state = match self.extractor.packages_at(&commit).await {
            Ok(packages) => match self.store(&commit, &packages).await {
                Ok(()) => {
                    tracing::info!(%commit, packages = packages.len(), "commit extracted");
                    CommitState::Success
                }
                Err(e) => {
                    tracing::error!(%commit, error = %e, "storing packages failed");
                    self.mark_broken(&commit).await;
                    CommitState::Broken
                }
            },
            Err(e) => {
                tracing::warn!(%commit, error = %e, "extraction failed");
                self.mark_broken(&commit).await;
                CommitState::Broken
            }
        };
        entry.publish(state)
    }

    async fn store(
        &self,
        commit: &Commit,
        packages: &[history_ingestor::models::package::Package],
    ) -> anyhow::Result<()> {
        self.storage
            .write_commit_state(commit, CommitState::Incomplete)
            .await?;
        self.storage.write_packages(commit, packages).await?;
        self.storage
            .write_commit_state(commit, CommitState::Success)
            .await
    }

    async fn mark_broken(&self, commit: &Commit) {
        if let Err(e) = self
            .storage
            .write_commit_state(commit, CommitState::Broken)
            .await
        {
            tracing::error!(%commit, error = %e, "recording broken state failed");
        }
    }
}
