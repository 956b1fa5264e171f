//! In-memory collaborators for driving an update run without network, nix, or SQLite.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use history_ingestor::{
    extractor::{ExtractionError, FailedSnafu, PackageExtractor},
    models::{
        channel::Channel,
        commit::{Commit, CommitState},
        package::Package,
    },
    providers::{HistoryProvider, ProviderError},
};
use version_sync::{
    period::Period,
    storage::{CoverageRecord, Storage, StorageResult},
};

#[derive(Default)]
struct Tables {
    states: HashMap<Commit, CommitState>,
    state_log: Vec<(Commit, CommitState)>,
    packages: HashMap<(Commit, String), Package>,
    coverage: Vec<(Period, Channel, Commit)>,
}

/// `Storage` backed by hash maps, with switches to make writes fail.
#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
    pub fail_packages_for: Mutex<HashSet<Commit>>,
    pub fail_coverage: Mutex<bool>,
}

impl MemoryStorage {
    pub fn state(&self, commit: &str) -> Option<CommitState> {
        self.tables.lock().unwrap().states.get(&Commit::new(commit)).copied()
    }

    /// Every state write in order.
    pub fn state_log(&self) -> Vec<(Commit, CommitState)> {
        self.tables.lock().unwrap().state_log.clone()
    }

    pub fn coverage_rows(&self) -> Vec<(Period, Channel, Commit)> {
        let mut rows = self.tables.lock().unwrap().coverage.clone();
        rows.sort();
        rows
    }

    pub fn package_count(&self, commit: &str) -> usize {
        let commit = Commit::new(commit);
        self.tables
            .lock()
            .unwrap()
            .packages
            .keys()
            .filter(|(c, _)| *c == commit)
            .count()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn coverage(&self, channel: Channel) -> StorageResult<Vec<CoverageRecord>> {
        let t = self.tables.lock().unwrap();
        Ok(t.coverage
            .iter()
            .filter(|(_, ch, _)| *ch == channel)
            .map(|(period, channel, commit)| CoverageRecord {
                period: *period,
                channel: *channel,
                commit: commit.clone(),
                state: t
                    .states
                    .get(commit)
                    .copied()
                    .unwrap_or(CommitState::Incomplete),
            })
            .collect())
    }

    async fn commit_states(&self) -> StorageResult<HashMap<Commit, CommitState>> {
        Ok(self.tables.lock().unwrap().states.clone())
    }

    async fn write_commit_state(&self, commit: &Commit, state: CommitState) -> StorageResult<()> {
        let mut t = self.tables.lock().unwrap();
        t.states.insert(commit.clone(), state);
        t.state_log.push((commit.clone(), state));
        Ok(())
    }

    async fn write_package(&self, commit: &Commit, package: &Package) -> StorageResult<()> {
        if self.fail_packages_for.lock().unwrap().contains(commit) {
            bail!("disk full");
        }
        self.tables
            .lock()
            .unwrap()
            .packages
            .insert((commit.clone(), package.attr_path.clone()), package.clone());
        Ok(())
    }

    async fn write_coverage(
        &self,
        period: Period,
        channel: Channel,
        commit: &Commit,
    ) -> StorageResult<()> {
        if *self.fail_coverage.lock().unwrap() {
            bail!("coverage table locked");
        }
        let mut t = self.tables.lock().unwrap();
        let row = (period, channel, commit.clone());
        if !t.coverage.contains(&row) {
            t.coverage.push(row);
        }
        Ok(())
    }
}

/// Answers every listing with the same newest-first commits, optionally per period end.
#[derive(Default)]
pub struct ScriptedHistory {
    pub default: Vec<Commit>,
    pub by_end: HashMap<DateTime<Utc>, Vec<Commit>>,
    pub calls: AtomicUsize,
}

impl ScriptedHistory {
    pub fn new(commits: &[&str]) -> Self {
        Self {
            default: commits.iter().map(|c| Commit::new(*c)).collect(),
            ..Self::default()
        }
    }

    pub fn with_end(mut self, end: DateTime<Utc>, commits: &[&str]) -> Self {
        self.by_end
            .insert(end, commits.iter().map(|c| Commit::new(*c)).collect());
        self
    }
}

#[async_trait]
impl HistoryProvider for ScriptedHistory {
    async fn commits_until(
        &self,
        _branch: &str,
        before: DateTime<Utc>,
        page_size: u8,
    ) -> Result<Vec<Commit>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let list = self.by_end.get(&before).unwrap_or(&self.default);
        Ok(list.iter().take(page_size as usize).cloned().collect())
    }
}

/// Pretends to evaluate commits; listed commits fail.
#[derive(Default)]
pub struct FakeExtractor {
    pub broken: HashSet<Commit>,
    pub delay: Duration,
    calls: Mutex<HashMap<Commit, usize>>,
    running: AtomicUsize,
    pub peak: AtomicUsize,
}

impl FakeExtractor {
    pub fn with_broken(broken: &[&str]) -> Self {
        Self {
            broken: broken.iter().map(|c| Commit::new(*c)).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self, commit: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&Commit::new(commit))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl PackageExtractor for FakeExtractor {
    async fn packages_at(&self, commit: &Commit) -> Result<Vec<Package>, ExtractionError> {
        *self.calls.lock().unwrap().entry(commit.clone()).or_default() += 1;
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.broken.contains(commit) {
            return FailedSnafu {
                commit: commit.clone(),
                status: "exit status: 1",
                stderr: "error: attribute 'hello' missing",
            }
            .fail();
        }
        Ok(vec![
            Package {
                attr_path: "hello".to_string(),
                name: "hello".to_string(),
                version: format!("2.12-{commit}"),
                description: Some("A program that produces a familiar, friendly greeting".into()),
            },
            Package {
                attr_path: "python3Packages.requests".to_string(),
                name: "requests".to_string(),
                version: "2.31.0".to_string(),
                description: None,
            },
        ])
    }
}
