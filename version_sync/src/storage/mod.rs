//! Persistence surface of the updater.
//!
//! The orchestrator talks to storage only through the async [`Storage`] trait. The
//! SQLite implementation lives in `repo.rs`.
use std::collections::HashMap;

use async_trait::async_trait;
use history_ingestor::models::{
    channel::Channel,
    commit::{Commit, CommitState},
    package::Package,
};

use crate::period::Period;

pub(crate) mod models;
pub mod repo;

pub use repo::SqliteStorage;

#[derive(thiserror::Error, Debug)]
/// Errors raised by the SQLite storage beyond plain diesel failures.
pub enum StorageError {
    #[error("row holds unknown commit state {0:?}")]
    /// A `commit_state.state` value outside the known codes.
    UnknownState(String),
    #[error("row holds unknown channel {0:?}")]
    /// A `coverage.channel` value that names no channel.
    UnknownChannel(String),
    #[error("connection mutex poisoned")]
    /// A previous holder of the connection panicked.
    Poisoned,
}

/// Result type used throughout the storage layer for fallible operations.
pub type StorageResult<T> = anyhow::Result<T>;

/// One checked (period, channel, commit) triple with the commit's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageRecord {
    /// Window the commit was picked for.
    pub period: Period,
    /// Channel whose branch the commit came from.
    pub channel: Channel,
    /// The verified commit.
    pub commit: Commit,
    /// State of `commit` at read time; `Incomplete` when no state was ever recorded.
    pub state: CommitState,
}

/// Async storage used by the update pipeline.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Every coverage record of `channel`, in no particular order.
    async fn coverage(&self, channel: Channel) -> StorageResult<Vec<CoverageRecord>>;

    /// Last recorded state of every commit, covered or not.
    async fn commit_states(&self) -> StorageResult<HashMap<Commit, CommitState>>;

    /// Inserts or replaces the state of `commit`.
    async fn write_commit_state(&self, commit: &Commit, state: CommitState) -> StorageResult<()>;

    /// Inserts or replaces one package of `commit`, keyed by attribute path.
    async fn write_package(&self, commit: &Commit, package: &Package) -> StorageResult<()>;

    /// Same as calling [`Storage::write_package`] for each element.
    async fn write_packages(&self, commit: &Commit, packages: &[Package]) -> StorageResult<()> {
        for package in packages {
            self.write_package(commit, package).await?;
        }
        Ok(())
    }

    /// Appends a coverage record. Writing an identical record again is a no-op.
    async fn write_coverage(
        &self,
        period: Period,
        channel: Channel,
        commit: &Commit,
    ) -> StorageResult<()>;
}
