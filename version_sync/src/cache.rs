//! Per-run deduplication of commit processing.
//!
//! Every commit gets exactly one entry per cache. The task that creates it owns the
//! work and publishes the terminal state once; everyone else suspends in
//! [`CommitStateCache::await_final`] until that happens. Waiting never polls: entry
//! creation is signalled through a [`Notify`], state changes through a `watch` channel.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use history_ingestor::models::commit::{Commit, CommitState};
use tokio::sync::{Notify, watch};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
/// Misuse of a cache entry. Each of these is a bug in the caller.
pub enum CacheError {
    #[error("commit {commit} already finished as {previous}")]
    /// The entry was already terminal.
    AlreadyFinal {
        /// The entry's commit.
        commit: Commit,
        /// State published first.
        previous: CommitState,
    },
    #[error("cannot publish {state} for {commit}: not a final state")]
    /// Only `Success` and `Broken` may be published.
    NotTerminal {
        /// The entry's commit.
        commit: Commit,
        /// The rejected state.
        state: CommitState,
    },
}

/// Shared map from commit to processing state.
#[derive(Debug, Default)]
pub struct CommitStateCache {
    entries: Mutex<HashMap<Commit, Arc<watch::Sender<CommitState>>>>,
    created: Notify,
}

/// Write side of one cache entry.
#[derive(Debug, Clone)]
pub struct EntryHandle {
    commit: Commit,
    tx: Arc<watch::Sender<CommitState>>,
}

impl CommitStateCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    // Critical sections never await or panic, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<Commit, Arc<watch::Sender<CommitState>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up `commit`, inserting an `Incomplete` entry if absent.
    ///
    /// The boolean is `true` only for the single caller that inserted the entry.
    pub fn get_or_create(&self, commit: &Commit) -> (EntryHandle, bool) {
        let (tx, created) = match self.lock().entry(commit.clone()) {
            Entry::Occupied(e) => (Arc::clone(e.get()), false),
            Entry::Vacant(v) => {
                let (tx, _rx) = watch::channel(CommitState::Incomplete);
                (Arc::clone(v.insert(Arc::new(tx))), true)
            }
        };
        if created {
            tracing::debug!(%commit, "cache entry created");
            self.created.notify_waiters();
        }
        (
            EntryHandle {
                commit: commit.clone(),
                tx,
            },
            created,
        )
    }

    /// Number of distinct commits seen so far.
    pub fn seen(&self) -> usize {
        self.lock().len()
    }

    /// Waits until `commit` has an entry and that entry is terminal.
    pub async fn await_final(&self, commit: &Commit) -> CommitState {
        let mut rx = loop {
            // Register interest before checking the map so a creation between the
            // check and the await still wakes us.
            let notified = self.created.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let existing = self.lock().get(commit).map(|tx| tx.subscribe());
            if let Some(rx) = existing {
                break rx;
            }
            notified.await;
        };

        // The cache keeps every sender alive for its whole lifetime, so the channel
        // cannot close while we borrow `self`.
        let terminal = rx.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        terminal.unwrap_or_else(|_| *rx.borrow())
    }
}

impl EntryHandle {
    /// Publishes the terminal state, waking every waiter.
    pub fn publish(&self, state: CommitState) -> Result<(), CacheError> {
        if !state.is_terminal() {
            return Err(CacheError::NotTerminal {
                commit: self.commit.clone(),
                state,
            });
        }
        let mut previous = None;
        self.tx.send_if_modified(|current| {
            if current.is_terminal() {
                previous = Some(*current);
                false
            } else {
                *current = state;
                true
            }
        });
        match previous {
            Some(previous) => Err(CacheError::AlreadyFinal {
                commit: self.commit.clone(),
                previous,
            }),
            None => Ok(()),
        }
    }
}
