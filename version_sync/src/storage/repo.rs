//! SQLite implementation of [`Storage`].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use async_trait::async_trait;
use diesel::{SqliteConnection, prelude::*};
use history_ingestor::models::{
    channel::Channel,
    commit::{Commit, CommitState},
    package::Package,
};

use crate::{
    db::connection::connect_sqlite,
    period::Period,
    schema::{commit_state, coverage, package},
    storage::{
        CoverageRecord, Storage, StorageError, StorageResult,
        models::{CommitStateRow, CoverageJoinRow, NewCoverage, PackageRow},
    },
    tz,
};

/// SQLite-backed [`Storage`].
///
/// Diesel is synchronous, so every call runs on the blocking pool against one
/// mutex-guarded connection. SQLite serializes writers anyway.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl SqliteStorage {
    /// Opens `database_url` with the standard PRAGMAs. Migrations are not run here.
    pub fn open(database_url: &str) -> StorageResult<Self> {
        let conn = connect_sqlite(database_url)
            .with_context(|| format!("opening sqlite database {database_url}"))?;
        Ok(Self::from_connection(conn))
    }

    /// Wraps an already configured connection.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StorageError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .context("storage task did not complete")?
    }

    /// Last recorded state of `commit`, if any.
    pub async fn commit_state(&self, commit: &Commit) -> StorageResult<Option<CommitState>> {
        let hash = commit.as_str().to_owned();
        self.with_conn(move |conn| {
            let code: Option<String> = commit_state::table
                .find(hash.as_str())
                .select(commit_state::state)
                .first(conn)
                .optional()?;
            code.map(|c| parse_state(&c)).transpose()
        })
        .await
    }

    /// Number of packages stored for `commit`.
    pub async fn package_count(&self, commit: &Commit) -> StorageResult<i64> {
        let hash = commit.as_str().to_owned();
        self.with_conn(move |conn| {
            Ok(package::table
                .filter(package::commit_hash.eq(hash.as_str()))
                .count()
                .get_result(conn)?)
        })
        .await
    }

    /// Every `(commit, version)` recorded for packages named `name`, deduplicated.
    pub async fn versions_of(&self, name: &str) -> StorageResult<Vec<(Commit, String)>> {
        let name = name.to_owned();
        self.with_conn(move |conn| {
            let rows: Vec<(String, String)> = package::table
                .filter(package::name.eq(name.as_str()))
                .select((package::commit_hash, package::version))
                .distinct()
                .order((package::version.asc(), package::commit_hash.asc()))
                .load(conn)?;
            Ok(rows
                .into_iter()
                .map(|(hash, version)| (Commit::new(hash), version))
                .collect())
        })
        .await
    }
}

fn parse_state(code: &str) -> StorageResult<CommitState> {
    code.parse::<CommitState>()
        .map_err(|_| StorageError::UnknownState(code.to_owned()).into())
}

fn record_from_row(row: CoverageJoinRow) -> StorageResult<CoverageRecord> {
    let channel: Channel = row
        .channel
        .parse()
        .map_err(|_| StorageError::UnknownChannel(row.channel.clone()))?;
    let period = Period::new(
        tz::parse_ts_to_utc(&row.period_start)?,
        tz::parse_ts_to_utc(&row.period_end)?,
    )?;
    let state = match row.state {
        Some(code) => parse_state(&code)?,
        None => CommitState::Incomplete,
    };
    Ok(CoverageRecord {
        period,
        channel,
        commit: Commit::new(row.commit_hash),
        state,
    })
}

fn upsert_package(conn: &mut SqliteConnection, hash: &str, p: &Package) -> QueryResult<usize> {
    let row = PackageRow {
        commit_hash: hash,
        attr_path: &p.attr_path,
        name: &p.name,
        version: &p.version,
        description: p.description.as_deref(),
    };
    diesel::insert_into(package::table)
        .values(&row)
        .on_conflict((package::commit_hash, package::attr_path))
        .do_update()
        .set(&row)
        .execute(conn)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn coverage(&self, channel: Channel) -> StorageResult<Vec<CoverageRecord>> {
        self.with_conn(move |conn| {
            let rows: Vec<CoverageJoinRow> = coverage::table
                .left_join(
                    commit_state::table.on(commit_state::commit_hash.eq(coverage::commit_hash)),
                )
                .filter(coverage::channel.eq(channel.branch()))
                .select((
                    coverage::channel,
                    coverage::period_start,
                    coverage::period_end,
                    coverage::commit_hash,
                    commit_state::state.nullable(),
                ))
                .order((coverage::period_start.asc(), coverage::id.asc()))
                .load(conn)?;
            rows.into_iter().map(record_from_row).collect()
        })
        .await
    }

    async fn commit_states(&self) -> StorageResult<HashMap<Commit, CommitState>> {
        self.with_conn(|conn| {
            let rows: Vec<(String, String)> = commit_state::table
                .select((commit_state::commit_hash, commit_state::state))
                .load(conn)?;
            rows.into_iter()
                .map(|(hash, code)| Ok((Commit::new(hash), parse_state(&code)?)))
                .collect()
        })
        .await
    }

    async fn write_commit_state(&self, commit: &Commit, state: CommitState) -> StorageResult<()> {
        let hash = commit.as_str().to_owned();
        self.with_conn(move |conn| {
            let row = CommitStateRow {
                commit_hash: &hash,
                state: state.as_str(),
            };
            diesel::insert_into(commit_state::table)
                .values(&row)
                .on_conflict(commit_state::commit_hash)
                .do_update()
                .set(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn write_package(&self, commit: &Commit, package: &Package) -> StorageResult<()> {
        let hash = commit.as_str().to_owned();
        let package = package.clone();
        self.with_conn(move |conn| {
            upsert_package(conn, &hash, &package)?;
            Ok(())
        })
        .await
    }

    /// One transaction for the whole set; a failure leaves no partial rows behind.
    async fn write_packages(&self, commit: &Commit, packages: &[Package]) -> StorageResult<()> {
        let hash = commit.as_str().to_owned();
        let packages = packages.to_vec();
        self.with_conn(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                for p in &packages {
                    upsert_package(conn, &hash, p)?;
                }
                Ok(())
            })?;
            tracing::debug!(commit = %hash, count = packages.len(), "stored packages");
            Ok(())
        })
        .await
    }

    async fn write_coverage(
        &self,
        period: Period,
        channel: Channel,
        commit: &Commit,
    ) -> StorageResult<()> {
        let hash = commit.as_str().to_owned();
        self.with_conn(move |conn| {
            let start = tz::to_rfc3339_millis(period.start);
            let end = tz::to_rfc3339_millis(period.end);
            diesel::insert_into(coverage::table)
                .values(&NewCoverage {
                    channel: channel.branch(),
                    period_start: &start,
                    period_end: &end,
                    commit_hash: &hash,
                })
                .on_conflict((
                    coverage::channel,
                    coverage::period_start,
                    coverage::period_end,
                    coverage::commit_hash,
                ))
                .do_nothing()
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
