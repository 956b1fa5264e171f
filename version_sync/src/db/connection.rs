//! SQLite connection helpers.
//!
//! Provides [`connect_sqlite`] that opens a connection and applies the PRAGMAs the
//! updater relies on: WAL journaling, foreign_keys=ON (package rows cascade with their
//! commit), and a 5000ms busy_timeout so a concurrent `version-sync coverage` reader
//! does not fail an update run.
//!
//! Example:
//! ```no_run
//! use version_sync::db::connection::connect_sqlite;
//!
//! let path = std::env::temp_dir().join("version_sync_example.db");
//! let _conn = connect_sqlite(path.to_str().unwrap()).expect("open sqlite");
//! ```

use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

use crate::db::sqlite_path;

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(sqlite_path(database_url))?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}
