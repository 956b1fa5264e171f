//! Database utilities for connections and schema migrations.
//!
//! This module provides:
//! - SQLite connection helpers: [`connection::connect_sqlite`] applies WAL, foreign_keys=ON, and a 5000ms busy_timeout.
//! - Embedded Diesel migrations: [`migrate::run_sqlite`] brings a database file up to date.
//!
//! Both accept a bare file path or a `sqlite://` URL.
//!
//! Example:
//! ```no_run
//! use version_sync::db::{migrate, connection};
//!
//! let db_path = std::env::temp_dir().join("version_sync_example.db");
//! migrate::run_sqlite(db_path.to_str().unwrap()).expect("migrations");
//!
//! // Open a tuned SQLite connection
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;

/// Strips an optional `sqlite://` or `sqlite:` scheme so Diesel sees a plain path.
pub fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}
