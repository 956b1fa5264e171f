//! Keeps a local database of which package versions existed on which release channel
//! at which point in time.
//!
//! An update run slices the requested time range into periods, skips periods already
//! covered by a verified commit, and for each remaining period tries recent commits of
//! the channel until one evaluates. Work is idempotent: commits known to be good or
//! broken are never evaluated twice.

#![deny(missing_docs)]

pub mod cache;
pub mod config;
pub mod db;
pub mod fetcher;
pub mod gaps;
pub mod orchestrator;
pub mod period;
#[allow(missing_docs)]
pub mod schema;
pub mod storage;
pub mod stream;
pub mod tz;
