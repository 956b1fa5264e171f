//! Provider abstraction for remote revision history.
//!
//! This module defines the [`HistoryProvider`] trait, the unified interface for listing
//! commits of a branch from any revision host. The concrete GitHub REST implementation
//! lives in [`github_rest`].
//!
//! The trait is designed for async usage and supports dynamic dispatch
//! (`dyn HistoryProvider`) so tests and the binary can pick an implementation at runtime.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use chrono::{DateTime, Utc};
//! use history_ingestor::models::commit::Commit;
//! use history_ingestor::providers::{HistoryProvider, ProviderError};
//!
//! struct Frozen;
//!
//! #[async_trait]
//! impl HistoryProvider for Frozen {
//!     async fn commits_until(
//!         &self,
//!         _branch: &str,
//!         _before: DateTime<Utc>,
//!         _page_size: u8,
//!     ) -> Result<Vec<Commit>, ProviderError> {
//!         Ok(vec![Commit::new("5b1f0c7")])
//!     }
//! }
//! ```

pub mod github_rest;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snafu::{Backtrace, Snafu};

use crate::models::commit::Commit;

/// Trait for listing the commits of a branch on a revision host.
#[async_trait]
pub trait HistoryProvider {
    /// Lists up to `page_size` commits of `branch` committed at or before `before`,
    /// newest first.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Commit>)` - Possibly empty list of commits.
    /// * `Err(ProviderError::RateLimited { .. })` - The host asked us to back off.
    /// * `Err(_)` - Any other failure.
    async fn commits_until(
        &self,
        branch: &str,
        before: DateTime<Utc>,
        page_size: u8,
    ) -> Result<Vec<Commit>, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// Token contains characters that are not valid in a header.
    #[snafu(display("Invalid API token format: {source}"))]
    InvalidToken {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a `HistoryProvider` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// The host refused the request because of rate limiting and suggested a wait.
    #[snafu(display("rate limited, retry in {}s", wait.as_secs_f64()))]
    RateLimited { wait: Duration },

    /// An error during an API request (e.g., network failure, timeout, bad body).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The host answered with a non-success status.
    #[snafu(display("API error ({status}): {message}"))]
    Api {
        status: u16,
        message: String,
        backtrace: Backtrace,
    },

    /// The request parameters were invalid for this specific provider.
    #[snafu(display("Invalid parameters for provider: {message}"))]
    Validation {
        message: String,
        backtrace: Backtrace,
    },
}
