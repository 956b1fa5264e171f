//! Package-set extraction.
//!
//! A [`PackageExtractor`] turns a commit into the list of packages defined at that
//! commit. Extraction is expensive (it evaluates the whole package set), so callers
//! are expected to deduplicate and bound concurrency above this layer.

pub mod nix_env;

use async_trait::async_trait;
use snafu::{Backtrace, Snafu};

use crate::models::{commit::Commit, package::Package};

pub use nix_env::NixEnvExtractor;

/// Trait for evaluating the package set at a commit.
#[async_trait]
pub trait PackageExtractor {
    /// Lists every package with a version at `commit`.
    async fn packages_at(&self, commit: &Commit) -> Result<Vec<Package>, ExtractionError>;
}

/// Errors that can occur while extracting a package set.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExtractionError {
    /// The evaluator could not be started at all.
    #[snafu(display("failed to spawn {program}: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// The evaluator ran but reported failure for this commit.
    #[snafu(display("evaluation of {commit} failed ({status}): {stderr}"))]
    Failed {
        commit: Commit,
        status: String,
        stderr: String,
        backtrace: Backtrace,
    },

    /// The evaluator's output was not the expected JSON document.
    #[snafu(display("malformed package set output: {source}"))]
    Parse {
        source: serde_json::Error,
        backtrace: Backtrace,
    },
}
