//! Commit identifiers and their processing states.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Opaque identifier of one point in the tracked history (a git hash).
///
/// Equality and ordering are by the identifier string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Commit(String);

impl Commit {
    /// Wraps a commit hash.
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// The hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Commit {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Outcome of processing a commit.
///
/// `Success` and `Broken` are terminal. `Incomplete` means "in flight or unknown" and
/// is never a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    /// Being processed, or a previous attempt stopped part-way.
    Incomplete,
    /// Package extraction completed and was persisted.
    Success,
    /// Extraction failed permanently for this commit.
    Broken,
}

impl CommitState {
    /// `true` for `Success` and `Broken`.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, CommitState::Incomplete)
    }

    /// Storage code for the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            CommitState::Incomplete => "incomplete",
            CommitState::Success => "success",
            CommitState::Broken => "broken",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored state code is not recognised.
#[derive(Debug, Snafu)]
#[snafu(display("unknown commit state: {code}"))]
pub struct UnknownCommitStateError {
    code: String,
}

impl FromStr for CommitState {
    type Err = UnknownCommitStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incomplete" => Ok(CommitState::Incomplete),
            "success" => Ok(CommitState::Success),
            "broken" => Ok(CommitState::Broken),
            other => Err(UnknownCommitStateError {
                code: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_incomplete_is_non_terminal() {
        assert!(!CommitState::Incomplete.is_terminal());
        assert!(CommitState::Success.is_terminal());
        assert!(CommitState::Broken.is_terminal());
    }

    #[test]
    fn state_codes_parse_back() {
        for s in [CommitState::Incomplete, CommitState::Success, CommitState::Broken] {
            assert_eq!(s.as_str().parse::<CommitState>().unwrap(), s);
        }
        assert!("done".parse::<CommitState>().is_err());
    }

    #[test]
    fn commits_order_by_hash() {
        let a = Commit::new("0a1b");
        let b = Commit::from("ff00");
        assert!(a < b);
        assert_eq!(a.to_string(), "0a1b");
    }
}
