//! GitHub REST implementation of [`HistoryProvider`](crate::providers::HistoryProvider).

pub mod params;
pub mod provider;
pub mod response;

pub use provider::{GithubConfig, GithubProvider};
