//! `version-sync.toml`: parsing, normalization, and loading.
//!
//! Every field has a default, so an empty file is a valid configuration. Credentials
//! are not part of the file; the GitHub token comes from `GITHUB_TOKEN`.
//!
//! Entrypoints:
//! - Parse + validate from a TOML string: [`load_config_str`]
//! - Parse + validate from a file path: [`load_config_path`]

use std::{num::NonZeroU32, time::Duration};

use anyhow::{Context, bail};
use history_ingestor::{
    models::channel::Channel,
    providers::github_rest::{GithubConfig, params::MAX_PAGE_SIZE},
};
use serde::{Deserialize, Serialize};
use toml::from_str;

use crate::{
    fetcher::FetchPolicy,
    orchestrator::{UpdateOptions, spare_cores},
};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SQLite file path or `sqlite://` URL.
    pub database_url: String,
    /// Branch names of the channels to track. Trimmed and de-duplicated on load.
    pub channels: Vec<String>,
    /// Commit history source.
    pub github: GithubCfg,
    /// Package-set evaluation.
    pub extractor: ExtractorCfg,
    /// Concurrency and retry limits of `update`.
    pub update: UpdateCfg,
}

/// `[github]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GithubCfg {
    /// API root.
    pub api_base: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Commits per listing call, 1..=100.
    pub page_size: u8,
    /// Client-side request pacing.
    pub requests_per_second: u32,
}

/// `[extractor]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorCfg {
    /// Evaluator executable.
    pub program: String,
    /// Base URL of commit tarballs; `<base>/<commit>.tar.gz` is evaluated.
    pub archive_base: String,
}

/// `[update]` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateCfg {
    /// Periods processed concurrently.
    pub period_workers: usize,
    /// Commits extracted concurrently; never more than available parallelism minus one.
    pub commit_workers: usize,
    /// Candidate commits tried per period.
    pub max_candidates: usize,
    /// Longest single rate-limit sleep.
    pub max_backoff_secs: u64,
    /// Rate-limit retries per listing call; 0 means unbounded.
    pub max_rate_limit_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "versions.db".to_string(),
            channels: Channel::ALL.iter().map(|c| c.branch().to_string()).collect(),
            github: GithubCfg::default(),
            extractor: ExtractorCfg::default(),
            update: UpdateCfg::default(),
        }
    }
}

impl Default for GithubCfg {
    fn default() -> Self {
        let gh = GithubConfig::default();
        Self {
            api_base: gh.api_base,
            owner: gh.owner,
            repo: gh.repo,
            page_size: crate::fetcher::DEFAULT_PAGE_SIZE,
            requests_per_second: gh.requests_per_second.get(),
        }
    }
}

impl Default for ExtractorCfg {
    fn default() -> Self {
        Self {
            program: "nix-env".to_string(),
            archive_base: "https://github.com/NixOS/nixpkgs/archive".to_string(),
        }
    }
}

impl Default for UpdateCfg {
    fn default() -> Self {
        Self {
            period_workers: 10,
            commit_workers: 3,
            max_candidates: 10,
            max_backoff_secs: 3600,
            max_rate_limit_retries: 0,
        }
    }
}

/// Trims and de-duplicates channel names (order preserved), then checks every limit.
pub fn normalize_config(cfg: &mut Config) -> anyhow::Result<()> {
    let mut seen = Vec::with_capacity(cfg.channels.len());
    for raw in std::mem::take(&mut cfg.channels) {
        let name = raw.trim().to_string();
        if name.is_empty() {
            bail!("channel name cannot be empty");
        }
        name.parse::<Channel>()
            .with_context(|| format!("channels: {name:?} is not a known channel"))?;
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    if seen.is_empty() {
        bail!("at least one channel must be configured");
    }
    cfg.channels = seen;

    if cfg.database_url.trim().is_empty() {
        bail!("database_url cannot be empty");
    }
    if cfg.github.page_size == 0 || cfg.github.page_size > MAX_PAGE_SIZE {
        bail!(
            "github.page_size must be within 1..={MAX_PAGE_SIZE}, got {}",
            cfg.github.page_size
        );
    }
    if cfg.github.requests_per_second == 0 {
        bail!("github.requests_per_second must be at least 1");
    }
    if cfg.update.period_workers == 0 {
        bail!("update.period_workers must be at least 1");
    }
    if cfg.update.commit_workers == 0 {
        bail!("update.commit_workers must be at least 1");
    }
    if cfg.update.max_candidates == 0 {
        bail!("update.max_candidates must be at least 1");
    }
    Ok(())
}

impl Config {
    /// Configured channels in file order.
    pub fn channel_list(&self) -> anyhow::Result<Vec<Channel>> {
        self.channels
            .iter()
            .map(|name| {
                name.parse::<Channel>()
                    .with_context(|| format!("unknown channel {name:?}"))
            })
            .collect()
    }

    /// Connection settings for the GitHub provider.
    pub fn github_config(&self) -> anyhow::Result<GithubConfig> {
        let requests_per_second = NonZeroU32::new(self.github.requests_per_second)
            .context("github.requests_per_second must be at least 1")?;
        Ok(GithubConfig {
            api_base: self.github.api_base.clone(),
            owner: self.github.owner.clone(),
            repo: self.github.repo.clone(),
            requests_per_second,
        })
    }

    /// Backoff policy for commit listing.
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            page_size: self.github.page_size,
            max_backoff: Duration::from_secs(self.update.max_backoff_secs),
            max_retries: (self.update.max_rate_limit_retries > 0)
                .then_some(self.update.max_rate_limit_retries),
        }
    }

    /// Worker counts, with commit workers capped by the machine.
    pub fn update_options(&self) -> UpdateOptions {
        UpdateOptions {
            period_workers: self.update.period_workers,
            commit_workers: self.update.commit_workers.min(spare_cores()),
            max_candidates: self.update.max_candidates,
        }
    }
}

/// Parse a configuration TOML string and normalize it.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<Config> {
    let mut cfg: Config = from_str(toml_str).context("failed to parse config TOML")?;
    normalize_config(&mut cfg).context("invalid configuration")?;
    Ok(cfg)
}

/// Read a configuration file from disk, parse, and normalize it.
pub fn load_config_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read config file {}", path.as_ref().display()))?;
    load_config_str(&text)
}
