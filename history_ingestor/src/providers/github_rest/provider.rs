use std::{num::NonZeroU32, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{
    Client, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;

use crate::{
    models::commit::Commit,
    providers::{
        ApiSnafu, ClientBuildSnafu, HistoryProvider, InvalidTokenSnafu, ProviderError,
        ProviderInitError, RateLimitedSnafu, ReqwestSnafu,
        github_rest::{
            params::{construct_params, validate_page_size},
            response::GithubCommit,
        },
    },
};

const USER_AGENT: &str = concat!("version-sync/", env!("CARGO_PKG_VERSION"));

/// Used when GitHub answers 429 without saying how long to wait.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Where the commits live and how hard we may hit the API.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// API root, e.g. `https://api.github.com` (tests point this at a mock server).
    pub api_base: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Client-side pacing, applied before every request.
    pub requests_per_second: NonZeroU32,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            owner: "NixOS".to_string(),
            repo: "nixpkgs".to_string(),
            requests_per_second: nonzero!(10u32),
        }
    }
}

pub struct GithubProvider {
    client: Client,
    commits_url: String,
    limiter: DefaultDirectRateLimiter,
}

impl GithubProvider {
    /// Creates a new GitHub provider.
    ///
    /// `token` is sent as a bearer token when present. Anonymous access works but
    /// GitHub allows it only 60 requests per hour.
    pub fn new(config: GithubConfig, token: Option<SecretString>) -> Result<Self, ProviderInitError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = token {
            let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .context(InvalidTokenSnafu)?;
            auth.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context(ClientBuildSnafu)?;

        let commits_url = format!(
            "{}/repos/{}/{}/commits",
            config.api_base.trim_end_matches('/'),
            config.owner,
            config.repo
        );

        Ok(Self {
            client,
            commits_url,
            limiter: RateLimiter::direct(Quota::per_second(config.requests_per_second)),
        })
    }
}

/// Reads GitHub's rate-limit signals off a failed response.
///
/// `retry-after` (secondary limits) wins over `x-ratelimit-reset` (primary limit).
/// A bare 403 without either header is an ordinary permission error.
pub(crate) fn rate_limit_wait(
    status: StatusCode,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<Duration> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secs) = header_str("retry-after").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs.max(1)));
    }

    if header_str("x-ratelimit-remaining").map(str::trim) == Some("0") {
        if let Some(reset) = header_str("x-ratelimit-reset").and_then(|v| v.trim().parse::<i64>().ok())
        {
            let secs = (reset - now.timestamp()).max(1);
            return Some(Duration::from_secs(secs as u64));
        }
    }

    (status == StatusCode::TOO_MANY_REQUESTS).then_some(DEFAULT_RATE_LIMIT_WAIT)
}

#[async_trait]
impl HistoryProvider for GithubProvider {
    async fn commits_until(
        &self,
        branch: &str,
        before: DateTime<Utc>,
        page_size: u8,
    ) -> Result<Vec<Commit>, ProviderError> {
        validate_page_size(page_size)?;

        self.limiter.until_ready().await;

        let query = construct_params(branch, before, page_size);
        let response = self
            .client
            .get(&self.commits_url)
            .query(&query)
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        if !status.is_success() {
            if let Some(wait) = rate_limit_wait(status, response.headers(), Utc::now()) {
                return RateLimitedSnafu { wait }.fail();
            }
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return ApiSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        let commits = response
            .json::<Vec<GithubCommit>>()
            .await
            .context(ReqwestSnafu)?;

        if let Some(newest) = commits.first() {
            tracing::debug!(
                branch,
                count = commits.len(),
                newest = %newest.sha,
                committed_at = ?newest.committed_at(),
                "listed commits"
            );
        }

        Ok(commits.into_iter().map(|c| Commit::new(c.sha)).collect())
    }
}
