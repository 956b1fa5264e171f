use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct GithubCommitSignature {
    pub date: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug)]
pub struct GithubCommitDetail {
    pub committer: Option<GithubCommitSignature>,
}

/// One element of the `GET /repos/{owner}/{repo}/commits` array.
#[derive(Deserialize, Debug)]
pub struct GithubCommit {
    pub sha: String,
    pub commit: GithubCommitDetail,
}

impl GithubCommit {
    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.commit.committer.as_ref().and_then(|c| c.date)
    }
}
