use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use snafu::ResultExt;
use tokio::process::Command;

use crate::{
    extractor::{ExtractionError, FailedSnafu, PackageExtractor, ParseSnafu, SpawnSnafu},
    models::{commit::Commit, package::Package},
};

/// Longest stderr tail kept in a [`ExtractionError::Failed`].
const STDERR_TAIL: usize = 2000;

#[derive(Deserialize, Debug, Default)]
struct NixEnvMeta {
    description: Option<String>,
}

/// One value of the `nix-env -qaP --json --meta` object, keyed by attribute path.
#[derive(Deserialize, Debug)]
struct NixEnvEntry {
    name: Option<String>,
    pname: Option<String>,
    version: Option<String>,
    #[serde(default)]
    meta: NixEnvMeta,
}

/// Evaluates nixpkgs at a commit with `nix-env`, fetching the source tarball by hash.
#[derive(Debug, Clone)]
pub struct NixEnvExtractor {
    program: String,
    archive_base: String,
}

impl NixEnvExtractor {
    /// `archive_base` is the URL prefix the commit tarball is fetched from,
    /// e.g. `https://github.com/NixOS/nixpkgs/archive`.
    pub fn new(program: impl Into<String>, archive_base: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            archive_base: archive_base.into(),
        }
    }

    fn source_url(&self, commit: &Commit) -> String {
        format!(
            "{}/{}.tar.gz",
            self.archive_base.trim_end_matches('/'),
            commit
        )
    }
}

/// Parses `nix-env --json` output, keeping attribute order and skipping
/// derivations without a version.
pub(crate) fn parse_package_set(stdout: &[u8]) -> Result<Vec<Package>, ExtractionError> {
    let entries: IndexMap<String, NixEnvEntry> =
        serde_json::from_slice(stdout).context(ParseSnafu)?;

    let packages = entries
        .into_iter()
        .filter_map(|(attr_path, entry)| {
            let version = entry.version.filter(|v| !v.is_empty())?;
            let name = match (entry.pname, entry.name) {
                (Some(pname), _) => pname,
                (None, Some(full)) => full
                    .strip_suffix(&format!("-{version}"))
                    .map(str::to_string)
                    .unwrap_or(full),
                (None, None) => attr_path.clone(),
            };
            Some(Package {
                attr_path,
                name,
                version,
                description: entry.meta.description,
            })
        })
        .collect();

    Ok(packages)
}

/// The last [`STDERR_TAIL`] bytes of `stderr` at most, cut on a char boundary.
fn stderr_tail(stderr: &str) -> &str {
    let start = stderr.len().saturating_sub(STDERR_TAIL);
    let cut = stderr
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| i >= start)
        .unwrap_or(stderr.len());
    &stderr[cut..]
}

#[async_trait]
impl PackageExtractor for NixEnvExtractor {
    async fn packages_at(&self, commit: &Commit) -> Result<Vec<Package>, ExtractionError> {
        let url = self.source_url(commit);
        tracing::debug!(%commit, %url, "evaluating package set");

        let output = Command::new(&self.program)
            .args(["-qaP", "--json", "--meta", "-f"])
            .arg(&url)
            .kill_on_drop(true)
            .output()
            .await
            .context(SpawnSnafu {
                program: self.program.clone(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return FailedSnafu {
                commit: commit.clone(),
                status: output.status.to_string(),
                stderr: stderr_tail(&stderr).trim(),
            }
            .fail();
        }

        parse_package_set(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "nixpkgs.hello": {
            "name": "hello-2.12.1",
            "pname": "hello",
            "version": "2.12.1",
            "meta": { "description": "A program that produces a familiar, friendly greeting" }
        },
        "nixpkgs.python3Packages.requests": {
            "name": "python3.11-requests-2.31.0",
            "version": "2.31.0"
        },
        "nixpkgs.someScript": {
            "name": "some-script",
            "version": ""
        }
    }"#;

    #[test]
    fn parses_entries_in_attribute_order() {
        let pkgs = parse_package_set(SAMPLE.as_bytes()).unwrap();
        assert_eq!(pkgs.len(), 2);

        assert_eq!(pkgs[0].attr_path, "nixpkgs.hello");
        assert_eq!(pkgs[0].name, "hello");
        assert_eq!(pkgs[0].version, "2.12.1");
        assert!(pkgs[0].description.as_deref().unwrap().contains("greeting"));

        // no pname: strip "-<version>" off the derivation name
        assert_eq!(pkgs[1].name, "python3.11-requests");
        assert_eq!(pkgs[1].description, None);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_package_set(b"error: attribute missing").unwrap_err();
        assert!(matches!(err, ExtractionError::Parse { .. }));
    }

    #[test]
    fn stderr_is_cut_to_its_tail_on_a_char_boundary() {
        assert_eq!(stderr_tail("error: boom"), "error: boom");

        // 3-byte chars put the byte cut point mid-character
        let long = format!("{}end", "…".repeat(STDERR_TAIL));
        let tail = stderr_tail(&long);
        assert!(tail.len() <= STDERR_TAIL, "kept {} bytes", tail.len());
        assert!(tail.len() > STDERR_TAIL - 3);
        assert!(tail.ends_with("end"));
        assert!(tail.starts_with('…'));
    }

    #[test]
    fn tarball_url_is_built_from_commit() {
        let x = NixEnvExtractor::new("nix-env", "https://example.org/archive/");
        assert_eq!(
            x.source_url(&Commit::new("abc123")),
            "https://example.org/archive/abc123.tar.gz"
        );
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let x = NixEnvExtractor::new("/nonexistent/nix-env-for-tests", "https://example.org");
        let err = x.packages_at(&Commit::new("abc123")).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Spawn { .. }), "{err}");
    }
}
