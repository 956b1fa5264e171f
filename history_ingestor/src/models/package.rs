//! Canonical in-memory representation of one package of a package set.
//!
//! This struct is the standard output of every
//! [`PackageExtractor`](crate::extractor::PackageExtractor) implementation.

use serde::{Deserialize, Serialize};

/// A single package as it existed at one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Attribute path in the package set (e.g., `"python3Packages.requests"`).
    pub attr_path: String,

    /// Package name without version (`pname`), e.g. `"requests"`.
    pub name: String,

    /// Version string exactly as declared by the package.
    pub version: String,

    /// Short description from the package metadata, when present.
    pub description: Option<String>,
}
