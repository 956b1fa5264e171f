//! Insertable/Queryable helper structs used by the SQLite storage implementation.

use diesel::prelude::*;

use crate::schema::{commit_state, coverage, package};

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = commit_state)]
pub(crate) struct CommitStateRow<'a> {
    pub(crate) commit_hash: &'a str,
    pub(crate) state: &'a str,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = package, treat_none_as_null = true)]
pub(crate) struct PackageRow<'a> {
    pub(crate) commit_hash: &'a str,
    pub(crate) attr_path: &'a str,
    pub(crate) name: &'a str,
    pub(crate) version: &'a str,
    pub(crate) description: Option<&'a str>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = coverage)]
pub(crate) struct NewCoverage<'a> {
    pub(crate) channel: &'a str,
    pub(crate) period_start: &'a str, // RFC3339 UTC millis
    pub(crate) period_end: &'a str,   // RFC3339 UTC millis
    pub(crate) commit_hash: &'a str,
}

/// `coverage` LEFT JOIN `commit_state`.
#[derive(Queryable, Debug)]
pub(crate) struct CoverageJoinRow {
    pub(crate) channel: String,
    pub(crate) period_start: String,
    pub(crate) period_end: String,
    pub(crate) commit_hash: String,
    pub(crate) state: Option<String>,
}
