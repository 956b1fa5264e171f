//! Clients for the two external systems the version database is built from: the
//! revision host that lists commits per branch, and the evaluator that turns a
//! commit into a package set.

pub mod extractor;
pub mod models;
pub mod providers;
