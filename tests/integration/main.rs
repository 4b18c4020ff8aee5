//! Integration tests against an in-memory SQLite database.
//!
//! Every test builds its own database through [`common::TestDatabase`], so
//! tests never share rows and can run in parallel.

mod common;
mod eager_loading;
mod persistence;
mod pivot;
mod query_execution;
