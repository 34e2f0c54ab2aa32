//! Integration tests module
//!
//! End-to-end tests of the refresh pipeline:
//! - fetch → parse → dedup → check → resolve → publish → persist
//! - replacement resolution against repositories
//! - failure handling and fail-safe aborts

pub mod error_scenarios;
pub mod fixtures;
pub mod pipeline_test;
pub mod resolver_test;
