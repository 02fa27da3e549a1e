//! Integration tests
//!
//! These tests use wiremock servers to drive the fetch pipeline, the crawler
//! and the job queue end to end.

mod common;
mod crawl_tests;
mod dispatch_tests;
mod fetch_tests;
mod scheduler_tests;
