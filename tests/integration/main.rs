//! Integration tests for Antenna
//!
//! The pipeline and chain tests drive scripted strategies; the HTTP tests
//! use wiremock to stand in for the platform and the scraping providers.

mod common;
mod fetch_tests;
mod http_tests;
mod pipeline_tests;
mod registry_tests;
