//! Service-level tests for the tool registry.

mod lifecycle_tests;
mod oauth_parking_tests;
mod placeholder_tests;
mod support;
