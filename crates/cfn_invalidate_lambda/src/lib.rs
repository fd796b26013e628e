//! AWS-oriented adapters and handlers for the CloudFront invalidation
//! custom resource.
//!
//! This crate owns runtime integration details (the Lambda lifecycle
//! handler, the CloudFront and callback adapter seams, environment config)
//! and re-exports the core contracts under a single `runtime` boundary.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod runtime;
#[cfg(feature = "test-helpers")]
pub mod test_helpers;
