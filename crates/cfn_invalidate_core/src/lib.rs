//! Shared primitives for the CloudFront invalidation custom resource.
//!
//! This crate owns the lifecycle event and callback contracts, resource
//! identity rules, and the bounded poll loop. It intentionally excludes AWS
//! SDK, HTTP and Lambda runtime concerns, which live in
//! `cfn_invalidate_lambda`.

pub mod contract;
pub mod identity;
pub mod polling;
