//! Shared domain primitives for the platform operations Lambdas.
//!
//! This crate owns event contracts, environment configuration, and the
//! verification token scheme. It intentionally excludes AWS SDK and Lambda
//! runtime concerns; those live in `ops_lambda`.

pub mod config;
pub mod contract;
pub mod token;
