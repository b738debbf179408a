//! AWS-oriented adapters and handlers for the platform operations Lambdas.
//!
//! This crate owns runtime integration details: handler logic as pure
//! functions over adapter traits, and one binary per Lambda under `src/bin`
//! that wires real AWS SDK clients behind those traits. Domain contracts,
//! configuration, and token logic live in `ops_core`.

pub mod adapters;
pub mod handlers;
pub mod logging;
