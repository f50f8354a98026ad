//! # Fleetbench Testing Utils
//!
//! Shared testing utilities for the fleetbench workspace: recording doubles for
//! the remote session, readiness probe and result processor traits, plus small
//! builders for test targets.
//!
//! ## Usage
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! fleetbench-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
