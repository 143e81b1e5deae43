//! Test helpers for Cohort crates.
//!
//! Provides:
//!
//! - [`MemoryGroupGraph`]: an in-memory [`cohort_authz::GroupGraph`]
//!   implementation with a small mutation surface for building fixtures
//! - Proptest strategies for domain values, shared across crates
//! - A tracing initializer for tests that want log output

#![deny(unsafe_code)]

pub mod graph;
pub mod strategies;

pub use graph::MemoryGroupGraph;

/// Initializes a compact tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .compact()
        .try_init();
}
