//! Group-authorization core for Cohort.
//!
//! This crate holds the domain logic between the store contracts
//! (`cohort-store`) and the out-of-scope RPC boundary, providing:
//!
//! - ID allocation: one `IdAllocator` trait with memory, coordination-store,
//!   and cache-store backends, all sharing the two-phase counter + valid-flag
//!   recovery scheme
//! - The signature-verified authorization cache with optimistic concurrency
//!   and sentinel-encoded entry status
//! - The group-graph query contract and the authorization resolver
//! - The bounded dependency-recovery state machine
//! - The caching service facade that keeps cache entries lazily coherent
//!   across graph mutations

#![deny(unsafe_code)]

pub mod alloc;
pub mod cache;
pub mod graph;
pub mod query;
pub mod recovery;
pub mod service;

pub use alloc::{
    AllocationError, CacheIdAllocator, CoordinatedIdAllocator, IdAllocator, MemoryIdAllocator,
    allocator_from_config,
};
pub use cache::{AuthorizationCache, CacheError, CacheQuery, CacheStatus};
pub use graph::{GraphError, GroupGraph, IndexAuthority};
pub use query::{AuthorizationQuery, resolve};
pub use recovery::{FailureKind, RecoveryError, run_with_recovery};
pub use service::AuthorizationService;
