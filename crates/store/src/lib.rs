//! Store contracts for the Cohort authorization core.
//!
//! This crate sits between the domain logic (`cohort-authz`) and whatever
//! backs the shared state in a given deployment, providing:
//!
//! - The coordination store contract: a cluster-wide read/write lock with
//!   bounded acquire, plus a small persisted counter and valid flag
//! - The cache store contract: per-key unordered sets with companion
//!   signature scalars, wildcard key enumeration, and an optimistic
//!   watch-then-conditional-commit transaction
//! - In-memory backends for both, used by tests and single-process
//!   deployments
//!
//! No authoritative state lives in-process; production backends implement
//! the same contracts over external services.

#![deny(unsafe_code)]

pub mod cache;
pub mod coordination;

pub use cache::{
    CacheEntrySnapshot, CacheStore, CacheStoreError, CommitOutcome, MemoryCacheStore, WatchToken,
    WriteBatch,
};
pub use coordination::{
    CoordinationError, CoordinationStore, LockGuard, MemoryCoordinationStore,
};
