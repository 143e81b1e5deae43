//! Core types, errors, and cryptographic primitives for Cohort.
//!
//! This crate provides the foundational types used throughout the
//! group-authorization core:
//! - The `VertexIndex` identifier and the vertex/group/edge data model
//! - Hierarchical group names
//! - The XOR set checksum and the Ed25519 set signer used by the cache
//! - Error types using snafu, with a numeric error-code catalog
//! - Configuration for allocator, cache, and recovery behavior

#![deny(unsafe_code)]

pub mod checksum;
pub mod config;
pub mod error;
pub mod index;
pub mod name;
pub mod signing;
pub mod vertex;

// Re-export commonly used types at crate root
pub use checksum::xor_checksum;
pub use error::{CohortError, ErrorCode, Result};
pub use index::VertexIndex;
pub use name::GroupName;
pub use signing::SetSigner;
pub use vertex::{Group, GroupInheritance, Membership, Vertex, VertexType};
