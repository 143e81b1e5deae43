//! Error types for Cohort using snafu.
//!
//! Module crates define their own snafu enums close to the code that fails
//! (`AllocationError`, `CacheError`, `GraphError`, ...). This module defines
//! the unified [`CohortError`] used at the public service boundary, and the
//! numeric [`ErrorCode`] catalog exposed to callers for programmatic
//! handling.

use core::fmt;

use snafu::{Location, Snafu};

use crate::vertex::VertexType;

/// Unified result type for cohort operations.
pub type Result<T, E = CohortError> = std::result::Result<T, E>;

/// Machine-readable error codes for programmatic error handling.
///
/// Codes are organized into ranges:
///
/// | Range       | Domain        | Examples                                |
/// |-------------|---------------|-----------------------------------------|
/// | 1000–1099   | Allocation    | Lock timeout, store rejection, recovery |
/// | 2000–2099   | Cache         | Store failure, corruption, contention   |
/// | 3000–3099   | Graph/query   | Principal or group not found            |
/// | 3100–3199   | General       | Configuration, internal invariants      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // --- Allocation errors (1000–1099) ---
    /// Coordination lock was not acquired within the bounded timeout.
    AllocationLockTimeout = 1000,
    /// The coordination store rejected a counter read or write.
    AllocationStoreRejected = 1001,
    /// The persisted counter is missing or flagged invalid and recovery
    /// from the graph's authoritative maximum failed.
    AllocationRecoveryFailed = 1002,

    // --- Cache errors (2000–2099) ---
    /// Cache store operation failed.
    CacheStore = 2000,
    /// Cache entry failed signature verification or member decoding.
    CacheCorruption = 2001,
    /// All optimistic write attempts aborted under contention.
    CacheContentionExhausted = 2002,
    /// A cache key could not be parsed back into a query.
    CacheInvalidKey = 2003,

    // --- Graph/query errors (3000–3099) ---
    /// Principal not found in the graph.
    PrincipalNotFound = 3000,
    /// Group not found in the graph.
    GroupNotFound = 3001,
    /// Graph query failed.
    QueryFailed = 3002,

    // --- General errors (3100–3199) ---
    /// Configuration error.
    Config = 3100,
    /// Internal error (unexpected state, invariant violation).
    Internal = 3101,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for
    /// unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::AllocationLockTimeout),
            1001 => Some(Self::AllocationStoreRejected),
            1002 => Some(Self::AllocationRecoveryFailed),
            2000 => Some(Self::CacheStore),
            2001 => Some(Self::CacheCorruption),
            2002 => Some(Self::CacheContentionExhausted),
            2003 => Some(Self::CacheInvalidKey),
            3000 => Some(Self::PrincipalNotFound),
            3001 => Some(Self::GroupNotFound),
            3002 => Some(Self::QueryFailed),
            3100 => Some(Self::Config),
            3101 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Whether the caller may retry the failed operation as-is.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::AllocationLockTimeout | Self::AllocationStoreRejected | Self::CacheStore
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Top-level error type for cohort operations.
///
/// Allocation failures are fatal to the operation and retryable by the
/// caller. Cache corruption and contention exhaustion are recovered inside
/// the cache layer and normally never surface. Not-found errors surface only
/// at direct management call sites; advisory call sites (authorization
/// resolution) degrade to an empty result instead.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CohortError {
    /// Coordination lock acquisition timed out.
    #[snafu(display("failed to acquire coordination lock within {timeout_ms} ms"))]
    LockTimeout {
        /// Bounded acquire timeout that elapsed.
        timeout_ms: u64,
    },

    /// ID allocation failed against the coordination store.
    #[snafu(display("id allocation failed at {location}: {message}"))]
    Allocation {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Cache store operation failed.
    #[snafu(display("cache store failure at {location}: {message}"))]
    CacheStore {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// A cache key could not be parsed back into a query.
    #[snafu(display("invalid cache key {key}: {reason}"))]
    InvalidCacheKey {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Principal not found in the graph.
    #[snafu(display("no {vertex_type} found with id {id}"))]
    PrincipalNotFound {
        /// Expected vertex type.
        vertex_type: VertexType,
        /// External principal id.
        id: String,
    },

    /// Group not found in the graph.
    #[snafu(display("no group found with name {name}"))]
    GroupNotFound {
        /// Fully qualified group name.
        name: String,
    },

    /// Graph query failed.
    #[snafu(display("graph query failed at {location}: {message}"))]
    Query {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Configuration error.
    #[snafu(display("configuration error: {message}"))]
    Config {
        /// Error description.
        message: String,
    },

    /// Internal error (unexpected state, invariant violation).
    #[snafu(display("internal error at {location}: {message}"))]
    Internal {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },
}

impl CohortError {
    /// Maps the error to its catalog code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::LockTimeout { .. } => ErrorCode::AllocationLockTimeout,
            Self::Allocation { .. } => ErrorCode::AllocationStoreRejected,
            Self::CacheStore { .. } => ErrorCode::CacheStore,
            Self::InvalidCacheKey { .. } => ErrorCode::CacheInvalidKey,
            Self::PrincipalNotFound { .. } => ErrorCode::PrincipalNotFound,
            Self::GroupNotFound { .. } => ErrorCode::GroupNotFound,
            Self::Query { .. } => ErrorCode::QueryFailed,
            Self::Config { .. } => ErrorCode::Config,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Whether the caller may retry the failed operation as-is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_u16() {
        for code in [
            ErrorCode::AllocationLockTimeout,
            ErrorCode::AllocationStoreRejected,
            ErrorCode::AllocationRecoveryFailed,
            ErrorCode::CacheStore,
            ErrorCode::CacheCorruption,
            ErrorCode::CacheContentionExhausted,
            ErrorCode::CacheInvalidKey,
            ErrorCode::PrincipalNotFound,
            ErrorCode::GroupNotFound,
            ErrorCode::QueryFailed,
            ErrorCode::Config,
            ErrorCode::Internal,
        ] {
            assert_eq!(ErrorCode::from_u16(code.as_u16()), Some(code));
        }
        assert_eq!(ErrorCode::from_u16(9999), None);
    }

    #[test]
    fn lock_timeout_is_retryable() {
        let err = CohortError::LockTimeout { timeout_ms: 250 };
        assert!(err.is_retryable());
        assert_eq!(err.code(), ErrorCode::AllocationLockTimeout);
    }

    #[test]
    fn not_found_is_not_retryable() {
        let err = CohortError::GroupNotFound { name: "root.missing".to_string() };
        assert!(!err.is_retryable());
    }
}
