//! Vertex index identifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Globally unique index assigned to every vertex in the group graph.
///
/// Indices are allocated once by an `IdAllocator`, are monotonically
/// non-decreasing across the cluster, and are never reused while the vertex
/// is active. Negative values never identify a real vertex; the cache layer
/// reserves them as status sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexIndex(i64);

impl VertexIndex {
    /// Creates an index from a raw value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for VertexIndex {
    #[inline]
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<VertexIndex> for i64 {
    #[inline]
    fn from(index: VertexIndex) -> Self {
        index.0
    }
}

impl fmt::Display for VertexIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for VertexIndex {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}
