//! Group-graph query contract.
//!
//! The resolver's only external read dependency. The graph engine itself
//! (persistence, traversal indexes, mutation) lives outside this crate;
//! everything here is the read surface the authorization core consumes, plus
//! the authoritative maximum-index query the allocators recover from.

use std::collections::BTreeSet;

use cohort_types::{Group, GroupName, Vertex, VertexIndex, VertexType};
use snafu::Snafu;

/// Error type for graph queries.
#[derive(Debug, Snafu)]
pub enum GraphError {
    /// No vertex of the requested type exists for the id.
    #[snafu(display("no {vertex_type} found with id {id}"))]
    PrincipalNotFound {
        /// Requested vertex type.
        vertex_type: VertexType,
        /// External principal id.
        id: String,
    },

    /// No group exists with the given name.
    #[snafu(display("no group found with name {name}"))]
    GroupNotFound {
        /// Fully qualified group name.
        name: GroupName,
    },

    /// The graph backend failed.
    #[snafu(display("graph backend failure: {message}"))]
    Backend {
        /// Backend-provided detail.
        message: String,
    },
}

/// Result type for graph queries.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Read queries over the persisted group graph.
pub trait GroupGraph: Send + Sync {
    /// Looks up a principal or group vertex.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::PrincipalNotFound`] when no vertex of the
    /// requested type exists for `id`.
    fn vertex(&self, vertex_type: VertexType, id: &str) -> Result<Vertex>;

    /// Returns the groups a principal holds through membership edges.
    ///
    /// With `explicit_only` the traversal stops at direct memberships;
    /// otherwise it follows parent/child edges whose inheritance grants
    /// data access. Inactive groups are excluded unless `include_inactive`.
    fn groups_of_principal(
        &self,
        vertex_type: VertexType,
        id: &str,
        explicit_only: bool,
        include_inactive: bool,
    ) -> Result<BTreeSet<Group>>;

    /// Returns the principals holding membership in a group.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::GroupNotFound`] when the group does not exist.
    fn group_members(
        &self,
        name: &GroupName,
        include_users: bool,
        include_apps: bool,
    ) -> Result<Vec<Vertex>>;
}

/// Authoritative source for the highest index ever allocated.
///
/// Allocator recovery re-derives the persisted counter from this query, so
/// an implementation must account for every vertex the graph has persisted,
/// active or not.
pub trait IndexAuthority: Send + Sync {
    /// The maximum allocated vertex index, or zero for an empty graph.
    fn max_allocated_index(&self) -> Result<VertexIndex>;
}
