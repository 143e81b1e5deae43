//! Vertex and edge data model for the group graph.
//!
//! The group graph stores three vertex kinds (users, app users, groups) and
//! two edge kinds (membership, parent/child). Vertices carry a globally
//! unique [`VertexIndex`]; groups additionally carry inheritance flags and
//! the inclusion flags that drive app-chain gating during authorization
//! resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::{index::VertexIndex, name::GroupName};

/// Kind of a graph vertex.
///
/// The string forms (`USER`, `APP_USER`, `GROUP`) are part of the cache key
/// format and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VertexType {
    /// A human principal.
    User,
    /// An application principal.
    AppUser,
    /// A group vertex.
    Group,
}

/// Error from parsing a [`VertexType`] string form.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("unknown vertex type: {value}"))]
pub struct UnknownVertexType {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for VertexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VertexType::User => "USER",
            VertexType::AppUser => "APP_USER",
            VertexType::Group => "GROUP",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for VertexType {
    type Err = UnknownVertexType;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "USER" => Ok(VertexType::User),
            "APP_USER" => Ok(VertexType::AppUser),
            "GROUP" => Ok(VertexType::Group),
            other => Err(UnknownVertexType { value: other.to_string() }),
        }
    }
}

/// A vertex in the group graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vertex {
    /// Globally unique index, assigned once at creation.
    pub index: VertexIndex,
    /// Vertex kind.
    pub vertex_type: VertexType,
    /// External principal identifier (DN for users, security id for apps).
    pub principal: String,
    /// Inactive vertices are soft-disabled, never deleted.
    pub active: bool,
}

impl Vertex {
    /// Creates an active vertex.
    pub fn new(index: VertexIndex, vertex_type: VertexType, principal: impl Into<String>) -> Self {
        Self { index, vertex_type, principal: principal.into(), active: true }
    }
}

/// Permissions inherited from a parent group along a parent/child edge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GroupInheritance {
    /// Members of the parent gain data access to this group.
    pub data_access: bool,
    /// Parent admin-read holders can read this group.
    pub admin_read: bool,
    /// Parent admin-write holders can modify this group.
    pub admin_write: bool,
    /// Parent admin-manage holders can manage memberships.
    pub admin_manage: bool,
    /// Parent admin-create-child holders can create child groups.
    pub admin_create_child: bool,
}

/// A group vertex.
///
/// `require_only_user` and `require_only_app` are independent flags: the
/// first admits the group into a user's unconditional set, the second makes
/// an app's membership grant the group to anyone acting through that app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Group {
    /// Globally unique index.
    pub index: VertexIndex,
    /// Fully qualified hierarchical name.
    pub name: GroupName,
    /// Display name (the last path segment at creation time).
    pub friendly_name: String,
    /// Inactive groups are excluded from resolution by default.
    pub active: bool,
    /// Permissions inherited by this group from its parent.
    pub inheritance: GroupInheritance,
    /// Membership counts for the user regardless of the app chain.
    pub require_only_user: bool,
    /// An app holding this group grants it to anyone acting through the app.
    pub require_only_app: bool,
}

impl Group {
    /// Creates a group with the platform defaults: active, user inclusion
    /// only.
    pub fn new(index: VertexIndex, name: GroupName) -> Self {
        let friendly_name = name.friendly_name().to_string();
        Self {
            index,
            name,
            friendly_name,
            active: true,
            inheritance: GroupInheritance::default(),
            require_only_user: true,
            require_only_app: false,
        }
    }

    /// Sets the inclusion flags.
    #[must_use]
    pub fn with_inclusion(mut self, require_only_user: bool, require_only_app: bool) -> Self {
        self.require_only_user = require_only_user;
        self.require_only_app = require_only_app;
        self
    }

    /// Sets the inheritance flags.
    #[must_use]
    pub fn with_inheritance(mut self, inheritance: GroupInheritance) -> Self {
        self.inheritance = inheritance;
        self
    }
}

/// A membership edge from a principal to a group, with per-edge permission
/// bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Membership {
    /// The member receives the group in data-access resolution.
    pub data_access: bool,
    /// The member may read group metadata.
    pub admin_read: bool,
    /// The member may modify the group.
    pub admin_write: bool,
    /// The member may manage other memberships.
    pub admin_manage: bool,
    /// The member may create child groups.
    pub admin_create_child: bool,
}

impl Default for Membership {
    /// Plain membership: data access without admin bits.
    fn default() -> Self {
        Self {
            data_access: true,
            admin_read: false,
            admin_write: false,
            admin_manage: false,
            admin_create_child: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_type_round_trips() {
        for vt in [VertexType::User, VertexType::AppUser, VertexType::Group] {
            let parsed: VertexType = vt.to_string().parse().expect("should parse");
            assert_eq!(parsed, vt);
        }
    }

    #[test]
    fn unknown_vertex_type_is_rejected() {
        let err = "GROUP_MAPPING".parse::<VertexType>().expect_err("should reject");
        assert_eq!(err.value, "GROUP_MAPPING");
    }

    #[test]
    fn new_group_defaults_match_initializer() {
        let group = Group::new(VertexIndex::new(7), GroupName::under_root("analysts"));
        assert!(group.active);
        assert!(group.require_only_user);
        assert!(!group.require_only_app);
        assert_eq!(group.friendly_name, "analysts");
    }
}
