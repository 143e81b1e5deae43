//! Hierarchical group names.
//!
//! Group names are dot-separated paths rooted at `root`. The platform
//! reserves two subtrees for application bookkeeping: `root.app.<name>` for
//! an application's own group and `root.appaccess.<name>` for the group
//! gating access to it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the root group. Every fully qualified name starts here.
pub const ROOT: &str = "root";

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// Subtree that holds each application's own group.
pub const APP_GROUP: &str = "app";

/// Subtree that holds each application's access group.
pub const APP_ACCESS_GROUP: &str = "appaccess";

/// A fully qualified, root-prefixed group name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
    /// Creates a name from a possibly unprefixed path, adding the root
    /// prefix when missing. An empty path names the root group itself.
    pub fn qualify(unprefixed: &str) -> Self {
        let prefix = format!("{ROOT}{SEPARATOR}");
        if unprefixed.is_empty() {
            Self(ROOT.to_string())
        } else if unprefixed == ROOT || unprefixed.starts_with(&prefix) {
            Self(unprefixed.to_string())
        } else {
            Self(format!("{ROOT}{SEPARATOR}{unprefixed}"))
        }
    }

    /// Creates a name for a direct child of the root group.
    pub fn under_root(segment: &str) -> Self {
        Self::qualify(segment)
    }

    /// The group holding an application's own memberships.
    pub fn app_group(app_name: &str) -> Self {
        Self(format!("{ROOT}{SEPARATOR}{APP_GROUP}{SEPARATOR}{app_name}"))
    }

    /// The group gating access to an application.
    pub fn app_access_group(app_name: &str) -> Self {
        Self(format!("{ROOT}{SEPARATOR}{APP_ACCESS_GROUP}{SEPARATOR}{app_name}"))
    }

    /// The fully qualified name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name with the root prefix stripped, as users entered it.
    pub fn unprefixed(&self) -> &str {
        let prefix = format!("{ROOT}{SEPARATOR}");
        self.0.strip_prefix(&prefix).unwrap_or(&self.0)
    }

    /// The last path segment.
    pub fn friendly_name(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or(&self.0)
    }

    /// The parent group name, or `None` for the root group.
    pub fn parent(&self) -> Option<GroupName> {
        self.0.rsplit_once(SEPARATOR).map(|(parent, _)| GroupName(parent.to_string()))
    }

    /// Replaces the last path segment, keeping the rest of the path.
    #[must_use]
    pub fn renamed(&self, new_friendly_name: &str) -> GroupName {
        match self.0.rsplit_once(SEPARATOR) {
            Some((parent, _)) => GroupName(format!("{parent}{SEPARATOR}{new_friendly_name}")),
            None => GroupName(new_friendly_name.to_string()),
        }
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
