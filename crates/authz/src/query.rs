//! Authorization resolution.
//!
//! Computes a principal's full authorization set from the group graph,
//! splitting the principal's groups into those held unconditionally
//! (`require_only_user`) and those visible only when every app in the
//! request chain also holds them. Groups flagged `require_only_app` on any
//! chain app are granted unconditionally, so platform-wide groups stay
//! visible, while a permission absent from the calling app cannot leak
//! through to the user.

use std::{collections::BTreeSet, sync::Arc};

use cohort_types::{Group, VertexIndex, VertexType};
use tracing::{debug, info};

use crate::{
    cache::{CacheError, CacheQuery},
    graph::{GraphError, GroupGraph},
};

/// Separator between cache key segments (type, id, chain).
pub const KEY_SEPARATOR: char = ':';

/// Separator between app ids within the chain segment.
pub const CHAIN_SEPARATOR: &str = ",";

/// Resolves the authorization set for a principal acting through
/// `app_chain`.
///
/// A missing or inactive principal resolves to the empty set; resolution
/// is an advisory call site, not management. Graph backend failures
/// propagate.
pub fn resolve<G: GroupGraph>(
    graph: &G,
    principal_type: VertexType,
    id: &str,
    app_chain: &[String],
) -> Result<BTreeSet<VertexIndex>, GraphError> {
    let mut auths = BTreeSet::new();

    let principal = match graph.vertex(principal_type, id) {
        Ok(vertex) => vertex,
        Err(GraphError::PrincipalNotFound { .. }) => {
            debug!(principal_type = %principal_type, id, "principal not found; empty result");
            return Ok(auths);
        },
        Err(err) => return Err(err),
    };
    if !principal.active {
        debug!(principal_type = %principal_type, id, "principal inactive; empty result");
        return Ok(auths);
    }

    // The principal always carries its own index.
    auths.insert(principal.index);

    let own_groups = graph.groups_of_principal(principal_type, id, false, false)?;

    // Walk the app chain once, accumulating the intersection of every
    // contributed group set and the union of require_only_app groups.
    let mut apps_filter: Option<BTreeSet<VertexIndex>> = None;
    let mut apps_always_include: BTreeSet<VertexIndex> = BTreeSet::new();
    for app_id in app_chain {
        let Some(app_groups) = chain_app_groups(graph, app_id)? else {
            continue;
        };
        let mut indices = BTreeSet::new();
        for group in &app_groups {
            indices.insert(group.index);
            if group.require_only_app {
                apps_always_include.insert(group.index);
            }
        }
        apps_filter = Some(match apps_filter {
            None => indices,
            Some(filter) => filter.intersection(&indices).copied().collect(),
        });
    }
    // Intersection over nothing is conservatively empty: with no app in the
    // chain, no app-dependent group is granted.
    let apps_filter = apps_filter.unwrap_or_default();

    match principal_type {
        VertexType::User => {
            let mut regardless = auths.clone();
            let mut depending_on_app = BTreeSet::new();
            for group in &own_groups {
                if group.require_only_user {
                    regardless.insert(group.index);
                } else {
                    depending_on_app.insert(group.index);
                }
            }
            auths = &regardless | &(&depending_on_app & &apps_filter);
        },
        VertexType::AppUser => {
            // An app's own groups apply unconditionally; no chain gating on
            // its own identity.
            for group in &own_groups {
                auths.insert(group.index);
            }
        },
        VertexType::Group => {},
    }

    Ok(&auths | &apps_always_include)
}

/// Returns a chain app's own group set, or `None` when the app is unknown
/// (logged and skipped, non-fatal). An inactive app contributes an empty
/// set, collapsing the chain intersection.
fn chain_app_groups<G: GroupGraph>(
    graph: &G,
    app_id: &str,
) -> Result<Option<BTreeSet<Group>>, GraphError> {
    match graph.vertex(VertexType::AppUser, app_id) {
        Err(GraphError::PrincipalNotFound { .. }) => {
            info!(app_id, "app in request chain not found; skipping");
            Ok(None)
        },
        Err(err) => Err(err),
        Ok(app) if !app.active => Ok(Some(BTreeSet::new())),
        Ok(_) => {
            let groups = graph.groups_of_principal(VertexType::AppUser, app_id, false, false)?;
            Ok(Some(groups))
        },
    }
}

/// The resolver's cacheable query.
///
/// Keys are `TYPE:id` for chain-less requests and `TYPE:id:app1,app2` with a
/// chain; the wildcard `TYPE:id*` covers every chain variant for one
/// principal.
#[derive(Debug)]
pub struct AuthorizationQuery<G> {
    graph: Arc<G>,
    principal_type: VertexType,
    principal_id: String,
    app_chain: Vec<String>,
}

impl<G> AuthorizationQuery<G> {
    /// Creates a query for one principal and request chain.
    pub fn new(
        graph: Arc<G>,
        principal_type: VertexType,
        principal_id: impl Into<String>,
        app_chain: Vec<String>,
    ) -> Self {
        Self { graph, principal_type, principal_id: principal_id.into(), app_chain }
    }

    /// The principal's type.
    pub fn principal_type(&self) -> VertexType {
        self.principal_type
    }

    /// The principal's external id.
    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    /// The request chain.
    pub fn app_chain(&self) -> &[String] {
        &self.app_chain
    }
}

impl<G: GroupGraph> CacheQuery for AuthorizationQuery<G> {
    fn key(&self) -> String {
        let base =
            format!("{}{}{}", self.principal_type, KEY_SEPARATOR, self.principal_id);
        if self.app_chain.is_empty() {
            base
        } else {
            format!("{base}{KEY_SEPARATOR}{}", self.app_chain.join(CHAIN_SEPARATOR))
        }
    }

    fn wildcard_key(&self) -> String {
        format!("{}{}{}*", self.principal_type, KEY_SEPARATOR, self.principal_id)
    }

    fn run(&self) -> Result<BTreeSet<VertexIndex>, GraphError> {
        resolve(self.graph.as_ref(), self.principal_type, &self.principal_id, &self.app_chain)
    }

    fn for_key(&self, key: &str) -> Result<Self, CacheError> {
        let mut parts = key.splitn(3, KEY_SEPARATOR);
        let (Some(type_part), Some(id_part)) = (parts.next(), parts.next()) else {
            return Err(CacheError::InvalidKey {
                key: key.to_string(),
                reason: "expected at least TYPE and id segments".to_string(),
            });
        };
        let principal_type: VertexType =
            type_part.parse().map_err(|_| CacheError::InvalidKey {
                key: key.to_string(),
                reason: format!("unknown vertex type {type_part}"),
            })?;
        let app_chain = match parts.next() {
            None => Vec::new(),
            Some(chain) => chain.split(CHAIN_SEPARATOR).map(str::to_string).collect(),
        };
        Ok(Self {
            graph: Arc::clone(&self.graph),
            principal_type,
            principal_id: id_part.to_string(),
            app_chain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Graph stub that always reports not-found; key handling needs no data.
    #[derive(Debug)]
    struct EmptyGraph;

    impl GroupGraph for EmptyGraph {
        fn vertex(
            &self,
            vertex_type: VertexType,
            id: &str,
        ) -> Result<cohort_types::Vertex, GraphError> {
            Err(GraphError::PrincipalNotFound { vertex_type, id: id.to_string() })
        }

        fn groups_of_principal(
            &self,
            _vertex_type: VertexType,
            _id: &str,
            _explicit_only: bool,
            _include_inactive: bool,
        ) -> Result<BTreeSet<Group>, GraphError> {
            Ok(BTreeSet::new())
        }

        fn group_members(
            &self,
            name: &cohort_types::GroupName,
            _include_users: bool,
            _include_apps: bool,
        ) -> Result<Vec<cohort_types::Vertex>, GraphError> {
            Err(GraphError::GroupNotFound { name: name.clone() })
        }
    }

    fn query(chain: &[&str]) -> AuthorizationQuery<EmptyGraph> {
        AuthorizationQuery::new(
            Arc::new(EmptyGraph),
            VertexType::User,
            "cn=alice",
            chain.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn key_without_chain_has_two_segments() {
        assert_eq!(query(&[]).key(), "USER:cn=alice");
    }

    #[test]
    fn key_with_chain_appends_apps() {
        assert_eq!(query(&["appA", "appB"]).key(), "USER:cn=alice:appA,appB");
    }

    #[test]
    fn wildcard_covers_all_chain_variants() {
        assert_eq!(query(&["appA"]).wildcard_key(), "USER:cn=alice*");
    }

    #[test]
    fn for_key_round_trips() {
        let original = query(&["appA", "appB"]);
        let rebound = original.for_key(&original.key()).expect("rebind");
        assert_eq!(rebound.principal_type(), VertexType::User);
        assert_eq!(rebound.principal_id(), "cn=alice");
        assert_eq!(rebound.app_chain(), &["appA".to_string(), "appB".to_string()]);
    }

    #[test]
    fn for_key_rejects_single_segment() {
        let err = query(&[]).for_key("USER").expect_err("should reject");
        assert!(matches!(err, CacheError::InvalidKey { .. }));
    }

    #[test]
    fn for_key_rejects_unknown_type() {
        let err = query(&[]).for_key("ROBOT:cn=alice").expect_err("should reject");
        assert!(matches!(err, CacheError::InvalidKey { .. }));
    }

    #[test]
    fn missing_principal_resolves_empty() {
        let auths =
            resolve(&EmptyGraph, VertexType::User, "cn=ghost", &[]).expect("resolve");
        assert!(auths.is_empty());
    }
}
