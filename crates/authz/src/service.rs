//! Caching authorization service facade.
//!
//! Resolution goes through the verified cache; graph mutations performed by
//! the surrounding management service call back into the hooks here so the
//! affected cache entries are lazily marked for recomputation instead of
//! being rebuilt synchronously.

use std::{collections::BTreeSet, sync::Arc};

use cohort_store::CacheStore;
use cohort_types::{
    CohortError, GroupName, VertexIndex, VertexType,
    error::{CacheStoreSnafu, QuerySnafu},
};
use tracing::debug;

use crate::{
    cache::{AuthorizationCache, CacheError},
    graph::{GraphError, GroupGraph},
    query::{AuthorizationQuery, KEY_SEPARATOR},
};

/// Maps cache-layer failures into the public error type.
fn from_cache(err: CacheError) -> CohortError {
    match err {
        CacheError::Store { source } => {
            CacheStoreSnafu { message: source.to_string() }.build()
        },
        CacheError::Query { source, .. } => from_graph(source),
        CacheError::InvalidKey { key, reason } => CohortError::InvalidCacheKey { key, reason },
    }
}

/// Maps graph failures into the public error type.
fn from_graph(err: GraphError) -> CohortError {
    match err {
        GraphError::PrincipalNotFound { vertex_type, id } => {
            CohortError::PrincipalNotFound { vertex_type, id }
        },
        GraphError::GroupNotFound { name } => {
            CohortError::GroupNotFound { name: name.to_string() }
        },
        GraphError::Backend { message } => QuerySnafu { message }.build(),
    }
}

/// Cached authorization resolution plus the invalidation hooks that keep
/// the cache coherent across graph mutations.
pub struct AuthorizationService<G, S> {
    graph: Arc<G>,
    cache: AuthorizationCache<S>,
}

impl<G: GroupGraph, S: CacheStore> AuthorizationService<G, S> {
    /// Creates a service over `graph` and `cache`.
    pub fn new(graph: Arc<G>, cache: AuthorizationCache<S>) -> Self {
        Self { graph, cache }
    }

    /// The underlying cache, for administrative sweeps.
    pub fn cache(&self) -> &AuthorizationCache<S> {
        &self.cache
    }

    /// Resolves a principal's authorization set through the cache.
    pub fn get_authorizations(
        &self,
        principal_type: VertexType,
        principal_id: &str,
        app_chain: Vec<String>,
    ) -> Result<BTreeSet<VertexIndex>, CohortError> {
        let query =
            AuthorizationQuery::new(Arc::clone(&self.graph), principal_type, principal_id, app_chain);
        self.cache.get(&query).map_err(from_cache)
    }

    /// Marks every cache entry of every member of `name` for update.
    ///
    /// Called after group mutations (create, activate, deactivate,
    /// inheritance change). This is a direct management call site: a
    /// missing group surfaces as [`CohortError::GroupNotFound`].
    pub fn group_changed(&self, name: &GroupName) -> Result<(), CohortError> {
        let members = self.graph.group_members(name, true, true).map_err(from_graph)?;
        debug!(group = %name, members = members.len(), "marking member caches for update");
        for member in members {
            self.mark_principal(member.vertex_type, &member.principal)?;
        }
        Ok(())
    }

    /// Marks one principal's cache entries (all chain variants) for update.
    pub fn principal_changed(
        &self,
        principal_type: VertexType,
        principal_id: &str,
    ) -> Result<(), CohortError> {
        self.mark_principal(principal_type, principal_id)
    }

    /// Eagerly recomputes every cached entry for a principal.
    pub fn rebuild(
        &self,
        principal_type: VertexType,
        principal_id: &str,
        app_chain: Vec<String>,
    ) -> Result<(), CohortError> {
        let query =
            AuthorizationQuery::new(Arc::clone(&self.graph), principal_type, principal_id, app_chain);
        self.cache.update_all(&query).map_err(from_cache)
    }

    fn mark_principal(
        &self,
        principal_type: VertexType,
        principal_id: &str,
    ) -> Result<(), CohortError> {
        let pattern = format!("{principal_type}{KEY_SEPARATOR}{principal_id}*");
        self.cache.mark_all_for_update(&pattern).map_err(from_cache)
    }
}
