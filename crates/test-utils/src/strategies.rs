//! Proptest strategies for Cohort domain types.
//!
//! Reusable generators for property-based testing across crates. Strategies
//! produce well-formed domain values while exploring edge cases through
//! random variation.

use std::collections::BTreeSet;

use cohort_types::{GroupName, VertexIndex, VertexType};
use proptest::prelude::*;

/// Generates an arbitrary positive vertex index.
pub fn arb_index() -> impl Strategy<Value = VertexIndex> {
    (1i64..1_000_000_000).prop_map(VertexIndex::new)
}

/// Generates a set of 0-32 distinct positive vertex indices.
pub fn arb_index_set() -> impl Strategy<Value = BTreeSet<VertexIndex>> {
    proptest::collection::btree_set(arb_index(), 0..32)
}

/// Generates an arbitrary principal id shaped like a DN fragment.
pub fn arb_principal_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,15}".prop_map(|name| format!("cn={name}"))
}

/// Generates an arbitrary vertex type.
pub fn arb_vertex_type() -> impl Strategy<Value = VertexType> {
    prop::sample::select(vec![VertexType::User, VertexType::AppUser, VertexType::Group])
}

/// Generates a group name 1-3 segments under root.
pub fn arb_group_name() -> impl Strategy<Value = GroupName> {
    proptest::collection::vec("[a-z][a-z0-9]{0,11}", 1..4)
        .prop_map(|segments| GroupName::qualify(&segments.join(".")))
}
