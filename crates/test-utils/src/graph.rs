//! In-memory group graph for tests.
//!
//! Implements the read contract the resolver and allocators consume, plus a
//! small mutation surface for building fixtures: create users, apps, and
//! groups, wire memberships and parent/child edges, flip activity. Indices
//! come from an injected [`MemoryIdAllocator`] instance, so fixture graphs
//! also exercise the allocator contract.

use std::collections::{BTreeSet, HashMap, VecDeque};

use cohort_authz::{
    GraphError, GroupGraph, IdAllocator, IndexAuthority, MemoryIdAllocator,
    graph::Result,
};
use cohort_types::{
    Group, GroupInheritance, GroupName, Membership, Vertex, VertexIndex, VertexType,
};
use parking_lot::RwLock;

#[derive(Default)]
struct GraphData {
    vertices: HashMap<(VertexType, String), Vertex>,
    groups: HashMap<GroupName, Group>,
    /// principal -> (group name -> membership edge)
    memberships: HashMap<(VertexType, String), HashMap<GroupName, Membership>>,
    /// parent group -> child groups
    children: HashMap<GroupName, Vec<GroupName>>,
}

/// In-memory [`GroupGraph`] implementation.
pub struct MemoryGroupGraph {
    data: RwLock<GraphData>,
    allocator: MemoryIdAllocator,
}

impl Default for MemoryGroupGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGroupGraph {
    /// Creates an empty graph with a fresh allocator.
    pub fn new() -> Self {
        Self { data: RwLock::new(GraphData::default()), allocator: MemoryIdAllocator::default() }
    }

    fn allocate(&self) -> VertexIndex {
        // The in-memory allocator cannot fail.
        self.allocator.next_id().expect("memory allocator")
    }

    /// Creates an active user, returning its vertex.
    pub fn add_user(&self, id: &str) -> Vertex {
        let vertex = Vertex::new(self.allocate(), VertexType::User, id);
        self.data
            .write()
            .vertices
            .insert((VertexType::User, id.to_string()), vertex.clone());
        vertex
    }

    /// Creates an active app user, returning its vertex.
    pub fn add_app_user(&self, id: &str) -> Vertex {
        let vertex = Vertex::new(self.allocate(), VertexType::AppUser, id);
        self.data
            .write()
            .vertices
            .insert((VertexType::AppUser, id.to_string()), vertex.clone());
        vertex
    }

    /// Creates an active group with default inclusion flags.
    pub fn add_group(&self, name: &GroupName) -> Group {
        let group = Group::new(self.allocate(), name.clone());
        self.insert_group(group.clone());
        group
    }

    /// Creates a group with explicit inclusion flags.
    pub fn add_group_with_inclusion(
        &self,
        name: &GroupName,
        require_only_user: bool,
        require_only_app: bool,
    ) -> Group {
        let group = Group::new(self.allocate(), name.clone())
            .with_inclusion(require_only_user, require_only_app);
        self.insert_group(group.clone());
        group
    }

    /// Creates a child group and wires the parent/child edge.
    pub fn add_child_group(
        &self,
        parent: &GroupName,
        name: &GroupName,
        inheritance: GroupInheritance,
    ) -> Group {
        let group =
            Group::new(self.allocate(), name.clone()).with_inheritance(inheritance);
        let mut data = self.data.write();
        data.groups.insert(name.clone(), group.clone());
        let vertex = Vertex::new(group.index, VertexType::Group, name.as_str());
        data.vertices.insert((VertexType::Group, name.as_str().to_string()), vertex);
        data.children.entry(parent.clone()).or_default().push(name.clone());
        group
    }

    fn insert_group(&self, group: Group) {
        let mut data = self.data.write();
        let vertex = Vertex::new(group.index, VertexType::Group, group.name.as_str());
        data.vertices
            .insert((VertexType::Group, group.name.as_str().to_string()), vertex);
        data.groups.insert(group.name.clone(), group);
    }

    /// Adds a membership edge from a principal to a group.
    pub fn add_member(
        &self,
        vertex_type: VertexType,
        id: &str,
        group: &GroupName,
        membership: Membership,
    ) {
        self.data
            .write()
            .memberships
            .entry((vertex_type, id.to_string()))
            .or_default()
            .insert(group.clone(), membership);
    }

    /// Soft-disables a principal.
    pub fn deactivate_principal(&self, vertex_type: VertexType, id: &str) {
        if let Some(vertex) =
            self.data.write().vertices.get_mut(&(vertex_type, id.to_string()))
        {
            vertex.active = false;
        }
    }

    /// Soft-disables a group.
    pub fn deactivate_group(&self, name: &GroupName) {
        let mut data = self.data.write();
        if let Some(group) = data.groups.get_mut(name) {
            group.active = false;
        }
        if let Some(vertex) =
            data.vertices.get_mut(&(VertexType::Group, name.as_str().to_string()))
        {
            vertex.active = false;
        }
    }
}

impl GroupGraph for MemoryGroupGraph {
    fn vertex(&self, vertex_type: VertexType, id: &str) -> Result<Vertex> {
        self.data
            .read()
            .vertices
            .get(&(vertex_type, id.to_string()))
            .cloned()
            .ok_or_else(|| GraphError::PrincipalNotFound { vertex_type, id: id.to_string() })
    }

    fn groups_of_principal(
        &self,
        vertex_type: VertexType,
        id: &str,
        explicit_only: bool,
        include_inactive: bool,
    ) -> Result<BTreeSet<Group>> {
        let data = self.data.read();
        if !data.vertices.contains_key(&(vertex_type, id.to_string())) {
            return Err(GraphError::PrincipalNotFound { vertex_type, id: id.to_string() });
        }

        // Direct memberships carrying the data-access bit.
        let mut held: BTreeSet<GroupName> = data
            .memberships
            .get(&(vertex_type, id.to_string()))
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(_, membership)| membership.data_access)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();

        // Data access flows down parent/child edges that inherit it.
        if !explicit_only {
            let mut frontier: VecDeque<GroupName> = held.iter().cloned().collect();
            while let Some(parent) = frontier.pop_front() {
                for child in data.children.get(&parent).into_iter().flatten() {
                    let inherits = data
                        .groups
                        .get(child)
                        .is_some_and(|group| group.inheritance.data_access);
                    if inherits && held.insert(child.clone()) {
                        frontier.push_back(child.clone());
                    }
                }
            }
        }

        Ok(held
            .into_iter()
            .filter_map(|name| data.groups.get(&name).cloned())
            .filter(|group| include_inactive || group.active)
            .collect())
    }

    fn group_members(
        &self,
        name: &GroupName,
        include_users: bool,
        include_apps: bool,
    ) -> Result<Vec<Vertex>> {
        let data = self.data.read();
        if !data.groups.contains_key(name) {
            return Err(GraphError::GroupNotFound { name: name.clone() });
        }

        let mut members = Vec::new();
        for ((vertex_type, id), edges) in &data.memberships {
            if !edges.contains_key(name) {
                continue;
            }
            let wanted = match vertex_type {
                VertexType::User => include_users,
                VertexType::AppUser => include_apps,
                VertexType::Group => false,
            };
            if !wanted {
                continue;
            }
            if let Some(vertex) = data.vertices.get(&(*vertex_type, id.clone())) {
                members.push(vertex.clone());
            }
        }
        members.sort_by_key(|vertex| vertex.index);
        Ok(members)
    }
}

impl IndexAuthority for MemoryGroupGraph {
    fn max_allocated_index(&self) -> Result<VertexIndex> {
        self.allocator
            .current_id()
            .map_err(|err| GraphError::Backend { message: err.to_string() })
    }
}
