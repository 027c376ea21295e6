//! Topology lattice (spec §3 "Lattice"; spec §9 design note: "use an
//! arena (vector) of interface nodes and refer to siblings by index").
//!
//! Grounded on `lattice.c`'s `lattice_elt_create`/`lattice_t`: a
//! multi-rooted DAG where nodes at the same TTL sharing a parent are its
//! sibling group. We represent that sibling group directly as the
//! parent's children list rather than each node separately listing its
//! siblings — a node's siblings are exactly `lattice.children(parent)` —
//! which is equivalent to the original's self-inclusive `siblings`
//! dynarray without the redundant back-pointer.

use crate::interface::Interface;
use mda_packet::Address;

pub type NodeId = usize;

#[derive(Debug, Clone)]
struct Node {
    interface: Interface,
    parents: Vec<NodeId>,
    children: Vec<NodeId>,
}

/// An arena-indexed DAG of [`Interface`] nodes, layered by TTL, with
/// possibly more than one root (spec: "multiple first-hop interfaces
/// when the source itself is multipath").
#[derive(Debug, Clone, Default)]
pub struct Lattice {
    arena: Vec<Node>,
    roots: Vec<NodeId>,
}

impl Lattice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, interface: Interface) -> NodeId {
        let id = self.push(interface);
        self.roots.push(id);
        id
    }

    pub fn add_child(&mut self, parent: NodeId, interface: Interface) -> NodeId {
        let id = self.push(interface);
        self.arena[parent].children.push(id);
        self.arena[id].parents.push(parent);
        id
    }

    fn push(&mut self, interface: Interface) -> NodeId {
        self.arena.push(Node {
            interface,
            parents: Vec::new(),
            children: Vec::new(),
        });
        self.arena.len() - 1
    }

    #[must_use]
    pub fn interface(&self, id: NodeId) -> &Interface {
        &self.arena[id].interface
    }

    pub fn interface_mut(&mut self, id: NodeId) -> &mut Interface {
        &mut self.arena[id].interface
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.arena[id].children
    }

    #[must_use]
    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        &self.arena[id].parents
    }

    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Looks up an existing child of `parent` with the given address
    /// (node identity is by address equality, spec §3 "Interface"), for
    /// merging repeated observations of the same next hop into one node.
    #[must_use]
    pub fn find_child_by_address(&self, parent: NodeId, address: Option<Address>) -> Option<NodeId> {
        self.arena[parent]
            .children
            .iter()
            .copied()
            .find(|&child| self.arena[child].interface.address == address)
    }

    #[must_use]
    pub fn find_root_by_address(&self, address: Option<Address>) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|&root| self.arena[root].interface.address == address)
    }
}
