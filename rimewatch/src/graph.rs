// Rimewatch: Rank-Attack Detection for RPL Low-Power Networks
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! The network graph store.
//!
//! A fixed-capacity arena of [`Node`] records, one per sensor the root knows about. Slot 0 always
//! holds the root itself. Nodes reference their parent and their neighbors through [`NodeIndex`]
//! handles instead of references, since the parent and neighbor relations are cyclic. Nodes are
//! never removed within a session; staleness is expressed through their timestamp.

use crate::addr::{compress, globalize};
use crate::rpl::RoutingTable;
use log::*;
use std::net::Ipv6Addr;

/// Maximum number of nodes the graph can hold, including the root.
pub const NETWORK_NODES: usize = 13;

/// Maximum number of neighbors recorded per node.
pub const NETWORK_DENSITY: usize = 8;

/// Handle of a node inside the [`NetworkGraph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(u16);

impl NodeIndex {
    /// The handle of the root node, always located in slot 0.
    pub const ROOT: NodeIndex = NodeIndex(0);

    /// The position of this node in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The detector flags of a node.
///
/// `temp` is scratch within one detector pass; the two saved flags survive between rounds and are
/// subject to repeat-offender decay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStatus {
    /// Set by a detector phase in the current round, consumed by the decay step of that phase.
    pub temp: bool,
    /// The node was recently caught misreporting a neighbor rank.
    pub rank_error: bool,
    /// The node was recently caught advertising a rank its parent does not allow.
    pub relative_error: bool,
}

impl NodeStatus {
    /// A node is announced to the operator only when both saved flags hold at once.
    pub fn is_malicious(&self) -> bool {
        self.rank_error && self.relative_error
    }
}

/// The association between a node and one of its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    /// The neighbor, or `None` when it could not be allocated in the arena.
    pub node: Option<NodeIndex>,
    /// The rank the owning node claims this neighbor has. May differ from the neighbor's own claim.
    pub rank: u16,
}

/// A network node, i.e. one sensor.
#[derive(Debug, Clone)]
pub struct Node {
    /// The compressed address of the node, which works as its identifier.
    pub(crate) id: u16,
    /// The full address of the node, copied out of the routing table on allocation.
    pub(crate) addr: Ipv6Addr,
    /// The round in which this node last answered a mapping request. 0 means never.
    pub(crate) timestamp: u8,
    /// The parent this node reported, if it has been allocated.
    pub(crate) parent: Option<NodeIndex>,
    /// The slot in `neighbors` holding the reported parent.
    pub(crate) parent_index: Option<usize>,
    /// The rank this node claims for itself.
    pub(crate) rank: u16,
    /// The neighbors this node reported, at most [`NETWORK_DENSITY`] of them.
    pub(crate) neighbors: Vec<Neighbor>,
    /// Scratch counter used by the detector to tally rank-observation mismatches.
    pub(crate) visited: u8,
    /// The detector flags of this node.
    pub(crate) status: NodeStatus,
}

impl Node {
    fn new(id: u16, addr: Ipv6Addr) -> Self {
        Self {
            id,
            addr,
            timestamp: 0,
            parent: None,
            parent_index: None,
            rank: 0,
            neighbors: Vec::new(),
            visited: 0,
            status: NodeStatus::default(),
        }
    }

    /// The short identifier of the node.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// The full address of the node.
    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    /// The round in which this node last answered, 0 when it never did.
    pub fn timestamp(&self) -> u8 {
        self.timestamp
    }

    /// The parent this node reported.
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    /// The slot in the neighbor list holding the reported parent.
    pub fn parent_index(&self) -> Option<usize> {
        self.parent_index
    }

    /// The rank this node claims for itself.
    pub fn rank(&self) -> u16 {
        self.rank
    }

    /// The neighbors this node reported.
    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    /// The detector flags of this node.
    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Append a neighbor observation, silently dropping it once the density bound is reached.
    pub(crate) fn push_neighbor(&mut self, neighbor: Neighbor) {
        if self.neighbors.len() < NETWORK_DENSITY {
            self.neighbors.push(neighbor);
        }
    }
}

/// The arena of all nodes the root knows about.
///
/// Slot 0 is reserved for the root. Further slots are allocated in first-unused order by
/// [`upsert`](NetworkGraph::upsert) and stay allocated for the lifetime of the graph. No two
/// allocated nodes share a short identifier.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    nodes: Vec<Node>,
}

impl NetworkGraph {
    /// Create a graph holding only the root node with the given global address.
    pub fn new(root_addr: Ipv6Addr) -> Self {
        let mut nodes = Vec::with_capacity(NETWORK_NODES);
        nodes.push(Node::new(compress(root_addr), root_addr));
        Self { nodes }
    }

    /// Number of allocated nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `false`: the root is always allocated.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The root node.
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    pub(crate) fn root_mut(&mut self) -> &mut Node {
        &mut self.nodes[0]
    }

    /// Get a node by handle.
    pub fn node(&self, idx: NodeIndex) -> Option<&Node> {
        self.nodes.get(idx.index())
    }

    pub(crate) fn node_mut(&mut self, idx: NodeIndex) -> Option<&mut Node> {
        self.nodes.get_mut(idx.index())
    }

    /// Iterate over all allocated nodes with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeIndex(i as u16), n))
    }

    /// Handles of all allocated nodes.
    pub(crate) fn indices(&self) -> impl Iterator<Item = NodeIndex> {
        (0..self.nodes.len() as u16).map(NodeIndex)
    }

    /// Search for a node by short identifier.
    pub fn find(&self, id: u16) -> Option<NodeIndex> {
        self.nodes.iter().position(|n| n.id == id).map(|i| NodeIndex(i as u16))
    }

    /// Get the node with the given short identifier, allocating it if necessary.
    ///
    /// A new node is backed by the first used routing table entry whose compressed destination
    /// equals `id`; its address is copied out of that entry. Returns `None` when the arena is full
    /// or when no routing table entry matches, in which case the caller simply proceeds with less
    /// information.
    pub fn upsert(&mut self, id: u16, routes: &RoutingTable) -> Option<NodeIndex> {
        if let Some(idx) = self.find(id) {
            return Some(idx);
        }

        if self.nodes.len() >= NETWORK_NODES {
            warn!("network graph is full, cannot allocate node {:#06x}", id);
            return None;
        }

        match routes.lookup(id) {
            Some(entry) => {
                debug!("creating new node with address {} ({:#06x})", entry.ipaddr, id);
                self.nodes.push(Node::new(id, entry.ipaddr));
                Some(NodeIndex((self.nodes.len() - 1) as u16))
            }
            None => {
                debug!("no routing table entry matches id {:#06x}", id);
                None
            }
        }
    }

    /// Rebuild the root's neighbor list from the routing table.
    ///
    /// Every destination whose next hop is the destination itself (after promoting the link-local
    /// next hop into the managed prefix) is a direct link-layer neighbor of the root. Each such
    /// neighbor is recorded with rank 0; the real rank is only learned from mapping replies.
    pub fn reset_root_neighbors(&mut self, routes: &RoutingTable) {
        let direct: Vec<u16> = routes
            .iter_used()
            .filter(|e| globalize(e.nexthop) == e.ipaddr)
            .map(|e| compress(e.ipaddr))
            .collect();

        self.root_mut().neighbors.clear();
        for id in direct {
            let node = self.upsert(id, routes);
            self.root_mut().push_neighbor(Neighbor { node, rank: 0 });
        }
    }

    /// Clear the detector's per-node scratch counters.
    pub(crate) fn clear_visited(&mut self) {
        for node in &mut self.nodes {
            node.visited = 0;
        }
    }
}
