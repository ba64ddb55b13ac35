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

//! An owned model of the state exposed by the RPL routing subsystem.
//!
//! The routing table, the instance table with its DODAGs, and the interface addresses are owned by
//! RPL; the detection core holds a read-only view and must tolerate the routing subsystem changing
//! entries between two of its own steps. Entries carry an explicit `isused` flag rather than being
//! removed, mirroring the fixed-size tables of the embedded routing implementation this view is
//! fed from.

use crate::addr::compress;
use std::net::Ipv6Addr;

/// Upper bound on the number of routing table entries.
pub const ROUTE_TABLE_SIZE: usize = 16;

/// Rank value marking a parent whose rank is not (yet) known.
pub const INFINITE_RANK: u16 = 0xffff;

/// One destination known to the routing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Address of the destination, under the managed global prefix.
    pub ipaddr: Ipv6Addr,
    /// Next hop towards the destination (usually a link-local address).
    pub nexthop: Ipv6Addr,
    /// Route metric, unused by the detection core.
    pub metric: u8,
    /// Whether this slot currently holds a route.
    pub isused: bool,
}

/// The routing table of the root, bounded to [`ROUTE_TABLE_SIZE`] entries.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
}

impl RoutingTable {
    /// Create an empty routing table.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Number of slots in the table (used and unused). The mapping cursor iterates up to this.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the entry in slot `i`.
    pub fn get(&self, i: usize) -> Option<&RouteEntry> {
        self.entries.get(i)
    }

    /// Iterate over all used entries.
    pub fn iter_used(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter().filter(|e| e.isused)
    }

    /// Find the first used entry whose compressed destination address equals `id`.
    pub fn lookup(&self, id: u16) -> Option<&RouteEntry> {
        self.iter_used().find(|e| compress(e.ipaddr) == id)
    }

    /// Add a route. Returns `false` when the table is full, in which case the route is dropped.
    pub fn add(&mut self, ipaddr: Ipv6Addr, nexthop: Ipv6Addr, metric: u8) -> bool {
        // reuse a free slot before growing the table
        if let Some(slot) = self.entries.iter_mut().find(|e| !e.isused) {
            *slot = RouteEntry { ipaddr, nexthop, metric, isused: true };
            return true;
        }
        if self.entries.len() >= ROUTE_TABLE_SIZE {
            return false;
        }
        self.entries.push(RouteEntry { ipaddr, nexthop, metric, isused: true });
        true
    }

    /// Mark the route towards `ipaddr` as unused, keeping the slot.
    pub fn remove(&mut self, ipaddr: Ipv6Addr) {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.isused && e.ipaddr == ipaddr) {
            slot.isused = false;
        }
    }
}

/// One parent a node considers within a DODAG, together with the rank it advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DodagParent {
    /// Address of the parent.
    pub addr: Ipv6Addr,
    /// The rank the parent advertised, or [`INFINITE_RANK`] when unknown.
    pub rank: u16,
}

/// One DODAG within an RPL instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dodag {
    /// Whether this slot currently holds a DODAG.
    pub used: bool,
    /// The DODAG identifier (an IPv6 address, by convention the root's).
    pub dag_id: Ipv6Addr,
    /// The DODAG version number.
    pub version: u8,
    /// The rank of the local node within this DODAG.
    pub rank: u16,
    /// The parent set of the local node.
    pub parents: Vec<DodagParent>,
    /// Index of the preferred parent in `parents`, if one is selected.
    pub preferred_parent: Option<usize>,
}

/// One RPL instance with its DODAG table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RplInstance {
    /// Whether this slot currently holds an instance.
    pub used: bool,
    /// The RPL instance identifier.
    pub instance_id: u8,
    /// The minimum increase in rank between a node and its parent.
    pub min_hoprankinc: u16,
    /// The DODAGs of this instance.
    pub dags: Vec<Dodag>,
}

/// The complete read-only view of the routing subsystem's state.
#[derive(Debug, Clone, Default)]
pub struct RplState {
    /// The instance table.
    pub instances: Vec<RplInstance>,
    /// The routing table.
    pub routes: RoutingTable,
    /// The preferred link-local address of the local interface.
    pub link_local: Option<Ipv6Addr>,
    /// The preferred global address of the local interface.
    pub global: Option<Ipv6Addr>,
}

impl RplState {
    /// Get the used instance with the given instance id.
    pub fn instance(&self, instance_id: u8) -> Option<&RplInstance> {
        self.instances.iter().find(|i| i.used && i.instance_id == instance_id)
    }

    /// Get the instance and DODAG at the given table positions, when both are used.
    pub fn dodag_at(&self, instance: usize, dag: usize) -> Option<(&RplInstance, &Dodag)> {
        let inst = self.instances.get(instance).filter(|i| i.used)?;
        let dodag = inst.dags.get(dag).filter(|d| d.used)?;
        Some((inst, dodag))
    }
}
