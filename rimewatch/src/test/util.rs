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

//! Builders shared by the test modules. Addresses follow the convention of the managed network:
//! `aaaa::n` is the global address of node `n`, `fe80::n` its link-local address.

use crate::graph::NetworkGraph;
use crate::mapper::{EngineState, MapTick, MappingEngine, RoundOutcome};
use crate::rpl::{Dodag, RoutingTable, RplInstance, RplState};
use crate::wire::{MappingReply, MappingRequest, NeighborReport};
use std::net::Ipv6Addr;

/// The global address `aaaa::n`.
pub fn node_addr(n: u16) -> Ipv6Addr {
    Ipv6Addr::new(0xaaaa, 0, 0, 0, 0, 0, 0, n)
}

/// The link-local address `fe80::n`.
pub fn link_local(n: u16) -> Ipv6Addr {
    Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, n)
}

/// A routing table with one used entry per `(destination, next hop)` pair. A destination routed
/// via itself is a direct neighbor of the root.
pub fn routing_table(entries: &[(u16, u16)]) -> RoutingTable {
    let mut table = RoutingTable::new();
    for &(dest, via) in entries {
        assert!(table.add(node_addr(dest), link_local(via), 1));
    }
    table
}

/// An RPL view with a single instance 1 / DODAG pair rooted at node `root`.
pub fn rpl_state(root: u16, min_hoprankinc: u16, routes: RoutingTable) -> RplState {
    RplState {
        instances: vec![RplInstance {
            used: true,
            instance_id: 1,
            min_hoprankinc,
            dags: vec![Dodag {
                used: true,
                dag_id: node_addr(root),
                version: 1,
                rank: min_hoprankinc,
                parents: Vec::new(),
                preferred_parent: None,
            }],
        }],
        routes,
        link_local: Some(link_local(root)),
        global: Some(node_addr(root)),
    }
}

/// A well-formed reply to a round of instance 1 on the DODAG rooted at `dag_root`.
pub fn reply(
    src: u16,
    dag_root: u16,
    timestamp: u8,
    rank: u16,
    parent: u16,
    neighbors: &[(u16, u16)],
) -> MappingReply {
    MappingReply {
        src,
        instance_id: 1,
        dag_id: dag_root,
        dag_version: 1,
        timestamp,
        rank,
        parent,
        neighbors: neighbors.iter().map(|&(id, rank)| NeighborReport { id, rank }).collect(),
    }
}

/// Drive a full round: fire the round timer, then tick the host timer until the round completes.
/// Returns the emitted requests.
pub fn run_round(
    engine: &mut MappingEngine,
    graph: &mut NetworkGraph,
    rpl: &RplState,
) -> (RoundOutcome, Vec<(Ipv6Addr, MappingRequest)>) {
    let outcome = engine.begin_round(graph, rpl);
    let mut requests = Vec::new();
    while engine.state() == EngineState::Mapping {
        let MapTick { request, round_complete } = engine.map_tick(graph, rpl);
        requests.extend(request);
        if round_complete {
            break;
        }
    }
    (outcome, requests)
}
