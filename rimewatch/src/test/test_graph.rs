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

use super::util::*;
use crate::graph::{NetworkGraph, NodeIndex, NETWORK_NODES};
use rand::prelude::*;
use std::collections::HashSet;

#[test]
fn the_root_occupies_slot_zero() {
    let graph = NetworkGraph::new(node_addr(1));
    assert_eq!(graph.len(), 1);
    assert_eq!(graph.find(0x0001), Some(NodeIndex::ROOT));
    assert_eq!(graph.root().id(), 0x0001);
    assert_eq!(graph.root().addr(), node_addr(1));
}

#[test]
fn upsert_is_idempotent() {
    let routes = routing_table(&[(2, 2), (3, 2)]);
    let mut graph = NetworkGraph::new(node_addr(1));

    let first = graph.upsert(0x0002, &routes).unwrap();
    let second = graph.upsert(0x0002, &routes).unwrap();
    assert_eq!(first, second);
    assert_eq!(graph.len(), 2);
    assert_eq!(graph.node(first).unwrap().addr(), node_addr(2));

    // upserting the root's own id returns the root
    assert_eq!(graph.upsert(0x0001, &routes), Some(NodeIndex::ROOT));
}

#[test]
fn upsert_keeps_short_ids_unique() {
    // any sequence of upserts over a fixed id population keeps ids unique and idempotent
    let population: Vec<u16> = (2..8).collect();
    let routes = routing_table(&population.iter().map(|&id| (id, 2)).collect::<Vec<_>>());
    let mut rng = StdRng::seed_from_u64(0x1da5);

    let mut graph = NetworkGraph::new(node_addr(1));
    let mut expected: std::collections::HashMap<u16, NodeIndex> = Default::default();
    for _ in 0..200 {
        let id = *population.choose(&mut rng).unwrap();
        let idx = graph.upsert(id, &routes).unwrap();
        assert_eq!(*expected.entry(id).or_insert(idx), idx);
    }

    let ids: Vec<u16> = graph.iter().map(|(_, n)| n.id()).collect();
    let unique: HashSet<u16> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert!(graph.len() <= NETWORK_NODES);
}

#[test]
fn upsert_fails_without_a_routing_entry() {
    let routes = routing_table(&[(2, 2)]);
    let mut graph = NetworkGraph::new(node_addr(1));
    assert_eq!(graph.upsert(0x0009, &routes), None);
    assert_eq!(graph.len(), 1);

    // a removed route no longer backs new nodes
    let mut routes = routes;
    routes.remove(node_addr(2));
    assert_eq!(graph.upsert(0x0002, &routes), None);
}

#[test]
fn upsert_fails_when_the_arena_is_full() {
    let entries: Vec<(u16, u16)> = (2..2 + NETWORK_NODES as u16).map(|id| (id, 2)).collect();
    let routes = routing_table(&entries);
    let mut graph = NetworkGraph::new(node_addr(1));

    // the root occupies one slot, so one destination does not fit
    for id in 2..2 + (NETWORK_NODES as u16 - 1) {
        assert!(graph.upsert(id, &routes).is_some(), "node {} should fit", id);
    }
    assert_eq!(graph.upsert(2 + NETWORK_NODES as u16 - 1, &routes), None);
    assert_eq!(graph.len(), NETWORK_NODES);
}

#[test]
fn reset_root_neighbors_collects_direct_neighbors() {
    // 2 and 4 are direct link neighbors, 3 is routed via 2
    let routes = routing_table(&[(2, 2), (3, 2), (4, 4)]);
    let mut graph = NetworkGraph::new(node_addr(1));

    graph.reset_root_neighbors(&routes);
    let root = graph.root();
    assert_eq!(root.neighbors().len(), 2);
    let ids: Vec<u16> = root
        .neighbors()
        .iter()
        .map(|n| graph.node(n.node.unwrap()).unwrap().id())
        .collect();
    assert_eq!(ids, vec![0x0002, 0x0004]);
    assert!(root.neighbors().iter().all(|n| n.rank == 0));

    // resetting again does not accumulate duplicates
    graph.reset_root_neighbors(&routes);
    assert_eq!(graph.root().neighbors().len(), 2);
}
