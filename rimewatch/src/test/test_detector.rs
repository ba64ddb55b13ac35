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
use crate::detector::run;
use crate::graph::{Neighbor, NetworkGraph, NodeIndex};
use crate::rpl::RoutingTable;

/// Build a graph holding the root (id 1) and the given descendants, all routable.
fn network(ids: &[u16]) -> (NetworkGraph, RoutingTable) {
    let routes = routing_table(&ids.iter().map(|&id| (id, id)).collect::<Vec<_>>());
    let mut graph = NetworkGraph::new(node_addr(1));
    for &id in ids {
        graph.upsert(id, &routes).unwrap();
    }
    (graph, routes)
}

/// Overwrite a node record with the given observations, resolving ids through the graph.
fn set_node(
    graph: &mut NetworkGraph,
    id: u16,
    timestamp: u8,
    rank: u16,
    parent: Option<u16>,
    neighbors: &[(u16, u16)],
) {
    let slots: Vec<Neighbor> = neighbors
        .iter()
        .map(|&(nid, rank)| Neighbor { node: graph.find(nid), rank })
        .collect();
    let parent_node = parent.and_then(|p| graph.find(p));
    let parent_slot = parent.and_then(|p| neighbors.iter().position(|&(nid, _)| nid == p));
    let idx = graph.find(id).unwrap();
    let node = graph.node_mut(idx).unwrap();
    node.timestamp = timestamp;
    node.rank = rank;
    node.parent = parent_node;
    node.parent_index = parent_slot;
    node.neighbors = slots;
}

fn idx(graph: &NetworkGraph, id: u16) -> NodeIndex {
    graph.find(id).unwrap()
}

#[test]
fn a_single_mismatch_only_counts_against_both_parties() {
    let (mut graph, _) = network(&[2, 3]);
    set_node(&mut graph, 1, 1, 256, None, &[(2, 0), (3, 0)]);
    // node 2 claims node 3 has rank 300, node 3 claims 900: off by more than 20%
    set_node(&mut graph, 2, 1, 512, Some(1), &[(1, 256), (3, 300)]);
    set_node(&mut graph, 3, 1, 900, Some(1), &[(1, 256)]);

    let report = run(&mut graph, 1, 256);

    assert_eq!(graph.node(idx(&graph, 2)).unwrap().visited, 1);
    assert_eq!(graph.node(idx(&graph, 3)).unwrap().visited, 1);
    // below the threshold: no correction, no flags, no verdict
    assert!(report.rank_liars.is_empty());
    assert!(report.announced.is_empty());
    assert!(report.missing.is_empty());
    assert_eq!(graph.node(idx(&graph, 3)).unwrap().rank(), 900);
    assert_eq!(graph.node(idx(&graph, 3)).unwrap().status(), Default::default());
}

#[test]
fn a_node_tallied_past_the_threshold_is_corrected() {
    let (mut graph, _) = network(&[2, 3, 4, 5]);
    set_node(&mut graph, 1, 1, 256, None, &[(2, 0), (4, 0), (5, 0)]);
    // three observers claim node 3 has rank 300 while it claims 900
    set_node(&mut graph, 2, 1, 512, Some(1), &[(1, 256), (3, 300)]);
    set_node(&mut graph, 4, 1, 512, Some(1), &[(1, 256), (3, 300)]);
    set_node(&mut graph, 5, 1, 512, Some(1), &[(1, 256), (3, 300)]);
    // the liar hangs off the root and has node 2 in its list, with a nearly-consistent claim
    set_node(&mut graph, 3, 1, 900, Some(1), &[(1, 256), (2, 510)]);

    let report = run(&mut graph, 1, 16);

    let liar = idx(&graph, 3);
    assert_eq!(report.rank_liars, vec![liar]);
    assert!(report.uncorrectable.is_empty());
    let node = graph.node(liar).unwrap();
    // the rank was repaired with a trusted observation, the claims with self-reported ranks
    assert_eq!(node.rank(), 300);
    assert_eq!(node.neighbors()[0].rank, 256);
    assert_eq!(node.neighbors()[1].rank, 512);
    assert!(node.status().rank_error);
    assert!(!node.status().relative_error);
    // a single check does not make a verdict
    assert!(report.announced.is_empty());
    // the observers stay trusted
    assert!(!graph.node(idx(&graph, 2)).unwrap().status().rank_error);
}

#[test]
fn an_uncorrectable_liar_keeps_its_rank() {
    let (mut graph, _) = network(&[2, 3, 4, 5]);
    set_node(&mut graph, 1, 1, 256, None, &[]);
    set_node(&mut graph, 2, 1, 512, Some(1), &[(1, 256), (3, 300)]);
    set_node(&mut graph, 4, 1, 512, Some(1), &[(1, 256), (3, 300)]);
    set_node(&mut graph, 5, 1, 512, Some(1), &[(1, 256), (3, 300)]);
    // the liar reports no neighbors at all, so nobody in its list can vouch for its rank
    set_node(&mut graph, 3, 1, 900, Some(1), &[]);

    let report = run(&mut graph, 1, 16);

    let liar = idx(&graph, 3);
    assert_eq!(report.rank_liars, vec![liar]);
    assert_eq!(report.uncorrectable, vec![liar]);
    let node = graph.node(liar).unwrap();
    assert_eq!(node.rank(), 900);
    assert!(node.status().rank_error, "the node is still flagged");
}

#[test]
fn a_rank_below_the_parents_allowance_flags_both() {
    let (mut graph, _) = network(&[2, 3]);
    set_node(&mut graph, 1, 1, 256, None, &[(3, 0)]);
    set_node(&mut graph, 3, 1, 768, Some(1), &[(1, 256), (2, 400)]);
    // node 2 hangs below node 3 but advertises a rank better than 300 + 256
    set_node(&mut graph, 2, 1, 400, Some(3), &[(3, 300)]);

    let report = run(&mut graph, 1, 256);

    assert!(graph.node(idx(&graph, 2)).unwrap().status().relative_error);
    assert!(graph.node(idx(&graph, 3)).unwrap().status().relative_error);
    assert!(!graph.node(idx(&graph, 2)).unwrap().status().rank_error);
    // one check alone does not announce anybody
    assert!(report.announced.is_empty());
}

#[test]
fn flags_decay_after_one_clean_round() {
    let (mut graph, _) = network(&[2, 3]);
    set_node(&mut graph, 1, 1, 256, None, &[(3, 0)]);
    set_node(&mut graph, 3, 1, 768, Some(1), &[(1, 256), (2, 400)]);
    set_node(&mut graph, 2, 1, 400, Some(3), &[(3, 300)]);
    run(&mut graph, 1, 256);
    assert!(graph.node(idx(&graph, 2)).unwrap().status().relative_error);

    // next round, the same node behaves: everything is forgiven
    set_node(&mut graph, 1, 2, 256, None, &[(3, 0)]);
    set_node(&mut graph, 3, 2, 768, Some(1), &[(1, 256), (2, 1024)]);
    set_node(&mut graph, 2, 2, 1024, Some(3), &[(3, 768)]);
    let report = run(&mut graph, 2, 256);

    assert_eq!(graph.node(idx(&graph, 2)).unwrap().status(), Default::default());
    assert_eq!(graph.node(idx(&graph, 3)).unwrap().status(), Default::default());
    assert!(report.announced.is_empty());
}

#[test]
fn only_a_node_failing_both_checks_is_announced() {
    let (mut graph, _) = network(&[2, 3, 4, 5]);
    set_node(&mut graph, 1, 1, 256, None, &[(2, 0), (4, 0), (5, 0)]);
    set_node(&mut graph, 2, 1, 512, Some(1), &[(1, 256), (3, 300)]);
    set_node(&mut graph, 4, 1, 512, Some(1), &[(1, 256), (3, 300)]);
    set_node(&mut graph, 5, 1, 512, Some(1), &[(1, 256), (3, 300)]);
    // node 3 lies about its rank, and its repaired rank undercuts its parent's allowance
    set_node(&mut graph, 3, 1, 900, Some(2), &[(2, 510)]);

    let report = run(&mut graph, 1, 256);

    let liar = idx(&graph, 3);
    let node = graph.node(liar).unwrap();
    assert!(node.status().rank_error && node.status().relative_error);
    assert_eq!(report.announced, vec![liar]);
    // the parent was dragged into the relative check but never lied about ranks
    let parent = graph.node(idx(&graph, 2)).unwrap();
    assert!(parent.status().relative_error && !parent.status().rank_error);
}

#[test]
fn silent_and_stale_nodes_are_reported_missing() {
    let (mut graph, _) = network(&[2, 3, 4, 5]);
    set_node(&mut graph, 1, 5, 256, None, &[]);
    // never answered
    set_node(&mut graph, 2, 0, 0, None, &[]);
    // answered three rounds ago, outside twice the recency window
    set_node(&mut graph, 3, 2, 512, Some(1), &[(1, 256)]);
    // fresh
    set_node(&mut graph, 4, 4, 512, Some(1), &[(1, 256)]);
    // claims to come from the future
    set_node(&mut graph, 5, 7, 512, Some(1), &[(1, 256)]);

    let report = run(&mut graph, 5, 256);

    let missing: Vec<u16> =
        report.missing.iter().map(|i| graph.node(*i).unwrap().id()).collect();
    assert_eq!(missing, vec![0x0002, 0x0003, 0x0005]);
}
