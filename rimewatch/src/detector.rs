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

//! The intrusion detection rules, run once per round over the network graph.
//!
//! Three checks run in sequence:
//!
//! 1. **Rank consistency.** Every pair of mutual observations is compared: the rank a node claims
//!    for a neighbor against the rank that neighbor claims for itself. Deviations above 20% of
//!    the average count against both parties; a node tallied past
//!    [`INCONSISTENCY_THRESHOLD`] is deemed lying, its rank is repaired from a trusted neighbor's
//!    observation, and its own claims about unflagged neighbors are replaced by their
//!    self-reported ranks.
//!
//! 2. **Child-parent relation.** A node advertising a rank below its reported parent's rank plus
//!    the instance's minimum hop increment claims a position in the DODAG its parent does not
//!    allow; the node and the parent are both marked.
//!
//! 3. **Missing info.** Nodes that never answered, or whose last answer is older than twice the
//!    recency window, are reported as having stale or missing data.
//!
//! After each of the first two checks, the temporary marks decay into the check's saved flag:
//! a node marked this round keeps the saved flag, a node that did not re-offend loses it. This
//! gates one-off misreads out; only a node holding both saved flags at once is announced to the
//! operator as advertising incorrect routes.

use crate::graph::{NetworkGraph, Node, NodeIndex};
use crate::mapper::{timestamp_outdated, RECENT_WINDOW};
use itertools::Itertools;
use log::*;

/// Number of rank-observation mismatches a node may accumulate per round before it is deemed
/// lying about ranks.
pub const INCONSISTENCY_THRESHOLD: u8 = 2;

/// The findings of one detector pass, for the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionReport {
    /// Nodes tallied past the inconsistency threshold this round.
    pub rank_liars: Vec<NodeIndex>,
    /// Rank liars for which no trusted neighbor observation was available to repair the rank.
    pub uncorrectable: Vec<NodeIndex>,
    /// Nodes holding both saved error flags, announced as advertising incorrect routes.
    pub announced: Vec<NodeIndex>,
    /// Nodes with stale or missing data.
    pub missing: Vec<NodeIndex>,
}

impl DetectionReport {
    /// Returns `true` when the pass found nothing to report.
    pub fn is_clean(&self) -> bool {
        self.rank_liars.is_empty() && self.announced.is_empty() && self.missing.is_empty()
    }
}

/// A node only takes part in the analysis while its data is fresh enough.
fn valid_node(node: &Node, current: u8) -> bool {
    node.timestamp() != 0 && !timestamp_outdated(current, node.timestamp(), 2 * RECENT_WINDOW)
}

/// Run all detection rules over the graph.
///
/// `current` is the timestamp of the round being analysed and `min_hoprankinc` the minimum
/// hop-rank increment of the instance that round was mapped under. Apart from the flag decay,
/// which depends on the previous round's flags, the result is a pure function of the graph.
pub fn run(graph: &mut NetworkGraph, current: u8, min_hoprankinc: u16) -> DetectionReport {
    let mut report = DetectionReport::default();
    rank_consistency(graph, current, &mut report);
    decay_rank_flags(graph);
    child_parent_relation(graph, current, min_hoprankinc);
    decay_relative_flags(graph);
    collect_verdicts(graph, current, &mut report);
    missing_info(graph, current, &mut report);
    report
}

/// Compare every mutual rank observation and repair the claims of nodes tallied past the
/// threshold.
fn rank_consistency(graph: &mut NetworkGraph, current: u8, report: &mut DetectionReport) {
    // the visited counters tally the mismatches of this round
    graph.clear_visited();

    // A node lying about its own rank towards the root is of no concern here: the rank it
    // advertises to the root is exactly the rank the root records for it, so the two views can
    // never disagree. The root is therefore excluded on both sides of the comparison.
    let mut mismatches: Vec<(NodeIndex, NodeIndex)> = Vec::new();
    for (idx, node) in graph.iter() {
        if idx == NodeIndex::ROOT || !valid_node(node, current) {
            continue;
        }
        for neighbor in node.neighbors() {
            let other_idx = match neighbor.node {
                Some(n) if n != NodeIndex::ROOT => n,
                _ => continue,
            };
            let other = match graph.node(other_idx) {
                Some(o) if valid_node(o, current) => o,
                _ => continue,
            };
            let claimed = neighbor.rank as u32;
            let own = other.rank() as u32;
            let diff = if own > claimed { own - claimed } else { claimed - own };
            // deviations above 20% of the average rank: (r1 + r2) / 2 * 0.2 = (r1 + r2) / 10
            if diff > (claimed + own) / 10 {
                debug!(
                    "node {:#06x} claims node {:#06x} has rank {}, while it claims {}",
                    node.id(),
                    other.id(),
                    claimed,
                    own
                );
                mismatches.push((idx, other_idx));
            }
        }
    }
    for (observer, observed) in mismatches {
        tally(graph, observer);
        tally(graph, observed);
    }

    let liars = graph
        .indices()
        .filter(|idx| graph.node(*idx).map(|n| n.visited > INCONSISTENCY_THRESHOLD) == Some(true))
        .collect_vec();
    for idx in liars {
        if let Some(node) = graph.node_mut(idx) {
            node.status.temp = true;
        }
        report.rank_liars.push(idx);
        repair_rank(graph, idx, report);
    }
}

fn tally(graph: &mut NetworkGraph, idx: NodeIndex) {
    if let Some(node) = graph.node_mut(idx) {
        node.visited = node.visited.saturating_add(1);
    }
}

/// Overwrite a lying node's rank with a trusted neighbor's observation of it, and its neighbor
/// claims with the self-reported ranks of every neighbor that was not flagged itself.
fn repair_rank(graph: &mut NetworkGraph, idx: NodeIndex, report: &mut DetectionReport) {
    let (node_id, neighbors) = match graph.node(idx) {
        Some(n) => (n.id(), n.neighbors().to_vec()),
        None => return,
    };

    let mut observed: Option<(u16, u16)> = None;
    for neighbor in &neighbors {
        let observer_idx = match neighbor.node {
            Some(n) => n,
            None => continue,
        };
        let observer = match graph.node(observer_idx) {
            Some(o) => o,
            None => continue,
        };
        if let Some(observation) = observer.neighbors().iter().find(|o| o.node == Some(idx)) {
            observed = Some((observation.rank, observer.id()));
        }
    }

    let (rank, observer_id) = match observed {
        Some(found) => found,
        None => {
            debug!("could not correct the ranks of node {:#06x}", node_id);
            report.uncorrectable.push(idx);
            return;
        }
    };
    debug!("updating node {:#06x} with information from node {:#06x}", node_id, observer_id);

    // replace the untrusted claims, slot by slot, with what the trusted neighbors say themselves
    let replacements = neighbors
        .iter()
        .enumerate()
        .filter_map(|(slot, neighbor)| {
            let other = graph.node(neighbor.node?)?;
            (other.visited <= INCONSISTENCY_THRESHOLD).then(|| (slot, other.rank()))
        })
        .collect_vec();

    if let Some(node) = graph.node_mut(idx) {
        node.rank = rank;
        for (slot, trusted_rank) in replacements {
            node.neighbors[slot].rank = trusted_rank;
        }
        debug!("new rank of node {:#06x}: {}", node_id, rank);
    }
}

/// Mark every fresh node whose advertised rank undercuts what its own parent report allows.
fn child_parent_relation(graph: &mut NetworkGraph, current: u8, min_hoprankinc: u16) {
    let mut offenders: Vec<(NodeIndex, Option<NodeIndex>)> = Vec::new();
    for (idx, node) in graph.iter() {
        if idx == NodeIndex::ROOT || !valid_node(node, current) {
            continue;
        }
        let parent = match node.parent_index().and_then(|slot| node.neighbors().get(slot)) {
            Some(p) => p,
            None => continue,
        };
        if (node.rank() as u32) < parent.rank as u32 + min_hoprankinc as u32 {
            debug!(
                "node {:#06x} advertises rank {} below its parent's {} + {}",
                node.id(),
                node.rank(),
                parent.rank,
                min_hoprankinc
            );
            offenders.push((idx, parent.node));
        }
    }
    for (idx, parent) in offenders {
        if let Some(node) = graph.node_mut(idx) {
            node.status.temp = true;
        }
        if let Some(parent) = parent.and_then(|p| graph.node_mut(p)) {
            parent.status.temp = true;
        }
    }
}

/// Promote this round's temporary marks into the rank-error flag; clear the flag of every node
/// that did not re-offend.
fn decay_rank_flags(graph: &mut NetworkGraph) {
    for idx in graph.indices().collect_vec() {
        if let Some(node) = graph.node_mut(idx) {
            node.status.rank_error = node.status.temp;
            node.status.temp = false;
        }
    }
}

/// Promote this round's temporary marks into the relative-error flag; clear the flag of every
/// node that did not re-offend.
fn decay_relative_flags(graph: &mut NetworkGraph) {
    for idx in graph.indices().collect_vec() {
        if let Some(node) = graph.node_mut(idx) {
            node.status.relative_error = node.status.temp;
            node.status.temp = false;
        }
    }
}

/// Announce every fresh node holding both saved flags at once.
fn collect_verdicts(graph: &NetworkGraph, current: u8, report: &mut DetectionReport) {
    for (idx, node) in graph.iter() {
        if valid_node(node, current) && node.status().is_malicious() {
            report.announced.push(idx);
        }
    }
}

/// Report every node that never answered or whose data has gone stale.
fn missing_info(graph: &NetworkGraph, current: u8, report: &mut DetectionReport) {
    for (idx, node) in graph.iter() {
        if !valid_node(node, current) {
            report.missing.push(idx);
        }
    }
}
