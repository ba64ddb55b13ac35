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

//! # Helper (printer) functions for the operator output
//! Module containing helper functions to get formatted strings and print the per-round network
//! graph snapshot and the detector findings.

use crate::detector::DetectionReport;
use crate::graph::{NetworkGraph, NodeIndex};
use itertools::Itertools;

/// Get a vector of strings representing the network graph as a forest of subtrees. Each node line
/// shows the timestamp of its last answer, the neighbor slot of its parent, its claimed rank, and
/// its claimed neighbor observations. Children are the neighbors that reported this node as their
/// parent. The root subtree comes first; nodes not reachable from the root follow as separate
/// subtrees.
pub fn graph_lines(graph: &NetworkGraph, timestamp: u8) -> Vec<String> {
    let mut lines = vec![format!("Network graph at timestamp {}:", timestamp), String::new()];
    let mut seen = vec![false; graph.len()];
    subtree_lines(graph, NodeIndex::ROOT, 0, &mut seen, &mut lines);
    for (i, idx) in graph.indices().enumerate() {
        if !seen[i] {
            subtree_lines(graph, idx, 0, &mut seen, &mut lines);
        }
    }
    lines.push("-----------------------".to_string());
    lines
}

fn subtree_lines(
    graph: &NetworkGraph,
    idx: NodeIndex,
    depth: usize,
    seen: &mut Vec<bool>,
    lines: &mut Vec<String>,
) {
    let node = match graph.node(idx) {
        Some(n) => n,
        None => return,
    };
    let indent = "  ".repeat(depth);
    if seen[idx.index()] {
        lines.push(format!("{}{}", indent, node.addr()));
        return;
    }
    seen[idx.index()] = true;

    let parent = match node.parent_index() {
        Some(slot) => format!("{:x}", slot),
        None => "-".to_string(),
    };
    let observations = node
        .neighbors()
        .iter()
        .map(|neighbor| {
            let addr = neighbor
                .node
                .and_then(|n| graph.node(n))
                .map(|n| n.addr().to_string())
                .unwrap_or_else(|| "?".to_string());
            format!("{} ({})", addr, neighbor.rank)
        })
        .join(", ");
    lines.push(format!(
        "{}{} (t: {}, p: {}, r: {})    {{{}}}",
        indent,
        node.addr(),
        node.timestamp(),
        parent,
        node.rank(),
        observations
    ));

    // recurse into the neighbors that name this node as their parent
    for neighbor in node.neighbors() {
        let child = match neighbor.node {
            Some(c) => c,
            None => continue,
        };
        if graph.node(child).map(|c| c.parent() == Some(idx)) == Some(true) {
            subtree_lines(graph, child, depth + 1, seen, lines);
        }
    }
}

/// Get the operator lines for a detection report: the confirmed route liars and the nodes with
/// stale or missing information. Empty when there is nothing to report.
pub fn report_lines(graph: &NetworkGraph, report: &DetectionReport) -> Vec<String> {
    let mut lines = Vec::new();
    if !report.announced.is_empty() {
        lines.push("The following nodes have advertised incorrect routes:".to_string());
        for idx in &report.announced {
            if let Some(node) = graph.node(*idx) {
                lines.push(format!("{} ({})", node.addr(), node.rank()));
            }
        }
    }
    if !report.missing.is_empty() {
        lines.push(
            "The following nodes have outdated or non-existent information:".to_string(),
        );
        for idx in &report.missing {
            if let Some(node) = graph.node(*idx) {
                lines.push(format!("{}", node.addr()));
            }
        }
    }
    lines
}

/// Print the graph snapshot to stdout.
pub fn print_graph(graph: &NetworkGraph, timestamp: u8) {
    for line in graph_lines(graph, timestamp) {
        println!("{}", line);
    }
}

/// Print the detection report to stdout.
pub fn print_report(graph: &NetworkGraph, report: &DetectionReport) {
    for line in report_lines(graph, report) {
        println!("{}", line);
    }
}
