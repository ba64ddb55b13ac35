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

#![deny(missing_docs)]

//! # Rimewatch
//!
//! This is a library implementing the root-side core of an intrusion detection system for
//! low-power IPv6 sensor networks routed by RPL. The root node periodically interrogates every
//! routable descendant, rebuilds the DODAG each node claims to see, and cross-checks the views to
//! find nodes that misreport their rank or parent. The root also acts as a distributed firewall
//! coordinator: sensor nodes report abusive external correspondents, and the root aggregates the
//! complaints into per-destination or network-wide packet filters.
//!
//! ## Structure
//!
//! This library is structured in the following way:
//!
//! - **[`addr`]**: Compression of IPv6 addresses into the 16-bit short identifiers used as node
//!   keys on the wire and in all tables, and the rewrite of link-local addresses into the managed
//!   global prefix.
//!
//! - **[`rpl`](rpl)**: An owned model of the state that the RPL routing subsystem exposes to the
//!   detector: the routing table, the instance table with its DODAGs and parent sets, and the
//!   interface addresses. The core only ever reads this state.
//!
//! - **[`graph`](graph)**: The network graph store, a fixed-capacity arena of [`Node`](graph::Node)
//!   records addressed by [`NodeIndex`](graph::NodeIndex). Slot 0 is the root itself. Nodes link to
//!   their parent and neighbors through indices, never through references, so the cyclic parent and
//!   neighbor relations need no shared ownership.
//!
//! - **[`wire`](wire)**: Fixed-layout little-endian codecs for the three datagram formats: the
//!   mapping request, the mapping reply, and the firewall-install request.
//!
//! - **[`mapper`](mapper)**: The [`MappingEngine`](mapper::MappingEngine), a state machine which
//!   polls one descendant per host-timer tick, validates incoming replies against the current round
//!   epoch, and writes accepted observations into the graph.
//!
//! - **[`detector`](detector)**: The per-round analysis: mutual rank-observation consistency,
//!   child-parent rank relation, flag decay with repeat-offender gating, and the missing-info
//!   sweep. Produces a [`DetectionReport`](detector::DetectionReport) for the operator.
//!
//! - **[`firewall`](firewall)**: The [`FilterSet`](firewall::FilterSet) holding the global filter
//!   ring and the per-destination small filter table, the classification of incoming filter-install
//!   requests, and the per-packet datapath predicate.
//!
//! - **[`printer`](printer)**: Helper functions formatting the operator output: the per-round graph
//!   snapshot and the detector verdict lists.

// test modules
mod test;

pub mod addr;
pub mod detector;
mod error;
pub mod firewall;
pub mod graph;
pub mod mapper;
pub mod printer;
pub mod rpl;
pub mod wire;

pub use error::Error;
