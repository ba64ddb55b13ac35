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

//! The mapping engine.
//!
//! A state machine with two states. In `Idle` it waits for the round timer. When the round timer
//! fires, the detector analyses the round that just finished, the timestamp advances, the engine
//! rotates to the next used (instance, DODAG) pair, reseeds the root's neighbor list, and enters
//! `Mapping`. While `Mapping`, every host-timer tick polls at most one descendant: the cursor
//! walks the routing table, skips unused slots and recently heard nodes, and emits one mapping
//! request. When the cursor reaches the table bound the round is over and the engine is `Idle`
//! again.
//!
//! Replies are accepted only while the round's `(instance, dag, version, timestamp)` tuple still
//! matches, so late replies from an earlier round fall through the timestamp check and are
//! dropped. There are no retries; a node that does not answer simply keeps a stale timestamp and
//! is picked up again in the next round.

use crate::addr::compress;
use crate::detector::{self, DetectionReport};
use crate::graph::{Neighbor, NetworkGraph, NodeIndex, NETWORK_DENSITY, NETWORK_NODES};
use crate::rpl::RplState;
use crate::wire::{DecodeError, MappingReply, MappingRequest};
use log::*;
use std::net::Ipv6Addr;
use std::time::Duration;
use thiserror::Error;

/// Time between two mapping rounds.
pub const ROUND_INTERVAL: Duration = Duration::from_secs(120);

/// Acceptably old information, in rounds. A node heard within this window is not polled again.
pub const RECENT_WINDOW: u8 = 1;

/// Spacing between two mapping requests within a round, such that a full round fits into the
/// round interval.
pub fn host_interval(round_interval: Duration) -> Duration {
    round_interval / NETWORK_NODES as u32
}

/// Wrap-aware staleness test for the 8-bit round timestamp.
///
/// A timestamp is outdated when it lies more than `margin` rounds behind `current`, in modular
/// arithmetic. Timestamps ahead of `current` ("from the future") wrap into large differences and
/// are treated as outdated as well.
pub fn timestamp_outdated(current: u8, ts: u8, margin: u8) -> bool {
    let diff = current.wrapping_sub(ts);
    diff > margin || diff > 127
}

/// The two states of the mapping engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting for the round timer.
    Idle,
    /// Walking the routing table, one request per host-timer tick.
    Mapping,
}

/// Reasons for silently dropping a mapping reply. Logged at debug level, never fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyDrop {
    /// The sender's source address does not compress to the id claimed in the payload.
    #[error("source address compresses to {actual:#06x} but the payload claims {claimed:#06x}")]
    SourceMismatch {
        /// Id claimed inside the payload.
        claimed: u16,
        /// Compression of the datagram's source address.
        actual: u16,
    },
    /// The reply names another RPL instance than the one being mapped.
    #[error("reply for instance {got} while mapping instance {expected}")]
    WrongInstance {
        /// Instance named by the reply.
        got: u8,
        /// Instance currently being mapped.
        expected: u8,
    },
    /// The reply names another DODAG than the one being mapped.
    #[error("reply for DODAG {got:#06x} while mapping {expected:#06x}")]
    WrongDag {
        /// DODAG named by the reply.
        got: u16,
        /// DODAG currently being mapped.
        expected: u16,
    },
    /// The reply names another DODAG version than the current one.
    #[error("reply for DODAG version {got} while expecting {expected}")]
    WrongVersion {
        /// Version named by the reply.
        got: u8,
        /// Version the routing subsystem currently sees.
        expected: u8,
    },
    /// The reply echoes a timestamp outside the current round.
    #[error("reply timestamped {got} in round {expected}")]
    WrongTimestamp {
        /// Timestamp echoed by the reply.
        got: u8,
        /// Timestamp of the current round.
        expected: u8,
    },
    /// No routing table entry matches the sender, so no node can be allocated for it.
    #[error("no routing table entry for id {0:#06x}")]
    UnknownNode(u16),
    /// A reply arrived before the first round started.
    #[error("no mapping round is active")]
    NoActiveRound,
    /// The payload does not parse as a mapping reply.
    #[error("malformed reply: {0}")]
    Malformed(#[from] DecodeError),
}

/// Result of a round-timer boundary.
#[derive(Debug)]
pub enum RoundOutcome {
    /// A new round was started.
    Started {
        /// Findings of the detector over the round that just completed. `None` after the very
        /// first round, which only seeds the graph.
        report: Option<DetectionReport>,
    },
    /// No used (instance, DODAG) pair exists; the engine stays idle until the next round timer.
    Skipped,
}

/// One host-timer tick while mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTick {
    /// The request to send, if a pollable descendant was found at the cursor.
    pub request: Option<(Ipv6Addr, MappingRequest)>,
    /// Set when the cursor wrapped: the round is complete and the engine is idle again.
    pub round_complete: bool,
}

/// The mapping state machine. Owns the round state; the graph and the RPL view are borrowed per
/// call so tests can drive independent instances.
#[derive(Debug)]
pub struct MappingEngine {
    state: EngineState,
    /// Monotonic round timestamp, wrapping at 256.
    timestamp: u8,
    /// Position of the currently mapped pair in the instance/DODAG tables.
    instance_cursor: usize,
    dag_cursor: usize,
    /// Set once a round has started; `None` before the first round.
    current: Option<CurrentDodag>,
    /// Cursor into the routing table while mapping.
    working_host: usize,
    /// Deferred-detector flag: the first round only seeds the graph.
    init: bool,
}

#[derive(Debug, Clone, Copy)]
struct CurrentDodag {
    instance: usize,
    dag: usize,
    instance_id: u8,
    dag_id: u16,
}

impl Default for MappingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingEngine {
    /// Create an idle engine. The first round starts with timestamp 1.
    pub fn new() -> Self {
        Self {
            state: EngineState::Idle,
            timestamp: 0,
            instance_cursor: 0,
            dag_cursor: 0,
            current: None,
            working_host: 0,
            init: true,
        }
    }

    /// The current state of the engine.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The timestamp of the current round.
    pub fn timestamp(&self) -> u8 {
        self.timestamp
    }

    /// The instance id currently being mapped, once a round has started.
    pub fn current_instance_id(&self) -> Option<u8> {
        self.current.map(|c| c.instance_id)
    }

    /// Round-timer boundary: analyse the finished round, advance the epoch, start the next round.
    ///
    /// Runs the detector over the graph as it stands (unless this is the first round), increments
    /// the timestamp, rotates to the next used (instance, DODAG) pair, rebuilds the root's
    /// neighbor list, and enters `Mapping`.
    pub fn begin_round(&mut self, graph: &mut NetworkGraph, rpl: &RplState) -> RoundOutcome {
        if self.state == EngineState::Mapping {
            // the host pacing does not fit into the round interval
            warn!("round boundary reached while the previous round is still mapping");
            return RoundOutcome::Skipped;
        }
        let (instance, dag) = match self.next_dodag(rpl) {
            Some(pair) => pair,
            None => {
                warn!("no used RPL instance/DODAG pair, skipping this mapping round");
                return RoundOutcome::Skipped;
            }
        };

        // analyse the round that just finished, against the instance it was mapped under
        let report = if self.init {
            None
        } else {
            let min_hoprankinc = self
                .current
                .and_then(|c| rpl.dodag_at(c.instance, c.dag))
                .map(|(inst, _)| inst.min_hoprankinc);
            min_hoprankinc.map(|m| detector::run(graph, self.timestamp, m))
        };
        self.init = false;

        // the overflow is fine, the timestamp is modular by design
        self.timestamp = self.timestamp.wrapping_add(1);

        self.instance_cursor = instance;
        self.dag_cursor = dag;
        let (inst, dodag) = match rpl.dodag_at(instance, dag) {
            Some(found) => found,
            None => unreachable!("next_dodag only returns used pairs"),
        };
        self.current = Some(CurrentDodag {
            instance,
            dag,
            instance_id: inst.instance_id,
            dag_id: compress(dodag.dag_id),
        });

        // reseed the root for the new epoch
        let min_hoprankinc = inst.min_hoprankinc;
        graph.reset_root_neighbors(&rpl.routes);
        let timestamp = self.timestamp;
        let root = graph.root_mut();
        root.rank = min_hoprankinc;
        root.parent = None;
        root.parent_index = None;
        root.timestamp = timestamp;

        self.working_host = 0;
        self.state = EngineState::Mapping;
        debug!(
            "round {} maps instance {} DODAG {:#06x}",
            self.timestamp,
            inst.instance_id,
            compress(dodag.dag_id)
        );
        RoundOutcome::Started { report }
    }

    /// Find the next used (instance, DODAG) pair, starting one slot past the current pair and
    /// wrapping over both tables. With a single used pair the search returns that same pair again.
    fn next_dodag(&self, rpl: &RplState) -> Option<(usize, usize)> {
        let n_instances = rpl.instances.len();
        if n_instances == 0 {
            return None;
        }
        let max_dags = rpl.instances.iter().map(|i| i.dags.len()).max().unwrap_or(0);
        if max_dags == 0 {
            return None;
        }

        let mut instance = self.instance_cursor;
        let mut dag = self.dag_cursor + 1;
        for _ in 0..=n_instances * max_dags {
            if dag >= max_dags {
                dag = 0;
                instance = (instance + 1) % n_instances;
            }
            if rpl.dodag_at(instance, dag).is_some() {
                return Some((instance, dag));
            }
            dag += 1;
        }
        None
    }

    /// One host-timer tick: poll at most one descendant.
    ///
    /// Walks the routing table cursor past unused slots and nodes heard within the recency
    /// window, emits a request for the first pollable candidate, and reports completion when the
    /// cursor reaches the table bound.
    pub fn map_tick(&mut self, graph: &mut NetworkGraph, rpl: &RplState) -> MapTick {
        if self.state != EngineState::Mapping {
            return MapTick { request: None, round_complete: false };
        }
        let current = match self.current {
            Some(c) => c,
            None => return MapTick { request: None, round_complete: false },
        };

        let bound = rpl.routes.len();
        let mut request = None;
        while self.working_host < bound {
            let entry = match rpl.routes.get(self.working_host) {
                Some(e) if e.isused => e,
                _ => {
                    self.working_host += 1;
                    continue;
                }
            };
            // make sure the destination has a graph slot, even before it ever answers
            let node = graph.upsert(compress(entry.ipaddr), &rpl.routes);
            let node = match node.and_then(|idx| graph.node(idx)) {
                Some(n) => n,
                None => {
                    self.working_host += 1;
                    continue;
                }
            };
            if self.recently_heard(node.timestamp()) {
                self.working_host += 1;
                continue;
            }
            debug!("polling host {:2} {}", self.working_host, entry.ipaddr);
            request = Some((
                entry.ipaddr,
                MappingRequest {
                    instance_id: current.instance_id,
                    dag_id: current.dag_id,
                    dag_version: self.dag_version(rpl).unwrap_or(0),
                    timestamp: self.timestamp,
                },
            ));
            break;
        }

        self.working_host += 1;
        let round_complete = self.working_host >= bound;
        if round_complete {
            self.working_host = 0;
            self.state = EngineState::Idle;
            debug!("mapping round {} complete", self.timestamp);
        }
        MapTick { request, round_complete }
    }

    /// A node heard within the recency window is not polled again this round. A timestamp of 0
    /// means the node was never heard and is always eligible.
    fn recently_heard(&self, node_timestamp: u8) -> bool {
        node_timestamp != 0 && !timestamp_outdated(self.timestamp, node_timestamp, RECENT_WINDOW)
    }

    fn dag_version(&self, rpl: &RplState) -> Option<u8> {
        let current = self.current?;
        rpl.dodag_at(current.instance, current.dag).map(|(_, d)| d.version)
    }

    /// Ingest a mapping reply received from `src_addr`.
    ///
    /// The reply is validated against the current round epoch before anything touches the graph:
    /// the sender's address must compress to the claimed source id, and instance, DODAG, DODAG
    /// version and timestamp must all match the round. On acceptance the sender and its parent are
    /// upserted and rank, parent and up to [`NETWORK_DENSITY`] neighbor observations are copied
    /// into the graph.
    pub fn handle_reply(
        &mut self,
        src_addr: Ipv6Addr,
        payload: &[u8],
        graph: &mut NetworkGraph,
        rpl: &RplState,
    ) -> Result<NodeIndex, ReplyDrop> {
        let reply = MappingReply::decode(payload)?;
        let current = self.current.ok_or(ReplyDrop::NoActiveRound)?;

        let actual = compress(src_addr);
        if actual != reply.src {
            return Err(ReplyDrop::SourceMismatch { claimed: reply.src, actual });
        }
        if reply.instance_id != current.instance_id {
            return Err(ReplyDrop::WrongInstance {
                got: reply.instance_id,
                expected: current.instance_id,
            });
        }
        if reply.dag_id != current.dag_id {
            return Err(ReplyDrop::WrongDag { got: reply.dag_id, expected: current.dag_id });
        }
        let version = self.dag_version(rpl).unwrap_or(0);
        if reply.dag_version != version {
            return Err(ReplyDrop::WrongVersion { got: reply.dag_version, expected: version });
        }
        if reply.timestamp != self.timestamp {
            return Err(ReplyDrop::WrongTimestamp { got: reply.timestamp, expected: self.timestamp });
        }

        let node = graph.upsert(reply.src, &rpl.routes).ok_or(ReplyDrop::UnknownNode(reply.src))?;

        // the parent and the neighbors may fail to allocate individually; whatever could be
        // resolved still enters the graph and the detector reports the rest as missing
        let parent = graph.upsert(reply.parent, &rpl.routes);
        let mut neighbors = Vec::with_capacity(reply.neighbors.len().min(NETWORK_DENSITY));
        let mut parent_index = None;
        for (i, observation) in reply.neighbors.iter().take(NETWORK_DENSITY).enumerate() {
            neighbors.push(Neighbor {
                node: graph.upsert(observation.id, &rpl.routes),
                rank: observation.rank,
            });
            if observation.id == reply.parent {
                parent_index = Some(i);
            }
        }

        let timestamp = self.timestamp;
        let entry = match graph.node_mut(node) {
            Some(e) => e,
            None => return Err(ReplyDrop::UnknownNode(reply.src)),
        };
        entry.rank = reply.rank;
        entry.neighbors = neighbors;
        entry.parent_index = parent_index;
        match parent {
            Some(parent) => {
                entry.parent = Some(parent);
                entry.timestamp = timestamp;
            }
            None => {
                // without a parent slot the record stays stale so that a fresh timestamp always
                // implies a resolvable parent
                debug!("parent {:#06x} of {:#06x} has no graph slot", reply.parent, reply.src);
            }
        }
        Ok(node)
    }
}
