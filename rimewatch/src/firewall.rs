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

//! The distributed firewall tables of the root.
//!
//! Sensors complain to the root about abusive external correspondents. A first complaint becomes a
//! *small* filter, scoped to the complaining sensor. When a second sensor complains about the same
//! external source, the source is evidently not a one-node problem: the small filter is *promoted*
//! into the global ring and packets from that source are dropped for the whole network. Both
//! tables are fixed-size; the global ring overwrites round-robin and the small table replaces
//! round-robin only when no free slot is left.
//!
//! The [`valid_packet`](FilterSet::valid_packet) predicate is the datapath: it is consulted once
//! per inbound packet on the router's ingress path and must therefore stay a plain linear scan
//! over the two small tables.

use crate::addr::compress;
use crate::wire::FilterRequest;
use log::*;
use std::net::Ipv6Addr;
use thiserror::Error;

/// Capacity of the global filter ring.
pub const GLOBAL_FILTERS: usize = 10;

/// Capacity of the per-destination filter table.
pub const SMALL_FILTERS: usize = 10;

/// Reasons for dropping a filter-install request. Logged, never fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestDrop {
    /// The requester asked to protect a destination other than itself.
    #[error("sender compresses to {actual:#06x} but asked to protect {claimed:#06x}")]
    ForeignDestination {
        /// Destination id named in the request.
        claimed: u16,
        /// Compression of the datagram's source address.
        actual: u16,
    },
    /// The source is already covered by a global filter.
    #[error("source is already covered by a global filter")]
    AlreadyGlobal,
    /// The same sensor already installed this exact filter.
    #[error("this filter has already been reported")]
    Duplicate,
}

/// What a successful filter-install request did to the tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// A second destination complained about a known source; the filter is now global.
    Promoted,
    /// A new small filter was placed in a free slot.
    Inserted,
    /// A new small filter replaced the oldest entry, round-robin.
    Replaced,
}

/// A filter scoped to one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SmallFilter {
    src: Ipv6Addr,
    dest: u16,
    used: bool,
}

impl SmallFilter {
    const EMPTY: SmallFilter = SmallFilter { src: Ipv6Addr::UNSPECIFIED, dest: 0, used: false };
}

/// The global ring and the per-destination table, plus their insertion cursors.
#[derive(Debug, Clone)]
pub struct FilterSet {
    global: [Option<Ipv6Addr>; GLOBAL_FILTERS],
    global_index: usize,
    small: [SmallFilter; SMALL_FILTERS],
    small_index: usize,
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterSet {
    /// Create an empty filter set.
    pub fn new() -> Self {
        Self {
            global: [None; GLOBAL_FILTERS],
            global_index: 0,
            small: [SmallFilter::EMPTY; SMALL_FILTERS],
            small_index: 0,
        }
    }

    /// Whether a global filter for `src` is installed.
    pub fn is_global(&self, src: Ipv6Addr) -> bool {
        self.global.iter().flatten().any(|g| *g == src)
    }

    /// Whether a small filter `(src, dest)` is installed.
    pub fn has_small(&self, src: Ipv6Addr, dest: u16) -> bool {
        self.small.iter().any(|f| f.used && f.src == src && f.dest == dest)
    }

    /// Number of small filters currently in use.
    pub fn small_in_use(&self) -> usize {
        self.small.iter().filter(|f| f.used).count()
    }

    /// Classify and apply a filter-install request sent by `sender`.
    ///
    /// A sensor may only install filters whose destination is itself; this is only a weak
    /// plausibility check, since the source address is not authenticated. A source already
    /// covered globally is dropped, a duplicate complaint from the same sensor is dropped, a
    /// complaint about a known source from a *different* sensor promotes the filter to global,
    /// and anything else becomes a new small filter.
    pub fn handle_request(
        &mut self,
        sender: Ipv6Addr,
        request: &FilterRequest,
    ) -> Result<FilterAction, RequestDrop> {
        let actual = compress(sender);
        if actual != request.dest {
            return Err(RequestDrop::ForeignDestination { claimed: request.dest, actual });
        }

        debug!(
            "node {:#06x} asks to filter packets from {}",
            request.dest, request.src
        );

        if self.is_global(request.src) {
            return Err(RequestDrop::AlreadyGlobal);
        }

        let mut first_unused = None;
        for i in 0..SMALL_FILTERS {
            if !self.small[i].used {
                first_unused.get_or_insert(i);
                continue;
            }
            if self.small[i].src == request.src {
                if self.small[i].dest == request.dest {
                    return Err(RequestDrop::Duplicate);
                }
                // a second destination is complaining about the same source
                info!("promoting the filter for {} to a global filter", request.src);
                self.global[self.global_index] = Some(request.src);
                self.global_index = (self.global_index + 1) % GLOBAL_FILTERS;
                self.small[i].used = false;
                return Ok(FilterAction::Promoted);
            }
        }

        let filter = SmallFilter { src: request.src, dest: request.dest, used: true };
        match first_unused {
            // out of space, overwrite the oldest entry round-robin
            None => {
                self.small[self.small_index] = filter;
                self.small_index = (self.small_index + 1) % SMALL_FILTERS;
                info!("replacing the oldest filter with ({}, {:#06x})", filter.src, filter.dest);
                Ok(FilterAction::Replaced)
            }
            Some(slot) => {
                self.small[slot] = filter;
                info!("installed the filter ({}, {:#06x})", filter.src, filter.dest);
                Ok(FilterAction::Inserted)
            }
        }
    }

    /// The datapath predicate, consulted once per inbound packet.
    ///
    /// Returns `false` (drop) when the packet's source matches a global filter, or matches a
    /// small filter whose destination is the packet's destination.
    pub fn valid_packet(&self, src: Ipv6Addr, dest: Ipv6Addr) -> bool {
        if self.is_global(src) {
            debug!("dropping packet from {}, global filter", src);
            return false;
        }
        if self.has_small(src, compress(dest)) {
            debug!("dropping packet from {} to {}, small filter", src, dest);
            return false;
        }
        true
    }
}
