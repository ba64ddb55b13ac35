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

//! Short-identifier handling for addresses inside the managed subnet.
//!
//! Every node of the managed network is keyed by the last 16-bit word of its IPv6 address, both on
//! the wire and in all in-memory tables. This works because all managed nodes share one routing
//! prefix, and the operator guarantees that interface identifiers do not collide in their low 16
//! bits. External hosts cannot be compressed and are always stored as full addresses.

use std::net::Ipv6Addr;

/// The well-known 16-bit prefix word of the managed global prefix.
pub const GLOBAL_PREFIX: u16 = 0xaaaa;

/// Compress an IPv6 address into its 16-bit short identifier (the last word of the address).
pub fn compress(addr: Ipv6Addr) -> u16 {
    addr.segments()[7]
}

/// Rewrite the first word of an address to the managed global prefix.
///
/// Used to promote link-local addresses found in the routing table into the prefixed form under
/// which nodes appear in the network graph.
pub fn globalize(addr: Ipv6Addr) -> Ipv6Addr {
    let mut segments = addr.segments();
    segments[0] = GLOBAL_PREFIX;
    Ipv6Addr::from(segments)
}
