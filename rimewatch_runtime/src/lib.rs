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

//! # Rimewatch Runtime
//!
//! The asynchronous glue around the [`rimewatch`] core. Each logical process of the system is one
//! task built around a single `select!` loop over its timer and socket events, so all state
//! mutations happen between two awaits and the tasks need no further synchronization among each
//! other:
//!
//! - **[`MapperServer`](server::MapperServer)**: the root-side mapping process. Fires the round
//!   and host timers into the [`MappingEngine`](rimewatch::mapper::MappingEngine), sends the
//!   resulting requests, ingests replies, and prints the per-round operator output.
//! - **[`FirewallConfigurator`](configurator::FirewallConfigurator)**: the root-side filter
//!   aggregation process, feeding install requests into the shared
//!   [`FilterSet`](rimewatch::firewall::FilterSet).
//! - **[`MapperClient`](client::MapperClient)**: the node-side responder answering mapping
//!   requests out of the node's own RPL view, plus [`report_host`](client::report_host) to
//!   complain about abusive external correspondents.
//!
//! The [`config`] module loads the JSON deployment description: socket addresses, timing, and the
//! RPL view that stands in for the routing subsystem's tables.

pub mod client;
pub mod config;
pub mod configurator;
pub mod server;

pub use configurator::Firewall;

use thiserror::Error;

/// Error type of the runtime layer.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Socket or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration file did not parse.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
    /// The root interface has no global address, so the graph cannot be rooted.
    #[error("The root interface has no global address configured")]
    NoGlobalAddress,
    /// The local interface has no usable address to derive the own short identifier from.
    #[error("The local interface has no usable address")]
    NoInterfaceAddress,
    /// More routes are configured than the routing table can hold.
    #[error("The configured routes exceed the routing table capacity")]
    TooManyRoutes,
}
