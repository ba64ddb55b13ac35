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

//! Deployment configuration, loaded from JSON files.
//!
//! Besides the socket and timing parameters, a configuration carries the [`RplView`]: the routing
//! table, instance table and interface addresses that the routing subsystem would expose on a real
//! border router. The view is deserialized once at startup and stands in for that collaborator.

use crate::RuntimeError;
use rimewatch::rpl::{Dodag, DodagParent, RoutingTable, RplInstance, RplState};
use rimewatch::wire;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv6Addr;
use std::path::Path;

fn default_bind() -> Ipv6Addr {
    Ipv6Addr::UNSPECIFIED
}

fn default_server_port() -> u16 {
    wire::MAPPER_SERVER_PORT
}

fn default_client_port() -> u16 {
    wire::MAPPER_CLIENT_PORT
}

fn default_firewall_server_port() -> u16 {
    wire::FW_CONF_SERVER_PORT
}

fn default_round_interval_ms() -> u64 {
    120_000
}

fn default_min_hoprankinc() -> u16 {
    256
}

fn default_version() -> u8 {
    1
}

/// Configuration of the root-side processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the server sockets bind to.
    #[serde(default = "default_bind")]
    pub bind: Ipv6Addr,
    /// Port on which mapping replies arrive.
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Port the nodes listen on for mapping requests.
    #[serde(default = "default_client_port")]
    pub client_port: u16,
    /// Port on which filter-install requests arrive.
    #[serde(default = "default_firewall_server_port")]
    pub firewall_port: u16,
    /// Time between two mapping rounds, in milliseconds.
    #[serde(default = "default_round_interval_ms")]
    pub round_interval_ms: u64,
    /// The RPL view of the root.
    #[serde(default)]
    pub rpl: RplView,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            server_port: default_server_port(),
            client_port: default_client_port(),
            firewall_port: default_firewall_server_port(),
            round_interval_ms: default_round_interval_ms(),
            rpl: RplView::default(),
        }
    }
}

impl ServerConfig {
    /// Load the configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RuntimeError> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Configuration of the node-side processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the node sockets bind to.
    #[serde(default = "default_bind")]
    pub bind: Ipv6Addr,
    /// Port on which mapping requests arrive.
    #[serde(default = "default_client_port")]
    pub mapper_port: u16,
    /// Address of the root, for firewall reports.
    pub root: Ipv6Addr,
    /// Port on which the root accepts filter-install requests.
    #[serde(default = "default_firewall_server_port")]
    pub root_firewall_port: u16,
    /// The RPL view of the node.
    #[serde(default)]
    pub rpl: RplView,
}

impl NodeConfig {
    /// Load the configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RuntimeError> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// The serialized form of the routing subsystem's state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RplView {
    /// Routing table entries.
    #[serde(default)]
    pub routes: Vec<RouteView>,
    /// RPL instances.
    #[serde(default)]
    pub instances: Vec<InstanceView>,
    /// Preferred link-local interface address.
    #[serde(default)]
    pub link_local: Option<Ipv6Addr>,
    /// Preferred global interface address.
    #[serde(default)]
    pub global: Option<Ipv6Addr>,
}

/// One routing table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteView {
    /// The destination address.
    pub dest: Ipv6Addr,
    /// The next hop towards the destination.
    pub via: Ipv6Addr,
    /// The route metric.
    #[serde(default)]
    pub metric: u8,
}

/// One RPL instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceView {
    /// The instance identifier.
    pub instance_id: u8,
    /// The minimum hop-rank increment of the instance.
    #[serde(default = "default_min_hoprankinc")]
    pub min_hoprankinc: u16,
    /// The DODAGs of the instance.
    pub dags: Vec<DodagView>,
}

/// One DODAG of an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DodagView {
    /// The DODAG identifier.
    pub dag_id: Ipv6Addr,
    /// The DODAG version number.
    #[serde(default = "default_version")]
    pub version: u8,
    /// The local node's rank within the DODAG.
    #[serde(default)]
    pub rank: u16,
    /// The local node's parent set.
    #[serde(default)]
    pub parents: Vec<ParentView>,
    /// Index of the preferred parent within the parent set.
    #[serde(default)]
    pub preferred_parent: Option<usize>,
}

/// One entry of a parent set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentView {
    /// The parent's address.
    pub addr: Ipv6Addr,
    /// The rank the parent advertises.
    pub rank: u16,
}

impl RplView {
    /// Build the in-memory RPL state out of the view.
    pub fn build(&self) -> Result<RplState, RuntimeError> {
        let mut routes = RoutingTable::new();
        for route in &self.routes {
            if !routes.add(route.dest, route.via, route.metric) {
                return Err(RuntimeError::TooManyRoutes);
            }
        }
        let instances = self
            .instances
            .iter()
            .map(|instance| RplInstance {
                used: true,
                instance_id: instance.instance_id,
                min_hoprankinc: instance.min_hoprankinc,
                dags: instance
                    .dags
                    .iter()
                    .map(|dag| Dodag {
                        used: true,
                        dag_id: dag.dag_id,
                        version: dag.version,
                        rank: dag.rank,
                        parents: dag
                            .parents
                            .iter()
                            .map(|p| DodagParent { addr: p.addr, rank: p.rank })
                            .collect(),
                        preferred_parent: dag.preferred_parent,
                    })
                    .collect(),
            })
            .collect();
        Ok(RplState {
            instances,
            routes,
            link_local: self.link_local,
            global: self.global,
        })
    }
}
