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

//! The node-side processes: the mapping responder and the abuse reporter.
//!
//! A sensor node answers mapping requests out of its own RPL view: its rank, its preferred
//! parent, and every potential parent with a known rank. It stays silent on requests it cannot
//! match to a DODAG it participates in; the root absorbs the missing reply through its timestamp
//! checks.

use crate::RuntimeError;
use log::*;
use rimewatch::addr::compress;
use rimewatch::rpl::{RplState, INFINITE_RANK};
use rimewatch::wire::{FilterRequest, MappingReply, MappingRequest, NeighborReport};
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// The node-side mapping responder.
#[derive(Debug)]
pub struct MapperClient {
    socket: UdpSocket,
    rpl: Arc<RwLock<RplState>>,
}

impl MapperClient {
    /// Bind the request socket.
    pub async fn bind(
        bind: Ipv6Addr,
        port: u16,
        rpl: Arc<RwLock<RplState>>,
    ) -> Result<Self, RuntimeError> {
        let socket = UdpSocket::bind((bind, port)).await?;
        info!("mapper client listening on {}", socket.local_addr()?);
        Ok(Self { socket, rpl })
    }

    /// The address the responder is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RuntimeError> {
        Ok(self.socket.local_addr()?)
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), RuntimeError> {
        let mut buf = [0u8; 64];
        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let (len, from) = received?;
                    self.on_request(from, &buf[..len]).await?;
                }
                _ = shutdown.changed() => break,
            }
        }
        Ok(())
    }

    async fn on_request(&self, from: SocketAddr, payload: &[u8]) -> Result<(), RuntimeError> {
        let request = match MappingRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                debug!("malformed mapping request from {}: {}", from, e);
                return Ok(());
            }
        };
        let reply = {
            let rpl = self.rpl.read().unwrap();
            build_reply(&rpl, &request)
        };
        if let Some(reply) = reply {
            debug!("answering mapping request from {}", from);
            self.socket.send_to(&reply.encode(), from).await?;
        }
        Ok(())
    }
}

/// Build the answer to a mapping request out of the node's RPL view.
///
/// Returns `None` when the request names an instance or DODAG the node does not participate in,
/// when the DODAG version does not match, or when the node has no interface address yet. The
/// neighbor list holds every potential parent whose rank is known.
pub fn build_reply(rpl: &RplState, request: &MappingRequest) -> Option<MappingReply> {
    let instance = rpl.instance(request.instance_id)?;
    let dodag = instance
        .dags
        .iter()
        .find(|d| d.used && compress(d.dag_id) == request.dag_id)?;
    if dodag.version != request.dag_version {
        debug!(
            "mapping request for DODAG version {} but ours is {}",
            request.dag_version, dodag.version
        );
        return None;
    }
    let own = rpl.link_local?;
    let preferred = dodag.preferred_parent.and_then(|i| dodag.parents.get(i))?;
    let neighbors = dodag
        .parents
        .iter()
        .filter(|p| p.rank != INFINITE_RANK)
        .map(|p| NeighborReport { id: compress(p.addr), rank: p.rank })
        .collect();
    Some(MappingReply {
        src: compress(own),
        instance_id: request.instance_id,
        dag_id: request.dag_id,
        dag_version: dodag.version,
        timestamp: request.timestamp,
        rank: dodag.rank,
        parent: compress(preferred.addr),
        neighbors,
    })
}

/// Report an abusive external correspondent to the root.
///
/// Builds the filter-install request out of the node's own compressed address and sends it to the
/// root's configurator port.
pub async fn report_host(
    socket: &UdpSocket,
    rpl: &RplState,
    root: SocketAddr,
    host: Ipv6Addr,
) -> Result<(), RuntimeError> {
    let own = rpl.link_local.ok_or(RuntimeError::NoInterfaceAddress)?;
    let request = FilterRequest { dest: compress(own), src: host };
    info!("reporting abusive host {} to {}", host, root);
    socket.send_to(&request.encode(), root).await?;
    Ok(())
}
