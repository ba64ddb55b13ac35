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

//! The firewall configurator process and the shared filter handle.
//!
//! The configurator listens for filter-install requests and feeds them into the
//! [`FilterSet`](rimewatch::firewall::FilterSet). The set itself sits behind the cloneable
//! [`Firewall`] handle, so the ingress path of the router consults the same tables the
//! configurator mutates.

use crate::RuntimeError;
use log::*;
use rimewatch::firewall::{FilterAction, FilterSet, RequestDrop};
use rimewatch::wire::FilterRequest;
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// Cloneable handle to the shared filter tables.
#[derive(Debug, Clone, Default)]
pub struct Firewall {
    inner: Arc<RwLock<FilterSet>>,
}

impl Firewall {
    /// Create a handle to a fresh, empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The datapath predicate: `false` means the packet must be dropped.
    pub fn valid_packet(&self, src: Ipv6Addr, dest: Ipv6Addr) -> bool {
        self.inner.read().unwrap().valid_packet(src, dest)
    }

    /// Classify and apply a filter-install request.
    pub fn handle_request(
        &self,
        sender: Ipv6Addr,
        request: &FilterRequest,
    ) -> Result<FilterAction, RequestDrop> {
        self.inner.write().unwrap().handle_request(sender, request)
    }

    /// Inspect the filter tables.
    pub fn with<R>(&self, f: impl FnOnce(&FilterSet) -> R) -> R {
        f(&self.inner.read().unwrap())
    }
}

/// The root-side filter aggregation process.
#[derive(Debug)]
pub struct FirewallConfigurator {
    socket: UdpSocket,
    firewall: Firewall,
}

impl FirewallConfigurator {
    /// Bind the configurator socket.
    pub async fn bind(
        bind: Ipv6Addr,
        port: u16,
        firewall: Firewall,
    ) -> Result<Self, RuntimeError> {
        let socket = UdpSocket::bind((bind, port)).await?;
        info!("firewall configurator listening on {}", socket.local_addr()?);
        Ok(Self { socket, firewall })
    }

    /// The address the configurator is bound to.
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
                    self.on_datagram(from, &buf[..len]);
                }
                _ = shutdown.changed() => break,
            }
        }
        Ok(())
    }

    fn on_datagram(&self, from: SocketAddr, payload: &[u8]) {
        let src = match from {
            SocketAddr::V6(a) => *a.ip(),
            SocketAddr::V4(_) => return,
        };
        let request = match FilterRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                debug!("malformed filter request from {}: {}", src, e);
                return;
            }
        };
        match self.firewall.handle_request(src, &request) {
            Ok(action) => debug!("filter request from {}: {:?}", src, action),
            Err(drop) => debug!("filter request from {} dropped: {}", src, drop),
        }
    }
}
