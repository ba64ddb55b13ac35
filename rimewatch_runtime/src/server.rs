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

//! The root-side mapping process.
//!
//! One `select!` loop over the round timer, the host timer and the reply socket. The timers drive
//! the [`MappingEngine`]; the socket feeds it replies. Since every event handler runs to
//! completion before the next await, graph and engine need no locking. Inbound datagrams pass the
//! shared firewall first: the root is the router, so its own ingress honors the filters it
//! distributes.

use crate::config::ServerConfig;
use crate::{Firewall, RuntimeError};
use log::*;
use rimewatch::graph::NetworkGraph;
use rimewatch::mapper::{self, EngineState, MappingEngine, RoundOutcome};
use rimewatch::printer;
use rimewatch::rpl::RplState;
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{self, Instant};

/// The root-side mapping process: state machine, graph, and the sockets and timers driving them.
#[derive(Debug)]
pub struct MapperServer {
    socket: UdpSocket,
    engine: MappingEngine,
    graph: NetworkGraph,
    rpl: Arc<RwLock<RplState>>,
    firewall: Firewall,
    round_interval: Duration,
    client_port: u16,
}

impl MapperServer {
    /// Bind the reply socket and root the graph at the interface's global address.
    ///
    /// Mapping cannot start before the root knows its own global address, so a missing address is
    /// a startup error rather than a deferred condition.
    pub async fn bind(
        config: &ServerConfig,
        rpl: Arc<RwLock<RplState>>,
        firewall: Firewall,
    ) -> Result<Self, RuntimeError> {
        let root_addr = rpl.read().unwrap().global.ok_or(RuntimeError::NoGlobalAddress)?;
        let socket = UdpSocket::bind((config.bind, config.server_port)).await?;
        info!("mapping server listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            engine: MappingEngine::new(),
            graph: NetworkGraph::new(root_addr),
            rpl,
            firewall,
            round_interval: Duration::from_millis(config.round_interval_ms),
            client_port: config.client_port,
        })
    }

    /// The engine, for inspection.
    pub fn engine(&self) -> &MappingEngine {
        &self.engine
    }

    /// The network graph, for inspection.
    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    /// Run until the shutdown signal fires; returns the server back for inspection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<Self, RuntimeError> {
        info!(
            "mapping every {:?}, hosts are polled with a {:?} delay",
            self.round_interval,
            mapper::host_interval(self.round_interval)
        );
        let mut round_timer =
            time::interval_at(Instant::now() + self.round_interval, self.round_interval);
        let mut host_timer = time::interval(mapper::host_interval(self.round_interval));
        let mut buf = [0u8; 1500];
        loop {
            tokio::select! {
                _ = round_timer.tick() => self.on_round_timer(),
                _ = host_timer.tick() => self.on_host_timer().await?,
                received = self.socket.recv_from(&mut buf) => {
                    let (len, from) = received?;
                    self.on_datagram(from, &buf[..len]);
                }
                _ = shutdown.changed() => break,
            }
        }
        Ok(self)
    }

    /// Round boundary: print the snapshot of the finished round, run the detector, start over.
    fn on_round_timer(&mut self) {
        if self.engine.state() != EngineState::Idle {
            // the previous round is still polling, which means the timing is misconfigured
            warn!("round timer fired while still mapping, skipping the boundary");
            return;
        }
        printer::print_graph(&self.graph, self.engine.timestamp());
        let rpl = self.rpl.read().unwrap();
        match self.engine.begin_round(&mut self.graph, &rpl) {
            RoundOutcome::Started { report: Some(report) } => {
                printer::print_report(&self.graph, &report);
                if report.is_clean() {
                    debug!("detector pass found nothing to report");
                }
            }
            RoundOutcome::Started { report: None } => debug!("first round, seeding the graph"),
            RoundOutcome::Skipped => (),
        }
    }

    /// Host-timer tick: poll at most one descendant.
    async fn on_host_timer(&mut self) -> Result<(), RuntimeError> {
        if self.engine.state() != EngineState::Mapping {
            return Ok(());
        }
        let tick = {
            let rpl = self.rpl.read().unwrap();
            self.engine.map_tick(&mut self.graph, &rpl)
        };
        if let Some((dest, request)) = tick.request {
            self.socket.send_to(&request.encode(), (dest, self.client_port)).await?;
        }
        Ok(())
    }

    /// A datagram on the reply port: firewall first, then the engine.
    fn on_datagram(&mut self, from: SocketAddr, payload: &[u8]) {
        let src = match from {
            SocketAddr::V6(a) => *a.ip(),
            SocketAddr::V4(_) => return,
        };
        if !self.firewall.valid_packet(src, self.graph.root().addr()) {
            return;
        }
        let rpl = self.rpl.read().unwrap();
        match self.engine.handle_reply(src, payload, &mut self.graph, &rpl) {
            Ok(_) => debug!("recorded mapping data from {}", src),
            Err(drop) => debug!("dropped mapping reply from {}: {}", src, drop),
        }
    }
}
