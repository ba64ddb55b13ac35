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

//! End-to-end runs of the runtime tasks over loopback UDP with ephemeral ports.

use rimewatch::rpl::{Dodag, DodagParent, RoutingTable, RplInstance, RplState};
use rimewatch::wire::{MappingReply, MappingRequest};
use rimewatch_runtime::client::{report_host, MapperClient};
use rimewatch_runtime::config::ServerConfig;
use rimewatch_runtime::configurator::FirewallConfigurator;
use rimewatch_runtime::server::MapperServer;
use rimewatch_runtime::Firewall;
use std::net::Ipv6Addr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

const LOCALHOST: Ipv6Addr = Ipv6Addr::LOCALHOST;

fn sensor_view() -> RplState {
    RplState {
        instances: vec![RplInstance {
            used: true,
            instance_id: 1,
            min_hoprankinc: 256,
            dags: vec![Dodag {
                used: true,
                dag_id: "aaaa::1".parse().unwrap(),
                version: 1,
                rank: 768,
                parents: vec![DodagParent { addr: "fe80::2".parse().unwrap(), rank: 512 }],
                preferred_parent: Some(0),
            }],
        }],
        routes: RoutingTable::new(),
        link_local: Some("fe80::5".parse().unwrap()),
        global: Some("aaaa::5".parse().unwrap()),
    }
}

#[tokio::test]
async fn a_mapping_request_is_answered_over_udp() {
    let rpl = Arc::new(RwLock::new(sensor_view()));
    let client = MapperClient::bind(LOCALHOST, 0, rpl).await.unwrap();
    let client_addr = client.local_addr().unwrap();
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(client.run(shutdown));

    let probe = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
    // a request for a version the node does not know stays unanswered
    let stale = MappingRequest { instance_id: 1, dag_id: 0x0001, dag_version: 7, timestamp: 3 };
    probe.send_to(&stale.encode(), client_addr).await.unwrap();
    let request = MappingRequest { instance_id: 1, dag_id: 0x0001, dag_version: 1, timestamp: 4 };
    probe.send_to(&request.encode(), client_addr).await.unwrap();

    let mut buf = [0u8; 256];
    let (len, from) = timeout(Duration::from_secs(5), probe.recv_from(&mut buf))
        .await
        .expect("no reply within five seconds")
        .unwrap();
    assert_eq!(from, client_addr);
    let reply = MappingReply::decode(&buf[..len]).unwrap();
    // the answer belongs to the second request; the stale one was silently dropped
    assert_eq!(reply.timestamp, 4);
    assert_eq!(reply.src, 0x0005);
    assert_eq!(reply.rank, 768);
    assert_eq!(reply.parent, 0x0002);

    stop.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn an_abuse_report_lands_in_the_filter_tables() {
    let firewall = Firewall::new();
    let configurator =
        FirewallConfigurator::bind(LOCALHOST, 0, firewall.clone()).await.unwrap();
    let root_addr = configurator.local_addr().unwrap();
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(configurator.run(shutdown));

    // over loopback the node's source address is ::1, so its view must compress to the same id
    let mut rpl = sensor_view();
    rpl.link_local = Some(LOCALHOST);
    let abusive: Ipv6Addr = "2001::dead".parse().unwrap();

    let socket = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
    report_host(&socket, &rpl, root_addr, abusive).await.unwrap();

    // wait for the datagram to be processed
    let mut installed = false;
    for _ in 0..50 {
        if firewall.with(|f| f.has_small(abusive, 0x0001)) {
            installed = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(installed, "the complaint never became a filter");

    // the datapath now drops traffic from the abusive host towards the complaining sensor
    assert!(!firewall.valid_packet(abusive, LOCALHOST));
    assert!(firewall.valid_packet("2001::beef".parse().unwrap(), LOCALHOST));

    // a duplicate complaint changes nothing
    report_host(&socket, &rpl, root_addr, abusive).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(firewall.with(|f| f.small_in_use()), 1);
    assert!(!firewall.with(|f| f.is_global(abusive)));

    stop.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn the_server_runs_rounds_and_stops_cleanly() {
    let config = ServerConfig {
        bind: LOCALHOST,
        server_port: 0,
        round_interval_ms: 50,
        ..ServerConfig::default()
    };
    let rpl = Arc::new(RwLock::new(RplState {
        instances: vec![RplInstance {
            used: true,
            instance_id: 1,
            min_hoprankinc: 256,
            dags: vec![Dodag {
                used: true,
                dag_id: "aaaa::1".parse().unwrap(),
                version: 1,
                rank: 256,
                parents: Vec::new(),
                preferred_parent: None,
            }],
        }],
        routes: RoutingTable::new(),
        link_local: Some("fe80::1".parse().unwrap()),
        global: Some("aaaa::1".parse().unwrap()),
    }));

    let server = MapperServer::bind(&config, rpl, Firewall::new()).await.unwrap();
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(server.run(shutdown));

    sleep(Duration::from_millis(300)).await;
    stop.send(true).unwrap();
    let server = task.await.unwrap().unwrap();

    // with a 50 ms round interval, several rounds have passed over an empty routing table
    assert!(server.engine().timestamp() >= 1);
    assert_eq!(server.graph().len(), 1);
    assert_eq!(server.graph().root().rank(), 256);
}

#[tokio::test]
async fn the_server_refuses_to_start_without_a_global_address() {
    let config = ServerConfig { bind: LOCALHOST, server_port: 0, ..ServerConfig::default() };
    let rpl = Arc::new(RwLock::new(RplState::default()));
    let result = MapperServer::bind(&config, rpl, Firewall::new()).await;
    assert!(result.is_err());
}
