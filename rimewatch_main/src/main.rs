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

use clap::{Parser, Subcommand};
use log::*;
use rimewatch_runtime::client::{report_host, MapperClient};
use rimewatch_runtime::config::{NodeConfig, ServerConfig};
use rimewatch_runtime::configurator::FirewallConfigurator;
use rimewatch_runtime::server::MapperServer;
use rimewatch_runtime::Firewall;
use std::error::Error;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::watch;

#[derive(Parser)]
#[clap(author, about = "Rank-attack detection and distributed firewalling for RPL networks")]
struct CommandLineArguments {
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Subcommand)]
enum MainCommand {
    /// Run the root-side processes: the network mapper and the firewall configurator
    Serve {
        /// Path to the server configuration file
        #[clap(short, long)]
        config: PathBuf,
    },
    /// Run the node-side mapping responder
    Node {
        /// Path to the node configuration file
        #[clap(short, long)]
        config: PathBuf,
    },
    /// Report an abusive external host to the root
    Report {
        /// Path to the node configuration file
        #[clap(short, long)]
        config: PathBuf,
        /// Address of the abusive host
        host: Ipv6Addr,
    },
    /// Parse a server configuration and print the resulting RPL view
    CheckConfig {
        /// Path to the server configuration file
        #[clap(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // initialize the env logger
    pretty_env_logger::init();

    // run clap
    let args = CommandLineArguments::parse();

    // match on the action
    match args.cmd {
        MainCommand::Serve { config } => serve(&config).await?,
        MainCommand::Node { config } => node(&config).await?,
        MainCommand::Report { config, host } => report(&config, host).await?,
        MainCommand::CheckConfig { config } => check_config(&config)?,
    }
    Ok(())
}

/// Run the mapper server and the firewall configurator side by side until interrupted.
async fn serve(path: &PathBuf) -> Result<(), Box<dyn Error>> {
    let config = ServerConfig::load(path)?;
    let rpl = Arc::new(RwLock::new(config.rpl.build()?));
    let firewall = Firewall::new();

    let server = MapperServer::bind(&config, rpl, firewall.clone()).await?;
    let configurator =
        FirewallConfigurator::bind(config.bind, config.firewall_port, firewall).await?;

    let (_stop, shutdown) = watch::channel(false);
    info!("root processes started");
    let _ = tokio::try_join!(server.run(shutdown.clone()), configurator.run(shutdown))?;
    Ok(())
}

/// Run the node-side mapping responder until interrupted.
async fn node(path: &PathBuf) -> Result<(), Box<dyn Error>> {
    let config = NodeConfig::load(path)?;
    let rpl = Arc::new(RwLock::new(config.rpl.build()?));
    let client = MapperClient::bind(config.bind, config.mapper_port, rpl).await?;
    let (_stop, shutdown) = watch::channel(false);
    info!("node processes started");
    client.run(shutdown).await?;
    Ok(())
}

/// Send a single filter-install request for the given host to the root.
async fn report(path: &PathBuf, host: Ipv6Addr) -> Result<(), Box<dyn Error>> {
    let config = NodeConfig::load(path)?;
    let rpl = config.rpl.build()?;
    let socket = UdpSocket::bind((config.bind, 0)).await?;
    report_host(&socket, &rpl, (config.root, config.root_firewall_port).into(), host).await?;
    Ok(())
}

/// Parse the configuration and print a summary of the RPL view.
fn check_config(path: &PathBuf) -> Result<(), Box<dyn Error>> {
    let config = ServerConfig::load(path)?;
    let rpl = config.rpl.build()?;
    println!("global address:     {:?}", rpl.global);
    println!("link-local address: {:?}", rpl.link_local);
    println!("routes:             {} slots", rpl.routes.len());
    for entry in rpl.routes.iter_used() {
        println!("    {} via {} (metric {})", entry.ipaddr, entry.nexthop, entry.metric);
    }
    for instance in rpl.instances.iter().filter(|i| i.used) {
        println!(
            "instance {} (min_hoprankinc {}):",
            instance.instance_id, instance.min_hoprankinc
        );
        for dag in instance.dags.iter().filter(|d| d.used) {
            println!(
                "    DODAG {} version {} rank {} ({} parents)",
                dag.dag_id,
                dag.version,
                dag.rank,
                dag.parents.len()
            );
        }
    }
    Ok(())
}
