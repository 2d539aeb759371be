//! CLI command implementations
//!
//! Kept out of main.rs so the rendering and option handling can be unit
//! tested.

use anyhow::{Context, Result};
use netlab::bridge::backbone_ports;
use netlab::provision::veth_commands;
use netlab::{
    command, plan_veths, CommandExecutor, LocalExecutor, NamespaceMap, Pipeline, PipelineOptions,
    PlanOptions, SshConfig, SshExecutor, Topology, VethPeer,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{error, info};

/// Where `up` sends its commands.
pub enum Target {
    Ssh(SshConfig),
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Text,
    Json,
    Commands,
}

/// Implementation of the 'up' command - provisions the topology on the host
pub async fn cmd_up(target: Target, topo: &Path, options: PipelineOptions) -> Result<()> {
    let executor: Box<dyn CommandExecutor> = match target {
        Target::Local => {
            info!("running commands on the local host");
            Box::new(LocalExecutor::new())
        }
        Target::Ssh(config) => {
            info!("connecting via SSH to {}", config.destination());
            let ssh = SshExecutor::new(config);
            ssh.check().await.context("failed to connect to host")?;
            Box::new(ssh)
        }
    };

    let report = match Pipeline::new(executor, options).load_and_run(topo).await {
        Ok(report) => report,
        Err(failure) => {
            if let Some(last) = failure.trail.last() {
                error!("last applied command: {}", last.command);
            }
            return Err(failure.into());
        }
    };

    println!(
        "Connected {} devices with {} veths",
        report.namespaces.len(),
        report.veths.len()
    );
    if let Some(bridge) = &report.bridge.bridge {
        println!(
            "Bridge '{}' joins {} backbone ports",
            bridge,
            report.bridge.ports.len()
        );
    }

    Ok(())
}

/// Implementation of the 'plan' command - prints the veth plan without a host
pub fn cmd_plan(
    topo: &Path,
    validate: bool,
    options: PlanOptions,
    format: PlanFormat,
    bridge: &str,
) -> Result<()> {
    let topology = Topology::load(topo)?;
    if validate {
        topology.validate()?;
    }
    let namespaces = NamespaceMap::placeholder(&topology);
    let veths = plan_veths(&topology, &namespaces, options)?;

    let rendered = match format {
        PlanFormat::Text => render_text(&veths),
        PlanFormat::Json => render_json(&veths)?,
        PlanFormat::Commands => render_commands(&veths, bridge),
    };
    print!("{rendered}");
    Ok(())
}

#[derive(Serialize)]
struct PlanView<'a> {
    veths: &'a [VethPeer],
    bridge_ports: Vec<&'a str>,
}

fn render_json(veths: &[VethPeer]) -> Result<String> {
    let view = PlanView {
        veths,
        bridge_ports: backbone_ports(veths),
    };
    let mut json = serde_json::to_string_pretty(&view)?;
    json.push('\n');
    Ok(json)
}

fn render_text(veths: &[VethPeer]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Planned {} veth pairs (namespace handles are placeholders):",
        veths.len()
    );
    for veth in veths {
        let _ = writeln!(out, "  {} <-> {}", veth.a, veth.b);
    }

    let ports = backbone_ports(veths);
    if ports.is_empty() {
        let _ = writeln!(out, "No backbone ports");
    } else {
        let _ = writeln!(out, "Backbone ports: {}", ports.join(", "));
    }
    out
}

fn render_commands(veths: &[VethPeer], bridge: &str) -> String {
    let mut out = String::new();
    for veth in veths {
        for (_, cmd) in veth_commands(veth) {
            let _ = writeln!(out, "{cmd}");
        }
    }

    let ports = backbone_ports(veths);
    if !ports.is_empty() {
        let _ = writeln!(out, "{}", command::bridge_add(bridge));
        let _ = writeln!(out, "{}", command::bridge_up(bridge));
        for port in ports {
            let _ = writeln!(out, "{}", command::bridge_attach(port, bridge));
        }
    }
    out
}
