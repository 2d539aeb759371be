//! Backbone bridge
//!
//! The host ends of all backbone veths are enslaved to one bridge, which turns
//! the per-device pairs into a shared broadcast segment.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::command;
use crate::executor::{run_checked, CommandError, CommandExecutor};
use crate::plan::VethPeer;

pub const DEFAULT_BRIDGE: &str = "backbone";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStep {
    Create,
    Up,
    Attach,
}

impl fmt::Display for BridgeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BridgeStep::Create => "create",
            BridgeStep::Up => "bring up",
            BridgeStep::Attach => "attach",
        })
    }
}

#[derive(Error, Debug)]
#[error("Bridge '{bridge}' failed at step '{step}'")]
pub struct BridgeError {
    pub bridge: String,
    pub step: BridgeStep,
    #[source]
    pub source: CommandError,
}

/// What the bridge stage did. `bridge` is `None` when the plan had no
/// backbone links and nothing was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeReport {
    pub bridge: Option<String>,
    pub ports: Vec<String>,
}

/// Interfaces of the plan that stay in the host namespace, in plan order.
pub fn backbone_ports(veths: &[VethPeer]) -> Vec<&str> {
    veths
        .iter()
        .flat_map(VethPeer::endpoints)
        .filter(|e| e.is_host())
        .map(|e| e.interface.as_str())
        .collect()
}

/// Create `bridge`, bring it up, and attach every host-side endpoint.
///
/// Point-to-point pairs have no host-side endpoint and are left alone. If no
/// endpoint is host-side, no command is issued.
pub async fn attach_backbone<E>(
    executor: &E,
    bridge: &str,
    veths: &[VethPeer],
) -> Result<BridgeReport, BridgeError>
where
    E: CommandExecutor + ?Sized,
{
    let ports = backbone_ports(veths);
    if ports.is_empty() {
        debug!("no backbone links, skipping bridge");
        return Ok(BridgeReport::default());
    }

    info!(bridge, ports = ports.len(), "creating bridge and adding veth backbones");

    let fail = |step: BridgeStep| {
        move |source: CommandError| BridgeError {
            bridge: bridge.to_string(),
            step,
            source,
        }
    };

    run_checked(executor, &command::bridge_add(bridge))
        .await
        .map_err(fail(BridgeStep::Create))?;
    run_checked(executor, &command::bridge_up(bridge))
        .await
        .map_err(fail(BridgeStep::Up))?;

    for port in &ports {
        run_checked(executor, &command::bridge_attach(port, bridge))
            .await
            .map_err(fail(BridgeStep::Attach))?;
        debug!(bridge, port, "attached to bridge");
    }

    Ok(BridgeReport {
        bridge: Some(bridge.to_string()),
        ports: ports.into_iter().map(String::from).collect(),
    })
}
