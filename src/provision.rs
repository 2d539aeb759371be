//! Veth provisioning
//!
//! Each planned pair is realized by up to four commands, always in this
//! order: create the pair, move end A into its namespace, move end B into its
//! namespace (skipped for the host namespace, where new links already live),
//! and bring both ends up from inside their namespaces.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::command;
use crate::executor::{run_checked, CommandError, CommandExecutor};
use crate::plan::VethPeer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    Create,
    MoveA,
    MoveB,
    BringUp,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            ProvisionStep::Create => "create",
            ProvisionStep::MoveA => "move A",
            ProvisionStep::MoveB => "move B",
            ProvisionStep::BringUp => "bring up",
        };
        f.write_str(step)
    }
}

#[derive(Error, Debug)]
#[error("Veth {index} ({a} <-> {b}) failed at step '{step}'")]
pub struct ProvisionError {
    /// Position of the pair in the plan.
    pub index: usize,
    pub a: String,
    pub b: String,
    pub step: ProvisionStep,
    #[source]
    pub source: CommandError,
}

impl ProvisionError {
    pub fn command(&self) -> &str {
        &self.source.command
    }

    pub fn output(&self) -> &str {
        &self.source.output
    }
}

/// The commands that realize `veth`, in issue order.
pub fn veth_commands(veth: &VethPeer) -> Vec<(ProvisionStep, String)> {
    let (a, b) = (&veth.a, &veth.b);

    let mut commands = vec![
        (ProvisionStep::Create, command::veth_add(&a.interface, &b.interface)),
        (ProvisionStep::MoveA, command::set_netns(&a.interface, a.namespace)),
    ];
    if !b.is_host() {
        commands.push((ProvisionStep::MoveB, command::set_netns(&b.interface, b.namespace)));
    }
    commands.push((
        ProvisionStep::BringUp,
        format!(
            "{} && {}",
            command::link_up(&a.interface, a.namespace),
            command::link_up(&b.interface, b.namespace)
        ),
    ));
    commands
}

/// Run the commands for a single pair, stopping at the first failure.
pub async fn provision_veth<E>(executor: &E, index: usize, veth: &VethPeer) -> Result<(), ProvisionError>
where
    E: CommandExecutor + ?Sized,
{
    for (step, cmd) in veth_commands(veth) {
        run_checked(executor, &cmd)
            .await
            .map_err(|source| ProvisionError {
                index,
                a: veth.a.interface.clone(),
                b: veth.b.interface.clone(),
                step,
                source,
            })?;
    }
    debug!(index, a = %veth.a, b = %veth.b, "veth provisioned");
    Ok(())
}

/// Provision every pair in plan order. Nothing is rolled back on failure.
///
/// `concurrency` above 1 lets that many pairs run at once; the steps of a
/// single pair stay sequential.
pub async fn provision_veths<E>(
    executor: &E,
    veths: &[VethPeer],
    concurrency: usize,
) -> Result<(), ProvisionError>
where
    E: CommandExecutor + ?Sized,
{
    info!(veths = veths.len(), "connecting devices with veths");

    stream::iter(veths.iter().enumerate())
        .map(|(index, veth)| provision_veth(executor, index, veth))
        .buffered(concurrency.max(1))
        .try_collect::<Vec<()>>()
        .await?;

    Ok(())
}
