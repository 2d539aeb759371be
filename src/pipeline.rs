//! Stage-by-stage execution of a topology
//!
//! ```text
//! Unloaded -> TopologyLoaded -> NamespacesResolved -> Planned
//!          -> VethsProvisioned -> BackboneAttached
//! ```
//!
//! Any failure ends the run in [`Stage::Failed`]. There is no retry and no
//! rollback; a failed run reports the stage that failed, the last stage that
//! completed, and the trail of commands that had already been applied.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

use crate::bridge::{attach_backbone, BridgeReport, DEFAULT_BRIDGE};
use crate::executor::{CommandExecutor, CompletedCommand, Journal};
use crate::namespace::{resolve_namespaces, NamespaceMap};
use crate::plan::{plan_veths, PlanOptions, VethPeer};
use crate::provision::provision_veths;
use crate::topology::Topology;
use crate::NetlabError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Unloaded,
    TopologyLoaded,
    NamespacesResolved,
    Planned,
    VethsProvisioned,
    BackboneAttached,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Unloaded => "unloaded",
            Stage::TopologyLoaded => "topology loaded",
            Stage::NamespacesResolved => "namespaces resolved",
            Stage::Planned => "planned",
            Stage::VethsProvisioned => "veths provisioned",
            Stage::BackboneAttached => "backbone attached",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Name of the shared backbone bridge on the host.
    pub bridge: String,
    /// Maximum resolution queries / veth pairs in flight at once.
    pub concurrency: usize,
    /// Run [`Topology::validate`] before touching the host.
    pub validate_topology: bool,
    pub plan: PlanOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            bridge: DEFAULT_BRIDGE.to_string(),
            concurrency: 1,
            validate_topology: true,
            plan: PlanOptions::default(),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub namespaces: NamespaceMap,
    pub veths: Vec<VethPeer>,
    pub bridge: BridgeReport,
    pub trail: Vec<CompletedCommand>,
}

/// A run that stopped early: the stage whose work failed, the last stage it
/// completed, the error, and the commands that were applied before it.
#[derive(Error, Debug)]
#[error(
    "Run failed at stage '{failed_at}' after '{reached}' ({} commands applied)",
    .trail.len()
)]
pub struct RunFailure {
    /// The stage being worked towards when the error happened.
    pub failed_at: Stage,
    /// The last stage that completed.
    pub reached: Stage,
    #[source]
    pub error: NetlabError,
    pub trail: Vec<CompletedCommand>,
}

/// Drives one topology through all stages against a single executor.
pub struct Pipeline<E> {
    executor: Journal<E>,
    options: PipelineOptions,
    stage: Stage,
}

impl<E: CommandExecutor> Pipeline<E> {
    pub fn new(executor: E, options: PipelineOptions) -> Self {
        Self {
            executor: Journal::new(executor),
            options,
            stage: Stage::Unloaded,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Load the topology file, then [`Pipeline::run`] it.
    pub async fn load_and_run(mut self, path: impl AsRef<Path>) -> Result<RunReport, RunFailure> {
        let path = path.as_ref();
        info!(path = %path.display(), "reading topology file");

        match Topology::load(path) {
            Ok(topology) => self.run(&topology).await,
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Run an already loaded topology to completion or first failure.
    pub async fn run(mut self, topology: &Topology) -> Result<RunReport, RunFailure> {
        self.drive(topology).await
    }

    /// Leaves the pipeline in `BackboneAttached` or `Failed`.
    async fn drive(&mut self, topology: &Topology) -> Result<RunReport, RunFailure> {
        match self.execute(topology).await {
            Ok((namespaces, veths, bridge)) => {
                let trail = self.executor.completed();
                info!(
                    veths = veths.len(),
                    bridge_ports = bridge.ports.len(),
                    commands = trail.len(),
                    "all done successfully"
                );
                Ok(RunReport {
                    namespaces,
                    veths,
                    bridge,
                    trail,
                })
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn execute(
        &mut self,
        topology: &Topology,
    ) -> Result<(NamespaceMap, Vec<VethPeer>, BridgeReport), NetlabError> {
        if self.options.validate_topology {
            topology.validate()?;
        }
        self.advance(Stage::TopologyLoaded);

        let namespaces =
            resolve_namespaces(&self.executor, topology, self.options.concurrency).await?;
        self.advance(Stage::NamespacesResolved);

        let veths = plan_veths(topology, &namespaces, self.options.plan)?;
        self.advance(Stage::Planned);

        provision_veths(&self.executor, &veths, self.options.concurrency).await?;
        self.advance(Stage::VethsProvisioned);

        let bridge = attach_backbone(&self.executor, &self.options.bridge, &veths).await?;
        self.advance(Stage::BackboneAttached);

        Ok((namespaces, veths, bridge))
    }

    fn advance(&mut self, stage: Stage) {
        info!(from = %self.stage, to = %stage, "pipeline stage");
        self.stage = stage;
    }

    fn fail(&mut self, error: NetlabError) -> RunFailure {
        let reached = self.stage;
        let failed_at = error.stage();
        error!(stage = %failed_at, error = %error, "pipeline failed");
        self.advance(Stage::Failed);

        RunFailure {
            failed_at,
            reached,
            error,
            trail: self.executor.completed(),
        }
    }
}
