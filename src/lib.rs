//! Emulated network topologies over running containers
//!
//! netlab takes a declarative list of devices and links, looks up the network
//! namespace of every device container on a host, and wires the links with veth
//! pairs. Links with more than two members ("backbones") get one veth per
//! device whose host-side end is enslaved to a shared bridge.
//!
//! The stages run in a fixed order:
//!
//! - [`topology`]: device/link model and topology file loading
//! - [`namespace`]: device name to namespace handle resolution
//! - [`plan`]: veth pair derivation from links
//! - [`provision`]: veth creation, namespace moves and bring-up
//! - [`bridge`]: backbone bridge creation and port attachment
//!
//! [`pipeline::Pipeline`] drives all of them against a [`CommandExecutor`].

pub mod bridge;
pub mod command;
pub mod executor;
pub mod namespace;
pub mod pipeline;
pub mod plan;
pub mod provision;
pub mod testing;
pub mod topology;

pub use bridge::{attach_backbone, BridgeError, BridgeReport, BridgeStep, DEFAULT_BRIDGE};
pub use executor::{
    CommandError, CommandExecutor, CompletedCommand, ExecFailure, Journal, LocalExecutor,
    SshConfig, SshExecutor, TransportError,
};
pub use namespace::{resolve_namespaces, NamespaceMap, NsHandle, ResolutionError, HOST_NS};
pub use pipeline::{Pipeline, PipelineOptions, RunFailure, RunReport, Stage};
pub use plan::{plan_veths, Endpoint, PlanError, PlanOptions, VethPeer};
pub use provision::{provision_veths, ProvisionError, ProvisionStep};
pub use topology::{Device, Link, LinkKind, LoadError, Topology};

use thiserror::Error;

/// Any failure that ends a run, tagged by the stage that produced it.
#[derive(Error, Debug)]
pub enum NetlabError {
    #[error("Topology load failed")]
    Load(#[from] LoadError),

    #[error("Namespace resolution failed")]
    Resolution(#[from] ResolutionError),

    #[error("Veth planning failed")]
    Plan(#[from] PlanError),

    #[error("Veth provisioning failed")]
    Provision(#[from] ProvisionError),

    #[error("Backbone bridge setup failed")]
    Bridge(#[from] BridgeError),
}

impl NetlabError {
    /// The pipeline stage whose work produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            NetlabError::Load(_) => Stage::TopologyLoaded,
            NetlabError::Resolution(_) => Stage::NamespacesResolved,
            NetlabError::Plan(_) => Stage::Planned,
            NetlabError::Provision(_) => Stage::VethsProvisioned,
            NetlabError::Bridge(_) => Stage::BackboneAttached,
        }
    }
}
