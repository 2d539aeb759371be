//! Namespace resolution
//!
//! Each device is a container; the PID of its init process identifies the
//! network namespace its interfaces must land in. Resolution asks the host
//! once per device and fails on the first device it cannot place.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::ParseIntError;
use thiserror::Error;
use tracing::{debug, info};

use crate::command;
use crate::executor::{run_checked, CommandError, CommandExecutor};
use crate::topology::Topology;

/// Kernel handle for a network namespace (the PID of a process inside it).
pub type NsHandle = u32;

/// The host's default namespace. Never assigned to a device.
pub const HOST_NS: NsHandle = 0;

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Namespace lookup for device '{device}' failed")]
    Command {
        device: String,
        #[source]
        source: CommandError,
    },

    #[error("Namespace lookup for device '{device}' returned '{output}', not a PID")]
    Parse {
        device: String,
        output: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Device '{0}' has no running process (PID 0); is the container stopped?")]
    HostNamespace(String),
}

/// Device name to namespace handle, fixed once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceMap {
    handles: BTreeMap<String, NsHandle>,
}

impl NamespaceMap {
    pub fn get(&self, device: &str) -> Option<NsHandle> {
        self.handles.get(device).copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NsHandle)> {
        self.handles.iter().map(|(d, ns)| (d.as_str(), *ns))
    }

    /// Handles 1..=n in declared order, for planning without a host.
    pub fn placeholder(topology: &Topology) -> Self {
        topology
            .device_names()
            .zip(1..)
            .map(|(device, ns)| (device.to_string(), ns))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, NsHandle)> for NamespaceMap {
    fn from_iter<I: IntoIterator<Item = (K, NsHandle)>>(iter: I) -> Self {
        Self {
            handles: iter.into_iter().map(|(d, ns)| (d.into(), ns)).collect(),
        }
    }
}

/// Resolve every device of `topology` to its namespace handle.
///
/// With `concurrency` 1 the queries run one at a time in declared order.
/// Larger values keep up to that many in flight; the first error still wins
/// and drops the rest.
pub async fn resolve_namespaces<E>(
    executor: &E,
    topology: &Topology,
    concurrency: usize,
) -> Result<NamespaceMap, ResolutionError>
where
    E: CommandExecutor + ?Sized,
{
    info!(devices = topology.devices.len(), "resolving device namespaces");

    let handles: Vec<(String, NsHandle)> = stream::iter(topology.device_names())
        .map(|device| resolve_device(executor, device))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(handles.into_iter().collect())
}

async fn resolve_device<E>(executor: &E, device: &str) -> Result<(String, NsHandle), ResolutionError>
where
    E: CommandExecutor + ?Sized,
{
    let output = run_checked(executor, &command::container_pid(device))
        .await
        .map_err(|source| ResolutionError::Command {
            device: device.to_string(),
            source,
        })?;

    let trimmed = output.trim();
    let ns: NsHandle = trimmed.parse().map_err(|source| ResolutionError::Parse {
        device: device.to_string(),
        output: trimmed.to_string(),
        source,
    })?;
    if ns == HOST_NS {
        return Err(ResolutionError::HostNamespace(device.to_string()));
    }

    debug!(device, ns, "resolved namespace");
    Ok((device.to_string(), ns))
}
