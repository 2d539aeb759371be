//! Veth planning
//!
//! Turns links into veth pairs. A point-to-point link `[A, B]` named
//! `[nA, nB]` becomes one pair `nA-nB` (in A) <-> `nB-nA` (in B). A backbone
//! link over `[D1..Dn]` named `m` becomes one pair per device, `Di-m` (in Di)
//! <-> `m-Di` (in the host namespace); the bridge later joins the host ends.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::namespace::{NamespaceMap, NsHandle, HOST_NS};
use crate::topology::{Link, LinkKind, Topology};

/// Device name recorded on the host side of backbone pairs.
pub const HOST_DEVICE: &str = "host";

/// Linux limit on interface names, excluding the trailing NUL.
pub const MAX_INTERFACE_NAME: usize = 15;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("Link {link} has unexpected size {}: {connection:?}", .connection.len())]
    UnexpectedLinkSize { link: usize, connection: Vec<String> },

    #[error("Link {link} needs {expected} name entries, found {found}")]
    MissingLinkName {
        link: usize,
        expected: usize,
        found: usize,
    },

    #[error("Could not find namespace for device '{device}' (link {link})")]
    UnresolvedDevice { link: usize, device: String },

    #[error("Interface name '{0}' is planned more than once")]
    DuplicateInterface(String),

    #[error("Invalid interface name '{0}' (1-15 chars of [A-Za-z0-9_.-], not starting with '-')")]
    InvalidInterfaceName(String),
}

/// One end of a veth pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub device: String,
    pub interface: String,
    pub namespace: NsHandle,
}

impl Endpoint {
    pub fn is_host(&self) -> bool {
        self.namespace == HOST_NS
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.device, self.interface, self.namespace)
    }
}

/// A planned veth pair. For backbone links `b` is the host side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VethPeer {
    pub a: Endpoint,
    pub b: Endpoint,
}

impl VethPeer {
    pub fn endpoints(&self) -> [&Endpoint; 2] {
        [&self.a, &self.b]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    /// Reject plans where two endpoints share an interface name.
    pub check_unique_names: bool,
    /// Reject interface names the kernel would refuse.
    pub check_name_format: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            check_unique_names: true,
            check_name_format: true,
        }
    }
}

/// Derive the veth pairs for every link, in link order.
pub fn plan_veths(
    topology: &Topology,
    namespaces: &NamespaceMap,
    options: PlanOptions,
) -> Result<Vec<VethPeer>, PlanError> {
    let mut veths = Vec::new();

    for (index, link) in topology.links.iter().enumerate() {
        match link.kind() {
            LinkKind::PointToPoint => veths.push(point_to_point(index, link, namespaces)?),
            LinkKind::Backbone => veths.extend(backbone(index, link, namespaces)?),
            LinkKind::Invalid(_) => {
                return Err(PlanError::UnexpectedLinkSize {
                    link: index,
                    connection: link.connection.clone(),
                })
            }
        }
    }

    if options.check_name_format {
        if let Some(bad) = veths
            .iter()
            .flat_map(VethPeer::endpoints)
            .find(|e| !is_valid_interface_name(&e.interface))
        {
            return Err(PlanError::InvalidInterfaceName(bad.interface.clone()));
        }
    }

    if options.check_unique_names {
        let mut seen = HashSet::new();
        for endpoint in veths.iter().flat_map(VethPeer::endpoints) {
            if !seen.insert(endpoint.interface.as_str()) {
                return Err(PlanError::DuplicateInterface(endpoint.interface.clone()));
            }
        }
    }

    info!(links = topology.links.len(), veths = veths.len(), "planned veth pairs");
    Ok(veths)
}

fn point_to_point(index: usize, link: &Link, namespaces: &NamespaceMap) -> Result<VethPeer, PlanError> {
    let [name_a, name_b] = link_names::<2>(index, link)?;
    let (device_a, device_b) = (&link.connection[0], &link.connection[1]);

    let veth = VethPeer {
        a: Endpoint {
            device: device_a.clone(),
            interface: format!("{name_a}-{name_b}"),
            namespace: lookup(index, device_a, namespaces)?,
        },
        b: Endpoint {
            device: device_b.clone(),
            interface: format!("{name_b}-{name_a}"),
            namespace: lookup(index, device_b, namespaces)?,
        },
    };
    debug!(link = index, a = %veth.a, b = %veth.b, "point-to-point veth");
    Ok(veth)
}

fn backbone(index: usize, link: &Link, namespaces: &NamespaceMap) -> Result<Vec<VethPeer>, PlanError> {
    let [medium] = link_names::<1>(index, link)?;

    link.connection
        .iter()
        .map(|device| -> Result<VethPeer, PlanError> {
            let veth = VethPeer {
                a: Endpoint {
                    device: device.clone(),
                    interface: format!("{device}-{medium}"),
                    namespace: lookup(index, device, namespaces)?,
                },
                b: Endpoint {
                    device: HOST_DEVICE.to_string(),
                    interface: format!("{medium}-{device}"),
                    namespace: HOST_NS,
                },
            };
            debug!(link = index, a = %veth.a, b = %veth.b, "backbone veth");
            Ok(veth)
        })
        .collect()
}

fn link_names<const N: usize>(index: usize, link: &Link) -> Result<[&str; N], PlanError> {
    if link.name.len() < N {
        return Err(PlanError::MissingLinkName {
            link: index,
            expected: N,
            found: link.name.len(),
        });
    }
    Ok(std::array::from_fn(|i| link.name[i].as_str()))
}

fn lookup(index: usize, device: &str, namespaces: &NamespaceMap) -> Result<NsHandle, PlanError> {
    namespaces
        .get(device)
        .ok_or_else(|| PlanError::UnresolvedDevice {
            link: index,
            device: device.to_string(),
        })
}

/// Whether `ip link add` will accept a derived endpoint name (`nA-nB`,
/// `Di-m` or `m-Di`).
///
/// Joining two names easily overflows the 15 bytes `IFNAMSIZ` leaves for the
/// name: `eth-uplink` and `eth-core` give `eth-uplink-eth-core`. Only ASCII
/// letters, digits, `-`, `_` and `.` pass, and a leading `-` would be parsed
/// as an `ip` option.
pub fn is_valid_interface_name(name: &str) -> bool {
    match name.as_bytes() {
        [] | [b'-', ..] => false,
        bytes => {
            bytes.len() <= MAX_INTERFACE_NAME
                && bytes
                    .iter()
                    .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        }
    }
}
