//! Topology model
//!
//! A topology is a list of devices (container names) and a list of links.
//! Two-member links become point-to-point veth pairs; links with more members
//! are backbones joined through the shared bridge.
//!
//! ```yaml
//! devices:
//!   - name: r1
//!   - name: r2
//! links:
//!   - name: [e0, e1]
//!     connection: [r1, r2]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read topology file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse topology: {0}")]
    Parse(String),

    #[error("Link {link} connects undeclared device '{device}'")]
    UnknownDevice { link: usize, device: String },

    #[error("Device '{0}' is declared more than once")]
    DuplicateDevice(String),

    #[error("Link {link} needs {expected} name entries, found {found}")]
    MissingLinkName {
        link: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Endpoint names; both are used for point-to-point links, only the
    /// first for backbones.
    pub name: Vec<String>,
    /// Device names this link joins, in order.
    pub connection: Vec<String>,
}

/// Shape of a link, decided by the length of its connection list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    PointToPoint,
    Backbone,
    Invalid(usize),
}

impl LinkKind {
    /// Number of `name` entries a link of this kind consumes.
    pub fn names_required(self) -> usize {
        match self {
            LinkKind::PointToPoint => 2,
            LinkKind::Backbone => 1,
            LinkKind::Invalid(_) => 0,
        }
    }
}

impl Link {
    pub fn kind(&self) -> LinkKind {
        match self.connection.len() {
            2 => LinkKind::PointToPoint,
            n if n > 2 => LinkKind::Backbone,
            n => LinkKind::Invalid(n),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Topology {
    /// Read and parse a topology file. `.json` files are parsed as JSON,
    /// everything else as YAML. No cross-reference checks are made here; see
    /// [`Topology::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let topology = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };

        debug!(
            path = %path.display(),
            devices = topology.devices.len(),
            links = topology.links.len(),
            "loaded topology"
        );
        Ok(topology)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, LoadError> {
        serde_yaml::from_str(content).map_err(|e| LoadError::Parse(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self, LoadError> {
        serde_json::from_str(content).map_err(|e| LoadError::Parse(e.to_string()))
    }

    /// Check that device names are unique, that every link member is a
    /// declared device, and that each well-shaped link carries enough names.
    ///
    /// Link size itself is left to the planner, which owns that error.
    pub fn validate(&self) -> Result<(), LoadError> {
        let mut declared = HashSet::with_capacity(self.devices.len());
        for device in &self.devices {
            if !declared.insert(device.name.as_str()) {
                return Err(LoadError::DuplicateDevice(device.name.clone()));
            }
        }

        for (index, link) in self.links.iter().enumerate() {
            if let Some(device) = link
                .connection
                .iter()
                .find(|d| !declared.contains(d.as_str()))
            {
                return Err(LoadError::UnknownDevice {
                    link: index,
                    device: device.clone(),
                });
            }

            let expected = link.kind().names_required();
            if link.name.len() < expected {
                return Err(LoadError::MissingLinkName {
                    link: index,
                    expected,
                    found: link.name.len(),
                });
            }
        }

        Ok(())
    }

    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name.as_str())
    }
}
