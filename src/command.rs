//! Shell text of every command netlab sends to the host

use crate::namespace::{NsHandle, HOST_NS};

/// Ask docker for the PID of a container's init process; its network
/// namespace is the one the device lives in.
pub fn container_pid(device: &str) -> String {
    format!("docker inspect -f '{{{{.State.Pid}}}}' {device}")
}

pub fn veth_add(a: &str, b: &str) -> String {
    format!("sudo ip link add {a} type veth peer name {b}")
}

/// Move `iface` into the network namespace of process `ns`.
pub fn set_netns(iface: &str, ns: NsHandle) -> String {
    format!("sudo ip link set {iface} netns {ns}")
}

/// Bring `iface` up from inside the namespace it lives in.
pub fn link_up(iface: &str, ns: NsHandle) -> String {
    if ns == HOST_NS {
        format!("sudo ip link set {iface} up")
    } else {
        format!("sudo nsenter -t {ns} -n ip link set {iface} up")
    }
}

pub fn bridge_add(bridge: &str) -> String {
    format!("sudo ip link add name {bridge} type bridge")
}

pub fn bridge_up(bridge: &str) -> String {
    format!("sudo ip link set {bridge} up")
}

pub fn bridge_attach(iface: &str, bridge: &str) -> String {
    format!("sudo ip link set {iface} master {bridge}")
}
