//! In-memory executors for exercising netlab without a container host
//!
//! [`ScriptedExecutor`] answers by command prefix and records everything it
//! was asked to run. [`FakeHost`] keeps just enough link state to reject a
//! second `ip link add` for an existing name, the way the kernel does.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use crate::command;
use crate::executor::{CommandExecutor, ExecFailure, TransportError};

#[derive(Debug, Clone)]
enum Reply {
    Output(String),
    Fail { output: String, code: i32 },
}

/// Executor with canned replies matched by command prefix.
///
/// Rules are checked in insertion order; the first prefix match wins.
/// Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Vec<(String, Reply)>,
    issued: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, prefix: impl Into<String>, output: impl Into<String>) -> Self {
        self.rules.push((prefix.into(), Reply::Output(output.into())));
        self
    }

    /// Fail commands starting with `prefix` with exit status 1.
    pub fn fail(self, prefix: impl Into<String>, output: impl Into<String>) -> Self {
        self.fail_with(prefix, output, 1)
    }

    pub fn fail_with(
        mut self,
        prefix: impl Into<String>,
        output: impl Into<String>,
        code: i32,
    ) -> Self {
        self.rules.push((
            prefix.into(),
            Reply::Fail {
                output: output.into(),
                code,
            },
        ));
        self
    }

    /// Answer the namespace query of each container with its PID.
    pub fn with_pids(mut self, pids: &[(&str, u32)]) -> Self {
        for (device, pid) in pids {
            self = self.respond(command::container_pid(device), format!("{pid}\n"));
        }
        self
    }

    /// Every command received so far, in order, including failed ones.
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, command: &str) -> Result<String, ExecFailure> {
        self.issued.lock().push(command.to_string());

        let reply = self
            .rules
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Fail { output, code }) => {
                Err(ExecFailure::new(output, TransportError::Exit(code)))
            }
            None => Ok(String::new()),
        }
    }
}

#[derive(Debug, Default)]
struct HostState {
    links: HashSet<String>,
    issued: Vec<String>,
}

/// A container host that remembers the links created on it.
///
/// `docker inspect` answers from the PID table (unknown containers fail like
/// the docker CLI does), and `ip link add` fails for names that already
/// exist. Every other command succeeds.
#[derive(Debug, Default)]
pub struct FakeHost {
    pids: HashMap<String, u32>,
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new(pids: &[(&str, u32)]) -> Self {
        Self {
            pids: pids.iter().map(|(d, p)| (d.to_string(), *p)).collect(),
            state: Mutex::default(),
        }
    }

    pub fn issued(&self) -> Vec<String> {
        self.state.lock().issued.clone()
    }

    pub fn has_link(&self, name: &str) -> bool {
        self.state.lock().links.contains(name)
    }
}

#[async_trait]
impl CommandExecutor for FakeHost {
    async fn run(&self, command: &str) -> Result<String, ExecFailure> {
        let mut state = self.state.lock();
        state.issued.push(command.to_string());

        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            ["docker", "inspect", "-f", _, device] => match self.pids.get(*device) {
                Some(pid) => Ok(format!("{pid}\n")),
                None => Err(ExecFailure::new(
                    format!("Error: No such object: {device}\n"),
                    TransportError::Exit(1),
                )),
            },
            ["sudo", "ip", "link", "add", "name", bridge, "type", "bridge"] => {
                add_links(&mut state.links, &[*bridge])
            }
            ["sudo", "ip", "link", "add", a, "type", "veth", "peer", "name", b] => {
                add_links(&mut state.links, &[*a, *b])
            }
            _ => Ok(String::new()),
        }
    }
}

fn add_links(links: &mut HashSet<String>, names: &[&str]) -> Result<String, ExecFailure> {
    if names.iter().any(|n| links.contains(*n)) {
        return Err(ExecFailure::new(
            "RTNETLINK answers: File exists\n",
            TransportError::Exit(2),
        ));
    }
    links.extend(names.iter().map(|n| n.to_string()));
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_first_match_wins() {
        let exec = ScriptedExecutor::new()
            .fail("sudo ip link add x", "exists")
            .respond("sudo ip link add", "ok");

        assert!(exec.run("sudo ip link add x type veth peer name y").await.is_err());
        assert_eq!(exec.run("sudo ip link add z type veth peer name w").await.unwrap(), "ok");
        assert_eq!(exec.run("whoami").await.unwrap(), "");
        assert_eq!(exec.issued().len(), 3);
    }

    #[tokio::test]
    async fn test_fake_host_rejects_existing_links() {
        let host = FakeHost::new(&[("r1", 100)]);

        assert_eq!(host.run(&command::container_pid("r1")).await.unwrap(), "100\n");
        assert!(host.run(&command::container_pid("r2")).await.is_err());

        let add = command::veth_add("a-b", "b-a");
        host.run(&add).await.unwrap();
        assert!(host.has_link("a-b") && host.has_link("b-a"));

        let failure = host.run(&add).await.unwrap_err();
        assert!(failure.output.contains("File exists"));
    }
}
