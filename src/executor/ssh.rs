use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{capture, run_checked, CommandError, CommandExecutor, ExecFailure};

/// Connection settings for the container host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Password authentication goes through `sshpass`; without it the
    /// client relies on keys or an agent.
    pub password: Option<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22,
            user: "netlab".to_string(),
            password: None,
        }
    }
}

impl SshConfig {
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Runs each command in a fresh session of the system `ssh` client.
///
/// Host keys are not verified, matching the disposable lab hosts this is
/// pointed at.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Program and argument list for running `remote` on the host.
    ///
    /// The password is never part of the argument list; it is handed to
    /// `sshpass -e` through the environment.
    pub fn argv(&self, remote: &str) -> (&'static str, Vec<String>) {
        let mut args = Vec::new();
        let program = if self.config.password.is_some() {
            args.extend(["-e".to_string(), "ssh".to_string()]);
            "sshpass"
        } else {
            "ssh"
        };

        args.extend(
            [
                "-p",
                &self.config.port.to_string(),
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "LogLevel=ERROR",
            ]
            .map(String::from),
        );
        if self.config.password.is_none() {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }
        args.push(self.config.destination());
        args.push("--".to_string());
        args.push(remote.to_string());

        (program, args)
    }

    /// Run a no-op on the host to fail early on bad address or credentials.
    pub async fn check(&self) -> Result<(), CommandError> {
        info!(destination = %self.config.destination(), port = self.config.port, "checking SSH access");
        run_checked(self, "true").await?;
        Ok(())
    }
}

#[async_trait]
impl CommandExecutor for SshExecutor {
    async fn run(&self, command: &str) -> Result<String, ExecFailure> {
        let (program, args) = self.argv(command);
        let mut cmd = Command::new(program);
        cmd.args(&args);
        if let Some(password) = &self.config.password {
            cmd.env("SSHPASS", password);
        }

        debug!(host = %self.config.host, command, "ssh exec");
        capture(cmd, program).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_with_keys() {
        let exec = SshExecutor::new(SshConfig {
            host: "10.0.0.5".into(),
            port: 2222,
            user: "lab".into(),
            password: None,
        });

        let (program, args) = exec.argv("sudo ip link set backbone up");
        assert_eq!(program, "ssh");
        assert_eq!(&args[..2], ["-p", "2222"]);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(
            &args[args.len() - 3..],
            ["lab@10.0.0.5", "--", "sudo ip link set backbone up"]
        );
    }

    #[test]
    fn test_argv_with_password_keeps_secret_out() {
        let exec = SshExecutor::new(SshConfig {
            password: Some("s3cret".into()),
            ..SshConfig::default()
        });

        let (program, args) = exec.argv("true");
        assert_eq!(program, "sshpass");
        assert_eq!(&args[..2], ["-e", "ssh"]);
        assert!(!args.iter().any(|a| a.contains("s3cret")));
        assert!(!args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"netlab@localhost".to_string()));
    }

    #[test]
    fn test_default_config() {
        let config = SshConfig::default();
        assert_eq!(config.port, 22);
        assert_eq!(config.destination(), "netlab@localhost");
    }
}
