use async_trait::async_trait;
use tokio::process::Command;

use super::{capture, CommandExecutor, ExecFailure};

/// Runs commands on this machine through `sh -c`.
///
/// Useful when netlab runs on the container host itself.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn run(&self, command: &str) -> Result<String, ExecFailure> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        capture(cmd, "sh").await
    }
}
