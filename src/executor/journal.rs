use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use super::{CommandExecutor, ExecFailure};

/// A command that ran to success, in the order it finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedCommand {
    pub command: String,
    pub output: String,
}

/// Executor wrapper that records every successful command.
///
/// Failed commands are not recorded; the trail is exactly the set of changes
/// that were applied to the host, which is what an undo layer would need.
pub struct Journal<E> {
    inner: E,
    completed: Mutex<Vec<CompletedCommand>>,
}

impl<E> Journal<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn completed(&self) -> Vec<CompletedCommand> {
        self.completed.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.completed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.lock().is_empty()
    }

    pub fn into_parts(self) -> (E, Vec<CompletedCommand>) {
        (self.inner, self.completed.into_inner())
    }
}

#[async_trait]
impl<E: CommandExecutor> CommandExecutor for Journal<E> {
    async fn run(&self, command: &str) -> Result<String, ExecFailure> {
        let output = self.inner.run(command).await?;
        self.completed.lock().push(CompletedCommand {
            command: command.to_string(),
            output: output.clone(),
        });
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedExecutor;

    #[tokio::test]
    async fn test_journal_records_only_successes() {
        let journal = Journal::new(
            ScriptedExecutor::new()
                .respond("first", "1\n")
                .fail("second", "boom"),
        );

        journal.run("first").await.unwrap();
        assert!(journal.run("second").await.is_err());
        journal.run("third").await.unwrap();

        let (inner, trail) = journal.into_parts();
        assert_eq!(
            trail.iter().map(|c| c.command.as_str()).collect::<Vec<_>>(),
            vec!["first", "third"]
        );
        assert_eq!(trail[0].output, "1\n");
        assert_eq!(inner.issued().len(), 3);
    }
}
