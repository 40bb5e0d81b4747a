//! Local web service launched alongside the tunnel

use std::time::Duration;

use anyhow::{Context, Result};

use cx_tunnel::{ProcessExit, ProcessHandle, TerminateOutcome};

/// A web service process owned by the `up` command.
///
/// The child is killed if this value is dropped without [`stop`](Self::stop).
pub struct LocalService {
    handle: ProcessHandle,
}

impl LocalService {
    /// Launch `command[0]` with the remaining elements as arguments
    pub fn start(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("Service command is empty")?;

        let handle = ProcessHandle::spawn(program, args)
            .with_context(|| format!("Failed to start local service '{}'", program))?;
        tracing::info!("Local service '{}' started with PID {}", program, handle.pid());

        Ok(Self { handle })
    }

    pub fn pid(&self) -> u32 {
        self.handle.pid()
    }

    /// Resolves when the service exits on its own
    pub async fn exited(&self) -> Result<ProcessExit> {
        self.handle
            .wait()
            .await
            .context("Failed to wait for local service")
    }

    /// Stop the service, killing it after `grace`
    pub async fn stop(self, grace: Duration) -> Result<TerminateOutcome> {
        let outcome = self
            .handle
            .terminate(grace)
            .await
            .context("Failed to stop local service")?;
        tracing::info!("Local service stopped: {:?}", outcome);
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_stop() {
        let service = LocalService::start(&["sleep".to_string(), "30".to_string()]).unwrap();
        assert!(service.pid() > 0);
        let outcome = service.stop(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(outcome, TerminateOutcome::Graceful(_)));
    }

    #[tokio::test]
    async fn test_empty_command() {
        assert!(LocalService::start(&[]).is_err());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = LocalService::start(&["cf-expose-no-such-service".to_string()])
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("executable not found"));
    }
}
