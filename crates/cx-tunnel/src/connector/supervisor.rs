//! Connector supervisor
//!
//! Launches the tunnel connector with the tunnel's run token and hands back
//! a [`ConnectorHandle`] that can be awaited or terminated.

use std::time::Duration;

use cx_core::config::TunnelConfig;
use cx_core::error::ProcessError;
use cx_core::types::TunnelToken;

use crate::process::{ProcessExit, ProcessHandle, TerminateOutcome};

/// A running connector process
pub type ConnectorHandle = ProcessHandle;

/// How a wait on the connector ended
pub type ConnectorExit = ProcessExit;

/// Starts and stops the connector process
#[derive(Debug, Clone)]
pub struct ConnectorSupervisor {
    program: String,
    args: Vec<String>,
}

impl Default for ConnectorSupervisor {
    fn default() -> Self {
        Self::from_config(&TunnelConfig::default())
    }
}

impl ConnectorSupervisor {
    /// Supervisor launching `program args... <token>`
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &TunnelConfig) -> Self {
        Self::new(config.connector_program.clone(), config.connector_args.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Launch the connector. Returns once the process is spawned.
    pub fn start(&self, token: &TunnelToken) -> Result<ConnectorHandle, ProcessError> {
        let mut args = self.args.clone();
        args.push(token.expose().to_string());

        // Never log args: the last one is the run token
        let handle = ProcessHandle::spawn(&self.program, &args)?;
        tracing::info!("Connector process started with PID {}", handle.pid());
        Ok(handle)
    }

    /// Block until the connector exits or is asked to stop
    pub async fn wait(&self, handle: &ConnectorHandle) -> Result<ConnectorExit, ProcessError> {
        handle.wait().await
    }

    /// SIGTERM, wait up to `grace`, then kill
    pub async fn terminate(
        &self,
        handle: &ConnectorHandle,
        grace: Duration,
    ) -> Result<TerminateOutcome, ProcessError> {
        handle.terminate(grace).await
    }
}
