//! Core error types for cf-expose

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::types::LifecycleState;

/// Top-level error type for the tunnel lifecycle
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Control-plane error
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    /// Connector or service process error
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Operation not allowed in the current lifecycle state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    /// Local service never became reachable
    #[error("Local service on port {port} not reachable after {timeout:?}")]
    ServiceNotReady { port: u16, timeout: Duration },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field or environment variable
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Connector executable is not on the search path
    #[error("Connector executable '{0}' is not installed")]
    ConnectorNotInstalled(String),
}

/// Errors returned by the remote tunnel/DNS API
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    /// The endpoint could not be reached (DNS, connect, TLS, timeout)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-2xx status or an unsuccessful envelope
    #[error("API error {status} {reason}: {body}")]
    Api {
        status: u16,
        reason: String,
        body: String,
    },

    /// The response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ControlPlaneError {
    /// HTTP status of an API error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ControlPlaneError::Api { status, .. } => Some(*status),
            ControlPlaneError::Transport(e) => e.status().map(|s| s.as_u16()),
            ControlPlaneError::Decode(_) => None,
        }
    }

    /// Whether the API reported that the target does not exist
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Errors from supervised child processes
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Executable could not be located
    #[error("'{program}' executable not found - ensure it is installed and on PATH")]
    NotInstalled { program: String },

    /// Spawning failed for another reason
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child failed
    #[error("Failed to wait on process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// Force-kill failed
    #[error("Failed to kill process {pid}: {source}")]
    Kill {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// Process exited on its own with a failure status
    #[error("'{program}' exited abnormally: {status}")]
    Exited { program: String, status: ExitStatus },
}
