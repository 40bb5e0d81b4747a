//! Local service configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// How the local web service is launched and probed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Command line launching the service; empty when it is managed elsewhere
    pub command: Vec<String>,

    /// How long to wait for the service port to accept connections
    #[serde(with = "duration_secs")]
    pub readiness_timeout: Duration,

    /// Delay between readiness probes
    #[serde(rename = "poll_interval_ms", with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            command: vec![],
            readiness_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl ServiceConfig {
    /// Whether cf-expose launches the service itself
    pub fn is_managed(&self) -> bool {
        !self.command.is_empty()
    }
}
