//! Tunnel configuration

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::connector::DEFAULT_CONNECTOR;
use crate::error::ConfigError;
use crate::types::{public_hostname, random_prefix};

/// Default control-plane endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// How the public hostname's leftmost label is chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SubdomainMode {
    /// Always use the same label
    Static { name: String },
    /// Fresh random 4-letter label on every `create()`
    Random,
}

impl Default for SubdomainMode {
    fn default() -> Self {
        SubdomainMode::Static {
            name: "apiparser".to_string(),
        }
    }
}

/// Configuration for a managed tunnel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Zone apex the public hostname lives under
    pub base_domain: String,

    /// Port of the local HTTP service being exposed
    pub local_port: u16,

    /// Prefix for the remote tunnel name; a Unix timestamp is appended
    pub name_prefix: String,

    /// Control-plane API base URL
    pub api_base_url: String,

    /// Per-request timeout for control-plane calls
    #[serde(with = "duration_secs")]
    pub api_timeout: Duration,

    /// How long the connector gets to exit after SIGTERM before it is killed
    #[serde(with = "duration_secs")]
    pub grace_period: Duration,

    /// Connector executable, resolved from PATH unless absolute
    pub connector_program: String,

    /// Arguments placed before the token when launching the connector
    pub connector_args: Vec<String>,

    /// Subdomain selection
    pub subdomain: SubdomainMode,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            base_domain: "cfsedev.org".to_string(),
            local_port: 8000,
            name_prefix: "cf-expose".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout: Duration::from_secs(30),
            grace_period: Duration::from_secs(5),
            connector_program: DEFAULT_CONNECTOR.to_string(),
            connector_args: vec!["tunnel".to_string(), "run".to_string(), "--token".to_string()],
            subdomain: SubdomainMode::default(),
        }
    }
}

impl TunnelConfig {
    /// Compute the public hostname according to the subdomain mode
    pub fn resolve_hostname<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        match &self.subdomain {
            SubdomainMode::Static { name } => public_hostname(name, &self.base_domain),
            SubdomainMode::Random => public_hostname(&random_prefix(rng), &self.base_domain),
        }
    }

    /// Local origin URL traffic is forwarded to
    pub fn local_service_url(&self) -> String {
        format!("http://localhost:{}", self.local_port)
    }

    /// Check values that would otherwise fail deep inside provisioning
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_domain.trim().is_empty() {
            return Err(ConfigError::MissingField("tunnel.base_domain".to_string()));
        }
        if self.local_port == 0 {
            return Err(ConfigError::Invalid(
                "tunnel.local_port must be non-zero".to_string(),
            ));
        }
        if let SubdomainMode::Static { name } = &self.subdomain {
            if name.is_empty() {
                return Err(ConfigError::MissingField("tunnel.subdomain.name".to_string()));
            }
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(ConfigError::Invalid(format!(
                    "tunnel.subdomain.name '{}' is not a valid DNS label",
                    name
                )));
            }
        }
        if self.connector_program.is_empty() {
            return Err(ConfigError::MissingField("tunnel.connector_program".to_string()));
        }
        Ok(())
    }
}
