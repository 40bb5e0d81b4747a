//! Wire models for the control-plane REST API

use serde::{Deserialize, Serialize};

use cx_core::types::{RoutingConfig, TunnelId};

/// Path segment of the tunnel collection under an account
pub const TUNNEL_COLLECTION: &str = "cfd_tunnel";

/// Standard response envelope: `{success, errors, messages, result}`
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

fn default_success() -> bool {
    true
}

/// One entry of the envelope's `errors` list
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for ApiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// POST body creating a remotely-managed tunnel
#[derive(Debug, Serialize)]
pub struct CreateTunnelRequest<'a> {
    pub name: &'a str,
    /// Base64 of 32 random bytes
    pub tunnel_secret: String,
    /// `cloudflare` means ingress is managed through the API, not a local file
    pub config_src: &'static str,
}

/// Tunnel as returned by the API (other fields ignored)
#[derive(Debug, Deserialize)]
pub struct TunnelInfo {
    pub id: TunnelId,
    #[serde(default)]
    pub name: String,
}

/// POST body creating a DNS record
#[derive(Debug, Serialize)]
pub struct CreateDnsRecordRequest<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub content: String,
    pub proxied: bool,
    pub comment: String,
}

/// PUT body replacing a tunnel's ingress configuration
#[derive(Debug, Serialize)]
pub struct TunnelConfigurationRequest {
    pub config: RoutingConfig,
}
