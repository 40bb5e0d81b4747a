//! Core domain types

use std::fmt;

use base64::Engine;
use rand::{Rng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Suffix of the routing domain every tunnel is reachable under
pub const ROUTING_DOMAIN: &str = "cfargotunnel.com";

/// Catch-all service that must terminate every ingress list
pub const CATCH_ALL_SERVICE: &str = "http_status:404";

/// Length of a generated random subdomain prefix
pub const RANDOM_PREFIX_LEN: usize = 4;

/// Identifier the control plane assigned to a tunnel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TunnelId(pub String);

impl TunnelId {
    /// Create a new tunnel ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// CNAME target routing traffic to this tunnel
    pub fn dns_target(&self) -> String {
        format!("{}.{}", self.0, ROUTING_DOMAIN)
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TunnelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a DNS record within a zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DnsRecordId(pub String);

impl DnsRecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DnsRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32 bytes of local randomness used as the tunnel secret.
///
/// Always drawn from the operating system RNG; never derived from anything
/// the server returns.
pub struct TunnelSecret([u8; 32]);

impl TunnelSecret {
    /// Generate a fresh secret from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw secret bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Standard base64 encoding, as the tunnel API expects
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl fmt::Debug for TunnelSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TunnelSecret([REDACTED])")
    }
}

/// Opaque credential the connector uses to authenticate its outbound connection
#[derive(Debug)]
pub struct TunnelToken(SecretString);

impl TunnelToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Expose the raw token. Only the connector invocation should need this.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// A remotely provisioned tunnel
#[derive(Debug)]
pub struct TunnelResource {
    pub id: TunnelId,
    pub name: String,
    pub secret: TunnelSecret,
    pub token: Option<TunnelToken>,
}

/// A CNAME record aliasing the public hostname to a tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsAliasRecord {
    pub id: DnsRecordId,
    #[serde(rename = "name")]
    pub hostname: String,
    #[serde(rename = "content")]
    pub target: String,
    #[serde(default)]
    pub proxied: bool,
}

/// One hostname-to-service mapping, evaluated first-match-wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub service: String,
}

impl IngressRule {
    /// Rule routing `hostname` to a local HTTP port
    pub fn local_http(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: Some(hostname.into()),
            service: format!("http://localhost:{}", port),
        }
    }

    /// Trailing rule answering 404 for anything unmatched
    pub fn catch_all() -> Self {
        Self {
            hostname: None,
            service: CATCH_ALL_SERVICE.to_string(),
        }
    }
}

/// Ordered ingress configuration of a tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub ingress: Vec<IngressRule>,
}

impl RoutingConfig {
    /// The two-rule configuration: `hostname -> localhost:port`, then 404
    pub fn for_local_service(hostname: &str, port: u16) -> Self {
        Self {
            ingress: vec![IngressRule::local_http(hostname, port), IngressRule::catch_all()],
        }
    }

    /// Exactly one hostname rule followed by the catch-all
    pub fn is_well_formed(&self) -> bool {
        match self.ingress.as_slice() {
            [route, last] => {
                route.hostname.is_some()
                    && last.hostname.is_none()
                    && last.service == CATCH_ALL_SERVICE
            }
            _ => false,
        }
    }
}

/// Lifecycle of a managed tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Nothing provisioned
    Idle,
    /// `create()` in progress
    Provisioning,
    /// All remote resources ready, token held
    Active,
    /// Connector running
    Running,
    /// Teardown pending or in progress
    Cleaning,
    /// Teardown finished
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::Provisioning => write!(f, "provisioning"),
            LifecycleState::Active => write!(f, "active"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Cleaning => write!(f, "cleaning"),
            LifecycleState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Generate a random lowercase alphabetic subdomain prefix
pub fn random_prefix<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..RANDOM_PREFIX_LEN)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// Join a subdomain label and a base domain
pub fn public_hostname(subdomain: &str, domain: &str) -> String {
    format!(
        "{}.{}",
        subdomain.trim_end_matches('.'),
        domain.trim_start_matches('.')
    )
}
