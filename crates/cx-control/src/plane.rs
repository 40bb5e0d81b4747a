//! Control-plane abstraction

use async_trait::async_trait;

use cx_core::error::ControlPlaneError;
use cx_core::types::{DnsAliasRecord, TunnelId, TunnelResource, TunnelToken};

/// Remote tunnel and DNS operations the lifecycle manager depends on.
///
/// Implementations must not retry; the caller owns any retry policy.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create a tunnel named `name` with a freshly generated local secret
    async fn create_tunnel(&self, name: &str) -> Result<TunnelResource, ControlPlaneError>;

    /// First CNAME record named exactly `hostname`
    async fn find_dns_record(
        &self,
        hostname: &str,
    ) -> Result<Option<DnsAliasRecord>, ControlPlaneError>;

    /// Replace any CNAME at `hostname` with a proxied alias to the tunnel
    async fn upsert_dns_record(
        &self,
        hostname: &str,
        tunnel_id: &TunnelId,
    ) -> Result<DnsAliasRecord, ControlPlaneError>;

    /// Overwrite the tunnel's ingress with `hostname -> localhost:port`, then 404
    async fn set_routing_config(
        &self,
        tunnel_id: &TunnelId,
        hostname: &str,
        local_port: u16,
    ) -> Result<(), ControlPlaneError>;

    /// Credential the local connector authenticates with
    async fn fetch_token(&self, tunnel_id: &TunnelId) -> Result<TunnelToken, ControlPlaneError>;

    /// Delete the CNAME at `hostname`; `Ok(false)` when there was none
    async fn delete_dns_record(&self, hostname: &str) -> Result<bool, ControlPlaneError>;

    /// Delete the tunnel; `Ok(false)` when it no longer exists
    async fn delete_tunnel(&self, tunnel_id: &TunnelId) -> Result<bool, ControlPlaneError>;
}
