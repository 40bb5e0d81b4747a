//! HTTP implementation of the control plane

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;

use cx_core::config::{ApiCredentials, TunnelConfig};
use cx_core::error::ControlPlaneError;
use cx_core::types::{
    DnsAliasRecord, DnsRecordId, RoutingConfig, TunnelId, TunnelResource, TunnelSecret,
    TunnelToken,
};

use crate::api::{
    ApiEnvelope, CreateDnsRecordRequest, CreateTunnelRequest, TunnelConfigurationRequest,
    TunnelInfo, TUNNEL_COLLECTION,
};
use crate::plane::ControlPlane;

/// Cap on the TCP/TLS connect phase, below the overall request timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request/response client for the tunnel and DNS API
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    credentials: ApiCredentials,
}

impl ControlPlaneClient {
    /// Create a client against `base_url` with a per-request `timeout`
    pub fn new(
        credentials: ApiCredentials,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ControlPlaneError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .user_agent(concat!("cf-expose/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Create a client using the endpoint and timeout from the tunnel config
    pub fn from_config(
        credentials: ApiCredentials,
        config: &TunnelConfig,
    ) -> Result<Self, ControlPlaneError> {
        Self::new(credentials, config.api_base_url.clone(), config.api_timeout)
    }

    fn tunnels_url(&self) -> String {
        format!(
            "{}/accounts/{}/{}",
            self.base_url, self.credentials.account_id, TUNNEL_COLLECTION
        )
    }

    fn tunnel_url(&self, tunnel_id: &TunnelId) -> String {
        format!("{}/{}", self.tunnels_url(), tunnel_id)
    }

    fn dns_records_url(&self) -> String {
        format!(
            "{}/zones/{}/dns_records",
            self.base_url, self.credentials.zone_id
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTHORIZATION, self.credentials.bearer())
    }

    /// Send a request and unwrap the envelope's `result`
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ControlPlaneError> {
        let envelope: ApiEnvelope<T> = self.send_envelope(request).await?;
        envelope
            .result
            .ok_or_else(|| ControlPlaneError::Decode("response has no result".to_string()))
    }

    /// Send a request whose result is irrelevant
    async fn send_unit(&self, request: RequestBuilder) -> Result<(), ControlPlaneError> {
        self.send_envelope::<serde_json::Value>(request).await?;
        Ok(())
    }

    async fn send_envelope<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<ApiEnvelope<T>, ControlPlaneError> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;

        tracing::debug!("{} {}", status.as_u16(), url.path());

        if !status.is_success() {
            return Err(ControlPlaneError::Api {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(ApiEnvelope {
                success: true,
                errors: vec![],
                result: None,
            });
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
            .map_err(|e| ControlPlaneError::Decode(format!("{} for {}", e, url.path())))?;

        if !envelope.success {
            let reason = envelope
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ControlPlaneError::Api {
                status: status.as_u16(),
                reason,
                body,
            });
        }

        Ok(envelope)
    }

    async fn delete_dns_record_by_id(&self, record_id: &DnsRecordId) -> Result<bool, ControlPlaneError> {
        let url = format!("{}/{}", self.dns_records_url(), record_id);
        match self.send_unit(self.request(Method::DELETE, &url)).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => {
                tracing::info!("DNS record {} already gone", record_id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    async fn create_tunnel(&self, name: &str) -> Result<TunnelResource, ControlPlaneError> {
        let secret = TunnelSecret::generate();
        let body = CreateTunnelRequest {
            name,
            tunnel_secret: secret.to_base64(),
            config_src: "cloudflare",
        };

        let info: TunnelInfo = self
            .send(self.request(Method::POST, &self.tunnels_url()).json(&body))
            .await?;

        tracing::info!("Created tunnel {} ({})", name, info.id);

        Ok(TunnelResource {
            id: info.id,
            name: if info.name.is_empty() {
                name.to_string()
            } else {
                info.name
            },
            secret,
            token: None,
        })
    }

    async fn find_dns_record(
        &self,
        hostname: &str,
    ) -> Result<Option<DnsAliasRecord>, ControlPlaneError> {
        let request = self
            .request(Method::GET, &self.dns_records_url())
            .query(&[("type", "CNAME"), ("name", hostname)]);

        let records: Vec<DnsAliasRecord> = self.send(request).await?;
        Ok(records
            .into_iter()
            .find(|r| r.hostname.eq_ignore_ascii_case(hostname)))
    }

    async fn upsert_dns_record(
        &self,
        hostname: &str,
        tunnel_id: &TunnelId,
    ) -> Result<DnsAliasRecord, ControlPlaneError> {
        // The API rejects a second record with the same name
        if let Some(existing) = self.find_dns_record(hostname).await? {
            tracing::info!(
                "Found existing DNS record {} for {}, deleting it",
                existing.id,
                hostname
            );
            self.delete_dns_record_by_id(&existing.id).await?;
        }

        let body = CreateDnsRecordRequest {
            name: hostname,
            record_type: "CNAME",
            content: tunnel_id.dns_target(),
            proxied: true,
            comment: format!("Managed by cf-expose for tunnel {}", tunnel_id),
        };

        let record: DnsAliasRecord = self
            .send(self.request(Method::POST, &self.dns_records_url()).json(&body))
            .await?;

        tracing::info!("Created DNS record {} for {}", record.id, hostname);
        Ok(record)
    }

    async fn set_routing_config(
        &self,
        tunnel_id: &TunnelId,
        hostname: &str,
        local_port: u16,
    ) -> Result<(), ControlPlaneError> {
        let url = format!("{}/configurations", self.tunnel_url(tunnel_id));
        let body = TunnelConfigurationRequest {
            config: RoutingConfig::for_local_service(hostname, local_port),
        };

        self.send_unit(self.request(Method::PUT, &url).json(&body))
            .await?;

        tracing::info!(
            "Tunnel {} routes {} to localhost:{}",
            tunnel_id,
            hostname,
            local_port
        );
        Ok(())
    }

    async fn fetch_token(&self, tunnel_id: &TunnelId) -> Result<TunnelToken, ControlPlaneError> {
        let url = format!("{}/token", self.tunnel_url(tunnel_id));
        let token: String = self.send(self.request(Method::GET, &url)).await?;
        if token.is_empty() {
            return Err(ControlPlaneError::Decode("empty tunnel token".to_string()));
        }
        Ok(TunnelToken::new(token))
    }

    async fn delete_dns_record(&self, hostname: &str) -> Result<bool, ControlPlaneError> {
        match self.find_dns_record(hostname).await? {
            Some(record) => self.delete_dns_record_by_id(&record.id).await,
            None => {
                tracing::info!("No DNS record for {} to delete", hostname);
                Ok(false)
            }
        }
    }

    async fn delete_tunnel(&self, tunnel_id: &TunnelId) -> Result<bool, ControlPlaneError> {
        match self
            .send_unit(self.request(Method::DELETE, &self.tunnel_url(tunnel_id)))
            .await
        {
            Ok(()) => {
                tracing::info!("Deleted tunnel {}", tunnel_id);
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("Tunnel {} already gone", tunnel_id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
