//! cx-core: Core abstractions and configuration for cf-expose
//!
//! This crate provides shared types, the error taxonomy, and configuration
//! structures used by the control-plane client, the tunnel lifecycle
//! manager, and the CLI.

pub mod config;
pub mod connector;
pub mod error;
pub mod time;
pub mod types;

pub use error::{ConfigError, ControlPlaneError, ProcessError, TunnelError};
pub use types::{
    DnsAliasRecord, DnsRecordId, IngressRule, LifecycleState, RoutingConfig, TunnelId,
    TunnelResource, TunnelSecret, TunnelToken,
};
