//! cx-tunnel: Tunnel lifecycle for cf-expose
//!
//! Provisions the remote tunnel and DNS alias, runs the local connector
//! under supervision, and tears everything down exactly once no matter
//! which trigger (connector exit, signal, or the caller) asks for it.

pub mod connector;
pub mod lifecycle;
pub mod process;
pub mod readiness;

pub use connector::{ConnectorExit, ConnectorHandle, ConnectorSupervisor};
pub use lifecycle::{CleanupReport, TunnelLifecycleManager};
pub use process::{ProcessExit, ProcessHandle, TerminateOutcome};
pub use readiness::wait_for_local_service;
