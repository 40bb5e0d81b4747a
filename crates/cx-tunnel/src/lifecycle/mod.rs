//! Tunnel lifecycle state machine

mod manager;
mod report;

pub use manager::TunnelLifecycleManager;
pub use report::CleanupReport;
