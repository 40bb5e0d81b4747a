//! cx-control: Control-plane client for cf-expose
//!
//! Wraps the remote tunnel and DNS API behind the [`ControlPlane`] trait.
//! [`ControlPlaneClient`] is the HTTP implementation; it performs no
//! retries and keeps no state between calls apart from its credentials.

pub mod api;
mod client;
mod plane;

pub use client::ControlPlaneClient;
pub use plane::ControlPlane;
