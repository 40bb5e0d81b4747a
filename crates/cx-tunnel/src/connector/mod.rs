//! Local connector process supervision

mod supervisor;

pub use supervisor::{ConnectorExit, ConnectorHandle, ConnectorSupervisor};
