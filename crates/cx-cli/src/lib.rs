//! cx-cli: Command-line interface for cf-expose
//!
//! Provides the `cf-expose` binary, which puts a local web service on a
//! public hostname for as long as it runs.

pub mod commands;
pub mod output;
pub mod service;
