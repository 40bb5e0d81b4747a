//! `check`: verify credentials, configuration and the connector

use std::path::PathBuf;

use anyhow::Result;

use cx_core::config::{self, ApiCredentials};
use cx_core::connector::{connector_version, get_install_instructions};

use crate::output::{print_error, print_info, print_success};

pub fn check_command(config_path: Option<&PathBuf>) -> Result<()> {
    let mut healthy = true;

    let file = match config::load_or_default(config_path.map(PathBuf::as_path)) {
        Ok(file) => {
            print_success("Configuration loaded");
            file
        }
        Err(e) => {
            print_error(&format!("Configuration: {}", e));
            anyhow::bail!("Environment check failed");
        }
    };

    match file.tunnel.validate() {
        Ok(()) => print_success(&format!(
            "Tunnel settings valid (domain {}, port {})",
            file.tunnel.base_domain, file.tunnel.local_port
        )),
        Err(e) => {
            print_error(&format!("Tunnel settings: {}", e));
            healthy = false;
        }
    }

    match ApiCredentials::from_env() {
        Ok(credentials) => print_success(&format!(
            "Cloudflare credentials present (account {}, zone {})",
            credentials.account_id, credentials.zone_id
        )),
        Err(e) => {
            print_error(&format!("Credentials: {}", e));
            healthy = false;
        }
    }

    match connector_version(&file.tunnel.connector_program) {
        Some(version) => print_success(&format!("Connector: {}", version)),
        None => {
            print_error(&format!(
                "Connector '{}' not found",
                file.tunnel.connector_program
            ));
            print_info(&get_install_instructions());
            healthy = false;
        }
    }

    if !healthy {
        anyhow::bail!("Environment check failed");
    }
    Ok(())
}
