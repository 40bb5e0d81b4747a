//! `cleanup`: remove resources left behind by a run that did not exit cleanly

use std::path::PathBuf;

use anyhow::{Context, Result};

use cx_control::{ControlPlane, ControlPlaneClient};
use cx_core::config::{self, ApiCredentials};
use cx_core::types::TunnelId;
use cx_tunnel::CleanupReport;

use crate::output::{format_cleanup_report, print_info, print_warning};

pub async fn cleanup_command(
    config_path: Option<&PathBuf>,
    hostname: &str,
    tunnel_id: Option<&str>,
) -> Result<()> {
    let file = config::load_or_default(config_path.map(PathBuf::as_path))
        .context("Failed to load configuration")?;
    let credentials =
        ApiCredentials::from_env().context("Cloudflare credentials are incomplete")?;
    let client = ControlPlaneClient::from_config(credentials, &file.tunnel)
        .context("Failed to create API client")?;

    let mut report = CleanupReport {
        performed: true,
        ..Default::default()
    };

    print_info(&format!("Removing DNS record for {}...", hostname));
    match client.delete_dns_record(hostname).await {
        Ok(deleted) => report.dns_record_deleted = deleted,
        Err(e) => {
            print_warning(&format!("Failed to delete DNS record: {}", e));
            report.failures.push(format!("DNS record {}: {}", hostname, e));
        }
    }

    if let Some(id) = tunnel_id {
        let id = TunnelId::new(id);
        print_info(&format!("Removing tunnel {}...", id));
        match client.delete_tunnel(&id).await {
            Ok(deleted) => report.tunnel_deleted = deleted,
            Err(e) => {
                print_warning(&format!("Failed to delete tunnel: {}", e));
                report.failures.push(format!("tunnel {}: {}", id, e));
            }
        }
    }

    println!("{}", format_cleanup_report(&report));

    if !report.is_complete() {
        anyhow::bail!("Cleanup incomplete: {}", report.failures.join("; "));
    }
    Ok(())
}
