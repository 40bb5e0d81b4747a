//! `up`: expose the local service until interrupted

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tokio_util::sync::CancellationToken;

use cx_control::ControlPlaneClient;
use cx_core::config::{self, ApiCredentials, ConfigFile, SubdomainMode};
use cx_core::connector::{ensure_connector_installed, get_install_instructions};
use cx_core::types::TunnelId;
use cx_tunnel::{
    wait_for_local_service, CleanupReport, ConnectorSupervisor, ProcessExit,
    TunnelLifecycleManager,
};

use crate::output::{
    format_cleanup_report, print_info, print_success, print_url, print_warning,
};
use crate::service::LocalService;

/// Command-line overrides for the `up` command
#[derive(Debug, Default, Clone)]
pub struct UpOptions {
    pub port: Option<u16>,
    pub domain: Option<String>,
    pub subdomain: Option<String>,
    pub random: bool,
    pub connector: Option<String>,
    pub skip_readiness: bool,
    pub command: Vec<String>,
}

impl UpOptions {
    /// Layer the overrides on top of the loaded configuration
    pub fn apply(&self, file: &mut ConfigFile) {
        if let Some(port) = self.port {
            file.tunnel.local_port = port;
        }
        if let Some(domain) = &self.domain {
            file.tunnel.base_domain = domain.clone();
        }
        if self.random {
            file.tunnel.subdomain = SubdomainMode::Random;
        } else if let Some(name) = &self.subdomain {
            file.tunnel.subdomain = SubdomainMode::Static { name: name.clone() };
        }
        if let Some(connector) = &self.connector {
            file.tunnel.connector_program = connector.clone();
        }
        if !self.command.is_empty() {
            file.service.command = self.command.clone();
        }
    }
}

pub async fn up_command(config_path: Option<&PathBuf>, options: UpOptions) -> Result<()> {
    let mut file = config::load_or_default(config_path.map(PathBuf::as_path))
        .context("Failed to load configuration")?;
    options.apply(&mut file);
    file.tunnel
        .validate()
        .context("Invalid tunnel configuration")?;

    let credentials =
        ApiCredentials::from_env().context("Cloudflare credentials are incomplete")?;

    let version = match ensure_connector_installed(&file.tunnel.connector_program) {
        Ok(version) => version,
        Err(e) => {
            print_info(&get_install_instructions());
            return Err(e.into());
        }
    };
    tracing::info!("Using {}", version);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let service = if file.service.is_managed() {
        let service = LocalService::start(&file.service.command)?;
        print_info(&format!("Started local service (PID {})", service.pid()));
        Some(service)
    } else {
        None
    };

    let result = expose(
        &file,
        credentials,
        &cancel,
        service.as_ref(),
        options.skip_readiness,
    )
    .await;

    if let Some(service) = service {
        if let Err(e) = service.stop(file.tunnel.grace_period).await {
            print_warning(&format!("{:#}", e));
        }
    }

    if result.is_ok() {
        print_success("Shut down cleanly");
    }
    result
}

/// Provision, run and tear down the tunnel. Teardown runs on every path.
async fn expose(
    file: &ConfigFile,
    credentials: ApiCredentials,
    cancel: &CancellationToken,
    service: Option<&LocalService>,
    skip_readiness: bool,
) -> Result<()> {
    if !skip_readiness {
        print_info(&format!(
            "Waiting for local service on port {}...",
            file.tunnel.local_port
        ));
        tokio::select! {
            ready = wait_for_local_service(
                file.tunnel.local_port,
                file.service.readiness_timeout,
                file.service.poll_interval,
            ) => ready.context("Local service did not become ready")?,
            _ = cancel.cancelled() => return Ok(()),
        }
    }

    let client = ControlPlaneClient::from_config(credentials, &file.tunnel)
        .context("Failed to create API client")?;
    let manager = TunnelLifecycleManager::new(
        client,
        ConnectorSupervisor::from_config(&file.tunnel),
        file.tunnel.clone(),
    );

    print_info("Provisioning tunnel...");
    let result = match manager.create().await {
        Err(e) => Err(e).context("Failed to create tunnel"),
        Ok(_) if cancel.is_cancelled() => {
            print_warning("Interrupted during provisioning");
            Ok(())
        }
        Ok(hostname) => {
            print_success(&format!("Tunnel ready for {}", hostname));
            print_url(&format!("https://{}", hostname));
            print_info("Press Ctrl+C to stop");

            let watch_service = async {
                if let Some(service) = service {
                    match service.exited().await {
                        Ok(ProcessExit::Exited(status)) => {
                            print_warning(&format!(
                                "Local service exited ({}), shutting down",
                                status
                            ));
                            cancel.cancel();
                        }
                        Ok(ProcessExit::Stopped) => {}
                        Err(e) => tracing::warn!("{:#}", e),
                    }
                }
                std::future::pending::<()>().await
            };

            tokio::select! {
                run = manager.run(cancel) => run.map(|_| ()).context("Connector failed"),
                _ = watch_service => Ok(()),
            }
        }
    };

    // No-op when run() already tore everything down
    manager.cleanup().await;
    manager.wait_terminated().await;

    let teardown = match manager.cleanup_report() {
        Some(report) => {
            println!("{}", format_cleanup_report(&report));
            match leftover_hint(
                &report,
                manager.hostname().as_deref(),
                manager.tunnel_id().as_ref(),
            ) {
                Some(hint) => {
                    print_warning(&hint);
                    Err(anyhow!(
                        "Cleanup incomplete: {} step(s) failed",
                        report.failures.len()
                    ))
                }
                None => Ok(()),
            }
        }
        None => Ok(()),
    };

    result.and(teardown)
}

/// Manual cleanup command for whatever an incomplete teardown left behind
fn leftover_hint(
    report: &CleanupReport,
    hostname: Option<&str>,
    tunnel_id: Option<&TunnelId>,
) -> Option<String> {
    if report.is_complete() {
        return None;
    }

    let mut command = format!(
        "cf-expose cleanup --hostname {}",
        hostname.unwrap_or("<hostname>")
    );
    if let Some(id) = tunnel_id {
        command.push_str(&format!(" --tunnel-id {}", id));
    }
    Some(format!(
        "Some resources may remain; run `{}` to remove them",
        command
    ))
}

/// Exit status when a second signal cuts teardown short
const FORCED_EXIT_CODE: i32 = 130;

/// Cancel `cancel` on Ctrl+C or SIGTERM. Teardown happens elsewhere.
///
/// A second signal exits the process at once, leaving any remote resources
/// behind.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut signals = ShutdownSignals::new();

        let name = signals.recv().await;
        tracing::info!("Received {}, initiating shutdown...", name);
        cancel.cancel();

        let name = signals.recv().await;
        tracing::warn!("Received {} again, exiting without finishing cleanup", name);
        print_warning(
            "Cleanup interrupted; run `cf-expose cleanup --hostname <hostname>` to remove leftovers",
        );
        std::process::exit(FORCED_EXIT_CODE);
    });
}

/// Ctrl+C, plus SIGTERM on unix
struct ShutdownSignals {
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl ShutdownSignals {
    fn new() -> Self {
        #[cfg(unix)]
        let terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    None
                }
            };

        Self {
            #[cfg(unix)]
            terminate,
        }
    }

    /// Wait for the next signal and return its name
    async fn recv(&mut self) -> &'static str {
        #[cfg(unix)]
        let terminate = async {
            match self.terminate.as_mut() {
                Some(signal) => {
                    signal.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => "Ctrl+C",
                Err(e) => {
                    tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending().await
                }
            },
            _ = terminate => "SIGTERM",
        }
    }
}
