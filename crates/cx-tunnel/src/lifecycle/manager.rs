//! Tunnel lifecycle manager
//!
//! Owns every remote and local resource of one exposed service:
//!
//! ```text
//! Idle --create()--> Provisioning --ok--> Active --run()--> Running
//!                         |                                    |
//!                         +--error--> Cleaning/Idle            v
//!                                         Cleaning --> Terminated
//! ```
//!
//! `create()` records each provisioned resource as soon as it exists and never
//! rolls back on its own. All teardown goes through `cleanup()`, which may be
//! triggered concurrently (connector exit, shutdown signal, the caller) and
//! runs its body exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use cx_control::ControlPlane;
use cx_core::config::TunnelConfig;
use cx_core::error::{ProcessError, TunnelError};
use cx_core::time::timestamped_name;
use cx_core::types::{DnsRecordId, LifecycleState, TunnelId, TunnelResource};

use super::report::CleanupReport;
use crate::connector::{ConnectorExit, ConnectorHandle, ConnectorSupervisor};

/// Resources recorded during provisioning
#[derive(Default)]
struct Resources {
    tunnel: Option<TunnelResource>,
    hostname: Option<String>,
    dns_record: Option<DnsRecordId>,
    /// Remote tunnel exists and has not been deleted yet
    tunnel_pending: bool,
    /// A DNS record may exist under `hostname` and has not been deleted yet
    dns_pending: bool,
}

impl Resources {
    fn has_pending(&self) -> bool {
        self.tunnel_pending || self.dns_pending
    }
}

/// Drives one tunnel from provisioning to teardown
pub struct TunnelLifecycleManager<C> {
    control: C,
    supervisor: ConnectorSupervisor,
    config: TunnelConfig,
    state: watch::Sender<LifecycleState>,
    resources: Mutex<Resources>,
    connector: Mutex<Option<Arc<ConnectorHandle>>>,
    cleanup_claimed: AtomicBool,
    report: Mutex<Option<CleanupReport>>,
}

impl<C: ControlPlane> TunnelLifecycleManager<C> {
    pub fn new(control: C, supervisor: ConnectorSupervisor, config: TunnelConfig) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            control,
            supervisor,
            config,
            state,
            resources: Mutex::new(Resources::default()),
            connector: Mutex::new(None),
            cleanup_claimed: AtomicBool::new(false),
            report: Mutex::new(None),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver observing every state transition
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Public hostname computed by `create()`
    pub fn hostname(&self) -> Option<String> {
        self.lock_resources().hostname.clone()
    }

    /// `https://` URL of the exposed service
    pub fn public_url(&self) -> Option<String> {
        self.hostname().map(|h| format!("https://{}", h))
    }

    /// ID of the provisioned tunnel
    pub fn tunnel_id(&self) -> Option<TunnelId> {
        self.lock_resources().tunnel.as_ref().map(|t| t.id.clone())
    }

    /// ID of the DNS record created by `create()`
    pub fn dns_record_id(&self) -> Option<DnsRecordId> {
        self.lock_resources().dns_record.clone()
    }

    /// Whether any remote resource is recorded and not yet torn down
    pub fn has_recorded_resources(&self) -> bool {
        self.lock_resources().has_pending()
    }

    /// Report of the teardown, whichever trigger performed it.
    ///
    /// `None` until cleanup has finished.
    pub fn cleanup_report(&self) -> Option<CleanupReport> {
        self.lock_report().clone()
    }

    /// Provision the tunnel, DNS alias, routing and run token.
    ///
    /// Returns the public hostname. On failure the error is returned and
    /// whatever was provisioned stays recorded; call [`cleanup`](Self::cleanup)
    /// to unwind it. The future must be driven to completion: a concurrent
    /// `cleanup()` waits for provisioning to finish before tearing down.
    pub async fn create(&self) -> Result<String, TunnelError> {
        // A claimed cleanup may not have moved the state off Idle yet
        let claimed = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Idle && !self.cleanup_claimed.load(Ordering::Acquire) {
                *state = LifecycleState::Provisioning;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(TunnelError::InvalidState {
                operation: "create",
                state: self.state(),
            });
        }

        tracing::info!("Provisioning tunnel");

        match self.provision().await {
            Ok(hostname) => {
                self.leave_provisioning(LifecycleState::Active);
                tracing::info!("Tunnel active at {}", hostname);
                Ok(hostname)
            }
            Err(e) => {
                let next = if self.has_recorded_resources() {
                    LifecycleState::Cleaning
                } else {
                    LifecycleState::Idle
                };
                self.leave_provisioning(next);
                tracing::error!("Provisioning failed: {}", e);
                Err(e)
            }
        }
    }

    fn leave_provisioning(&self, next: LifecycleState) {
        self.state.send_if_modified(|state| {
            if *state == LifecycleState::Provisioning {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    async fn provision(&self) -> Result<String, TunnelError> {
        let name = timestamped_name(&self.config.name_prefix);
        let tunnel = self.control.create_tunnel(&name).await?;
        let tunnel_id = tunnel.id.clone();
        {
            let mut resources = self.lock_resources();
            resources.tunnel = Some(tunnel);
            resources.tunnel_pending = true;
        }
        self.ensure_not_cleaning()?;

        let hostname = self.config.resolve_hostname(&mut rand::thread_rng());
        {
            let mut resources = self.lock_resources();
            resources.hostname = Some(hostname.clone());
            resources.dns_pending = true;
        }

        let record = self.control.upsert_dns_record(&hostname, &tunnel_id).await?;
        self.lock_resources().dns_record = Some(record.id);
        self.ensure_not_cleaning()?;

        self.control
            .set_routing_config(&tunnel_id, &hostname, self.config.local_port)
            .await?;
        self.ensure_not_cleaning()?;

        let token = self.control.fetch_token(&tunnel_id).await?;
        if let Some(tunnel) = self.lock_resources().tunnel.as_mut() {
            tunnel.token = Some(token);
        }

        Ok(hostname)
    }

    /// Abort provisioning once another trigger has claimed cleanup
    fn ensure_not_cleaning(&self) -> Result<(), TunnelError> {
        if self.cleanup_claimed.load(Ordering::Acquire) {
            return Err(TunnelError::InvalidState {
                operation: "continue provisioning",
                state: LifecycleState::Cleaning,
            });
        }
        Ok(())
    }

    /// Run the connector until it exits or `cancel` fires, then clean up.
    ///
    /// Requires `Active`. Returns once teardown has finished. A connector that
    /// exits unsuccessfully on its own surfaces as [`ProcessError::Exited`].
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ConnectorExit, TunnelError> {
        let started = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Active {
                *state = LifecycleState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(TunnelError::InvalidState {
                operation: "run",
                state: self.state(),
            });
        }

        if cancel.is_cancelled() {
            self.finish().await;
            return Ok(ConnectorExit::Stopped);
        }

        let spawned = {
            let resources = self.lock_resources();
            resources
                .tunnel
                .as_ref()
                .and_then(|t| t.token.as_ref())
                .map(|token| self.supervisor.start(token))
        };

        let handle = match spawned {
            Some(Ok(handle)) => Arc::new(handle),
            Some(Err(e)) => {
                tracing::error!("Failed to start connector: {}", e);
                self.finish().await;
                return Err(e.into());
            }
            None => {
                self.finish().await;
                return Err(TunnelError::InvalidState {
                    operation: "run without a token",
                    state: LifecycleState::Running,
                });
            }
        };

        *self.lock_connector() = Some(Arc::clone(&handle));

        // Cleanup may have been claimed before the handle was visible to it
        if self.cleanup_claimed.load(Ordering::Acquire) {
            if let Err(e) = handle.terminate(self.config.grace_period).await {
                tracing::warn!("Failed to stop connector: {}", e);
            }
        }

        let exit = tokio::select! {
            result = self.supervisor.wait(&handle) => result,
            _ = cancel.cancelled() => {
                tracing::info!("Shutdown requested, stopping connector");
                Ok(ConnectorExit::Stopped)
            }
        };

        self.finish().await;

        match exit? {
            ConnectorExit::Exited(status) if !status.success() => Err(ProcessError::Exited {
                program: self.supervisor.program().to_string(),
                status,
            }
            .into()),
            exit => Ok(exit),
        }
    }

    /// Clean up, or wait for whichever trigger already claimed it
    async fn finish(&self) {
        if !self.cleanup().await.performed {
            self.wait_terminated().await;
        }
    }

    /// Tear down everything recorded so far.
    ///
    /// Single-flight: only the first caller performs the work; later or
    /// concurrent callers get a report with `performed == false` immediately
    /// and can read the real one from [`cleanup_report`](Self::cleanup_report)
    /// after [`wait_terminated`](Self::wait_terminated).
    /// Each step is best-effort and failures are logged, never returned.
    pub async fn cleanup(&self) -> CleanupReport {
        if self
            .cleanup_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Cleanup already claimed");
            return CleanupReport::skipped();
        }

        // Let an in-flight create() finish recording what it provisioned.
        // The check and the move to Cleaning happen under one write lock.
        let mut rx = self.state.subscribe();
        loop {
            let entered = self.state.send_if_modified(|state| {
                if *state == LifecycleState::Provisioning {
                    false
                } else {
                    *state = LifecycleState::Cleaning;
                    true
                }
            });
            if entered || rx.changed().await.is_err() {
                break;
            }
        }
        tracing::info!("Cleaning up tunnel resources");

        let mut report = CleanupReport {
            performed: true,
            ..Default::default()
        };

        let connector = self.lock_connector().take();
        if let Some(handle) = connector {
            match self
                .supervisor
                .terminate(&handle, self.config.grace_period)
                .await
            {
                Ok(outcome) => {
                    tracing::info!("Connector stopped: {:?}", outcome);
                    report.connector = Some(outcome);
                }
                Err(e) => {
                    tracing::warn!("Failed to stop connector: {}", e);
                    report.failures.push(format!("connector: {}", e));
                }
            }
        }

        let hostname = {
            let resources = self.lock_resources();
            resources
                .dns_pending
                .then(|| resources.hostname.clone())
                .flatten()
        };
        if let Some(hostname) = hostname {
            match self.control.delete_dns_record(&hostname).await {
                Ok(deleted) => {
                    report.dns_record_deleted = deleted;
                    self.lock_resources().dns_pending = false;
                }
                Err(e) => {
                    tracing::warn!("Failed to delete DNS record for {}: {}", hostname, e);
                    report.failures.push(format!("DNS record {}: {}", hostname, e));
                }
            }
        }

        let tunnel_id = {
            let resources = self.lock_resources();
            resources
                .tunnel
                .as_ref()
                .filter(|_| resources.tunnel_pending)
                .map(|t| t.id.clone())
        };
        if let Some(tunnel_id) = tunnel_id {
            match self.control.delete_tunnel(&tunnel_id).await {
                Ok(deleted) => {
                    report.tunnel_deleted = deleted;
                    self.lock_resources().tunnel_pending = false;
                }
                Err(e) => {
                    tracing::warn!("Failed to delete tunnel {}: {}", tunnel_id, e);
                    report.failures.push(format!("tunnel {}: {}", tunnel_id, e));
                }
            }
        }

        *self.lock_report() = Some(report.clone());
        self.state.send_replace(LifecycleState::Terminated);

        if report.is_complete() {
            tracing::info!("Cleanup complete");
        } else {
            tracing::warn!(
                "Cleanup finished with {} failure(s); some resources may remain",
                report.failures.len()
            );
        }

        report
    }

    /// Block until the lifecycle reaches `Terminated`
    pub async fn wait_terminated(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| *state == LifecycleState::Terminated)
            .await;
    }

    fn lock_resources(&self) -> MutexGuard<'_, Resources> {
        self.resources.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_report(&self) -> MutexGuard<'_, Option<CleanupReport>> {
        self.report.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_connector(&self) -> MutexGuard<'_, Option<Arc<ConnectorHandle>>> {
        self.connector.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C> Drop for TunnelLifecycleManager<C> {
    fn drop(&mut self) {
        let resources = self
            .resources
            .get_mut()
            .unwrap_or_else(|e| e.into_inner());
        if !resources.has_pending() {
            return;
        }

        let hostname = resources.hostname.as_deref().unwrap_or("-");
        let tunnel = resources
            .tunnel
            .as_ref()
            .map(|t| t.id.to_string())
            .unwrap_or_else(|| "-".to_string());
        tracing::warn!(
            "Dropped with remote resources still recorded (hostname: {}, tunnel: {}); \
             run `cf-expose cleanup --hostname {} --tunnel-id {}` to remove them",
            hostname,
            tunnel,
            hostname,
            tunnel
        );
    }
}
