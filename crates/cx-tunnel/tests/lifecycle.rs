//! Lifecycle manager tests
//!
//! Drives `TunnelLifecycleManager` against an in-memory control plane and
//! `sh` scripts standing in for the connector.

#![cfg(unix)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Barrier, Notify};
use tokio_util::sync::CancellationToken;

use cx_control::ControlPlane;
use cx_core::config::{SubdomainMode, TunnelConfig};
use cx_core::error::{ControlPlaneError, ProcessError, TunnelError};
use cx_core::types::{
    DnsAliasRecord, DnsRecordId, LifecycleState, RoutingConfig, TunnelId, TunnelResource,
    TunnelSecret, TunnelToken,
};
use cx_tunnel::{ConnectorExit, ConnectorSupervisor, TerminateOutcome, TunnelLifecycleManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    CreateTunnel,
    UpsertDns,
    SetRouting,
    FetchToken,
    DeleteDns,
    DeleteTunnel,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Step>,
    next_id: u32,
    tunnels: HashMap<TunnelId, String>,
    records: HashMap<String, DnsAliasRecord>,
    routing: HashMap<TunnelId, RoutingConfig>,
    fail_on: Option<Step>,
}

/// Control plane that keeps tunnels and records in memory
#[derive(Clone, Default)]
struct FakeControlPlane {
    state: Arc<Mutex<FakeState>>,
    /// Holds `create_tunnel` until notified
    gate: Option<Arc<Notify>>,
}

impl FakeControlPlane {
    fn failing_on(step: Step) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().fail_on = Some(step);
        fake
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn record(&self, step: Step) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(step);
        if state.fail_on == Some(step) {
            return Err(ControlPlaneError::Api {
                status: 500,
                reason: "Internal Server Error".to_string(),
                body: String::new(),
            });
        }
        Ok(())
    }

    fn calls(&self) -> Vec<Step> {
        self.state.lock().unwrap().calls.clone()
    }

    fn count(&self, step: Step) -> usize {
        self.calls().iter().filter(|s| **s == step).count()
    }

    fn tunnel_count(&self) -> usize {
        self.state.lock().unwrap().tunnels.len()
    }

    fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    fn dns_record(&self, hostname: &str) -> Option<DnsAliasRecord> {
        self.state.lock().unwrap().records.get(hostname).cloned()
    }

    fn routing(&self, tunnel_id: &TunnelId) -> Option<RoutingConfig> {
        self.state.lock().unwrap().routing.get(tunnel_id).cloned()
    }

    fn seed_record(&self, hostname: &str, id: &str) {
        self.state.lock().unwrap().records.insert(
            hostname.to_string(),
            DnsAliasRecord {
                id: DnsRecordId::new(id),
                hostname: hostname.to_string(),
                target: "stale.cfargotunnel.com".to_string(),
                proxied: true,
            },
        );
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn create_tunnel(&self, name: &str) -> Result<TunnelResource, ControlPlaneError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.record(Step::CreateTunnel)?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = TunnelId::new(format!("tun-{}", state.next_id));
        state.tunnels.insert(id.clone(), name.to_string());
        Ok(TunnelResource {
            id,
            name: name.to_string(),
            secret: TunnelSecret::generate(),
            token: None,
        })
    }

    async fn find_dns_record(
        &self,
        hostname: &str,
    ) -> Result<Option<DnsAliasRecord>, ControlPlaneError> {
        Ok(self.dns_record(hostname))
    }

    async fn upsert_dns_record(
        &self,
        hostname: &str,
        tunnel_id: &TunnelId,
    ) -> Result<DnsAliasRecord, ControlPlaneError> {
        self.record(Step::UpsertDns)?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let record = DnsAliasRecord {
            id: DnsRecordId::new(format!("rec-{}", state.next_id)),
            hostname: hostname.to_string(),
            target: tunnel_id.dns_target(),
            proxied: true,
        };
        state.records.insert(hostname.to_string(), record.clone());
        Ok(record)
    }

    async fn set_routing_config(
        &self,
        tunnel_id: &TunnelId,
        hostname: &str,
        local_port: u16,
    ) -> Result<(), ControlPlaneError> {
        self.record(Step::SetRouting)?;
        self.state.lock().unwrap().routing.insert(
            tunnel_id.clone(),
            RoutingConfig::for_local_service(hostname, local_port),
        );
        Ok(())
    }

    async fn fetch_token(&self, tunnel_id: &TunnelId) -> Result<TunnelToken, ControlPlaneError> {
        self.record(Step::FetchToken)?;
        Ok(TunnelToken::new(format!("token-for-{}", tunnel_id)))
    }

    async fn delete_dns_record(&self, hostname: &str) -> Result<bool, ControlPlaneError> {
        self.record(Step::DeleteDns)?;
        Ok(self.state.lock().unwrap().records.remove(hostname).is_some())
    }

    async fn delete_tunnel(&self, tunnel_id: &TunnelId) -> Result<bool, ControlPlaneError> {
        self.record(Step::DeleteTunnel)?;
        Ok(self.state.lock().unwrap().tunnels.remove(tunnel_id).is_some())
    }
}

/// Connector stand-in: `sh -c SCRIPT cloudflared-stub <token>`
fn stub_connector(script: &str) -> ConnectorSupervisor {
    ConnectorSupervisor::new(
        "sh",
        vec![
            "-c".to_string(),
            script.to_string(),
            "cloudflared-stub".to_string(),
        ],
    )
}

fn test_config() -> TunnelConfig {
    TunnelConfig {
        grace_period: Duration::from_secs(2),
        ..Default::default()
    }
}

fn manager_with(
    fake: &FakeControlPlane,
    connector: ConnectorSupervisor,
    config: TunnelConfig,
) -> TunnelLifecycleManager<FakeControlPlane> {
    TunnelLifecycleManager::new(fake.clone(), connector, config)
}

#[tokio::test]
async fn test_create_static_hostname_and_routing() {
    let fake = FakeControlPlane::default();
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());

    let hostname = manager.create().await.unwrap();
    assert_eq!(hostname, "apiparser.cfsedev.org");
    assert_eq!(manager.state(), LifecycleState::Active);
    assert_eq!(manager.public_url().as_deref(), Some("https://apiparser.cfsedev.org"));

    assert_eq!(
        fake.calls(),
        vec![
            Step::CreateTunnel,
            Step::UpsertDns,
            Step::SetRouting,
            Step::FetchToken
        ]
    );
    assert_eq!(fake.tunnel_count(), 1);
    assert_eq!(fake.record_count(), 1);

    let tunnel_id = manager.tunnel_id().unwrap();
    let record = fake.dns_record(&hostname).unwrap();
    assert_eq!(record.hostname, hostname);
    assert_eq!(record.target, tunnel_id.dns_target());
    assert_eq!(manager.dns_record_id(), Some(record.id));

    let routing = fake.routing(&tunnel_id).unwrap();
    assert!(routing.is_well_formed());
    assert_eq!(
        routing.ingress[0].hostname.as_deref(),
        Some("apiparser.cfsedev.org")
    );
    assert_eq!(routing.ingress[0].service, "http://localhost:8000");
    assert_eq!(routing.ingress[1].service, "http_status:404");

    manager.cleanup().await;
}

#[tokio::test]
async fn test_create_random_hostname() {
    let fake = FakeControlPlane::default();
    let config = TunnelConfig {
        subdomain: SubdomainMode::Random,
        ..test_config()
    };
    let manager = manager_with(&fake, stub_connector("exit 0"), config);

    let hostname = manager.create().await.unwrap();
    let (prefix, domain) = hostname.split_once('.').unwrap();
    assert_eq!(domain, "cfsedev.org");
    assert_eq!(prefix.len(), 4);
    assert!(prefix.chars().all(|c| c.is_ascii_lowercase()));

    manager.cleanup().await;
}

#[tokio::test]
async fn test_create_replaces_existing_record() {
    let fake = FakeControlPlane::default();
    fake.seed_record("apiparser.cfsedev.org", "old-rec");
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());

    manager.create().await.unwrap();
    assert_eq!(fake.record_count(), 1);
    let record = fake.dns_record("apiparser.cfsedev.org").unwrap();
    assert_ne!(record.id.as_str(), "old-rec");

    manager.cleanup().await;
}

#[tokio::test]
async fn test_create_tunnel_failure_stops_sequence() {
    let fake = FakeControlPlane::failing_on(Step::CreateTunnel);
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());

    let err = manager.create().await.unwrap_err();
    match err {
        TunnelError::ControlPlane(e) => assert_eq!(e.status(), Some(500)),
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(fake.calls(), vec![Step::CreateTunnel]);
    assert_eq!(manager.state(), LifecycleState::Idle);
    assert!(!manager.has_recorded_resources());
    assert!(manager.tunnel_id().is_none());
    assert!(manager.hostname().is_none());
}

#[tokio::test]
async fn test_mid_sequence_failure_keeps_resources_for_cleanup() {
    let fake = FakeControlPlane::failing_on(Step::SetRouting);
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());

    manager.create().await.unwrap_err();
    assert_eq!(manager.state(), LifecycleState::Cleaning);
    assert!(manager.has_recorded_resources());
    assert_eq!(fake.count(Step::FetchToken), 0);
    // No inline rollback
    assert_eq!(fake.tunnel_count(), 1);
    assert_eq!(fake.record_count(), 1);

    let report = manager.cleanup().await;
    assert!(report.performed);
    assert!(report.dns_record_deleted);
    assert!(report.tunnel_deleted);
    assert!(report.connector.is_none());
    assert_eq!(fake.tunnel_count(), 0);
    assert_eq!(fake.record_count(), 0);
    assert_eq!(manager.state(), LifecycleState::Terminated);
}

#[tokio::test]
async fn test_create_twice_is_rejected() {
    let fake = FakeControlPlane::default();
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());

    manager.create().await.unwrap();
    let err = manager.create().await.unwrap_err();
    assert!(matches!(
        err,
        TunnelError::InvalidState {
            state: LifecycleState::Active,
            ..
        }
    ));
    assert_eq!(fake.count(Step::CreateTunnel), 1);

    manager.cleanup().await;
}

#[tokio::test]
async fn test_run_requires_active() {
    let fake = FakeControlPlane::default();
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());

    let err = manager.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        TunnelError::InvalidState {
            operation: "run",
            state: LifecycleState::Idle
        }
    ));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_run_passes_token_and_cleans_up_on_exit() {
    let fake = FakeControlPlane::default();
    let manager = manager_with(
        &fake,
        stub_connector("case \"$1\" in token-for-tun-*) exit 0;; *) exit 9;; esac"),
        test_config(),
    );

    manager.create().await.unwrap();
    let exit = manager.run(&CancellationToken::new()).await.unwrap();
    assert!(matches!(exit, ConnectorExit::Exited(status) if status.success()));

    assert_eq!(manager.state(), LifecycleState::Terminated);
    assert_eq!(fake.count(Step::DeleteDns), 1);
    assert_eq!(fake.count(Step::DeleteTunnel), 1);
    assert_eq!(fake.tunnel_count(), 0);
    assert_eq!(fake.record_count(), 0);
}

#[tokio::test]
async fn test_run_abnormal_exit_is_process_error() {
    let fake = FakeControlPlane::default();
    let manager = manager_with(&fake, stub_connector("exit 4"), test_config());

    manager.create().await.unwrap();
    let err = manager.run(&CancellationToken::new()).await.unwrap_err();
    match err {
        TunnelError::Process(ProcessError::Exited { status, .. }) => {
            assert_eq!(status.code(), Some(4))
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // Runtime failure takes the same cleanup path
    assert_eq!(manager.state(), LifecycleState::Terminated);
    assert_eq!(fake.tunnel_count(), 0);
}

#[tokio::test]
async fn test_missing_connector_still_cleans_up() {
    let fake = FakeControlPlane::default();
    let connector = ConnectorSupervisor::new("cf-expose-no-such-connector", vec![]);
    let manager = manager_with(&fake, connector, test_config());

    manager.create().await.unwrap();
    let err = manager.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        TunnelError::Process(ProcessError::NotInstalled { .. })
    ));

    assert_eq!(fake.count(Step::DeleteDns), 1);
    assert_eq!(fake.count(Step::DeleteTunnel), 1);
    assert_eq!(fake.tunnel_count(), 0);
    assert_eq!(fake.record_count(), 0);
    assert_eq!(manager.state(), LifecycleState::Terminated);
}

#[tokio::test]
async fn test_interrupt_while_running() {
    let fake = FakeControlPlane::default();
    let manager = manager_with(&fake, stub_connector("exec sleep 30"), test_config());
    manager.create().await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let exit = manager.run(&cancel).await.unwrap();
    assert_eq!(exit, ConnectorExit::Stopped);
    assert!(start.elapsed() < Duration::from_secs(5));

    assert_eq!(manager.state(), LifecycleState::Terminated);
    assert_eq!(fake.count(Step::DeleteDns), 1);
    assert_eq!(fake.count(Step::DeleteTunnel), 1);

    // Later triggers are no-ops
    let report = manager.cleanup().await;
    assert!(!report.performed);
    assert_eq!(fake.count(Step::DeleteDns), 1);
    assert_eq!(fake.count(Step::DeleteTunnel), 1);
}

#[tokio::test]
async fn test_stubborn_connector_is_killed_after_grace() {
    let fake = FakeControlPlane::default();
    let config = TunnelConfig {
        grace_period: Duration::from_millis(300),
        ..Default::default()
    };
    let manager = Arc::new(manager_with(
        &fake,
        stub_connector("trap '' TERM; exec sleep 30"),
        config,
    ));
    manager.create().await.unwrap();

    let runner = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run(&CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;

    let report = manager.cleanup().await;
    assert!(report.performed);
    assert_eq!(report.connector, Some(TerminateOutcome::Killed));

    let exit = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("run() did not return")
        .unwrap()
        .unwrap();
    assert_eq!(exit, ConnectorExit::Stopped);
    assert_eq!(fake.count(Step::DeleteTunnel), 1);
}

#[tokio::test]
async fn test_cleanup_twice_is_noop() {
    let fake = FakeControlPlane::default();
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());
    manager.create().await.unwrap();

    let first = manager.cleanup().await;
    assert!(first.performed);
    assert!(first.is_complete());

    let second = manager.cleanup().await;
    assert!(!second.performed);
    assert_eq!(fake.count(Step::DeleteDns), 1);
    assert_eq!(fake.count(Step::DeleteTunnel), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cleanup_runs_once() {
    let fake = FakeControlPlane::default();
    let manager = Arc::new(manager_with(&fake, stub_connector("exit 0"), test_config()));
    manager.create().await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.cleanup().await })
        })
        .collect();

    let mut performed = 0;
    for task in tasks {
        if task.await.unwrap().performed {
            performed += 1;
        }
    }
    assert_eq!(performed, 1);

    manager.wait_terminated().await;
    assert_eq!(fake.count(Step::DeleteDns), 1);
    assert_eq!(fake.count(Step::DeleteTunnel), 1);
}

#[tokio::test]
async fn test_cleanup_continues_after_failed_step() {
    let fake = FakeControlPlane::failing_on(Step::DeleteDns);
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());
    manager.create().await.unwrap();

    let report = manager.cleanup().await;
    assert!(report.performed);
    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert!(report.tunnel_deleted);
    assert_eq!(manager.state(), LifecycleState::Terminated);
    // The record is still recorded as outstanding
    assert!(manager.has_recorded_resources());
}

#[tokio::test]
async fn test_cleanup_before_create_is_harmless() {
    let fake = FakeControlPlane::default();
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());

    let report = manager.cleanup().await;
    assert!(report.performed);
    assert!(report.is_complete());
    assert!(fake.calls().is_empty());
    assert_eq!(manager.state(), LifecycleState::Terminated);
}

#[tokio::test]
async fn test_cleanup_report_survives_teardown_inside_run() {
    let fake = FakeControlPlane::failing_on(Step::DeleteDns);
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());
    manager.create().await.unwrap();
    assert!(manager.cleanup_report().is_none());

    // run() tears down on its own; the caller's cleanup() is then a no-op
    manager.run(&CancellationToken::new()).await.unwrap();
    assert!(!manager.cleanup().await.performed);

    let report = manager.cleanup_report().unwrap();
    assert!(report.performed);
    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("apiparser.cfsedev.org"));
    assert!(report.tunnel_deleted);
    assert_eq!(fake.record_count(), 1);
    assert!(manager.hostname().is_some());
    assert!(manager.tunnel_id().is_some());
}

#[tokio::test]
async fn test_cleanup_waits_for_inflight_provisioning() {
    let gate = Arc::new(Notify::new());
    let fake = FakeControlPlane::gated(Arc::clone(&gate));
    let manager = Arc::new(manager_with(&fake, stub_connector("exit 0"), test_config()));

    let creator = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.create().await })
    };
    manager
        .subscribe()
        .wait_for(|state| *state == LifecycleState::Provisioning)
        .await
        .unwrap();

    let cleaner = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.cleanup().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!cleaner.is_finished());
    assert_eq!(manager.state(), LifecycleState::Provisioning);

    gate.notify_one();

    let err = creator.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        TunnelError::InvalidState {
            operation: "continue provisioning",
            ..
        }
    ));
    let report = cleaner.await.unwrap();
    assert!(report.performed);
    assert!(report.tunnel_deleted);
    assert_eq!(fake.count(Step::UpsertDns), 0);
    assert_eq!(fake.tunnel_count(), 0);
    assert_eq!(manager.state(), LifecycleState::Terminated);
}

#[tokio::test]
async fn test_create_after_cleanup_is_rejected() {
    let fake = FakeControlPlane::default();
    let manager = manager_with(&fake, stub_connector("exit 0"), test_config());

    manager.cleanup().await;
    let err = manager.create().await.unwrap_err();
    assert!(matches!(
        err,
        TunnelError::InvalidState {
            operation: "create",
            ..
        }
    ));
    assert!(fake.calls().is_empty());
    assert_eq!(manager.state(), LifecycleState::Terminated);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_racing_cleanup_never_leaks() {
    for _ in 0..200 {
        let fake = FakeControlPlane::default();
        let manager = Arc::new(manager_with(&fake, stub_connector("exit 0"), test_config()));
        let barrier = Arc::new(Barrier::new(2));

        let creator = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                manager.create().await
            })
        };
        let cleaner = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                manager.cleanup().await
            })
        };

        let _ = creator.await.unwrap();
        assert!(cleaner.await.unwrap().performed);

        tokio::time::timeout(Duration::from_secs(5), manager.wait_terminated())
            .await
            .expect("lifecycle never reached Terminated");
        assert_eq!(manager.state(), LifecycleState::Terminated);
        assert_eq!(fake.tunnel_count(), 0);
        assert_eq!(fake.record_count(), 0);
        assert!(!manager.has_recorded_resources());
    }
}
