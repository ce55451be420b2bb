//! Shared test utilities for reef-engine tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use reef_net::{AddressResolver, AdhocController, DataMover, NetError};
use reef_types::*;
use tokio::sync::Mutex;

use crate::service::{ReefService, ServiceConfig};

/// Data mover that records every transfer it is asked to start.
#[derive(Default)]
pub struct MockMover {
    pub started: Mutex<Vec<(String, TransferId)>>,
    pub fail: AtomicBool,
    /// Never answer.
    pub hang: AtomicBool,
}

#[async_trait::async_trait]
impl DataMover for MockMover {
    async fn start_transfer(&self, address: &str, transfer: &Transfer) -> Result<(), NetError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NetError::Closed);
        }
        self.started
            .lock()
            .await
            .push((address.to_string(), transfer.id));
        Ok(())
    }
}

/// Controller that mounts storage under `/mnt/reef/<id>`.
#[derive(Default)]
pub struct MockController {
    pub deploys: AtomicUsize,
    pub terminates: AtomicUsize,
    pub addresses: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    /// Never answer deploy or terminate.
    pub hang: AtomicBool,
}

#[async_trait::async_trait]
impl AdhocController for MockController {
    async fn deploy(
        &self,
        address: &str,
        adhoc: AdhocStorageId,
        _kind: AdhocStorageType,
        _ctx: &AdhocStorageCtx,
        _resources: &AdhocStorageResources,
    ) -> Result<String, NetError> {
        self.addresses.lock().await.push(address.to_string());
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NetError::Remote {
                code: ErrorCode::Undetermined,
                message: "startup script exited with status 1".into(),
            });
        }
        self.deploys.fetch_add(1, Ordering::SeqCst);
        Ok(format!("/mnt/reef/{adhoc}"))
    }

    async fn terminate(
        &self,
        _address: &str,
        _adhoc: AdhocStorageId,
        _kind: AdhocStorageType,
        _resources: &AdhocStorageResources,
    ) -> Result<(), NetError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NetError::Closed);
        }
        self.terminates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Resolves every hostname to `<hostname>.ib:<port>`.
pub struct SuffixResolver;

#[async_trait::async_trait]
impl AddressResolver for SuffixResolver {
    async fn resolve(&self, hostname: &str, port: u16) -> Result<String, NetError> {
        Ok(format!("{hostname}.ib:{port}"))
    }
}

pub struct Harness {
    pub service: Arc<ReefService>,
    pub mover: Arc<MockMover>,
    pub controller: Arc<MockController>,
}

/// A service wired to mocks, with `default_mover` as its fallback mover.
pub fn harness_with(default_mover: Option<&str>) -> Harness {
    let mover = Arc::new(MockMover::default());
    let controller = Arc::new(MockController::default());
    let service = ReefService::new(ServiceConfig {
        default_mover_address: default_mover.map(str::to_string),
        wait_timeout: Duration::from_millis(200),
        dispatch_timeout: Duration::from_millis(100),
        controller_timeout: Duration::from_millis(100),
        ..Default::default()
    })
    .with_data_mover(mover.clone())
    .with_controller(controller.clone())
    .with_resolver(Arc::new(SuffixResolver));

    Harness {
        service: Arc::new(service),
        mover,
        controller,
    }
}

pub fn harness() -> Harness {
    harness_with(None)
}

pub fn nodes(names: &[&str]) -> Vec<Node> {
    names.iter().map(|n| Node::new(*n)).collect()
}

pub fn ctx(mode: ExecutionMode) -> AdhocStorageCtx {
    AdhocStorageCtx {
        controller_address: String::new(),
        data_mover_address: String::new(),
        execution_mode: mode,
        access_mode: AccessMode::ReadWrite,
        walltime: 3600,
        should_flush: false,
    }
}

/// Register a four-node GekkoFS instance in `separate_new` mode.
pub async fn register_adhoc(service: &ReefService) -> AdhocStorage {
    service
        .register_adhoc_storage(
            "scratch".into(),
            AdhocStorageType::Gekkofs,
            ctx(ExecutionMode::SeparateNew),
            AdhocStorageResources {
                nodes: nodes(&["n01", "n02", "n03", "n04"]),
            },
        )
        .await
        .unwrap()
}

pub async fn register_job(
    service: &ReefService,
    slurm_id: u64,
    adhoc: Option<AdhocStorageId>,
) -> Job {
    service
        .register_job(
            slurm_id,
            JobResources {
                nodes: nodes(&["n01", "n02"]),
            },
            JobRequirements {
                adhoc_storage: adhoc,
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

pub fn ds(ids: &[&str]) -> Vec<Dataset> {
    ids.iter().map(|s| Dataset::new(*s)).collect()
}
