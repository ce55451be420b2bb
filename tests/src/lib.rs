//! Shared test harness for reef integration tests.
//!
//! Provides [`TestDeployment`]: a reef service, an ad-hoc storage
//! controller and a data mover, each behind its own RPC server on a
//! loopback port. The service reaches the other two over TCP exactly as it
//! would in production; tests drive it through an [`RpcClient`].

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reef_engine::{ReefService, ServiceConfig};
use reef_net::{NetError, Reply, Request, RequestHandler, Response, RpcClient, RpcServer};
use reef_types::*;
use reefd::config::{AdhocTemplate, CommandTemplate};
use reefd::{ControllerHandler, ServiceHandler};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

// =========================================================================
// Data mover
// =========================================================================

/// Data mover that records the transfers it receives.
///
/// With `complete` set, it reports every transfer as finished back to the
/// service, the way a real mover would once the bytes have moved.
pub struct RecordingMover {
    pub received: Mutex<Vec<Transfer>>,
    pub complete: AtomicBool,
    service_addr: Mutex<Option<String>>,
}

impl RecordingMover {
    fn new() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
            complete: AtomicBool::new(false),
            service_addr: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl RequestHandler for RecordingMover {
    async fn handle(&self, request: Request, _peer: SocketAddr) -> Response {
        let Request::StartTransfer { transfer } = request else {
            return Response::error(ErrorCode::BadArguments, "not a data mover call");
        };
        self.received.lock().await.push(transfer.clone());

        if self.complete.load(Ordering::SeqCst)
            && let Some(addr) = self.service_addr.lock().await.clone()
        {
            // Report from a separate task: the service is still waiting
            // for this response.
            tokio::spawn(async move {
                let update = Request::TransferUpdate {
                    transfer: transfer.id,
                    status: TransferStatus::Finished,
                    progress: TransferProgress {
                        bytes_transferred: 1 << 20,
                        total_bytes: Some(1 << 20),
                        error: None,
                    },
                };
                if let Err(e) = RpcClient::new(addr).call(&update).await {
                    debug!(transfer = %transfer.id, "update failed: {e}");
                }
            });
        }
        Response::ok(Reply::Empty)
    }
}

// =========================================================================
// Deployment
// =========================================================================

/// A service, controller and data mover on loopback ports.
pub struct TestDeployment {
    pub service: Arc<ReefService>,
    pub service_addr: String,
    pub controller_addr: String,
    pub mover_addr: String,
    pub mover: Arc<RecordingMover>,
    /// Parent of the controller's storage directories.
    pub workdir: TempDir,
    tasks: Vec<JoinHandle<Result<(), NetError>>>,
}

impl TestDeployment {
    /// Start all three servers. The controller serves GekkoFS with shell
    /// commands that leave marker files in the storage directory.
    pub async fn start() -> Self {
        let workdir = tempfile::tempdir().expect("tempdir");
        let controller = ControllerHandler::new(BTreeMap::from([(
            AdhocStorageType::Gekkofs,
            AdhocTemplate {
                working_directory: workdir.path().to_path_buf(),
                startup: CommandTemplate {
                    command: "echo {ADHOC_NODES} > {ADHOC_DIRECTORY}/running".into(),
                    environment: BTreeMap::new(),
                },
                shutdown: CommandTemplate {
                    command: "rm {ADHOC_DIRECTORY}/running".into(),
                    environment: BTreeMap::new(),
                },
            },
        )]));

        let mut tasks = Vec::new();
        let (controller_addr, task) = spawn_server(Arc::new(controller)).await;
        tasks.push(task);

        let mover = Arc::new(RecordingMover::new());
        let (mover_addr, task) = spawn_server(mover.clone()).await;
        tasks.push(task);

        let service = Arc::new(ReefService::new(ServiceConfig {
            default_mover_address: Some(mover_addr.clone()),
            wait_timeout: std::time::Duration::from_secs(5),
            ..Default::default()
        }));
        let (service_addr, task) = spawn_server(Arc::new(ServiceHandler::new(service.clone()))).await;
        tasks.push(task);

        *mover.service_addr.lock().await = Some(service_addr.clone());

        Self {
            service,
            service_addr,
            controller_addr,
            mover_addr,
            mover,
            workdir,
            tasks,
        }
    }

    /// A fresh client connection to the service.
    pub fn client(&self) -> RpcClient {
        RpcClient::new(self.service_addr.clone())
    }

    /// Storage context pointing at this deployment's controller.
    pub fn ctx(&self) -> AdhocStorageCtx {
        AdhocStorageCtx {
            controller_address: self.controller_addr.clone(),
            data_mover_address: String::new(),
            execution_mode: ExecutionMode::SeparateNew,
            access_mode: AccessMode::ReadWrite,
            walltime: 3600,
            should_flush: true,
        }
    }
}

impl Drop for TestDeployment {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn spawn_server<H: RequestHandler>(
    handler: Arc<H>,
) -> (String, JoinHandle<Result<(), NetError>>) {
    let server = RpcServer::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = server.local_addr().expect("local addr").to_string();
    (addr, tokio::spawn(server.serve(handler)))
}

// =========================================================================
// Call helpers
// =========================================================================

/// Call the service and return the payload, or the remote error code.
pub async fn call(client: &RpcClient, request: Request) -> Result<Reply, ErrorCode> {
    let response = client.call(&request).await.expect("transport failure");
    match response.into_result() {
        Ok(reply) => Ok(reply),
        Err(e) => Err(e.code()),
    }
}

pub fn nodes(names: &[&str]) -> Vec<Node> {
    names.iter().map(|n| Node::new(*n)).collect()
}

pub fn ds(ids: &[&str]) -> Vec<Dataset> {
    ids.iter().map(|s| Dataset::new(*s)).collect()
}

pub async fn register_adhoc(client: &RpcClient, ctx: AdhocStorageCtx, hosts: &[&str]) -> AdhocStorage {
    match call(
        client,
        Request::RegisterAdhocStorage {
            name: "scratch".into(),
            kind: AdhocStorageType::Gekkofs,
            ctx,
            resources: AdhocStorageResources { nodes: nodes(hosts) },
        },
    )
    .await
    {
        Ok(Reply::AdhocStorage(s)) => s,
        other => panic!("register_adhoc_storage: {other:?}"),
    }
}

pub async fn register_job(
    client: &RpcClient,
    slurm_id: u64,
    adhoc: Option<AdhocStorageId>,
) -> Result<Job, ErrorCode> {
    match call(
        client,
        Request::RegisterJob {
            slurm_id,
            resources: JobResources {
                nodes: nodes(&["n01", "n02"]),
            },
            requirements: JobRequirements {
                adhoc_storage: adhoc,
                ..Default::default()
            },
        },
    )
    .await?
    {
        Reply::Job(job) => Ok(job),
        other => panic!("register_job: {other:?}"),
    }
}
