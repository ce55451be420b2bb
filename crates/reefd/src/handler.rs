//! RPC dispatch for the reef service.
//!
//! [`ServiceHandler`] maps every decoded [`Request`] onto a [`ReefService`]
//! call and its result onto a [`Response`]. Calls meant for a controller or
//! a data mover are refused.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reef_engine::{EngineError, ReefService};
use reef_net::{Reply, Request, RequestHandler, Response};
use reef_types::ErrorCode;
use tracing::{info, warn};

static NEXT_RPC_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id used to pair an inbound call with its response in logs.
pub(crate) fn next_rpc_id() -> u64 {
    NEXT_RPC_ID.fetch_add(1, Ordering::Relaxed)
}

/// Log the response to call `rpc_id`.
pub(crate) fn log_response(rpc_id: u64, name: &str, peer: SocketAddr, response: &Response) {
    if response.code.is_success() {
        info!(rpc_id, rpc = name, %peer, code = %response.code, "<= response");
    } else {
        warn!(
            rpc_id,
            rpc = name,
            %peer,
            code = %response.code,
            message = response.message.as_deref().unwrap_or_default(),
            "<= response"
        );
    }
}

/// Serves the public reef API.
pub struct ServiceHandler {
    service: Arc<ReefService>,
}

impl ServiceHandler {
    pub fn new(service: Arc<ReefService>) -> Self {
        Self { service }
    }

    async fn dispatch(&self, request: Request) -> Result<Reply, EngineError> {
        let s = &self.service;
        let reply = match request {
            Request::Ping => Reply::Empty,

            Request::RegisterJob {
                slurm_id,
                resources,
                requirements,
            } => Reply::Job(s.register_job(slurm_id, resources, requirements).await?),
            Request::UpdateJob {
                job,
                resources,
                requirements,
            } => Reply::Job(s.update_job(job, resources, requirements).await?),
            Request::RemoveJob { job } => Reply::Job(s.remove_job(job).await?),
            Request::GetJob { job } => Reply::Job(s.job(job).await?),
            Request::Query { slurm_id } => Reply::JobInfo(s.query(slurm_id).await?),

            Request::RegisterAdhocStorage {
                name,
                kind,
                ctx,
                resources,
            } => Reply::AdhocStorage(s.register_adhoc_storage(name, kind, ctx, resources).await?),
            Request::UpdateAdhocStorage { adhoc, ctx, caller } => {
                Reply::AdhocStorage(s.update_adhoc_storage(adhoc, ctx, caller).await?)
            }
            Request::RemoveAdhocStorage { adhoc, caller } => {
                Reply::AdhocStorage(s.remove_adhoc_storage(adhoc, caller).await?)
            }
            Request::GetAdhocStorage { adhoc } => Reply::AdhocStorage(s.adhoc_storage(adhoc).await?),
            Request::DeployAdhocStorage { adhoc } => {
                Reply::MountPath(s.deploy_adhoc_storage(adhoc).await?)
            }
            Request::TerminateAdhocStorage { adhoc } => {
                s.terminate_adhoc_storage(adhoc).await?;
                Reply::Empty
            }
            Request::BindAdhocStorage { adhoc, job } => {
                s.bind_adhoc_storage(adhoc, job).await?;
                Reply::Empty
            }
            Request::UnbindAdhocStorage { adhoc } => {
                s.unbind_adhoc_storage(adhoc).await?;
                Reply::Empty
            }
            Request::CurrentClient { adhoc } => Reply::Client(s.current_client(adhoc).await?),

            Request::RegisterPfsStorage { name, kind, ctx } => {
                Reply::PfsStorage(s.register_pfs_storage(name, kind, ctx).await?)
            }
            Request::UpdatePfsStorage { pfs, ctx } => {
                Reply::PfsStorage(s.update_pfs_storage(pfs, ctx).await?)
            }
            Request::RemovePfsStorage { pfs } => Reply::PfsStorage(s.remove_pfs_storage(pfs).await?),
            Request::GetPfsStorage { pfs } => Reply::PfsStorage(s.pfs_storage(pfs).await?),

            Request::TransferDatasets {
                job,
                sources,
                targets,
                qos_limits,
                mapping,
            } => Reply::Transfer(
                s.transfer_datasets(job, sources, targets, &qos_limits, mapping)
                    .await?,
            ),
            Request::GetPendingTransfers { job } => Reply::Transfers(s.pending_transfers(job).await?),
            Request::SetTransferPriority { transfer, delta } => {
                Reply::Priority(s.set_transfer_priority(transfer, delta).await?)
            }
            Request::GetTransferPriority { transfer } => {
                Reply::Priority(s.transfer_priority(transfer).await?)
            }
            Request::CancelTransfer { transfer } => {
                let status = s.cancel_transfer(transfer).await?;
                let (_, progress) = s.transfer_status(transfer).await?;
                Reply::TransferStatus { status, progress }
            }
            Request::TransferUpdate {
                transfer,
                status,
                progress,
            } => {
                let status = s.transfer_update(transfer, status, progress).await?;
                let (_, progress) = s.transfer_status(transfer).await?;
                Reply::TransferStatus { status, progress }
            }
            Request::TransferStatus { transfer } => {
                let (status, progress) = s.transfer_status(transfer).await?;
                Reply::TransferStatus { status, progress }
            }
            Request::WaitTransfer {
                transfer,
                timeout_ms,
            } => {
                let status = s
                    .wait_transfer(transfer, timeout_ms.map(Duration::from_millis))
                    .await?;
                let (_, progress) = s.transfer_status(transfer).await?;
                Reply::TransferStatus { status, progress }
            }

            Request::SetQosConstraints { job, limit } => {
                s.set_qos_constraints(job, limit).await?;
                Reply::Empty
            }
            Request::GetQosConstraints { job, scope, entity } => {
                Reply::Limits(s.get_qos_constraints(job, scope, &entity).await?)
            }
            Request::RemoveQosConstraints { job, entity, class } => {
                let removed = s.remove_qos_constraints(job, &entity, class).await?;
                Reply::Removed(removed as u64)
            }

            Request::DefineDataOperation {
                job,
                executable,
                arguments,
            } => Reply::DataOperation(s.define_data_operation(job, executable, arguments).await?),
            Request::ConnectDataOperation {
                job,
                op,
                inputs,
                outputs,
                streaming,
                arguments,
            } => Reply::DataOperation(
                s.connect_data_operation(job, op, inputs, outputs, streaming, arguments)
                    .await?,
            ),
            Request::LinkTransferToDataOperation {
                job,
                op,
                transfer,
                streaming,
                arguments,
            } => Reply::DataOperation(
                s.link_transfer_to_data_operation(job, op, transfer, streaming, arguments)
                    .await?,
            ),
            Request::FinalizeDataOperation { job, op } => {
                Reply::Outcome(s.finalize_data_operation(job, op).await?)
            }
            Request::GetStatistics { job } => Reply::Statistics(s.statistics(job).await?),

            Request::AdhocDeploy { .. }
            | Request::AdhocTerminate { .. }
            | Request::StartTransfer { .. } => {
                return Err(EngineError::BadArguments(
                    "operation is not served by the reef service".into(),
                ));
            }
        };
        Ok(reply)
    }
}

#[async_trait::async_trait]
impl RequestHandler for ServiceHandler {
    async fn handle(&self, request: Request, peer: SocketAddr) -> Response {
        let rpc_id = next_rpc_id();
        let name = request.name();
        info!(rpc_id, rpc = name, %peer, "=> request");

        let response = match self.dispatch(request).await {
            Ok(reply) => Response::ok(reply),
            Err(e) => Response::error(e.code(), e.to_string()),
        };

        log_response(rpc_id, name, peer, &response);
        response
    }
}
