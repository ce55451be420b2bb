//! Request and response shapes.
//!
//! Every request is answered by exactly one [`Response`] carrying an
//! [`ErrorCode`]. Entities cross the wire as ids, never as references.

use reef_types::{
    AdhocStorage, AdhocStorageCtx, AdhocStorageId, AdhocStorageResources, AdhocStorageType,
    DataOperation, DataOperationId, Dataset, ErrorCode, Job, JobId, JobInfo, JobRequirements,
    JobResources, JobStatistics, Node, OperationArg, OperationOutcome, PfsStorage, PfsStorageCtx,
    PfsStorageId, PfsStorageType, QosClass, QosEntity, QosLimit, QosScope, Transfer,
    TransferId, TransferMapping, TransferProgress, TransferStatus,
};
use serde::{Deserialize, Serialize};

use crate::error::NetError;

/// A remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Liveness check.
    Ping,

    // -- jobs --
    RegisterJob {
        slurm_id: u64,
        resources: JobResources,
        requirements: JobRequirements,
    },
    UpdateJob {
        job: JobId,
        resources: JobResources,
        requirements: Option<JobRequirements>,
    },
    RemoveJob {
        job: JobId,
    },
    GetJob {
        job: JobId,
    },
    /// Look a job up by its scheduler id.
    Query {
        slurm_id: u64,
    },

    // -- ad-hoc storage --
    RegisterAdhocStorage {
        name: String,
        kind: AdhocStorageType,
        ctx: AdhocStorageCtx,
        resources: AdhocStorageResources,
    },
    UpdateAdhocStorage {
        adhoc: AdhocStorageId,
        ctx: AdhocStorageCtx,
        caller: Option<JobId>,
    },
    RemoveAdhocStorage {
        adhoc: AdhocStorageId,
        caller: Option<JobId>,
    },
    GetAdhocStorage {
        adhoc: AdhocStorageId,
    },
    DeployAdhocStorage {
        adhoc: AdhocStorageId,
    },
    TerminateAdhocStorage {
        adhoc: AdhocStorageId,
    },
    BindAdhocStorage {
        adhoc: AdhocStorageId,
        job: JobId,
    },
    UnbindAdhocStorage {
        adhoc: AdhocStorageId,
    },
    CurrentClient {
        adhoc: AdhocStorageId,
    },

    // -- PFS storage --
    RegisterPfsStorage {
        name: String,
        kind: PfsStorageType,
        ctx: PfsStorageCtx,
    },
    UpdatePfsStorage {
        pfs: PfsStorageId,
        ctx: PfsStorageCtx,
    },
    RemovePfsStorage {
        pfs: PfsStorageId,
    },
    GetPfsStorage {
        pfs: PfsStorageId,
    },

    // -- transfers --
    TransferDatasets {
        job: JobId,
        sources: Vec<Dataset>,
        targets: Vec<Dataset>,
        qos_limits: Vec<QosLimit>,
        mapping: TransferMapping,
    },
    GetPendingTransfers {
        job: JobId,
    },
    SetTransferPriority {
        transfer: TransferId,
        delta: i64,
    },
    GetTransferPriority {
        transfer: TransferId,
    },
    CancelTransfer {
        transfer: TransferId,
    },
    /// Progress reported by a data mover.
    TransferUpdate {
        transfer: TransferId,
        status: TransferStatus,
        progress: TransferProgress,
    },
    TransferStatus {
        transfer: TransferId,
    },
    /// Block until the transfer is terminal. `None` uses the server default.
    WaitTransfer {
        transfer: TransferId,
        timeout_ms: Option<u64>,
    },

    // -- QoS --
    SetQosConstraints {
        job: JobId,
        limit: QosLimit,
    },
    GetQosConstraints {
        job: JobId,
        scope: QosScope,
        entity: QosEntity,
    },
    RemoveQosConstraints {
        job: JobId,
        entity: QosEntity,
        class: Option<QosClass>,
    },

    // -- data operations --
    DefineDataOperation {
        job: JobId,
        executable: String,
        arguments: Vec<OperationArg>,
    },
    ConnectDataOperation {
        job: JobId,
        op: DataOperationId,
        inputs: Vec<Dataset>,
        outputs: Vec<Dataset>,
        streaming: bool,
        arguments: Vec<OperationArg>,
    },
    LinkTransferToDataOperation {
        job: JobId,
        op: DataOperationId,
        transfer: TransferId,
        streaming: bool,
        arguments: Vec<OperationArg>,
    },
    FinalizeDataOperation {
        job: JobId,
        op: DataOperationId,
    },
    GetStatistics {
        job: JobId,
    },

    // -- adhoc controller --
    /// Materialize a storage instance on its nodes. Answered with a mount path.
    AdhocDeploy {
        adhoc: AdhocStorageId,
        kind: AdhocStorageType,
        ctx: AdhocStorageCtx,
        resources: AdhocStorageResources,
    },
    /// Tear a storage instance down.
    AdhocTerminate {
        adhoc: AdhocStorageId,
        kind: AdhocStorageType,
        resources: AdhocStorageResources,
    },

    // -- data mover --
    /// Start moving the data of a transfer.
    StartTransfer {
        transfer: Transfer,
    },
}

fn check_nodes(nodes: &[Node]) -> Result<(), &'static str> {
    if nodes.iter().any(|n| n.hostname.trim().is_empty()) {
        return Err("empty node hostname");
    }
    Ok(())
}

fn check_datasets(datasets: &[Dataset]) -> Result<(), &'static str> {
    if datasets.iter().any(|d| d.id.is_empty()) {
        return Err("empty dataset identifier");
    }
    Ok(())
}

fn check_entity(entity: &QosEntity) -> Result<(), &'static str> {
    match entity {
        QosEntity::Dataset(d) if d.id.is_empty() => Err("empty dataset identifier"),
        QosEntity::Node(h) if h.trim().is_empty() => Err("empty node hostname"),
        _ => Ok(()),
    }
}

impl Request {
    /// Operation name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::RegisterJob { .. } => "register_job",
            Request::UpdateJob { .. } => "update_job",
            Request::RemoveJob { .. } => "remove_job",
            Request::GetJob { .. } => "get_job",
            Request::Query { .. } => "query",
            Request::RegisterAdhocStorage { .. } => "register_adhoc_storage",
            Request::UpdateAdhocStorage { .. } => "update_adhoc_storage",
            Request::RemoveAdhocStorage { .. } => "remove_adhoc_storage",
            Request::GetAdhocStorage { .. } => "get_adhoc_storage",
            Request::DeployAdhocStorage { .. } => "deploy_adhoc_storage",
            Request::TerminateAdhocStorage { .. } => "terminate_adhoc_storage",
            Request::BindAdhocStorage { .. } => "bind_adhoc_storage",
            Request::UnbindAdhocStorage { .. } => "unbind_adhoc_storage",
            Request::CurrentClient { .. } => "current_client",
            Request::RegisterPfsStorage { .. } => "register_pfs_storage",
            Request::UpdatePfsStorage { .. } => "update_pfs_storage",
            Request::RemovePfsStorage { .. } => "remove_pfs_storage",
            Request::GetPfsStorage { .. } => "get_pfs_storage",
            Request::TransferDatasets { .. } => "transfer_datasets",
            Request::GetPendingTransfers { .. } => "get_pending_transfers",
            Request::SetTransferPriority { .. } => "set_transfer_priority",
            Request::GetTransferPriority { .. } => "get_transfer_priority",
            Request::CancelTransfer { .. } => "cancel_transfer",
            Request::TransferUpdate { .. } => "transfer_update",
            Request::TransferStatus { .. } => "transfer_status",
            Request::WaitTransfer { .. } => "wait_transfer",
            Request::SetQosConstraints { .. } => "set_qos_constraints",
            Request::GetQosConstraints { .. } => "get_qos_constraints",
            Request::RemoveQosConstraints { .. } => "remove_qos_constraints",
            Request::DefineDataOperation { .. } => "define_data_operation",
            Request::ConnectDataOperation { .. } => "connect_data_operation",
            Request::LinkTransferToDataOperation { .. } => "link_transfer_to_data_operation",
            Request::FinalizeDataOperation { .. } => "finalize_data_operation",
            Request::GetStatistics { .. } => "get_statistics",
            Request::AdhocDeploy { .. } => "adhoc_deploy",
            Request::AdhocTerminate { .. } => "adhoc_terminate",
            Request::StartTransfer { .. } => "start_transfer",
        }
    }

    /// Check structural well-formedness.
    ///
    /// Only checks that required values are present and non-empty; whether
    /// the referenced entities exist is for the service to decide.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            Request::RegisterJob { resources, .. } | Request::UpdateJob { resources, .. } => {
                check_nodes(&resources.nodes)
            }
            Request::RegisterAdhocStorage {
                name, resources, ..
            } => {
                if name.trim().is_empty() {
                    return Err("empty storage name");
                }
                if resources.nodes.is_empty() {
                    return Err("ad-hoc storage needs at least one node");
                }
                check_nodes(&resources.nodes)
            }
            Request::RegisterPfsStorage { name, ctx, .. } => {
                if name.trim().is_empty() {
                    return Err("empty storage name");
                }
                if ctx.mount_point.is_empty() {
                    return Err("empty mount point");
                }
                Ok(())
            }
            Request::UpdatePfsStorage { ctx, .. } if ctx.mount_point.is_empty() => {
                Err("empty mount point")
            }
            Request::TransferDatasets {
                sources,
                targets,
                qos_limits,
                ..
            } => {
                check_datasets(sources)?;
                check_datasets(targets)?;
                qos_limits.iter().try_for_each(|l| check_entity(&l.entity))
            }
            Request::SetQosConstraints { limit, .. } => check_entity(&limit.entity),
            Request::GetQosConstraints { entity, .. }
            | Request::RemoveQosConstraints { entity, .. } => check_entity(entity),
            Request::DefineDataOperation { executable, .. } if executable.trim().is_empty() => {
                Err("empty executable path")
            }
            Request::ConnectDataOperation {
                inputs, outputs, ..
            } => {
                check_datasets(inputs)?;
                check_datasets(outputs)
            }
            Request::AdhocDeploy { resources, .. } | Request::AdhocTerminate { resources, .. } => {
                check_nodes(&resources.nodes)
            }
            _ => Ok(()),
        }
    }
}

/// Payload of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// No payload.
    Empty,
    Job(Job),
    JobInfo(JobInfo),
    AdhocStorage(AdhocStorage),
    PfsStorage(PfsStorage),
    /// Mount path of a deployed storage.
    MountPath(String),
    /// Job bound to an ad-hoc storage.
    Client(Option<JobId>),
    Transfer(Transfer),
    Transfers(Vec<Transfer>),
    Priority(i64),
    TransferStatus {
        status: TransferStatus,
        progress: TransferProgress,
    },
    Limits(Vec<QosLimit>),
    /// Number of entries removed.
    Removed(u64),
    DataOperation(DataOperation),
    Outcome(OperationOutcome),
    Statistics(JobStatistics),
}

/// Answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Outcome of the call.
    pub code: ErrorCode,
    /// Error description when `code` is not success.
    pub message: Option<String>,
    /// Payload; [`Reply::Empty`] on failure.
    pub reply: Reply,
}

impl Response {
    /// A successful response.
    pub fn ok(reply: Reply) -> Self {
        Self {
            code: ErrorCode::Success,
            message: None,
            reply,
        }
    }

    /// A failed response.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            reply: Reply::Empty,
        }
    }

    /// Convert into the payload, or a [`NetError::Remote`] carrying the code.
    pub fn into_result(self) -> Result<Reply, NetError> {
        if self.code.is_success() {
            Ok(self.reply)
        } else {
            Err(NetError::Remote {
                code: self.code,
                message: self.message.unwrap_or_default(),
            })
        }
    }
}
