//! [`Pipeline`] implementation.

use std::collections::HashMap;
use std::sync::Arc;

use reef_types::{
    DataOpStatus, DataOperation, DataOperationId, Dataset, IdAllocator, JobId, OperationArg,
    OperationConnection, OperationLink, OperationOutcome, TransferId,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::DataOpError;

type Result<T> = std::result::Result<T, DataOpError>;

/// Store of data operations and their state machine.
pub struct Pipeline {
    ids: Arc<IdAllocator>,
    ops: RwLock<HashMap<DataOperationId, DataOperation>>,
}

/// Look up `op` and check it belongs to `job`.
fn owned<'a>(
    ops: &'a mut HashMap<DataOperationId, DataOperation>,
    job: JobId,
    op: DataOperationId,
) -> Result<&'a mut DataOperation> {
    match ops.get_mut(&op) {
        Some(entry) if entry.job_id == job => Ok(entry),
        _ => Err(DataOpError::NotFound { job, op }),
    }
}

impl Pipeline {
    /// Create an empty pipeline drawing ids from `ids`.
    pub fn new(ids: Arc<IdAllocator>) -> Arc<Self> {
        Arc::new(Self {
            ids,
            ops: RwLock::new(HashMap::new()),
        })
    }

    /// Define a new operation for `job`, in the `defined` state.
    pub async fn define(
        &self,
        job: JobId,
        executable: String,
        arguments: Vec<OperationArg>,
    ) -> Result<DataOperation> {
        if executable.trim().is_empty() {
            return Err(DataOpError::BadArguments("empty executable path"));
        }

        let id = DataOperationId::from(self.ids.allocate().ok_or(DataOpError::IdsExhausted)?);
        let op = DataOperation {
            id,
            job_id: job,
            executable,
            arguments,
            status: DataOpStatus::Defined,
            connection: None,
            link: None,
            outcome: None,
        };
        self.ops.write().await.insert(id, op.clone());

        info!(op = %id, %job, executable = %op.executable, "data operation defined");
        Ok(op)
    }

    /// Wire a defined operation to its input and output datasets.
    pub async fn connect(
        &self,
        job: JobId,
        op: DataOperationId,
        inputs: Vec<Dataset>,
        outputs: Vec<Dataset>,
        streaming: bool,
        arguments: Vec<OperationArg>,
    ) -> Result<DataOperation> {
        let mut ops = self.ops.write().await;
        let entry = owned(&mut ops, job, op)?;

        if entry.status != DataOpStatus::Defined {
            return Err(DataOpError::InvalidState {
                op,
                status: entry.status,
                action: "connect",
            });
        }

        entry.connection = Some(OperationConnection {
            inputs,
            outputs,
            streaming,
            arguments,
        });
        entry.status = DataOpStatus::Connected;

        debug!(%op, %job, streaming, "data operation connected");
        Ok(entry.clone())
    }

    /// Tie a connected operation to a transfer.
    ///
    /// The caller is responsible for checking that the transfer exists and
    /// belongs to the same job.
    pub async fn link(
        &self,
        job: JobId,
        op: DataOperationId,
        transfer: TransferId,
        streaming: bool,
        arguments: Vec<OperationArg>,
    ) -> Result<DataOperation> {
        let mut ops = self.ops.write().await;
        let entry = owned(&mut ops, job, op)?;

        if entry.status != DataOpStatus::Connected {
            return Err(DataOpError::InvalidState {
                op,
                status: entry.status,
                action: "link",
            });
        }

        entry.link = Some(OperationLink {
            transfer,
            streaming,
            arguments,
        });
        entry.status = DataOpStatus::Linked;

        debug!(%op, %job, %transfer, "data operation linked");
        Ok(entry.clone())
    }

    /// Check that `op` may be finalized and return it.
    ///
    /// Used before waiting on a linked transfer, so that an operation in the
    /// wrong state fails without waiting.
    pub async fn finalizable(&self, job: JobId, op: DataOperationId) -> Result<DataOperation> {
        let entry = self.get(job, op).await?;
        match entry.status {
            DataOpStatus::Connected | DataOpStatus::Linked => Ok(entry),
            status => Err(DataOpError::InvalidState {
                op,
                status,
                action: "finalize",
            }),
        }
    }

    /// Record the outcome of a connected or linked operation and move it to
    /// `finalized`.
    pub async fn finalize(
        &self,
        job: JobId,
        op: DataOperationId,
        outcome: OperationOutcome,
    ) -> Result<OperationOutcome> {
        let mut ops = self.ops.write().await;
        let entry = owned(&mut ops, job, op)?;

        match entry.status {
            DataOpStatus::Connected | DataOpStatus::Linked => {}
            status => {
                return Err(DataOpError::InvalidState {
                    op,
                    status,
                    action: "finalize",
                });
            }
        }

        entry.status = DataOpStatus::Finalized;
        entry.outcome = Some(outcome);

        info!(%op, %job, ?outcome, "data operation finalized");
        Ok(outcome)
    }

    /// Snapshot of an operation owned by `job`.
    pub async fn get(&self, job: JobId, op: DataOperationId) -> Result<DataOperation> {
        match self.ops.read().await.get(&op) {
            Some(entry) if entry.job_id == job => Ok(entry.clone()),
            _ => Err(DataOpError::NotFound { job, op }),
        }
    }

    /// Number of operations defined by `job`.
    pub async fn count_for_job(&self, job: JobId) -> usize {
        self.ops
            .read()
            .await
            .values()
            .filter(|op| op.job_id == job)
            .count()
    }

    /// Drop every operation of `job`. Returns how many were dropped.
    pub async fn purge_job(&self, job: JobId) -> usize {
        let mut ops = self.ops.write().await;
        let before = ops.len();
        ops.retain(|_, op| op.job_id != job);
        before - ops.len()
    }
}
