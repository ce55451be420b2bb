//! [`ReefService`]: the context object every RPC handler works against.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reef_dataops::Pipeline;
use reef_net::{
    AddressResolver, AdhocController, DataMover, DnsResolver, RemoteAdhocController,
    RemoteDataMover,
};
use reef_qos::QosStore;
use reef_registry::{DeploymentPlan, Registry};
use reef_transfer::TransferOrchestrator;
use reef_types::*;
use tracing::{debug, info, warn};

use crate::error::EngineError;

type Result<T> = std::result::Result<T, EngineError>;

/// Configuration for creating a [`ReefService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Data mover used when a job's ad-hoc storage names none.
    pub default_mover_address: Option<String>,
    /// Port the adhoc controller listens on, used when a storage context
    /// carries no controller address.
    pub controller_port: u16,
    /// Default budget for transfer waits.
    pub wait_timeout: Duration,
    /// Budget for handing a transfer to the data mover.
    pub dispatch_timeout: Duration,
    /// Budget for a deploy or terminate call, including address resolution.
    pub controller_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_mover_address: None,
            controller_port: 52001,
            wait_timeout: Duration::from_secs(30),
            dispatch_timeout: Duration::from_secs(10),
            controller_timeout: Duration::from_secs(120),
        }
    }
}

/// Run a collaborator call, giving up after `after`.
///
/// The call is dropped on expiry, which closes its connection.
async fn within<T, F>(after: Duration, what: String, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout { what, after }),
    }
}

/// The service context.
///
/// Owns every component and the external collaborators. Constructed once at
/// startup; [`ReefService::shutdown`] tears down what it deployed.
pub struct ReefService {
    ids: Arc<IdAllocator>,
    registry: Arc<Registry>,
    transfers: Arc<TransferOrchestrator>,
    qos: Arc<QosStore>,
    pipeline: Arc<Pipeline>,
    config: ServiceConfig,
    mover: Arc<dyn DataMover>,
    controller: Arc<dyn AdhocController>,
    resolver: Arc<dyn AddressResolver>,
}

impl ReefService {
    /// Create a service that reaches its collaborators over RPC.
    pub fn new(config: ServiceConfig) -> Self {
        let ids = Arc::new(IdAllocator::new());
        Self {
            registry: Registry::new(ids.clone()),
            transfers: TransferOrchestrator::new(ids.clone()),
            qos: QosStore::new(),
            pipeline: Pipeline::new(ids.clone()),
            ids,
            config,
            mover: Arc::new(RemoteDataMover::new()),
            controller: Arc::new(RemoteAdhocController::new()),
            resolver: Arc::new(DnsResolver),
        }
    }

    /// Replace the data mover.
    pub fn with_data_mover(mut self, mover: Arc<dyn DataMover>) -> Self {
        self.mover = mover;
        self
    }

    /// Replace the adhoc controller.
    pub fn with_controller(mut self, controller: Arc<dyn AdhocController>) -> Self {
        self.controller = controller;
        self
    }

    /// Replace the address resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn AddressResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Return a reference to the registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Return a reference to the transfer orchestrator.
    pub fn transfers(&self) -> &Arc<TransferOrchestrator> {
        &self.transfers
    }

    /// Return a reference to the QoS store.
    pub fn qos(&self) -> &Arc<QosStore> {
        &self.qos
    }

    /// Return a reference to the data-operation pipeline.
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Return the service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Number of ids handed out so far, across all entity kinds.
    pub fn ids_allocated(&self) -> u64 {
        self.ids.allocated()
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Register a job, binding the ad-hoc storage it references.
    pub async fn register_job(
        &self,
        slurm_id: u64,
        resources: JobResources,
        requirements: JobRequirements,
    ) -> Result<Job> {
        Ok(self
            .registry
            .register_job(slurm_id, resources, requirements)
            .await?)
    }

    /// Replace a job's resources and, optionally, its requirements.
    pub async fn update_job(
        &self,
        job: JobId,
        resources: JobResources,
        requirements: Option<JobRequirements>,
    ) -> Result<Job> {
        Ok(self
            .registry
            .update_job(job, resources, requirements)
            .await?)
    }

    /// Remove a job.
    ///
    /// Releases its ad-hoc storage binding, cancels its outstanding
    /// transfers and drops its transfers, job-scoped QoS limits and data
    /// operations. Waiters on a cancelled transfer observe `cancelled`.
    pub async fn remove_job(&self, job: JobId) -> Result<Job> {
        let removed = self.registry.remove_job(job).await?;

        let cancelled = self.transfers.cancel_all(job).await;
        let evicted = self.transfers.evict_job(job).await;
        let limits = self.qos.purge_job(job).await;
        let ops = self.pipeline.purge_job(job).await;
        debug!(%job, cancelled, evicted, limits, ops, "job state dropped");

        Ok(removed)
    }

    /// Look up a job.
    pub async fn job(&self, job: JobId) -> Result<Job> {
        Ok(self.registry.job(job).await?)
    }

    /// Look a job up by its scheduler id.
    ///
    /// Without a bound ad-hoc storage the controller address is empty and
    /// `io_procs` is zero.
    pub async fn query(&self, slurm_id: u64) -> Result<JobInfo> {
        let job = self.registry.job_by_slurm_id(slurm_id).await?;

        let adhoc = match job.requirements.adhoc_storage {
            Some(id) => self.registry.adhoc_storage(id).await.ok(),
            None => None,
        };
        let (adhoc_controller_address, io_procs) = match adhoc {
            Some(s) => (
                s.ctx.controller_address.clone(),
                u32::try_from(s.node_count()).unwrap_or(u32::MAX),
            ),
            None => (String::new(), 0),
        };

        Ok(JobInfo {
            job_id: job.id,
            adhoc_controller_address,
            io_procs,
        })
    }

    // ------------------------------------------------------------------
    // Ad-hoc storage
    // ------------------------------------------------------------------

    /// Register an ad-hoc storage instance, unbound and undeployed.
    pub async fn register_adhoc_storage(
        &self,
        name: String,
        kind: AdhocStorageType,
        ctx: AdhocStorageCtx,
        resources: AdhocStorageResources,
    ) -> Result<AdhocStorage> {
        Ok(self
            .registry
            .register_adhoc_storage(name, kind, ctx, resources)
            .await?)
    }

    /// Replace the context of an ad-hoc storage instance. `caller` must be
    /// its client, or it must have none.
    pub async fn update_adhoc_storage(
        &self,
        adhoc: AdhocStorageId,
        ctx: AdhocStorageCtx,
        caller: Option<JobId>,
    ) -> Result<AdhocStorage> {
        Ok(self
            .registry
            .update_adhoc_storage(adhoc, ctx, caller)
            .await?)
    }

    /// Remove an ad-hoc storage instance. Same ownership rule as updates.
    pub async fn remove_adhoc_storage(
        &self,
        adhoc: AdhocStorageId,
        caller: Option<JobId>,
    ) -> Result<AdhocStorage> {
        Ok(self.registry.remove_adhoc_storage(adhoc, caller).await?)
    }

    /// Look up an ad-hoc storage instance.
    pub async fn adhoc_storage(&self, adhoc: AdhocStorageId) -> Result<AdhocStorage> {
        Ok(self.registry.adhoc_storage(adhoc).await?)
    }

    /// Claim `adhoc` for `job`. A storage has at most one client and a job
    /// holds at most one storage.
    pub async fn bind_adhoc_storage(&self, adhoc: AdhocStorageId, job: JobId) -> Result<()> {
        Ok(self.registry.bind(adhoc, job).await?)
    }

    /// Release `adhoc` from whichever job holds it.
    pub async fn unbind_adhoc_storage(&self, adhoc: AdhocStorageId) -> Result<()> {
        Ok(self.registry.unbind(adhoc).await?)
    }

    /// The job bound to `adhoc`, if any.
    pub async fn current_client(&self, adhoc: AdhocStorageId) -> Result<Option<JobId>> {
        Ok(self.registry.current_client(adhoc).await?)
    }

    /// Address of the controller responsible for `plan`.
    async fn controller_address(&self, plan: &DeploymentPlan) -> Result<String> {
        if !plan.ctx.controller_address.is_empty() {
            return Ok(plan.ctx.controller_address.clone());
        }

        let Some(first) = plan.resources.nodes.first() else {
            return Err(EngineError::BadArguments(format!(
                "adhoc storage {} has no controller address and no nodes",
                plan.id
            )));
        };
        let addr = self
            .resolver
            .resolve(&first.hostname, self.config.controller_port)
            .await?;
        debug!(adhoc = %plan.id, host = %first.hostname, %addr, "resolved controller address");
        Ok(addr)
    }

    /// Deploy an ad-hoc storage instance and return its mount path.
    ///
    /// A failed or timed-out deployment leaves the storage registered and
    /// undeployed, so the call can be repeated.
    pub async fn deploy_adhoc_storage(&self, adhoc: AdhocStorageId) -> Result<String> {
        let plan = self.registry.begin_deploy(adhoc).await?;

        let deployed = within(
            self.config.controller_timeout,
            format!("deployment of adhoc storage {adhoc}"),
            async {
                let addr = self.controller_address(&plan).await?;
                info!(%adhoc, kind = %plan.kind, controller = %addr, nodes = plan.resources.nodes.len(), "deploying adhoc storage");
                let path = self
                    .controller
                    .deploy(&addr, adhoc, plan.kind, &plan.ctx, &plan.resources)
                    .await?;
                Ok(path)
            },
        )
        .await;

        match deployed {
            Ok(path) => {
                self.registry.complete_deploy(adhoc, path.clone()).await?;
                Ok(path)
            }
            Err(e) => {
                warn!(%adhoc, "deployment failed: {e}");
                self.registry.abort_deploy(adhoc).await?;
                Err(e)
            }
        }
    }

    /// Tear down a deployed ad-hoc storage instance. The entry stays
    /// registered.
    pub async fn terminate_adhoc_storage(&self, adhoc: AdhocStorageId) -> Result<()> {
        let plan = self.registry.begin_teardown(adhoc).await?;

        let terminated = within(
            self.config.controller_timeout,
            format!("teardown of adhoc storage {adhoc}"),
            async {
                let addr = self.controller_address(&plan).await?;
                info!(%adhoc, controller = %addr, "terminating adhoc storage");
                self.controller
                    .terminate(&addr, adhoc, plan.kind, &plan.resources)
                    .await?;
                Ok(())
            },
        )
        .await;

        match terminated {
            Ok(()) => {
                self.registry.complete_teardown(adhoc).await?;
                Ok(())
            }
            Err(e) => {
                warn!(%adhoc, "teardown failed: {e}");
                self.registry.abort_teardown(adhoc).await?;
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // PFS storage
    // ------------------------------------------------------------------

    /// Register a PFS storage instance.
    pub async fn register_pfs_storage(
        &self,
        name: String,
        kind: PfsStorageType,
        ctx: PfsStorageCtx,
    ) -> Result<PfsStorage> {
        Ok(self.registry.register_pfs_storage(name, kind, ctx).await?)
    }

    /// Replace the context of a PFS storage instance.
    pub async fn update_pfs_storage(
        &self,
        pfs: PfsStorageId,
        ctx: PfsStorageCtx,
    ) -> Result<PfsStorage> {
        Ok(self.registry.update_pfs_storage(pfs, ctx).await?)
    }

    /// Remove a PFS storage instance.
    pub async fn remove_pfs_storage(&self, pfs: PfsStorageId) -> Result<PfsStorage> {
        Ok(self.registry.remove_pfs_storage(pfs).await?)
    }

    /// Look up a PFS storage instance.
    pub async fn pfs_storage(&self, pfs: PfsStorageId) -> Result<PfsStorage> {
        Ok(self.registry.pfs_storage(pfs).await?)
    }

    // ------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------

    /// Data mover serving `job`: the one named by its ad-hoc storage, or the
    /// configured default.
    async fn mover_address(&self, job: &Job) -> Option<String> {
        if let Some(adhoc) = job.requirements.adhoc_storage
            && let Ok(storage) = self.registry.adhoc_storage(adhoc).await
            && !storage.ctx.data_mover_address.is_empty()
        {
            return Some(storage.ctx.data_mover_address);
        }
        self.config.default_mover_address.clone()
    }

    /// Create a transfer and hand it to the job's data mover.
    ///
    /// Without a data mover the transfer stays pending. If the mover refuses
    /// it or does not answer in time, the transfer is marked failed and the
    /// error returned. A job removed concurrently takes the new transfer
    /// with it and the call fails with `NotFound`.
    pub async fn transfer_datasets(
        &self,
        job: JobId,
        sources: Vec<Dataset>,
        targets: Vec<Dataset>,
        qos_limits: &[QosLimit],
        mapping: TransferMapping,
    ) -> Result<Transfer> {
        let owner = self.registry.job(job).await?;
        let transfer = self
            .transfers
            .create(job, sources, targets, qos_limits, mapping)
            .await?;

        if let Err(e) = self.registry.job(job).await {
            // Removed between the check above and the insert.
            self.transfers.cancel_all(job).await;
            self.transfers.evict_job(job).await;
            return Err(e.into());
        }

        let Some(addr) = self.mover_address(&owner).await else {
            warn!(transfer = %transfer.id, %job, "no data mover configured, transfer left pending");
            return Ok(transfer);
        };

        let dispatched = within(
            self.config.dispatch_timeout,
            format!("dispatch of transfer {}", transfer.id),
            async { Ok(self.mover.start_transfer(&addr, &transfer).await?) },
        )
        .await;

        if let Err(e) = dispatched {
            warn!(transfer = %transfer.id, mover = %addr, "dispatch failed: {e}");
            let progress = TransferProgress {
                error: Some(e.to_string()),
                ..Default::default()
            };
            if let Err(update) = self
                .transfers
                .update(transfer.id, TransferStatus::Failed, progress)
                .await
            {
                // A concurrent update already made it terminal.
                debug!(transfer = %transfer.id, "{update}");
            }
            return Err(e);
        }

        debug!(transfer = %transfer.id, mover = %addr, "transfer dispatched");
        Ok(transfer)
    }

    /// Non-terminal transfers of `job`, highest priority first.
    pub async fn pending_transfers(&self, job: JobId) -> Result<Vec<Transfer>> {
        self.registry.job(job).await?;
        Ok(self.transfers.pending(job).await)
    }

    /// Shift the priority of a pending transfer; returns the new value.
    pub async fn set_transfer_priority(&self, transfer: TransferId, delta: i64) -> Result<i64> {
        Ok(self.transfers.set_priority(transfer, delta).await?)
    }

    /// Priority of a transfer that is not yet terminal.
    pub async fn transfer_priority(&self, transfer: TransferId) -> Result<i64> {
        Ok(self.transfers.priority(transfer).await?)
    }

    /// Cancel a transfer. Cancelling twice is not an error.
    pub async fn cancel_transfer(&self, transfer: TransferId) -> Result<TransferStatus> {
        Ok(self.transfers.cancel(transfer).await?)
    }

    /// Ingest progress reported by a data mover.
    pub async fn transfer_update(
        &self,
        transfer: TransferId,
        status: TransferStatus,
        progress: TransferProgress,
    ) -> Result<TransferStatus> {
        Ok(self.transfers.update(transfer, status, progress).await?)
    }

    /// Current status and last reported progress.
    pub async fn transfer_status(
        &self,
        transfer: TransferId,
    ) -> Result<(TransferStatus, TransferProgress)> {
        let t = self.transfers.transfer(transfer).await?;
        Ok((t.status, t.progress))
    }

    /// Wait until `transfer` is terminal, for at most `timeout` (the
    /// configured default when `None`).
    pub async fn wait_transfer(
        &self,
        transfer: TransferId,
        timeout: Option<Duration>,
    ) -> Result<TransferStatus> {
        let after = timeout.unwrap_or(self.config.wait_timeout);
        match tokio::time::timeout(after, self.transfers.wait(transfer)).await {
            Ok(status) => Ok(status?),
            Err(_) => Err(EngineError::Timeout {
                what: format!("transfer {transfer}"),
                after,
            }),
        }
    }

    // ------------------------------------------------------------------
    // QoS
    // ------------------------------------------------------------------

    /// Insert or replace a QoS limit on behalf of `job`.
    pub async fn set_qos_constraints(&self, job: JobId, limit: QosLimit) -> Result<()> {
        self.registry.job(job).await?;
        self.qos.set(limit).await;
        Ok(())
    }

    /// Limits recorded for `entity`, which must be of kind `scope`.
    pub async fn get_qos_constraints(
        &self,
        job: JobId,
        scope: QosScope,
        entity: &QosEntity,
    ) -> Result<Vec<QosLimit>> {
        self.registry.job(job).await?;
        Ok(self.qos.get(scope, entity).await?)
    }

    /// Drop the `class` limit of `entity`, or all of its limits. Returns how
    /// many were removed.
    pub async fn remove_qos_constraints(
        &self,
        job: JobId,
        entity: &QosEntity,
        class: Option<QosClass>,
    ) -> Result<usize> {
        self.registry.job(job).await?;
        Ok(self.qos.remove(entity, class).await?)
    }

    // ------------------------------------------------------------------
    // Data operations
    // ------------------------------------------------------------------

    /// Define an operation running `executable` for `job`.
    pub async fn define_data_operation(
        &self,
        job: JobId,
        executable: String,
        arguments: Vec<OperationArg>,
    ) -> Result<DataOperation> {
        self.registry.job(job).await?;
        let op = self.pipeline.define(job, executable, arguments).await?;

        if let Err(e) = self.registry.job(job).await {
            // Removed between the check above and the insert.
            self.pipeline.purge_job(job).await;
            return Err(e.into());
        }
        Ok(op)
    }

    /// Attach input and output datasets to a defined operation.
    pub async fn connect_data_operation(
        &self,
        job: JobId,
        op: DataOperationId,
        inputs: Vec<Dataset>,
        outputs: Vec<Dataset>,
        streaming: bool,
        arguments: Vec<OperationArg>,
    ) -> Result<DataOperation> {
        Ok(self
            .pipeline
            .connect(job, op, inputs, outputs, streaming, arguments)
            .await?)
    }

    /// Tie a connected operation to one of the job's transfers that has not
    /// yet reached a terminal state.
    pub async fn link_transfer_to_data_operation(
        &self,
        job: JobId,
        op: DataOperationId,
        transfer: TransferId,
        streaming: bool,
        arguments: Vec<OperationArg>,
    ) -> Result<DataOperation> {
        let t = self.transfers.transfer(transfer).await?;
        if t.job_id != job {
            return Err(EngineError::TransferNotInJob { transfer, job });
        }
        if t.status.is_terminal() {
            return Err(EngineError::TransferTerminal {
                transfer,
                status: t.status,
            });
        }
        Ok(self
            .pipeline
            .link(job, op, transfer, streaming, arguments)
            .await?)
    }

    /// Finalize an operation.
    ///
    /// A linked operation first waits for its transfer, for at most the
    /// configured wait timeout. It succeeds only if the transfer finished.
    pub async fn finalize_data_operation(
        &self,
        job: JobId,
        op: DataOperationId,
    ) -> Result<OperationOutcome> {
        let entry = self.pipeline.finalizable(job, op).await?;

        let outcome = match &entry.link {
            Some(link) => match self.wait_transfer(link.transfer, None).await {
                Ok(TransferStatus::Finished) => OperationOutcome::Succeeded,
                Ok(status) => {
                    debug!(%op, transfer = %link.transfer, %status, "linked transfer did not finish");
                    OperationOutcome::Failed
                }
                Err(e) => {
                    warn!(%op, transfer = %link.transfer, "linked transfer wait failed: {e}");
                    OperationOutcome::Failed
                }
            },
            None => OperationOutcome::Succeeded,
        };

        Ok(self.pipeline.finalize(job, op, outcome).await?)
    }

    /// Look up an operation of `job`.
    pub async fn data_operation(&self, job: JobId, op: DataOperationId) -> Result<DataOperation> {
        Ok(self.pipeline.get(job, op).await?)
    }

    // ------------------------------------------------------------------
    // Statistics and lifecycle
    // ------------------------------------------------------------------

    /// Per-job counters.
    pub async fn statistics(&self, job: JobId) -> Result<JobStatistics> {
        self.registry.job(job).await?;

        let mut stats = JobStatistics::default();
        for t in self.transfers.transfers_for(job).await {
            let counter = match t.status {
                TransferStatus::Pending => &mut stats.pending_transfers,
                TransferStatus::InProgress => &mut stats.in_progress_transfers,
                TransferStatus::Finished => &mut stats.finished_transfers,
                TransferStatus::Failed => &mut stats.failed_transfers,
                TransferStatus::Cancelled => &mut stats.cancelled_transfers,
            };
            *counter += 1;
        }
        stats.data_operations = self.pipeline.count_for_job(job).await as u64;
        stats.qos_limits = self.qos.count_for_job(job).await as u64;
        Ok(stats)
    }

    /// Tear down every deployed ad-hoc storage instance.
    ///
    /// Failures are logged and do not stop the remaining teardowns. Returns
    /// how many instances were torn down.
    pub async fn shutdown(&self) -> usize {
        let mut torn_down = 0;
        for storage in self.registry.adhoc_storages().await {
            if !storage.is_deployed() {
                continue;
            }
            match self.terminate_adhoc_storage(storage.id).await {
                Ok(()) => torn_down += 1,
                Err(e) => warn!(adhoc = %storage.id, "teardown at shutdown failed: {e}"),
            }
        }
        info!(torn_down, "service shut down");
        torn_down
    }
}
