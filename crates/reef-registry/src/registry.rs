//! [`Registry`] implementation: keyed stores for jobs, ad-hoc storage and
//! PFS storage.

use std::collections::HashMap;
use std::sync::Arc;

use reef_types::{
    AdhocStorage, AdhocStorageCtx, AdhocStorageId, AdhocStorageResources, AdhocStorageType,
    IdAllocator, Job, JobId, JobRequirements, JobResources, PfsStorage, PfsStorageCtx,
    PfsStorageId, PfsStorageType, Storage,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::arbiter::{AdhocSlot, AdhocState, Deployment, may_modify, snapshot_of};
use crate::error::RegistryError;

type Result<T> = std::result::Result<T, RegistryError>;

/// Number of entries of each kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    /// Registered jobs.
    pub jobs: usize,
    /// Registered ad-hoc storage instances.
    pub adhoc_storage: usize,
    /// Registered PFS storage instances.
    pub pfs_storage: usize,
}

/// In-memory registry of jobs and storage.
///
/// The registry is volatile: its contents live as long as the process.
pub struct Registry {
    ids: Arc<IdAllocator>,
    /// Registered jobs, keyed by id.
    pub(crate) jobs: RwLock<HashMap<JobId, Job>>,
    /// Registered ad-hoc storage, each entry behind its own lock.
    pub(crate) adhoc: RwLock<HashMap<AdhocStorageId, Arc<AdhocSlot>>>,
    /// Registered PFS storage, keyed by id.
    pfs: RwLock<HashMap<PfsStorageId, PfsStorage>>,
}

impl Registry {
    /// Create an empty registry drawing ids from `ids`.
    pub fn new(ids: Arc<IdAllocator>) -> Arc<Self> {
        Arc::new(Self {
            ids,
            jobs: RwLock::new(HashMap::new()),
            adhoc: RwLock::new(HashMap::new()),
            pfs: RwLock::new(HashMap::new()),
        })
    }

    fn allocate(&self) -> Result<u64> {
        self.ids.allocate().ok_or(RegistryError::IdsExhausted)
    }

    pub(crate) async fn adhoc_slot(&self, id: AdhocStorageId) -> Result<Arc<AdhocSlot>> {
        self.adhoc
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::AdhocStorageNotFound(id))
    }

    /// Number of registered entries of each kind.
    pub async fn counts(&self) -> RegistryCounts {
        RegistryCounts {
            jobs: self.jobs.read().await.len(),
            adhoc_storage: self.adhoc.read().await.len(),
            pfs_storage: self.pfs.read().await.len(),
        }
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Register a job.
    ///
    /// If the requirements reference an ad-hoc storage, the storage must be
    /// registered and free; the new job becomes its bound client.
    pub async fn register_job(
        &self,
        slurm_id: u64,
        resources: JobResources,
        requirements: JobRequirements,
    ) -> Result<Job> {
        let mut jobs = self.jobs.write().await;

        if jobs.values().any(|j| j.slurm_id == slurm_id) {
            return Err(RegistryError::BadArguments(format!(
                "slurm job {slurm_id} is already registered"
            )));
        }

        let slot = match requirements.adhoc_storage {
            Some(adhoc) => Some(self.adhoc_slot(adhoc).await.map_err(|_| {
                RegistryError::BadArguments(format!("unknown adhoc storage {adhoc}"))
            })?),
            None => None,
        };

        let id = JobId::from(self.allocate()?);
        if let Some(slot) = &slot {
            slot.bind(id).await?;
        }

        let job = Job {
            id,
            slurm_id,
            resources,
            requirements,
        };
        jobs.insert(id, job.clone());

        info!(job = %id, slurm_id, adhoc = ?job.requirements.adhoc_storage, "job registered");
        Ok(job)
    }

    /// Replace a job's resources and, optionally, its requirements.
    ///
    /// The update is applied under the jobs write lock, so readers observe
    /// either the old or the new job. Moving the job to a different ad-hoc
    /// storage binds the new one before releasing the old one.
    pub async fn update_job(
        &self,
        id: JobId,
        resources: JobResources,
        requirements: Option<JobRequirements>,
    ) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(RegistryError::JobNotFound(id))?;

        if let Some(requirements) = &requirements {
            let old = job.requirements.adhoc_storage;
            let new = requirements.adhoc_storage;
            if old != new {
                if let Some(adhoc) = new {
                    let slot = self.adhoc_slot(adhoc).await.map_err(|_| {
                        RegistryError::BadArguments(format!("unknown adhoc storage {adhoc}"))
                    })?;
                    slot.bind(id).await?;
                }
                if let Some(adhoc) = old
                    && let Ok(slot) = self.adhoc_slot(adhoc).await
                {
                    slot.release(id).await;
                }
            }
        }

        job.resources = resources;
        if let Some(requirements) = requirements {
            job.requirements = requirements;
        }

        debug!(job = %id, "job updated");
        Ok(job.clone())
    }

    /// Remove a job, first releasing any ad-hoc storage it is bound to.
    pub async fn remove_job(&self, id: JobId) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&id) {
            return Err(RegistryError::JobNotFound(id));
        }

        let slots: Vec<Arc<AdhocSlot>> = self.adhoc.read().await.values().cloned().collect();
        for slot in slots {
            if slot.release(id).await {
                info!(job = %id, adhoc = %slot.id(), "adhoc storage released by job removal");
            }
        }

        let job = jobs.remove(&id).ok_or(RegistryError::JobNotFound(id))?;
        info!(job = %id, "job removed");
        Ok(job)
    }

    /// Look up a job.
    pub async fn job(&self, id: JobId) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::JobNotFound(id))
    }

    /// Look up a job by the id the batch scheduler gave it.
    pub async fn job_by_slurm_id(&self, slurm_id: u64) -> Result<Job> {
        self.jobs
            .read()
            .await
            .values()
            .find(|j| j.slurm_id == slurm_id)
            .cloned()
            .ok_or(RegistryError::SlurmJobNotFound(slurm_id))
    }

    // ------------------------------------------------------------------
    // Ad-hoc storage
    // ------------------------------------------------------------------

    /// Register an ad-hoc storage instance. It starts unbound and undeployed.
    pub async fn register_adhoc_storage(
        &self,
        name: String,
        kind: AdhocStorageType,
        ctx: AdhocStorageCtx,
        resources: AdhocStorageResources,
    ) -> Result<AdhocStorage> {
        let id = AdhocStorageId::from(self.allocate()?);
        let slot = Arc::new(AdhocSlot::new(
            id,
            AdhocState {
                name,
                kind,
                ctx,
                resources,
                client: None,
                deployment: Deployment::Undeployed,
            },
        ));
        let snapshot = slot.snapshot().await;

        self.adhoc.write().await.insert(id, slot);

        info!(adhoc = %id, name = %snapshot.name, kind = %kind, nodes = snapshot.node_count(), "adhoc storage registered");
        Ok(snapshot)
    }

    /// Replace the execution context of an ad-hoc storage instance.
    ///
    /// `caller` must be the bound client, or no client may be bound.
    pub async fn update_adhoc_storage(
        &self,
        id: AdhocStorageId,
        ctx: AdhocStorageCtx,
        caller: Option<JobId>,
    ) -> Result<AdhocStorage> {
        let slot = self.adhoc_slot(id).await?;
        let mut state = slot.write().await;

        may_modify(id, state.client, caller)?;
        if matches!(
            state.deployment,
            Deployment::Deploying | Deployment::TearingDown { .. }
        ) {
            return Err(RegistryError::InvalidState {
                adhoc: id,
                reason: "deployment change in progress",
            });
        }

        state.ctx = ctx;
        debug!(adhoc = %id, "adhoc storage updated");
        Ok(snapshot_of(id, &state))
    }

    /// Remove an ad-hoc storage instance.
    ///
    /// `caller` must be the bound client, or no client may be bound. A job
    /// that referenced the storage loses the reference.
    pub async fn remove_adhoc_storage(
        &self,
        id: AdhocStorageId,
        caller: Option<JobId>,
    ) -> Result<AdhocStorage> {
        let mut jobs = self.jobs.write().await;
        let mut adhoc = self.adhoc.write().await;
        let slot = adhoc
            .get(&id)
            .cloned()
            .ok_or(RegistryError::AdhocStorageNotFound(id))?;

        let snapshot = {
            let state = slot.write().await;
            may_modify(id, state.client, caller)?;
            if matches!(
                state.deployment,
                Deployment::Deploying | Deployment::TearingDown { .. }
            ) {
                return Err(RegistryError::InvalidState {
                    adhoc: id,
                    reason: "deployment change in progress",
                });
            }
            snapshot_of(id, &state)
        };

        adhoc.remove(&id);
        for job in jobs.values_mut() {
            if job.requirements.adhoc_storage == Some(id) {
                job.requirements.adhoc_storage = None;
            }
        }

        info!(adhoc = %id, "adhoc storage removed");
        Ok(snapshot)
    }

    /// Look up an ad-hoc storage instance.
    pub async fn adhoc_storage(&self, id: AdhocStorageId) -> Result<AdhocStorage> {
        Ok(self.adhoc_slot(id).await?.snapshot().await)
    }

    /// Snapshots of every registered ad-hoc storage instance, by id.
    pub async fn adhoc_storages(&self) -> Vec<AdhocStorage> {
        let slots: Vec<Arc<AdhocSlot>> = self.adhoc.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.snapshot().await);
        }
        out.sort_by_key(|s| s.id);
        out
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
        let id = PfsStorageId::from(self.allocate()?);
        let pfs = PfsStorage {
            id,
            name,
            kind,
            ctx,
        };
        self.pfs.write().await.insert(id, pfs.clone());

        info!(pfs = %id, name = %pfs.name, mount_point = %pfs.ctx.mount_point, "pfs storage registered");
        Ok(pfs)
    }

    /// Replace the execution context of a PFS storage instance.
    pub async fn update_pfs_storage(&self, id: PfsStorageId, ctx: PfsStorageCtx) -> Result<PfsStorage> {
        let mut pfs = self.pfs.write().await;
        let entry = pfs.get_mut(&id).ok_or(RegistryError::PfsStorageNotFound(id))?;
        entry.ctx = ctx;

        debug!(pfs = %id, "pfs storage updated");
        Ok(entry.clone())
    }

    /// Remove a PFS storage instance.
    pub async fn remove_pfs_storage(&self, id: PfsStorageId) -> Result<PfsStorage> {
        let removed = self
            .pfs
            .write()
            .await
            .remove(&id)
            .ok_or(RegistryError::PfsStorageNotFound(id))?;

        info!(pfs = %id, "pfs storage removed");
        Ok(removed)
    }

    /// Look up a PFS storage instance.
    pub async fn pfs_storage(&self, id: PfsStorageId) -> Result<PfsStorage> {
        self.pfs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::PfsStorageNotFound(id))
    }

    /// Look up a storage instance of either kind by raw id.
    pub async fn storage(&self, raw_id: u64) -> Result<Storage> {
        if let Ok(adhoc) = self.adhoc_storage(AdhocStorageId::from(raw_id)).await {
            return Ok(Storage::Adhoc(adhoc));
        }
        self.pfs_storage(PfsStorageId::from(raw_id))
            .await
            .map(Storage::Pfs)
            .map_err(|_| RegistryError::StorageNotFound(raw_id))
    }
}
