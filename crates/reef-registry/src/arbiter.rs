//! Ownership arbitration for ad-hoc storage.
//!
//! Every ad-hoc storage entry is an [`AdhocSlot`] with its own lock. The
//! slot records the bound client (at most one job) and the deployment
//! state. Deployment and teardown are two-phase: `begin_*` flips the slot
//! into a transitional state under the lock and returns a
//! [`DeploymentPlan`]; the caller releases everything, talks to the
//! controller, then calls `complete_*` or `abort_*`.

use reef_types::{
    AdhocStorage, AdhocStorageCtx, AdhocStorageId, AdhocStorageResources, AdhocStorageType, JobId,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::registry::Registry;

type Result<T> = std::result::Result<T, RegistryError>;

/// Deployment state of an ad-hoc storage instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Deployment {
    Undeployed,
    Deploying,
    Deployed { mount_path: String },
    TearingDown { mount_path: String },
}

/// Mutable state of an ad-hoc storage entry.
#[derive(Debug)]
pub(crate) struct AdhocState {
    pub(crate) name: String,
    pub(crate) kind: AdhocStorageType,
    pub(crate) ctx: AdhocStorageCtx,
    pub(crate) resources: AdhocStorageResources,
    pub(crate) client: Option<JobId>,
    pub(crate) deployment: Deployment,
}

/// A registered ad-hoc storage instance guarded by its own lock.
#[derive(Debug)]
pub(crate) struct AdhocSlot {
    id: AdhocStorageId,
    state: RwLock<AdhocState>,
}

/// Everything a controller needs to deploy or tear down a storage instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    /// The storage being deployed.
    pub id: AdhocStorageId,
    /// Storage system to launch.
    pub kind: AdhocStorageType,
    /// Execution context, including the controller address.
    pub ctx: AdhocStorageCtx,
    /// Nodes to launch on.
    pub resources: AdhocStorageResources,
    /// Mount path of the current deployment (teardown only).
    pub mount_path: Option<String>,
}

impl AdhocSlot {
    pub(crate) fn new(id: AdhocStorageId, state: AdhocState) -> Self {
        Self {
            id,
            state: RwLock::new(state),
        }
    }

    pub(crate) fn id(&self) -> AdhocStorageId {
        self.id
    }

    pub(crate) async fn snapshot(&self) -> AdhocStorage {
        let state = self.state.read().await;
        snapshot_of(self.id, &state)
    }

    pub(crate) async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AdhocState> {
        self.state.write().await
    }

    /// Record `job` as the exclusive client.
    pub(crate) async fn bind(&self, job: JobId) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(client) = state.client {
            return Err(RegistryError::AdhocInUse {
                adhoc: self.id,
                client,
            });
        }
        state.client = Some(job);
        Ok(())
    }

    /// Clear the binding if it is held by `job`.
    pub(crate) async fn release(&self, job: JobId) -> bool {
        let mut state = self.state.write().await;
        if state.client == Some(job) {
            state.client = None;
            true
        } else {
            false
        }
    }

    pub(crate) async fn client(&self) -> Option<JobId> {
        self.state.read().await.client
    }
}

pub(crate) fn snapshot_of(id: AdhocStorageId, state: &AdhocState) -> AdhocStorage {
    let mount_path = match &state.deployment {
        Deployment::Deployed { mount_path } | Deployment::TearingDown { mount_path } => {
            Some(mount_path.clone())
        }
        Deployment::Undeployed | Deployment::Deploying => None,
    };
    AdhocStorage {
        id,
        name: state.name.clone(),
        kind: state.kind,
        ctx: state.ctx.clone(),
        resources: state.resources.clone(),
        client: state.client,
        mount_path,
    }
}

/// Whether `caller` may modify a storage currently bound to `client`.
pub(crate) fn may_modify(
    adhoc: AdhocStorageId,
    client: Option<JobId>,
    caller: Option<JobId>,
) -> Result<()> {
    match client {
        Some(bound) if Some(bound) != caller => Err(RegistryError::AdhocInUse {
            adhoc,
            client: bound,
        }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Arbiter operations
// ---------------------------------------------------------------------------

impl Registry {
    /// Bind `job` as the exclusive client of `adhoc`.
    ///
    /// Fails with [`RegistryError::AdhocInUse`] if any job is already bound,
    /// leaving the existing binding untouched, and with
    /// [`RegistryError::JobAlreadyBound`] if the job holds another storage.
    /// On success the job's requirements point at `adhoc`.
    pub async fn bind(&self, adhoc: AdhocStorageId, job: JobId) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job).ok_or(RegistryError::JobNotFound(job))?;
        let slot = self.adhoc_slot(adhoc).await?;

        if let Some(held) = entry.requirements.adhoc_storage
            && held != adhoc
        {
            return Err(RegistryError::JobAlreadyBound { job, adhoc: held });
        }

        slot.bind(job).await?;
        entry.requirements.adhoc_storage = Some(adhoc);

        info!(%adhoc, %job, "adhoc storage bound");
        Ok(())
    }

    /// Clear the binding of `adhoc`, whoever holds it. Idempotent.
    ///
    /// The released job no longer references the storage.
    pub async fn unbind(&self, adhoc: AdhocStorageId) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let slot = self.adhoc_slot(adhoc).await?;
        let previous = {
            let mut state = slot.write().await;
            state.client.take()
        };

        if let Some(job) = previous {
            if let Some(entry) = jobs.get_mut(&job)
                && entry.requirements.adhoc_storage == Some(adhoc)
            {
                entry.requirements.adhoc_storage = None;
            }
            info!(%adhoc, %job, "adhoc storage unbound");
        }
        Ok(())
    }

    /// The job currently bound to `adhoc`, if any.
    pub async fn current_client(&self, adhoc: AdhocStorageId) -> Result<Option<JobId>> {
        let slot = self.adhoc_slot(adhoc).await?;
        Ok(slot.client().await)
    }

    /// Mark `adhoc` as being deployed and return what the controller needs.
    ///
    /// Fails with [`RegistryError::AlreadyDeployed`] if a deployment exists or
    /// is already in flight.
    pub async fn begin_deploy(&self, adhoc: AdhocStorageId) -> Result<DeploymentPlan> {
        let slot = self.adhoc_slot(adhoc).await?;
        let mut state = slot.write().await;

        match state.deployment {
            Deployment::Undeployed => {}
            Deployment::Deploying | Deployment::Deployed { .. } => {
                return Err(RegistryError::AlreadyDeployed(adhoc));
            }
            Deployment::TearingDown { .. } => {
                return Err(RegistryError::InvalidState {
                    adhoc,
                    reason: "teardown in progress",
                });
            }
        }

        state.deployment = Deployment::Deploying;
        debug!(%adhoc, "deployment started");
        Ok(DeploymentPlan {
            id: adhoc,
            kind: state.kind,
            ctx: state.ctx.clone(),
            resources: state.resources.clone(),
            mount_path: None,
        })
    }

    /// Record the mount path produced by a successful deployment.
    pub async fn complete_deploy(
        &self,
        adhoc: AdhocStorageId,
        mount_path: String,
    ) -> Result<AdhocStorage> {
        let slot = self.adhoc_slot(adhoc).await?;
        let mut state = slot.write().await;

        if state.deployment != Deployment::Deploying {
            return Err(RegistryError::InvalidState {
                adhoc,
                reason: "no deployment in progress",
            });
        }

        info!(%adhoc, %mount_path, "adhoc storage deployed");
        state.deployment = Deployment::Deployed { mount_path };
        Ok(snapshot_of(adhoc, &state))
    }

    /// Return `adhoc` to the undeployed state after a failed deployment.
    ///
    /// The entry stays registered and can be deployed again.
    pub async fn abort_deploy(&self, adhoc: AdhocStorageId) -> Result<()> {
        let slot = self.adhoc_slot(adhoc).await?;
        let mut state = slot.write().await;
        if state.deployment == Deployment::Deploying {
            state.deployment = Deployment::Undeployed;
            debug!(%adhoc, "deployment aborted");
        }
        Ok(())
    }

    /// Mark a deployed `adhoc` as being torn down.
    pub async fn begin_teardown(&self, adhoc: AdhocStorageId) -> Result<DeploymentPlan> {
        let slot = self.adhoc_slot(adhoc).await?;
        let mut state = slot.write().await;

        let mount_path = match &state.deployment {
            Deployment::Deployed { mount_path } => mount_path.clone(),
            Deployment::Undeployed => {
                return Err(RegistryError::InvalidState {
                    adhoc,
                    reason: "not deployed",
                });
            }
            Deployment::Deploying | Deployment::TearingDown { .. } => {
                return Err(RegistryError::InvalidState {
                    adhoc,
                    reason: "deployment change in progress",
                });
            }
        };

        state.deployment = Deployment::TearingDown {
            mount_path: mount_path.clone(),
        };
        Ok(DeploymentPlan {
            id: adhoc,
            kind: state.kind,
            ctx: state.ctx.clone(),
            resources: state.resources.clone(),
            mount_path: Some(mount_path),
        })
    }

    /// Clear the deployment after a successful teardown.
    pub async fn complete_teardown(&self, adhoc: AdhocStorageId) -> Result<AdhocStorage> {
        let slot = self.adhoc_slot(adhoc).await?;
        let mut state = slot.write().await;

        if !matches!(state.deployment, Deployment::TearingDown { .. }) {
            return Err(RegistryError::InvalidState {
                adhoc,
                reason: "no teardown in progress",
            });
        }

        state.deployment = Deployment::Undeployed;
        info!(%adhoc, "adhoc storage torn down");
        Ok(snapshot_of(adhoc, &state))
    }

    /// Restore the previous deployment after a failed teardown.
    pub async fn abort_teardown(&self, adhoc: AdhocStorageId) -> Result<()> {
        let slot = self.adhoc_slot(adhoc).await?;
        let mut state = slot.write().await;
        if let Deployment::TearingDown { mount_path } = &state.deployment {
            state.deployment = Deployment::Deployed {
                mount_path: mount_path.clone(),
            };
        }
        Ok(())
    }
}
