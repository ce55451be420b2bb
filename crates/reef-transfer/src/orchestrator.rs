//! [`TransferOrchestrator`] implementation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reef_types::{
    Dataset, IdAllocator, JobId, QosLimit, Transfer, TransferId, TransferMapping,
    TransferProgress, TransferStatus,
};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::TransferError;

type Result<T> = std::result::Result<T, TransferError>;

/// Priority assigned to new transfers.
pub const DEFAULT_PRIORITY: i64 = 0;

/// Mutable part of a transfer, guarded by the transfer's own lock.
#[derive(Debug)]
struct TransferState {
    priority: i64,
    status: TransferStatus,
    progress: TransferProgress,
}

/// A transfer and its lock.
#[derive(Debug)]
struct TransferEntry {
    id: TransferId,
    job_id: JobId,
    /// Creation order, used to break priority ties.
    seq: u64,
    sources: Vec<Dataset>,
    targets: Vec<Dataset>,
    qos_limits: Vec<QosLimit>,
    mapping: TransferMapping,
    state: Mutex<TransferState>,
    status_tx: watch::Sender<TransferStatus>,
}

impl TransferEntry {
    fn snapshot(&self, state: &TransferState) -> Transfer {
        Transfer {
            id: self.id,
            job_id: self.job_id,
            sources: self.sources.clone(),
            targets: self.targets.clone(),
            qos_limits: self.qos_limits.clone(),
            mapping: self.mapping,
            priority: state.priority,
            status: state.status,
            progress: state.progress.clone(),
        }
    }
}

/// Order of statuses along the only permitted direction of travel.
fn rank(status: TransferStatus) -> u8 {
    match status {
        TransferStatus::Pending => 0,
        TransferStatus::InProgress => 1,
        TransferStatus::Finished | TransferStatus::Failed | TransferStatus::Cancelled => 2,
    }
}

/// Transfers by id, indexed by owning job.
#[derive(Default)]
struct TransferTable {
    entries: HashMap<TransferId, Arc<TransferEntry>>,
    by_job: HashMap<JobId, BTreeSet<TransferId>>,
}

/// Creates and tracks dataset transfers.
pub struct TransferOrchestrator {
    ids: Arc<IdAllocator>,
    transfers: RwLock<TransferTable>,
    next_seq: AtomicU64,
}

impl TransferOrchestrator {
    /// Create an orchestrator drawing ids from `ids`.
    pub fn new(ids: Arc<IdAllocator>) -> Arc<Self> {
        Arc::new(Self {
            ids,
            transfers: RwLock::new(TransferTable::default()),
            next_seq: AtomicU64::new(0),
        })
    }

    async fn entry(&self, id: TransferId) -> Result<Arc<TransferEntry>> {
        self.transfers
            .read()
            .await
            .entries
            .get(&id)
            .cloned()
            .ok_or(TransferError::NotFound(id))
    }

    async fn entries_for(&self, job: JobId) -> Vec<Arc<TransferEntry>> {
        let table = self.transfers.read().await;
        let Some(ids) = table.by_job.get(&job) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| table.entries.get(id).cloned())
            .collect()
    }

    /// Number of transfers currently tracked.
    pub async fn count(&self) -> usize {
        self.transfers.read().await.entries.len()
    }

    /// Create a pending transfer for `job`.
    ///
    /// The source and target counts must fit `mapping`. The limits are
    /// copied; later changes to the caller's limits do not affect the
    /// transfer.
    pub async fn create(
        &self,
        job: JobId,
        sources: Vec<Dataset>,
        targets: Vec<Dataset>,
        qos_limits: &[QosLimit],
        mapping: TransferMapping,
    ) -> Result<Transfer> {
        if !mapping.accepts(sources.len(), targets.len()) {
            return Err(TransferError::MappingMismatch {
                mapping,
                sources: sources.len(),
                targets: targets.len(),
            });
        }

        let id = TransferId::from(self.ids.allocate().ok_or(TransferError::IdsExhausted)?);
        let (status_tx, _) = watch::channel(TransferStatus::Pending);

        let mut table = self.transfers.write().await;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;

        let entry = Arc::new(TransferEntry {
            id,
            job_id: job,
            seq,
            sources,
            targets,
            qos_limits: qos_limits.to_vec(),
            mapping,
            state: Mutex::new(TransferState {
                priority: DEFAULT_PRIORITY,
                status: TransferStatus::Pending,
                progress: TransferProgress::default(),
            }),
            status_tx,
        });
        let snapshot = {
            let state = entry.state.lock().await;
            entry.snapshot(&state)
        };
        table.entries.insert(id, entry);
        table.by_job.entry(job).or_default().insert(id);

        info!(transfer = %id, %job, sources = snapshot.sources.len(), targets = snapshot.targets.len(), ?mapping, "transfer created");
        Ok(snapshot)
    }

    /// Snapshot of a transfer.
    pub async fn transfer(&self, id: TransferId) -> Result<Transfer> {
        let entry = self.entry(id).await?;
        let state = entry.state.lock().await;
        Ok(entry.snapshot(&state))
    }

    /// All transfers of `job`, in creation order.
    pub async fn transfers_for(&self, job: JobId) -> Vec<Transfer> {
        let mut entries = self.entries_for(job).await;
        entries.sort_by_key(|e| e.seq);

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let state = entry.state.lock().await;
            out.push(entry.snapshot(&state));
        }
        out
    }

    /// Non-terminal transfers of `job`, highest priority first, ties broken
    /// by creation order.
    pub async fn pending(&self, job: JobId) -> Vec<Transfer> {
        let entries = self.entries_for(job).await;

        let mut live = Vec::new();
        for entry in entries {
            let state = entry.state.lock().await;
            if !state.status.is_terminal() {
                live.push((state.priority, entry.seq, entry.snapshot(&state)));
            }
        }

        live.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        live.into_iter().map(|(_, _, t)| t).collect()
    }

    /// Shift the priority of a pending transfer by `delta`.
    ///
    /// Returns the new priority.
    pub async fn set_priority(&self, id: TransferId, delta: i64) -> Result<i64> {
        let entry = self.entry(id).await?;
        let mut state = entry.state.lock().await;

        if state.status != TransferStatus::Pending {
            return Err(TransferError::NotSchedulable {
                id,
                status: state.status,
            });
        }

        state.priority = state.priority.saturating_add(delta);
        debug!(transfer = %id, delta, priority = state.priority, "transfer priority changed");
        Ok(state.priority)
    }

    /// Current priority of a transfer that has not yet finished.
    pub async fn priority(&self, id: TransferId) -> Result<i64> {
        let entry = self.entry(id).await?;
        let state = entry.state.lock().await;

        if state.status.is_terminal() {
            return Err(TransferError::NotSchedulable {
                id,
                status: state.status,
            });
        }
        Ok(state.priority)
    }

    /// Cancel a transfer.
    ///
    /// Cancelling an already cancelled transfer succeeds. Cancelling a
    /// finished or failed transfer is an invalid transition. Cancellation
    /// only records state; the data mover observes it on its next update.
    pub async fn cancel(&self, id: TransferId) -> Result<TransferStatus> {
        let entry = self.entry(id).await?;
        let mut state = entry.state.lock().await;

        match state.status {
            TransferStatus::Cancelled => return Ok(TransferStatus::Cancelled),
            TransferStatus::Finished | TransferStatus::Failed => {
                return Err(TransferError::InvalidTransition {
                    id,
                    from: state.status,
                    to: TransferStatus::Cancelled,
                });
            }
            TransferStatus::Pending | TransferStatus::InProgress => {}
        }

        state.status = TransferStatus::Cancelled;
        entry.status_tx.send_replace(TransferStatus::Cancelled);
        info!(transfer = %id, "transfer cancelled");
        Ok(TransferStatus::Cancelled)
    }

    /// Record progress reported by the data mover.
    ///
    /// Status only moves forward: pending, then in progress, then a terminal
    /// state. Updates to a terminal transfer, and regressions, are invalid
    /// transitions.
    pub async fn update(
        &self,
        id: TransferId,
        status: TransferStatus,
        progress: TransferProgress,
    ) -> Result<TransferStatus> {
        let entry = self.entry(id).await?;
        let mut state = entry.state.lock().await;

        if state.status.is_terminal() || rank(status) < rank(state.status) {
            warn!(transfer = %id, from = %state.status, to = %status, "rejected transfer update");
            return Err(TransferError::InvalidTransition {
                id,
                from: state.status,
                to: status,
            });
        }

        let changed = state.status != status;
        state.status = status;
        state.progress = progress;
        if changed {
            entry.status_tx.send_replace(status);
            info!(transfer = %id, %status, "transfer status changed");
        } else {
            debug!(transfer = %id, bytes = state.progress.bytes_transferred, "transfer progress");
        }
        Ok(status)
    }

    /// Wait until the transfer reaches a terminal state and return it.
    ///
    /// Yields while waiting; wrap in `tokio::time::timeout` for a deadline.
    pub async fn wait(&self, id: TransferId) -> Result<TransferStatus> {
        let mut rx = {
            let entry = self.entry(id).await?;
            entry.status_tx.subscribe()
        };

        match rx.wait_for(|s| s.is_terminal()).await {
            Ok(status) => Ok(*status),
            // Entries are evicted only once terminal, and `wait_for` checks
            // the final value before reporting a closed channel.
            Err(_) => Err(TransferError::NotFound(id)),
        }
    }

    /// Cancel every non-terminal transfer of `job`. Returns how many were
    /// cancelled.
    pub async fn cancel_all(&self, job: JobId) -> usize {
        let mut cancelled = 0;
        for entry in self.entries_for(job).await {
            let mut state = entry.state.lock().await;
            if !state.status.is_terminal() {
                state.status = TransferStatus::Cancelled;
                entry.status_tx.send_replace(TransferStatus::Cancelled);
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            info!(%job, cancelled, "cancelled outstanding transfers");
        }
        cancelled
    }

    /// Forget the terminal transfers of `job`. Returns how many were
    /// dropped.
    ///
    /// Waiters already subscribed still observe the final status; later
    /// lookups fail with [`TransferError::NotFound`].
    pub async fn evict_job(&self, job: JobId) -> usize {
        let mut table = self.transfers.write().await;
        let Some(ids) = table.by_job.remove(&job) else {
            return 0;
        };

        let mut kept = BTreeSet::new();
        let mut evicted = 0;
        for id in ids {
            let Some(entry) = table.entries.get(&id) else {
                continue;
            };
            if entry.status_tx.borrow().is_terminal() {
                table.entries.remove(&id);
                evicted += 1;
            } else {
                kept.insert(id);
            }
        }
        if !kept.is_empty() {
            table.by_job.insert(job, kept);
        }

        debug!(%job, evicted, "evicted transfers");
        evicted
    }
}
