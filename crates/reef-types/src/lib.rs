//! Shared types and identifiers for reef.
//!
//! This crate defines the vocabulary used across the reef workspace:
//! identifiers ([`JobId`], [`AdhocStorageId`], [`PfsStorageId`],
//! [`TransferId`], [`DataOperationId`]) and the allocator that hands them out,
//! the job and storage model ([`Job`], [`AdhocStorage`], [`PfsStorage`]),
//! transfers and QoS limits ([`Transfer`], [`QosLimit`]), data operations
//! ([`DataOperation`]) and the wire-level [`ErrorCode`].
//!
//! Everything here is a plain value: cross-entity references are always ids,
//! never pointers, and every type is serde-serializable so it can cross the
//! RPC boundary unchanged.

mod code;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub use code::ErrorCode;

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Return the raw numeric representation.
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a registered job.
    JobId
);

define_id!(
    /// Identifier of a registered ad-hoc storage instance.
    AdhocStorageId
);

define_id!(
    /// Identifier of a registered parallel file system storage instance.
    PfsStorageId
);

define_id!(
    /// Identifier of a dataset transfer.
    TransferId
);

define_id!(
    /// Identifier of a data operation.
    DataOperationId
);

/// Process-wide source of entity identifiers.
///
/// A single allocator is shared by every component so that no two entities
/// ever carry the same numeric id, whatever their kind. Ids start at 1 and
/// are never reused.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next id, or `None` once the id space is exhausted.
    pub fn allocate(&self) -> Option<u64> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .ok()
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed).saturating_sub(1)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Nodes and datasets
// ---------------------------------------------------------------------------

/// Role of a compute node within the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A regular compute node.
    #[default]
    Regular,
    /// A login/service node.
    Administrative,
}

/// A cluster node, identified by hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Hostname as reported by the batch scheduler.
    pub hostname: String,
    /// Role of the node.
    pub kind: NodeKind,
}

impl Node {
    /// A regular compute node with the given hostname.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            kind: NodeKind::Regular,
        }
    }
}

/// A logical piece of data at some storage tier.
///
/// Compared by identifier. Identifiers may carry a tier prefix such as
/// `lustre:/scratch/in` or `gekkofs:/in`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset identifier.
    pub id: String,
}

impl Dataset {
    /// Create a dataset from its identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The tier prefix of the identifier (`lustre` in `lustre:/in`), if any.
    pub fn tier(&self) -> Option<&str> {
        let (tier, rest) = self.id.split_once(':')?;
        if tier.is_empty() || rest.is_empty() {
            None
        } else {
            Some(tier)
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A desired movement of data from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRoute {
    /// Where the data currently lives.
    pub source: Dataset,
    /// Where the data should end up.
    pub target: Dataset,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Nodes allocated to a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResources {
    /// Allocated nodes.
    pub nodes: Vec<Node>,
}

/// What a job needs from the storage hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequirements {
    /// Datasets to stage in before the job runs.
    pub inputs: Vec<DatasetRoute>,
    /// Datasets to stage out after the job completes.
    pub outputs: Vec<DatasetRoute>,
    /// Datasets the job is expected to produce.
    pub expected_outputs: Vec<DatasetRoute>,
    /// Ad-hoc storage the job runs against, if any.
    pub adhoc_storage: Option<AdhocStorageId>,
}

/// A registered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Identifier assigned at registration.
    pub id: JobId,
    /// Identifier assigned by the batch scheduler.
    pub slurm_id: u64,
    /// Allocated nodes.
    pub resources: JobResources,
    /// Storage requirements.
    pub requirements: JobRequirements,
}

/// Summary returned when looking a job up by its scheduler id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Identifier assigned at registration.
    pub job_id: JobId,
    /// Controller address of the job's ad-hoc storage (empty without one).
    pub adhoc_controller_address: String,
    /// Number of nodes serving the job's ad-hoc storage.
    pub io_procs: u32,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Supported ad-hoc storage systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdhocStorageType {
    /// GekkoFS.
    Gekkofs,
    /// dataClay.
    Dataclay,
    /// Expand.
    Expand,
    /// Hercules.
    Hercules,
}

impl AdhocStorageType {
    /// All supported types.
    pub const ALL: [AdhocStorageType; 4] = [
        AdhocStorageType::Gekkofs,
        AdhocStorageType::Dataclay,
        AdhocStorageType::Expand,
        AdhocStorageType::Hercules,
    ];

    /// Lowercase name, as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            AdhocStorageType::Gekkofs => "gekkofs",
            AdhocStorageType::Dataclay => "dataclay",
            AdhocStorageType::Expand => "expand",
            AdhocStorageType::Hercules => "hercules",
        }
    }

    /// Parse a lowercase name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for AdhocStorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an ad-hoc storage instance relates to the job using it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Runs inside the job allocation, sharing nodes with the application.
    InJobShared,
    /// Runs inside the job allocation on dedicated nodes.
    InJobDedicated,
    /// Runs in a new, separate allocation.
    SeparateNew,
    /// Runs in an existing, separate allocation.
    SeparateExisting,
}

/// Access permitted on an ad-hoc storage instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    /// Read only.
    ReadOnly,
    /// Write only.
    WriteOnly,
    /// Read and write.
    ReadWrite,
}

/// Execution context of an ad-hoc storage instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdhocStorageCtx {
    /// Address of the controller that deploys this storage. When empty the
    /// address is resolved from the storage's first node.
    pub controller_address: String,
    /// Address of the data mover serving this storage.
    pub data_mover_address: String,
    /// Execution mode.
    pub execution_mode: ExecutionMode,
    /// Access mode.
    pub access_mode: AccessMode,
    /// Expected lifetime, in seconds.
    pub walltime: u32,
    /// Whether data should be flushed in the background.
    pub should_flush: bool,
}

/// Nodes an ad-hoc storage instance is deployed on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdhocStorageResources {
    /// Nodes assigned to the storage.
    pub nodes: Vec<Node>,
}

/// Snapshot of a registered ad-hoc storage instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdhocStorage {
    /// Identifier assigned at registration.
    pub id: AdhocStorageId,
    /// User-supplied name.
    pub name: String,
    /// Storage system.
    pub kind: AdhocStorageType,
    /// Execution context.
    pub ctx: AdhocStorageCtx,
    /// Assigned nodes.
    pub resources: AdhocStorageResources,
    /// The job currently bound to this storage, if any.
    pub client: Option<JobId>,
    /// Mount path recorded by a successful deployment.
    pub mount_path: Option<String>,
}

impl AdhocStorage {
    /// Number of nodes assigned to the storage.
    pub fn node_count(&self) -> usize {
        self.resources.nodes.len()
    }

    /// Whether the storage has been deployed.
    pub fn is_deployed(&self) -> bool {
        self.mount_path.is_some()
    }
}

/// Supported parallel file systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PfsStorageType {
    /// Lustre.
    Lustre,
    /// IBM Spectrum Scale.
    Gpfs,
}

/// Execution context of a PFS storage instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PfsStorageCtx {
    /// Where the file system is mounted.
    pub mount_point: String,
}

/// A registered parallel file system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PfsStorage {
    /// Identifier assigned at registration.
    pub id: PfsStorageId,
    /// User-supplied name.
    pub name: String,
    /// File system type.
    pub kind: PfsStorageType,
    /// Execution context.
    pub ctx: PfsStorageCtx,
}

/// Either kind of registered storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Storage {
    /// Job-scoped ad-hoc storage.
    Adhoc(AdhocStorage),
    /// Persistent parallel file system.
    Pfs(PfsStorage),
}

impl Storage {
    /// Raw identifier of the storage.
    pub fn raw_id(&self) -> u64 {
        match self {
            Storage::Adhoc(s) => s.id.as_u64(),
            Storage::Pfs(s) => s.id.as_u64(),
        }
    }

    /// User-supplied name of the storage.
    pub fn name(&self) -> &str {
        match self {
            Storage::Adhoc(s) => &s.name,
            Storage::Pfs(s) => &s.name,
        }
    }
}

// ---------------------------------------------------------------------------
// QoS
// ---------------------------------------------------------------------------

/// What a QoS limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QosScope {
    /// A single dataset.
    Dataset,
    /// A single node.
    Node,
    /// A whole job.
    Job,
}

/// The quantity a QoS limit constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum QosClass {
    /// Bytes per second.
    Bandwidth,
    /// I/O operations per second.
    Iops,
}

/// The entity a QoS limit is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QosEntity {
    /// A dataset.
    Dataset(Dataset),
    /// A node, by hostname.
    Node(String),
    /// A job.
    Job(JobId),
}

impl QosEntity {
    /// The scope implied by the entity kind.
    pub fn scope(&self) -> QosScope {
        match self {
            QosEntity::Dataset(_) => QosScope::Dataset,
            QosEntity::Node(_) => QosScope::Node,
            QosEntity::Job(_) => QosScope::Job,
        }
    }
}

impl fmt::Display for QosEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QosEntity::Dataset(d) => write!(f, "dataset:{d}"),
            QosEntity::Node(h) => write!(f, "node:{h}"),
            QosEntity::Job(j) => write!(f, "job:{j}"),
        }
    }
}

/// A numeric QoS constraint on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QosLimit {
    /// The constrained entity.
    pub entity: QosEntity,
    /// The constrained quantity.
    pub class: QosClass,
    /// The limit value.
    pub value: u64,
}

impl QosLimit {
    /// The scope of the constrained entity.
    pub fn scope(&self) -> QosScope {
        self.entity.scope()
    }
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Cardinality relationship between a transfer's sources and targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMapping {
    /// Each source goes to the target at the same position.
    OneToOne,
    /// A single source is replicated to every target.
    OneToN,
    /// Many sources to as many targets.
    NToN,
}

impl TransferMapping {
    /// Whether `sources` sources and `targets` targets fit this mapping.
    pub fn accepts(&self, sources: usize, targets: usize) -> bool {
        match self {
            TransferMapping::OneToOne | TransferMapping::NToN => {
                sources > 0 && sources == targets
            }
            TransferMapping::OneToN => sources == 1 && targets > 0,
        }
    }
}

/// Lifecycle state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Registered, not yet started.
    Pending,
    /// Being moved by the data mover.
    InProgress,
    /// Completed successfully.
    Finished,
    /// Completed with an error.
    Failed,
    /// Cancelled by a client.
    Cancelled,
}

impl TransferStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Finished | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InProgress => "in_progress",
            TransferStatus::Finished => "finished",
            TransferStatus::Failed => "failed",
            TransferStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Progress reported by the data mover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes moved so far.
    pub bytes_transferred: u64,
    /// Total bytes to move, when known.
    pub total_bytes: Option<u64>,
    /// Error description for failed transfers.
    pub error: Option<String>,
}

/// Snapshot of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Identifier assigned at creation.
    pub id: TransferId,
    /// Owning job.
    pub job_id: JobId,
    /// Source datasets.
    pub sources: Vec<Dataset>,
    /// Target datasets.
    pub targets: Vec<Dataset>,
    /// Limits supplied at creation.
    pub qos_limits: Vec<QosLimit>,
    /// Source/target mapping.
    pub mapping: TransferMapping,
    /// Scheduling priority; larger runs first.
    pub priority: i64,
    /// Current state.
    pub status: TransferStatus,
    /// Last reported progress.
    pub progress: TransferProgress,
}

// ---------------------------------------------------------------------------
// Data operations
// ---------------------------------------------------------------------------

/// A typed argument passed to a data operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationArg {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// Free-form text.
    Text(String),
    /// Boolean switch.
    Flag(bool),
}

/// Lifecycle state of a data operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataOpStatus {
    /// Created, not yet wired to any dataset.
    Defined,
    /// Wired to its input and output datasets.
    Connected,
    /// Additionally tied to a transfer.
    Linked,
    /// Done; accepts no further transitions.
    Finalized,
}

impl fmt::Display for DataOpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataOpStatus::Defined => "defined",
            DataOpStatus::Connected => "connected",
            DataOpStatus::Linked => "linked",
            DataOpStatus::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// Result of a finalized data operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationOutcome {
    /// The operation completed.
    Succeeded,
    /// The operation, or the transfer it waited on, failed.
    Failed,
}

/// Input/output wiring of a connected data operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConnection {
    /// Datasets the operation reads.
    pub inputs: Vec<Dataset>,
    /// Datasets the operation writes.
    pub outputs: Vec<Dataset>,
    /// Whether data is streamed rather than staged.
    pub streaming: bool,
    /// Extra arguments supplied when connecting.
    pub arguments: Vec<OperationArg>,
}

/// A transfer a data operation waits on before finalizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLink {
    /// The linked transfer.
    pub transfer: TransferId,
    /// Whether data is streamed from the transfer.
    pub streaming: bool,
    /// Extra arguments supplied when linking.
    pub arguments: Vec<OperationArg>,
}

/// Snapshot of a data operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataOperation {
    /// Identifier assigned at definition.
    pub id: DataOperationId,
    /// Owning job.
    pub job_id: JobId,
    /// Path of the executable implementing the operation.
    pub executable: String,
    /// Arguments supplied at definition.
    pub arguments: Vec<OperationArg>,
    /// Current state.
    pub status: DataOpStatus,
    /// Wiring recorded by `connect`.
    pub connection: Option<OperationConnection>,
    /// Link recorded by `link`.
    pub link: Option<OperationLink>,
    /// Result recorded by `finalize`.
    pub outcome: Option<OperationOutcome>,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Per-job counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatistics {
    /// Transfers waiting to start.
    pub pending_transfers: u64,
    /// Transfers being moved.
    pub in_progress_transfers: u64,
    /// Transfers that completed successfully.
    pub finished_transfers: u64,
    /// Transfers that failed.
    pub failed_transfers: u64,
    /// Transfers cancelled by a client.
    pub cancelled_transfers: u64,
    /// Data operations defined by the job.
    pub data_operations: u64,
    /// QoS limits attached to the job itself.
    pub qos_limits: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_debug() {
        let id = JobId::from(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(format!("{id:?}"), "JobId(42)");
        assert_eq!(id.as_u64(), 42);
    }

    #[test]
    fn test_allocator_is_monotonic_and_starts_at_one() {
        let ids = IdAllocator::new();
        assert_eq!(ids.allocate(), Some(1));
        assert_eq!(ids.allocate(), Some(2));
        assert_eq!(ids.allocate(), Some(3));
        assert_eq!(ids.allocated(), 3);
    }

    #[test]
    fn test_allocator_exhaustion() {
        let ids = IdAllocator {
            next: AtomicU64::new(u64::MAX),
        };
        assert_eq!(ids.allocate(), None);
        assert_eq!(ids.allocate(), None);
    }

    #[test]
    fn test_allocator_concurrent_ids_are_unique() {
        let ids = std::sync::Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || {
                    (0..1000).map(|_| ids.allocate().unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8000);
    }

    #[test]
    fn test_dataset_tier() {
        assert_eq!(Dataset::new("lustre:/in").tier(), Some("lustre"));
        assert_eq!(Dataset::new("gekkofs:/out/a").tier(), Some("gekkofs"));
        assert_eq!(Dataset::new("/plain/path").tier(), None);
        assert_eq!(Dataset::new(":/x").tier(), None);
    }

    #[test]
    fn test_mapping_cardinalities() {
        use TransferMapping::*;

        assert!(OneToOne.accepts(1, 1));
        assert!(OneToOne.accepts(3, 3));
        assert!(!OneToOne.accepts(2, 1));
        assert!(!OneToOne.accepts(0, 0));

        assert!(OneToN.accepts(1, 4));
        assert!(OneToN.accepts(1, 1));
        assert!(!OneToN.accepts(2, 4));
        assert!(!OneToN.accepts(1, 0));

        assert!(NToN.accepts(5, 5));
        assert!(!NToN.accepts(5, 4));
        assert!(!NToN.accepts(0, 0));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(!TransferStatus::InProgress.is_terminal());
        assert!(TransferStatus::Finished.is_terminal());
        assert!(TransferStatus::Failed.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_adhoc_type_names() {
        for t in AdhocStorageType::ALL {
            assert_eq!(AdhocStorageType::from_name(t.name()), Some(t));
        }
        assert_eq!(AdhocStorageType::from_name("beegfs"), None);
    }

    #[test]
    fn test_qos_entity_scope() {
        let limit = QosLimit {
            entity: QosEntity::Node("n01".into()),
            class: QosClass::Bandwidth,
            value: 10,
        };
        assert_eq!(limit.scope(), QosScope::Node);
        assert_eq!(QosEntity::Job(JobId::from(3)).scope(), QosScope::Job);
        assert_eq!(
            QosEntity::Dataset(Dataset::new("lustre:/a")).to_string(),
            "dataset:lustre:/a"
        );
    }

    #[test]
    fn test_job_serializes_with_postcard() {
        let job = Job {
            id: JobId::from(7),
            slurm_id: 4242,
            resources: JobResources {
                nodes: vec![Node::new("n01"), Node::new("n02")],
            },
            requirements: JobRequirements {
                inputs: vec![DatasetRoute {
                    source: Dataset::new("lustre:/in"),
                    target: Dataset::new("gekkofs:/in"),
                }],
                adhoc_storage: Some(AdhocStorageId::from(3)),
                ..Default::default()
            },
        };
        let bytes = postcard::to_allocvec(&job).unwrap();
        let decoded: Job = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, job);
    }
}
