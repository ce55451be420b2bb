//! Transfer orchestration for reef.
//!
//! The [`TransferOrchestrator`] creates [`Transfer`](reef_types::Transfer)
//! entities from dataset lists and a mapping strategy, orders pending
//! transfers by priority, and ingests progress reported by the data mover.
//!
//! Each transfer carries its own lock; priority changes, cancellation and
//! progress updates serialize on it without blocking other transfers.
//! Status changes are published on a per-transfer watch channel so callers
//! can wait for completion without polling.

mod error;
mod orchestrator;

pub use error::TransferError;
pub use orchestrator::{DEFAULT_PRIORITY, TransferOrchestrator};
