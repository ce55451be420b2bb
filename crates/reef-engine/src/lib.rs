//! Service context tying all reef components together.
//!
//! [`ReefService`] owns the registry, the transfer orchestrator, the QoS
//! store and the data-operation pipeline, all drawing ids from one shared
//! allocator. It also holds the external collaborators (data mover, adhoc
//! controller, address resolver) and implements the operations that span
//! several components: deployment, transfer dispatch, job removal and
//! finalization of linked data operations.
//!
//! No component lock is held while a collaborator call is in flight.

pub mod error;
pub mod service;

pub use error::EngineError;
pub use service::{ReefService, ServiceConfig};

#[cfg(test)]
mod tests;
