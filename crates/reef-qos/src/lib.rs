//! QoS limit store for reef.
//!
//! Limits are keyed by entity and class: setting the same entity/class pair
//! twice replaces the value. The store is independent of transfers, which
//! carry their own copies of the limits supplied at creation.

mod error;
mod store;

pub use error::QosError;
pub use store::QosStore;
