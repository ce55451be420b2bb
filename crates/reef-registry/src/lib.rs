//! Resource registry for reef.
//!
//! [`Registry`] is the single source of truth for registered jobs, ad-hoc
//! storage and PFS storage. Each entity kind lives in its own
//! `RwLock<HashMap>`; lookups take the read side, inserts, updates and
//! removals take the write side.
//!
//! Ad-hoc storage entries additionally carry their own lock, which the
//! ownership arbiter ([`Registry::bind`], [`Registry::unbind`],
//! [`Registry::current_client`]) uses to guarantee that at most one job is
//! bound to a given storage at a time. Binding checks on different storages
//! never contend.
//!
//! Lock order, wherever more than one is taken: jobs, then the ad-hoc map,
//! then an individual ad-hoc entry. No lock is ever held across a call to
//! an external collaborator; deployment is split into
//! [`Registry::begin_deploy`] and [`Registry::complete_deploy`] so the
//! caller can await the controller in between.

mod arbiter;
mod error;
mod registry;

pub use arbiter::DeploymentPlan;
pub use error::RegistryError;
pub use registry::{Registry, RegistryCounts};
