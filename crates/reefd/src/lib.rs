//! Building blocks of the `reefd` binary, exposed for integration tests.
//!
//! - [`config`]: TOML configuration.
//! - [`handler`]: RPC dispatch onto [`reef_engine::ReefService`].
//! - [`controller`]: ad-hoc storage controller mode.

pub mod config;
pub mod controller;
pub mod handler;

pub use config::DaemonConfig;
pub use controller::ControllerHandler;
pub use handler::ServiceHandler;
