//! Data-operation pipeline for reef.
//!
//! A data operation is a user-supplied executable working on datasets. It
//! moves through a fixed sequence of states:
//!
//! ```text
//! defined --connect--> connected --link--> linked --finalize--> finalized
//!                          \______________finalize______________/
//! ```
//!
//! Linking is optional and ties the operation to a transfer, so that
//! finalization waits for the transfer to complete. Waiting happens outside
//! this crate; [`Pipeline::finalize`] only records the outcome.

mod error;
mod pipeline;

pub use error::DataOpError;
pub use pipeline::Pipeline;
