//! RPC protocol layer for reef.
//!
//! - [`Request`], [`Response`] and [`Reply`]: the call shapes, encoded with
//!   postcard.
//! - [`RpcServer`] and [`RpcClient`]: length-prefixed frames over TCP.
//! - [`DataMover`], [`AdhocController`] and [`AddressResolver`]: the external
//!   collaborators the service calls out to, with RPC-backed
//!   implementations in [`RemoteDataMover`] and [`RemoteAdhocController`].
//!
//! The layer does no business logic. Requests that fail to decode or fail
//! [`Request::validate`] are answered with `BadArguments` before reaching
//! the handler.

mod error;
mod message;
mod remote;
mod transport;

use reef_types::{
    AdhocStorageCtx, AdhocStorageId, AdhocStorageResources, AdhocStorageType, Transfer,
};

pub use error::NetError;
pub use message::{Reply, Request, Response};
pub use remote::{ClientPool, DnsResolver, RemoteAdhocController, RemoteDataMover};
pub use transport::{
    MAX_MESSAGE_SIZE, RequestHandler, RpcClient, RpcServer, decode, read_frame, write_frame,
};

/// Service that moves bytes between storage tiers.
///
/// Progress comes back separately, as `TransferUpdate` calls.
#[async_trait::async_trait]
pub trait DataMover: Send + Sync {
    /// Ask the mover at `address` to start `transfer`.
    async fn start_transfer(&self, address: &str, transfer: &Transfer) -> Result<(), NetError>;
}

/// Service that materializes ad-hoc storage on its nodes.
#[async_trait::async_trait]
pub trait AdhocController: Send + Sync {
    /// Deploy a storage instance. Returns its mount path.
    async fn deploy(
        &self,
        address: &str,
        adhoc: AdhocStorageId,
        kind: AdhocStorageType,
        ctx: &AdhocStorageCtx,
        resources: &AdhocStorageResources,
    ) -> Result<String, NetError>;

    /// Tear a deployed storage instance down.
    async fn terminate(
        &self,
        address: &str,
        adhoc: AdhocStorageId,
        kind: AdhocStorageType,
        resources: &AdhocStorageResources,
    ) -> Result<(), NetError>;
}

/// Maps a hostname to a reachable `host:port` address.
#[async_trait::async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, hostname: &str, port: u16) -> Result<String, NetError>;
}
