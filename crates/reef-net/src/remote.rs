//! RPC-backed implementations of the external collaborator traits.

use std::collections::HashMap;
use std::sync::Arc;

use reef_types::{
    AdhocStorageCtx, AdhocStorageId, AdhocStorageResources, AdhocStorageType, Transfer,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::NetError;
use crate::message::{Reply, Request};
use crate::transport::RpcClient;
use crate::{AddressResolver, AdhocController, DataMover};

/// Clients keyed by remote address.
///
/// Uses `Mutex` rather than `RwLock` so that concurrent callers for the same
/// address share one client instead of racing to insert their own.
#[derive(Default)]
pub struct ClientPool {
    clients: Mutex<HashMap<String, Arc<RpcClient>>>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client for `addr`, created on first use.
    pub async fn get(&self, addr: &str) -> Arc<RpcClient> {
        let mut clients = self.clients.lock().await;
        clients
            .entry(addr.to_string())
            .or_insert_with(|| Arc::new(RpcClient::new(addr)))
            .clone()
    }

    /// Send `request` to `addr` and return the successful payload.
    pub async fn call(&self, addr: &str, request: &Request) -> Result<Reply, NetError> {
        let client = self.get(addr).await;
        client.call(request).await?.into_result()
    }
}

/// Data mover reached over RPC.
#[derive(Default)]
pub struct RemoteDataMover {
    pool: ClientPool,
}

impl RemoteDataMover {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DataMover for RemoteDataMover {
    async fn start_transfer(&self, address: &str, transfer: &Transfer) -> Result<(), NetError> {
        let request = Request::StartTransfer {
            transfer: transfer.clone(),
        };
        match self.pool.call(address, &request).await? {
            Reply::Empty => {
                debug!(transfer = %transfer.id, %address, "transfer handed to data mover");
                Ok(())
            }
            other => Err(NetError::UnexpectedReply(format!("{other:?}"))),
        }
    }
}

/// Adhoc controller reached over RPC.
#[derive(Default)]
pub struct RemoteAdhocController {
    pool: ClientPool,
}

impl RemoteAdhocController {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AdhocController for RemoteAdhocController {
    async fn deploy(
        &self,
        address: &str,
        adhoc: AdhocStorageId,
        kind: AdhocStorageType,
        ctx: &AdhocStorageCtx,
        resources: &AdhocStorageResources,
    ) -> Result<String, NetError> {
        let request = Request::AdhocDeploy {
            adhoc,
            kind,
            ctx: ctx.clone(),
            resources: resources.clone(),
        };
        match self.pool.call(address, &request).await? {
            Reply::MountPath(path) => Ok(path),
            other => Err(NetError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    async fn terminate(
        &self,
        address: &str,
        adhoc: AdhocStorageId,
        kind: AdhocStorageType,
        resources: &AdhocStorageResources,
    ) -> Result<(), NetError> {
        let request = Request::AdhocTerminate {
            adhoc,
            kind,
            resources: resources.clone(),
        };
        match self.pool.call(address, &request).await? {
            Reply::Empty => Ok(()),
            other => Err(NetError::UnexpectedReply(format!("{other:?}"))),
        }
    }
}

/// Resolves hostnames through the system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsResolver;

#[async_trait::async_trait]
impl AddressResolver for DnsResolver {
    async fn resolve(&self, hostname: &str, port: u16) -> Result<String, NetError> {
        let mut addrs = tokio::net::lookup_host((hostname, port))
            .await
            .map_err(|e| NetError::Resolve(format!("{hostname}: {e}")))?;
        addrs
            .next()
            .map(|a| a.to_string())
            .ok_or_else(|| NetError::Resolve(hostname.to_string()))
    }
}
