//! TCP transport.
//!
//! Frames are a 4-byte big-endian length followed by a postcard payload.
//! A connection carries one request at a time: the client writes a
//! [`Request`] frame and reads back exactly one [`Response`] frame.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use reef_types::ErrorCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::NetError;
use crate::message::{Request, Response};

/// Maximum frame size: 16 MB.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

// -----------------------------------------------------------------------
// Framing
// -----------------------------------------------------------------------

/// Encode `message` and write it as one frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload =
        postcard::to_allocvec(message).map_err(|e| NetError::Serialization(e.to_string()))?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(NetError::FrameTooLarge {
            len: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one raw frame. Returns `None` if the peer closed the connection
/// cleanly before the length prefix.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, NetError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(NetError::FrameTooLarge {
            len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Bytes::from(payload)))
}

/// Decode a frame payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, NetError> {
    postcard::from_bytes(payload).map_err(|e| NetError::Serialization(e.to_string()))
}

// -----------------------------------------------------------------------
// Client
// -----------------------------------------------------------------------

/// Client for one remote address.
///
/// The connection is opened on first use and reused afterwards. A failed
/// call drops the connection; the next call reconnects. Calls are not
/// retried.
pub struct RpcClient {
    addr: String,
    conn: Mutex<Option<TcpStream>>,
}

impl RpcClient {
    /// Create a client for `addr` (`host:port`). Does not connect.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: Mutex::new(None),
        }
    }

    /// Remote address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send `request` and wait for its response.
    ///
    /// Transport failures are returned as errors; error codes reported by
    /// the peer are carried in the returned [`Response`].
    ///
    /// The connection is held outside the cache for the whole exchange, so a
    /// call dropped midway (e.g. by a timeout) closes it instead of leaving
    /// an unread response for the next caller.
    pub async fn call(&self, request: &Request) -> Result<Response, NetError> {
        let mut conn = self.conn.lock().await;

        let mut stream = match conn.take() {
            Some(stream) => stream,
            None => {
                debug!(addr = %self.addr, "connecting");
                let stream = TcpStream::connect(&self.addr).await?;
                stream.set_nodelay(true)?;
                stream
            }
        };

        write_frame(&mut stream, request).await?;
        let response = match read_frame(&mut stream).await? {
            Some(payload) => decode::<Response>(&payload)?,
            None => return Err(NetError::Closed),
        };

        *conn = Some(stream);
        Ok(response)
    }
}

// -----------------------------------------------------------------------
// Server
// -----------------------------------------------------------------------

/// Handles decoded, structurally valid requests.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the response to `request`, received from `peer`.
    async fn handle(&self, request: Request, peer: SocketAddr) -> Response;
}

/// Accepts connections and dispatches their requests to a handler.
pub struct RpcServer {
    listener: TcpListener,
}

impl RpcServer {
    /// Bind to `addr`.
    pub async fn bind(addr: &str) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` completes. Each connection runs in its own
    /// task; connections still open at shutdown are left to finish.
    pub async fn serve_until<H, F>(self, handler: Arc<H>, shutdown: F) -> Result<(), NetError>
    where
        H: RequestHandler,
        F: Future<Output = ()>,
    {
        info!(addr = %self.local_addr()?, "rpc server listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("rpc server stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, handler).await {
                                debug!(%peer, "connection error: {e}");
                            }
                        });
                    }
                    Err(e) => warn!("failed to accept connection: {e}"),
                }
            }
        }
    }

    /// Serve forever.
    pub async fn serve<H: RequestHandler>(self, handler: Arc<H>) -> Result<(), NetError> {
        self.serve_until(handler, std::future::pending()).await
    }
}

/// Answer requests on one connection until the peer closes it.
///
/// Frames that do not decode, or requests that fail structural validation,
/// are answered with [`ErrorCode::BadArguments`] without reaching the
/// handler.
async fn handle_connection<H: RequestHandler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
) -> Result<(), NetError> {
    stream.set_nodelay(true)?;
    debug!(%peer, "connection accepted");

    while let Some(payload) = read_frame(&mut stream).await? {
        let response = match decode::<Request>(&payload) {
            Ok(request) => match request.validate() {
                Ok(()) => handler.handle(request, peer).await,
                Err(reason) => {
                    warn!(%peer, op = request.name(), %reason, "rejected malformed request");
                    Response::error(ErrorCode::BadArguments, reason)
                }
            },
            Err(e) => {
                warn!(%peer, "failed to decode request: {e}");
                Response::error(ErrorCode::BadArguments, e.to_string())
            }
        };
        write_frame(&mut stream, &response).await?;
    }

    debug!(%peer, "connection closed");
    Ok(())
}
