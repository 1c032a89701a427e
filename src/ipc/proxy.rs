//! Client proxy: the runtime's outbound channel to the client process.
//!
//! A proxy owns one local-socket stream to the client endpoint. Calls are
//! serialized over that stream: each call writes one [`ClientRequest`] line
//! and waits, bounded by the response timeout, for the matching
//! acknowledgement. The acknowledgement only reports transport success;
//! logical answers come back through the runtime host.
//!
//! Any transport failure (write error, closed stream, timeout) marks the
//! proxy lost: [`ClientProxy::connection_lost`] is raised exactly once and
//! [`ClientProxy::disconnected`] is cancelled so that every wait correlated
//! with this proxy ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use interprocess::local_socket::tokio::{prelude::*, RecvHalf, SendHalf, Stream};
use interprocess::local_socket::{GenericNamespaced, ToNsName};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::ipc::codec::{to_line, IpcCodec};
use crate::ipc::events::EventSource;
use crate::ipc::protocol::{
    ClientMessage, ClientRequest, CommunicationResult, IpcResponse, PasswordRequestPurpose,
};
use crate::{AppError, Result};

/// Outbound calls the runtime makes to a client process.
pub trait ClientProxy: Send + Sync {
    /// Tell the client its reconfiguration request for `path` was refused.
    fn inform_reconfiguration_denied(&self, path: String) -> BoxFuture<'_, CommunicationResult>;

    /// Ask the client to collect a password. The answer arrives as a
    /// password reply on the runtime host carrying `request_id`.
    fn request_password(
        &self,
        purpose: PasswordRequestPurpose,
        request_id: Uuid,
    ) -> BoxFuture<'_, CommunicationResult>;

    /// Ask the client to close and exit.
    fn initiate_shutdown(&self) -> BoxFuture<'_, CommunicationResult>;

    /// Liveness check.
    fn ping(&self) -> BoxFuture<'_, CommunicationResult>;

    /// Raised once when the connection to the client is lost.
    fn connection_lost(&self) -> &EventSource<()>;

    /// Cancelled when the proxy is lost or disconnected on purpose.
    fn disconnected(&self) -> CancellationToken;

    /// Close the connection without raising [`ClientProxy::connection_lost`].
    fn disconnect(&self) -> BoxFuture<'_, ()>;
}

/// Creates proxies for client endpoints.
pub trait ProxyFactory: Send + Sync {
    /// Connect to the client listening on `address`; every request carries
    /// `token`.
    fn connect(&self, address: String, token: Uuid) -> BoxFuture<'_, Result<Arc<dyn ClientProxy>>>;
}

struct Connection {
    reader: FramedRead<RecvHalf, IpcCodec>,
    writer: SendHalf,
}

impl Connection {
    async fn exchange(&mut self, line: &[u8]) -> Result<IpcResponse> {
        self.writer.write_all(line).await?;
        self.writer.flush().await?;

        match self.reader.next().await {
            Some(Ok(response)) => Ok(serde_json::from_str(response.trim())?),
            Some(Err(err)) => Err(err),
            None => Err(AppError::Ipc("connection closed by client".into())),
        }
    }
}

/// [`ClientProxy`] over an `interprocess` local socket.
pub struct SocketClientProxy {
    address: String,
    token: Uuid,
    response_timeout: Duration,
    connection: tokio::sync::Mutex<Option<Connection>>,
    connection_lost: EventSource<()>,
    disconnected: CancellationToken,
    lost: AtomicBool,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl SocketClientProxy {
    /// Connect to `address` and start the heartbeat.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the address is invalid or the client is
    /// not listening.
    pub async fn connect(
        address: &str,
        token: Uuid,
        response_timeout: Duration,
        ping_interval: Duration,
    ) -> Result<Arc<Self>> {
        let name = address
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{address}': {err}")))?;

        let stream = tokio::time::timeout(response_timeout, Stream::connect(name))
            .await
            .map_err(|_| AppError::Ipc(format!("timed out connecting to '{address}'")))?
            .map_err(|err| AppError::Ipc(format!("failed to connect to '{address}': {err}")))?;

        let (reader, writer) = stream.split();
        let proxy = Arc::new(Self {
            address: address.to_owned(),
            token,
            response_timeout,
            connection: tokio::sync::Mutex::new(Some(Connection {
                reader: FramedRead::new(reader, IpcCodec::new()),
                writer,
            })),
            connection_lost: EventSource::new(),
            disconnected: CancellationToken::new(),
            lost: AtomicBool::new(false),
            heartbeat: Mutex::new(None),
        });

        let heartbeat = spawn_heartbeat(Arc::downgrade(&proxy), proxy.disconnected.clone(), ping_interval);
        *proxy
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(heartbeat);

        info!(address, "client proxy connected");
        Ok(proxy)
    }

    /// Endpoint address of the client.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn send(&self, message: ClientMessage) -> CommunicationResult {
        if self.disconnected.is_cancelled() {
            return CommunicationResult::failed();
        }

        let kind = message.kind();
        let line = match to_line(&ClientRequest {
            token: self.token,
            message,
        }) {
            Ok(line) => line,
            Err(err) => {
                warn!(message = kind, %err, "failed to encode client request");
                return CommunicationResult::failed();
            }
        };

        let mut guard = self.connection.lock().await;
        let Some(connection) = guard.as_mut() else {
            return CommunicationResult::failed();
        };

        let failure = match tokio::time::timeout(self.response_timeout, connection.exchange(&line)).await {
            Ok(Ok(response)) if response.ok => {
                debug!(message = kind, "client acknowledged message");
                return CommunicationResult::delivered();
            }
            Ok(Ok(response)) => {
                warn!(
                    message = kind,
                    error = response.error.as_deref().unwrap_or("unknown error"),
                    "client rejected message"
                );
                return CommunicationResult::failed();
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("no response within {:?}", self.response_timeout),
        };

        *guard = None;
        drop(guard);

        warn!(message = kind, address = %self.address, error = %failure, "client communication failed");
        self.mark_lost();
        CommunicationResult::failed()
    }

    fn mark_lost(&self) {
        if self.lost.swap(true, Ordering::SeqCst) {
            return;
        }

        self.disconnected.cancel();
        warn!(address = %self.address, "connection to client lost");
        self.connection_lost.publish(&());
    }

    fn stop_heartbeat(&self) {
        let heartbeat = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = heartbeat {
            task.abort();
        }
    }
}

impl ClientProxy for SocketClientProxy {
    fn inform_reconfiguration_denied(&self, path: String) -> BoxFuture<'_, CommunicationResult> {
        self.send(ClientMessage::ReconfigurationDenied { path }).boxed()
    }

    fn request_password(
        &self,
        purpose: PasswordRequestPurpose,
        request_id: Uuid,
    ) -> BoxFuture<'_, CommunicationResult> {
        self.send(ClientMessage::PasswordRequested {
            purpose,
            request_id,
        })
        .boxed()
    }

    fn initiate_shutdown(&self) -> BoxFuture<'_, CommunicationResult> {
        self.send(ClientMessage::ShutdownInitiated).boxed()
    }

    fn ping(&self) -> BoxFuture<'_, CommunicationResult> {
        self.send(ClientMessage::Ping).boxed()
    }

    fn connection_lost(&self) -> &EventSource<()> {
        &self.connection_lost
    }

    fn disconnected(&self) -> CancellationToken {
        self.disconnected.clone()
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        async move {
            self.lost.store(true, Ordering::SeqCst);
            self.disconnected.cancel();
            self.stop_heartbeat();
            *self.connection.lock().await = None;
            info!(address = %self.address, "client proxy disconnected");
        }
        .boxed()
    }
}

impl Drop for SocketClientProxy {
    fn drop(&mut self) {
        self.disconnected.cancel();
        self.stop_heartbeat();
    }
}

impl std::fmt::Debug for SocketClientProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClientProxy")
            .field("address", &self.address)
            .field("lost", &self.lost.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn spawn_heartbeat(
    proxy: Weak<SocketClientProxy>,
    disconnected: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    let span = tracing::info_span!("client_heartbeat");
    tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = disconnected.cancelled() => break,
                    () = tokio::time::sleep(interval) => {
                        let Some(proxy) = proxy.upgrade() else { break };
                        if !proxy.ping().await.success {
                            break;
                        }
                    }
                }
            }
            debug!("heartbeat stopped");
        }
        .instrument(span),
    )
}

/// [`ProxyFactory`] producing [`SocketClientProxy`] instances.
#[derive(Debug, Clone)]
pub struct SocketProxyFactory {
    response_timeout: Duration,
    ping_interval: Duration,
}

impl SocketProxyFactory {
    /// Create a factory with the given timings.
    #[must_use]
    pub fn new(response_timeout: Duration, ping_interval: Duration) -> Self {
        Self {
            response_timeout,
            ping_interval,
        }
    }
}

impl ProxyFactory for SocketProxyFactory {
    fn connect(&self, address: String, token: Uuid) -> BoxFuture<'_, Result<Arc<dyn ClientProxy>>> {
        async move {
            let proxy =
                SocketClientProxy::connect(&address, token, self.response_timeout, self.ping_interval)
                    .await?;
            Ok(proxy as Arc<dyn ClientProxy>)
        }
        .boxed()
    }
}
