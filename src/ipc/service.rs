//! Connection check against the system service.
//!
//! The service is a well-known component with a fixed address. The runtime
//! only needs to know whether it answers a ping.

use std::io;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::{GenericNamespaced, ToNsName};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::FramedRead;
use tracing::debug;

use crate::ipc::codec::{to_line, IpcCodec};
use crate::ipc::protocol::{HostRequest, IpcResponse, RuntimeMessage};
use crate::{AppError, Result};

/// Probes the service endpoint.
pub trait ServiceConnector: Send + Sync {
    /// Whether the service at `address` answers.
    fn probe(&self, address: String) -> BoxFuture<'_, bool>;
}

/// [`ServiceConnector`] sending a ping over a local socket.
#[derive(Debug, Clone)]
pub struct SocketServiceConnector {
    timeout: Duration,
}

impl SocketServiceConnector {
    /// Create a connector that gives up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn ping(address: &str) -> Result<IpcResponse> {
        let name = address
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{address}': {err}")))?;
        let stream = Stream::connect(name).await?;
        let (reader, mut writer) = stream.split();

        let request = HostRequest {
            token: None,
            message: RuntimeMessage::Ping,
        };
        writer.write_all(&to_line(&request)?).await?;

        let mut lines = FramedRead::new(reader, IpcCodec::new());
        match lines.next().await {
            Some(line) => Ok(serde_json::from_str(line?.trim())?),
            None => Err(AppError::Io(io::ErrorKind::UnexpectedEof.to_string())),
        }
    }
}

impl ServiceConnector for SocketServiceConnector {
    fn probe(&self, address: String) -> BoxFuture<'_, bool> {
        async move {
            match tokio::time::timeout(self.timeout, Self::ping(&address)).await {
                Ok(Ok(response)) => response.ok,
                Ok(Err(err)) => {
                    debug!(address, %err, "service probe failed");
                    false
                }
                Err(_) => {
                    debug!(address, "service probe timed out");
                    false
                }
            }
        }
        .boxed()
    }
}
