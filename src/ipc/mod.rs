//! Inter-process communication between the runtime and its cooperating
//! processes.

pub mod codec;
pub mod events;
pub mod host;
pub mod protocol;
pub mod proxy;
pub mod service;

pub use events::{EventSource, SubscriptionId};
pub use host::RuntimeHost;
pub use proxy::{ClientProxy, ProxyFactory, SocketClientProxy, SocketProxyFactory};
pub use service::{ServiceConnector, SocketServiceConnector};
