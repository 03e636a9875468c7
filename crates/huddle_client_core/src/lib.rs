#![forbid(unsafe_code)]

//! Client sync layer for the huddle group messenger.
//!
//! Keeps a view-facing store of groups and messages consistent with two asynchronous sources:
//! push events from the local messaging backend and binary frames from a per-identity real-time
//! socket. See [`SyncCore`] for the entry point.

pub mod bridge;
pub mod config;
pub mod error;
pub mod event_bridge;
pub mod events;
pub mod identity;
pub mod ingress;
pub mod packages;
pub mod socket;
pub mod store;
pub mod sync_core;
pub mod transport;

#[cfg(test)]
mod test_support;



pub use bridge::{BoxedCommandBridge, CommandBridge, Invoke, InvokeBridge};
pub use config::{ClientConfig, load_client_config, load_client_config_from_path};
pub use error::{BridgeError, SyncError, TransportError};
pub use events::{SyncEvent, ViolationOrigin};
pub use identity::IdentityResource;
pub use packages::PackageIndex;
pub use socket::{FrameSubscription, InboundFrame, SendOutcome, SocketManager, SocketState, SocketTask};
pub use store::{Store, StoreChange, StoreSnapshot};
pub use sync_core::SyncCore;
pub use transport::{Connection, Connector, WsConnector};
