#![forbid(unsafe_code)]

//! Request/response seam to the messaging backend.
//!
//! The core never talks to the backend directly: every command goes through a
//! [`CommandBridge`]. [`InvokeBridge`] adapts any generic `invoke(command, json)` transport
//! (an IPC channel, an in-process dispatcher) to the typed trait.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use huddle_domain::{GroupId, PackageId, UserName};
use huddle_protocol::commands::{
	ADVERTISE, CREATE_GROUP, CREATE_MESSAGE, CREATE_USER, CreateMessageArgs, CreateUserArgs, GET_GROUPS, GET_IDENTITY,
	INVITE_PACKAGE, IS_AUTHENTICATED, InvitePackageArgs, PROCESS_MESSAGE, ProcessMessageArgs,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::BridgeError;

pub type BridgeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BridgeError>> + Send + 'a>>;

pub type BoxedCommandBridge = Arc<dyn CommandBridge>;

/// Backend commands used by the sync layer. Ids come back as raw strings; the core validates them.
pub trait CommandBridge: Send + Sync {
	fn create_user<'a>(&'a self, name: UserName) -> BridgeFuture<'a, ()>;

	fn is_authenticated<'a>(&'a self) -> BridgeFuture<'a, bool>;

	/// Fails while no user exists.
	fn get_identity<'a>(&'a self) -> BridgeFuture<'a, String>;

	fn get_groups<'a>(&'a self) -> BridgeFuture<'a, Vec<String>>;

	fn create_group<'a>(&'a self) -> BridgeFuture<'a, String>;

	fn advertise<'a>(&'a self) -> BridgeFuture<'a, ()>;

	/// Returns the wire bytes of the welcome/commit to put on the socket.
	fn invite_package<'a>(&'a self, group_id: GroupId, package_id: PackageId) -> BridgeFuture<'a, Vec<u8>>;

	/// Returns the wire bytes of the encrypted application message.
	fn create_message<'a>(&'a self, group_id: GroupId, message: String) -> BridgeFuture<'a, Vec<u8>>;

	/// Hands an inbound frame to the backend. Resulting state changes come back as push events.
	fn process_message<'a>(&'a self, data: Bytes) -> BridgeFuture<'a, ()>;
}

pub type InvokeFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, String>> + Send>>;

/// Untyped command transport: a command name plus JSON arguments in, JSON or an error string out.
pub trait Invoke: Send + Sync {
	fn invoke(&self, command: &'static str, args: serde_json::Value) -> InvokeFuture;
}

impl<F> Invoke for F
where
	F: Fn(&'static str, serde_json::Value) -> InvokeFuture + Send + Sync,
{
	fn invoke(&self, command: &'static str, args: serde_json::Value) -> InvokeFuture {
		(self)(command, args)
	}
}

#[derive(Serialize)]
struct NoArgs {}

/// [`CommandBridge`] over an [`Invoke`] transport, encoding arguments with the command records of
/// `huddle_protocol::commands`.
pub struct InvokeBridge<I> {
	invoke: I,
}

impl<I: Invoke> InvokeBridge<I> {
	pub fn new(invoke: I) -> Self {
		Self { invoke }
	}

	pub fn into_boxed(self) -> BoxedCommandBridge
	where
		I: 'static,
	{
		Arc::new(self)
	}

	async fn call<T: DeserializeOwned>(&self, command: &'static str, args: impl Serialize) -> Result<T, BridgeError> {
		let args =
			serde_json::to_value(args).map_err(|e| BridgeError::new(command, format!("encode arguments: {e}")))?;
		debug!(command, "invoking backend command");
		let value = self
			.invoke
			.invoke(command, args)
			.await
			.map_err(|message| BridgeError::new(command, message))?;
		serde_json::from_value(value).map_err(|e| BridgeError::new(command, format!("decode response: {e}")))
	}
}

impl<I: Invoke> CommandBridge for InvokeBridge<I> {
	fn create_user<'a>(&'a self, name: UserName) -> BridgeFuture<'a, ()> {
		Box::pin(self.call(CREATE_USER, CreateUserArgs { name }))
	}

	fn is_authenticated<'a>(&'a self) -> BridgeFuture<'a, bool> {
		Box::pin(self.call(IS_AUTHENTICATED, NoArgs {}))
	}

	fn get_identity<'a>(&'a self) -> BridgeFuture<'a, String> {
		Box::pin(self.call(GET_IDENTITY, NoArgs {}))
	}

	fn get_groups<'a>(&'a self) -> BridgeFuture<'a, Vec<String>> {
		Box::pin(self.call(GET_GROUPS, NoArgs {}))
	}

	fn create_group<'a>(&'a self) -> BridgeFuture<'a, String> {
		Box::pin(self.call(CREATE_GROUP, NoArgs {}))
	}

	fn advertise<'a>(&'a self) -> BridgeFuture<'a, ()> {
		Box::pin(self.call(ADVERTISE, NoArgs {}))
	}

	fn invite_package<'a>(&'a self, group_id: GroupId, package_id: PackageId) -> BridgeFuture<'a, Vec<u8>> {
		Box::pin(self.call(INVITE_PACKAGE, InvitePackageArgs { group_id, package_id }))
	}

	fn create_message<'a>(&'a self, group_id: GroupId, message: String) -> BridgeFuture<'a, Vec<u8>> {
		Box::pin(self.call(CREATE_MESSAGE, CreateMessageArgs { group_id, message }))
	}

	fn process_message<'a>(&'a self, data: Bytes) -> BridgeFuture<'a, ()> {
		Box::pin(self.call(PROCESS_MESSAGE, ProcessMessageArgs { data: data.to_vec() }))
	}
}
