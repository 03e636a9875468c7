//! In-memory fakes for the bridge and the socket transport.

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc as fmpsc;
use futures::{Sink, Stream, StreamExt as _};
use huddle_domain::{GroupId, PackageId, UserName};
use huddle_protocol::{Frame, NEW_MESSAGE_EVENT, RawPushEvent};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, watch};

use crate::bridge::{BoxedCommandBridge, BridgeFuture, CommandBridge};
use crate::error::{BridgeError, TransportError};
use crate::transport::{ConnectFuture, Connection, Connector};

static LOG_INIT: OnceLock<()> = OnceLock::new();

pub(crate) fn init_test_logging() {
	LOG_INIT.get_or_init(|| {
		if std::env::var_os("HUDDLE_TEST_LOG").is_none() {
			return;
		}

		let _ = tracing_subscriber::fmt()
			.with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
			.with_target(false)
			.with_test_writer()
			.try_init();
	});
}

pub(crate) const WAIT: Duration = Duration::from_secs(2);

/// Wait until the watched value satisfies `pred`, failing the test after [`WAIT`].
pub(crate) async fn wait_for<T>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) -> T
where
	T: Clone,
{
	tokio::time::timeout(WAIT, rx.wait_for(pred))
		.await
		.expect("timed out waiting for watch value")
		.expect("watch sender dropped")
		.clone()
}

#[derive(Default)]
struct BridgeState {
	identity: Option<String>,
	identity_on_create: Option<String>,
	authenticated: bool,
	groups: Vec<String>,
	next_group_ids: VecDeque<String>,
	failing: HashSet<String>,
	calls: Vec<String>,
	processed: Vec<Bytes>,
	push_tx: Option<mpsc::UnboundedSender<RawPushEvent>>,
}

/// Backend fake. `create_message` encodes `"<group>|<text>"`; with [`FakeBridge::echo_pushes_to`]
/// set, `process_message` decodes that format back into a `new_message` push event.
#[derive(Clone, Default)]
pub(crate) struct FakeBridge {
	state: Arc<Mutex<BridgeState>>,
}

impl FakeBridge {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn into_boxed(self) -> BoxedCommandBridge {
		Arc::new(self)
	}

	pub(crate) fn set_identity(&self, id: &str) {
		let mut st = self.state.lock();
		st.identity = Some(id.to_string());
		st.authenticated = true;
	}

	pub(crate) fn clear_identity(&self) {
		self.state.lock().identity = None;
	}

	pub(crate) fn set_identity_on_create(&self, id: &str) {
		self.state.lock().identity_on_create = Some(id.to_string());
	}

	pub(crate) fn set_groups(&self, groups: &[&str]) {
		self.state.lock().groups = groups.iter().map(|g| g.to_string()).collect();
	}

	pub(crate) fn push_next_group_id(&self, id: &str) {
		self.state.lock().next_group_ids.push_back(id.to_string());
	}

	pub(crate) fn fail_command(&self, command: &str) {
		self.state.lock().failing.insert(command.to_string());
	}

	pub(crate) fn echo_pushes_to(&self, tx: mpsc::UnboundedSender<RawPushEvent>) {
		self.state.lock().push_tx = Some(tx);
	}

	pub(crate) fn calls(&self) -> Vec<String> {
		self.state.lock().calls.clone()
	}

	pub(crate) fn processed(&self) -> Vec<Bytes> {
		self.state.lock().processed.clone()
	}

	fn enter(&self, command: &'static str, call: String) -> Result<(), BridgeError> {
		let mut st = self.state.lock();
		st.calls.push(call);
		if st.failing.contains(command) {
			return Err(BridgeError::new(command, "rejected by fake backend"));
		}
		Ok(())
	}
}

impl CommandBridge for FakeBridge {
	fn create_user<'a>(&'a self, name: UserName) -> BridgeFuture<'a, ()> {
		Box::pin(async move {
			self.enter("create_user", format!("create_user:{name}"))?;
			let mut st = self.state.lock();
			if let Some(id) = st.identity_on_create.take() {
				st.identity = Some(id);
				st.authenticated = true;
			}
			Ok(())
		})
	}

	fn is_authenticated<'a>(&'a self) -> BridgeFuture<'a, bool> {
		Box::pin(async move {
			self.enter("is_authenticated", "is_authenticated".to_string())?;
			Ok(self.state.lock().authenticated)
		})
	}

	fn get_identity<'a>(&'a self) -> BridgeFuture<'a, String> {
		Box::pin(async move {
			self.enter("get_identity", "get_identity".to_string())?;
			self.state
				.lock()
				.identity
				.clone()
				.ok_or_else(|| BridgeError::new("get_identity", "no user"))
		})
	}

	fn get_groups<'a>(&'a self) -> BridgeFuture<'a, Vec<String>> {
		Box::pin(async move {
			self.enter("get_groups", "get_groups".to_string())?;
			Ok(self.state.lock().groups.clone())
		})
	}

	fn create_group<'a>(&'a self) -> BridgeFuture<'a, String> {
		Box::pin(async move {
			self.enter("create_group", "create_group".to_string())?;
			let mut st = self.state.lock();
			let id = st
				.next_group_ids
				.pop_front()
				.ok_or_else(|| BridgeError::new("create_group", "no group id queued"))?;
			st.groups.push(id.clone());
			Ok(id)
		})
	}

	fn advertise<'a>(&'a self) -> BridgeFuture<'a, ()> {
		Box::pin(async move { self.enter("advertise", "advertise".to_string()) })
	}

	fn invite_package<'a>(&'a self, group_id: GroupId, package_id: PackageId) -> BridgeFuture<'a, Vec<u8>> {
		Box::pin(async move {
			self.enter("invite_package", format!("invite_package:{group_id}:{package_id}"))?;
			Ok(format!("welcome:{group_id}:{package_id}").into_bytes())
		})
	}

	fn create_message<'a>(&'a self, group_id: GroupId, message: String) -> BridgeFuture<'a, Vec<u8>> {
		Box::pin(async move {
			self.enter("create_message", format!("create_message:{group_id}:{message}"))?;
			Ok(format!("{group_id}|{message}").into_bytes())
		})
	}

	fn process_message<'a>(&'a self, data: Bytes) -> BridgeFuture<'a, ()> {
		Box::pin(async move {
			self.enter("process_message", format!("process_message:{}", data.len()))?;
			let mut st = self.state.lock();
			st.processed.push(data.clone());
			if let Some(tx) = st.push_tx.as_ref()
				&& let Ok(text) = std::str::from_utf8(&data)
				&& let Some((group_id, message)) = text.split_once('|')
			{
				let _ = tx.send(RawPushEvent::new(
					NEW_MESSAGE_EVENT,
					json!({ "group_id": group_id, "message": message }),
				));
			}
			Ok(())
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnEvent {
	Opened(String),
	Detached(String),
	Closed(String),
}

struct Peer {
	inbound_tx: fmpsc::UnboundedSender<Result<Frame, TransportError>>,
	sent: Arc<Mutex<Vec<Bytes>>>,
}

#[derive(Default)]
struct ConnectorState {
	journal: Vec<ConnEvent>,
	peers: HashMap<String, Peer>,
	refuse: HashSet<String>,
}

/// Transport fake. Every connection lifecycle step lands in a shared journal.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
	state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn journal(&self) -> Vec<ConnEvent> {
		self.state.lock().journal.clone()
	}

	pub(crate) fn refuse(&self, url: &str) {
		self.state.lock().refuse.insert(url.to_string());
	}

	/// Deliver a frame on the latest connection to `url`. Returns `false` once that connection's
	/// listener is gone.
	pub(crate) fn inject(&self, url: &str, frame: Frame) -> bool {
		let st = self.state.lock();
		st.peers
			.get(url)
			.is_some_and(|peer| peer.inbound_tx.unbounded_send(Ok(frame)).is_ok())
	}

	pub(crate) fn inject_error(&self, url: &str, err: TransportError) -> bool {
		let st = self.state.lock();
		st.peers
			.get(url)
			.is_some_and(|peer| peer.inbound_tx.unbounded_send(Err(err)).is_ok())
	}

	/// Peer-side close: the inbound stream ends.
	pub(crate) fn hang_up(&self, url: &str) {
		if let Some(peer) = self.state.lock().peers.get(url) {
			peer.inbound_tx.close_channel();
		}
	}

	pub(crate) fn sent(&self, url: &str) -> Vec<Bytes> {
		self.state
			.lock()
			.peers
			.get(url)
			.map(|peer| peer.sent.lock().clone())
			.unwrap_or_default()
	}
}

impl Connector for FakeConnector {
	fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
		Box::pin(async move {
			let mut st = self.state.lock();
			if st.refuse.contains(url) {
				return Err(TransportError::Connect {
					url: url.to_string(),
					message: "connection refused".to_string(),
				});
			}

			let (inbound_tx, inbound_rx) = fmpsc::unbounded();
			let sent = Arc::new(Mutex::new(Vec::new()));
			st.peers.insert(
				url.to_string(),
				Peer {
					inbound_tx,
					sent: sent.clone(),
				},
			);
			st.journal.push(ConnEvent::Opened(url.to_string()));

			Ok(Connection {
				outbound: Box::pin(JournalSink {
					url: url.to_string(),
					state: self.state.clone(),
					sent,
					closed: false,
				}),
				inbound: Box::pin(JournalStream {
					url: url.to_string(),
					state: self.state.clone(),
					rx: inbound_rx,
				}),
			})
		})
	}
}

struct JournalSink {
	url: String,
	state: Arc<Mutex<ConnectorState>>,
	sent: Arc<Mutex<Vec<Bytes>>>,
	closed: bool,
}

impl Sink<Bytes> for JournalSink {
	type Error = TransportError;

	fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		if self.closed {
			return Poll::Ready(Err(TransportError::Send("connection closed".to_string())));
		}
		Poll::Ready(Ok(()))
	}

	fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
		self.sent.lock().push(item);
		Ok(())
	}

	fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		let this = self.get_mut();
		if !this.closed {
			this.closed = true;
			this.state.lock().journal.push(ConnEvent::Closed(this.url.clone()));
		}
		Poll::Ready(Ok(()))
	}
}

struct JournalStream {
	url: String,
	state: Arc<Mutex<ConnectorState>>,
	rx: fmpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

impl Stream for JournalStream {
	type Item = Result<Frame, TransportError>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.rx.poll_next_unpin(cx)
	}
}

impl Drop for JournalStream {
	fn drop(&mut self) {
		self.state.lock().journal.push(ConnEvent::Detached(self.url.clone()));
	}
}
