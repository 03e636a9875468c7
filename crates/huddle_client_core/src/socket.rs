#![forbid(unsafe_code)]

//! Identity-keyed real-time socket.
//!
//! One task owns the connection. It follows the identity watch channel: every time the identity
//! changes it detaches the inbound listener, closes the old connection, opens
//! `<server>/<identity>/messages` and attaches the listener to the new one, in that order.
//! Frames are fanned out to subscribers tagged with the identity and connection generation they
//! arrived on, so nothing from a previous connection is delivered after a transition.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt as _, StreamExt as _};
use huddle_domain::Identity;
use huddle_protocol::Frame;
use huddle_util::endpoint::Endpoint;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{SyncError, TransportError};
use crate::transport::{BoxedFrameSink, BoxedFrameStream, Connector};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection state as seen from outside the socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketState {
	Disconnected { reason: Option<String> },
	Connecting { identity: Identity },
	Connected { identity: Identity, generation: u64 },
}

impl SocketState {
	pub fn is_connected(&self) -> bool {
		matches!(self, SocketState::Connected { .. })
	}
}

/// A frame together with the connection it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
	pub identity: Identity,
	pub generation: u64,
	pub frame: Frame,
}

/// What happened to an outbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
	Sent,
	/// No connection was open; the payload was dropped.
	Dropped,
}

#[derive(Debug)]
enum SocketCommand {
	Send {
		data: Bytes,
		reply: oneshot::Sender<Result<SendOutcome, TransportError>>,
	},
	Subscribe {
		handler_id: u64,
		handler: mpsc::UnboundedSender<InboundFrame>,
	},
	Unsubscribe {
		handler_id: u64,
	},
	Reconnect {
		reply: oneshot::Sender<bool>,
	},
}

/// Handle to the socket task. Cheap to clone.
#[derive(Clone)]
pub struct SocketManager {
	cmd_tx: mpsc::UnboundedSender<SocketCommand>,
	state_rx: watch::Receiver<SocketState>,
	next_handler_id: Arc<AtomicU64>,
}

impl fmt::Debug for SocketManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SocketManager")
			.field("state", &*self.state_rx.borrow())
			.finish_non_exhaustive()
	}
}

/// Stops the socket task and waits for it.
pub struct SocketTask {
	shutdown_tx: oneshot::Sender<()>,
	join: JoinHandle<()>,
}

impl SocketTask {
	pub async fn shutdown(self) {
		let _ = self.shutdown_tx.send(());
		if let Err(e) = self.join.await {
			warn!(error = %e, "socket task ended abnormally");
		}
	}
}

impl SocketManager {
	/// Spawn the socket task. If `identity_rx` already holds an identity the connection is opened
	/// right away.
	pub fn start(
		server: Endpoint,
		identity_rx: watch::Receiver<Option<Identity>>,
		connector: Arc<dyn Connector>,
	) -> (SocketManager, SocketTask) {
		let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
		let (state_tx, state_rx) = watch::channel(SocketState::Disconnected { reason: None });
		let (shutdown_tx, shutdown_rx) = oneshot::channel();

		let actor = SocketActor {
			server,
			connector,
			state_tx,
			live: None,
			current: None,
			generation: 0,
			subscribers: HashMap::new(),
		};
		let join = tokio::spawn(run_socket_task(actor, identity_rx, cmd_rx, shutdown_rx));

		(
			SocketManager {
				cmd_tx,
				state_rx,
				next_handler_id: Arc::new(AtomicU64::new(1)),
			},
			SocketTask { shutdown_tx, join },
		)
	}

	/// Send a binary payload on the current connection. Without a connection the payload is
	/// dropped and `SendOutcome::Dropped` is returned; that is not an error.
	pub async fn send(&self, data: impl Into<Bytes>) -> Result<SendOutcome, SyncError> {
		let (reply, reply_rx) = oneshot::channel();
		self.cmd_tx
			.send(SocketCommand::Send {
				data: data.into(),
				reply,
			})
			.map_err(|_| SyncError::NotRunning("socket manager"))?;
		let outcome = reply_rx.await.map_err(|_| SyncError::NotRunning("socket manager"))??;
		Ok(outcome)
	}

	/// Register a frame handler. It stays bound across identity changes; dropping the returned
	/// subscription unregisters it.
	pub fn subscribe(&self) -> (FrameSubscription, mpsc::UnboundedReceiver<InboundFrame>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let handler_id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);

		let _ = self.cmd_tx.send(SocketCommand::Subscribe { handler_id, handler: tx });

		(
			FrameSubscription {
				handler_id,
				cmd_tx: self.cmd_tx.clone(),
			},
			rx,
		)
	}

	/// Re-open the connection for the current identity through the normal teardown/open
	/// transition. Returns `false` when there is no identity yet.
	pub async fn reconnect(&self) -> Result<bool, SyncError> {
		let (reply, reply_rx) = oneshot::channel();
		self.cmd_tx
			.send(SocketCommand::Reconnect { reply })
			.map_err(|_| SyncError::NotRunning("socket manager"))?;
		reply_rx.await.map_err(|_| SyncError::NotRunning("socket manager"))
	}

	pub fn state(&self) -> watch::Receiver<SocketState> {
		self.state_rx.clone()
	}

	pub fn current_state(&self) -> SocketState {
		self.state_rx.borrow().clone()
	}
}

/// Unregisters its handler on drop.
pub struct FrameSubscription {
	handler_id: u64,
	cmd_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl Drop for FrameSubscription {
	fn drop(&mut self) {
		let _ = self.cmd_tx.send(SocketCommand::Unsubscribe {
			handler_id: self.handler_id,
		});
	}
}

struct LiveConnection {
	identity: Identity,
	generation: u64,
	url: String,
	outbound: BoxedFrameSink,
	inbound: BoxedFrameStream,
}

struct SocketActor {
	server: Endpoint,
	connector: Arc<dyn Connector>,
	state_tx: watch::Sender<SocketState>,
	live: Option<LiveConnection>,
	/// Identity the socket is keyed to, kept after a dropped connection so `reconnect` can reuse it.
	current: Option<Identity>,
	generation: u64,
	subscribers: HashMap<u64, mpsc::UnboundedSender<InboundFrame>>,
}

async fn run_socket_task(
	mut actor: SocketActor,
	mut identity_rx: watch::Receiver<Option<Identity>>,
	mut cmd_rx: mpsc::UnboundedReceiver<SocketCommand>,
	mut shutdown_rx: oneshot::Receiver<()>,
) {
	let mut identity_open = true;

	let initial = identity_rx.borrow_and_update().clone();
	if let Some(identity) = initial {
		actor.transition(identity, "initial identity").await;
	}

	loop {
		tokio::select! {
			biased;

			_ = &mut shutdown_rx => {
				debug!("socket task shutdown requested");
				break;
			}

			cmd = cmd_rx.recv() => {
				let Some(cmd) = cmd else {
					debug!("all socket manager handles dropped");
					break;
				};
				actor.handle_command(cmd).await;
			}

			changed = identity_rx.changed(), if identity_open => {
				if changed.is_err() {
					debug!("identity source closed; keeping current connection");
					identity_open = false;
					continue;
				}
				let next = identity_rx.borrow_and_update().clone();
				match next {
					Some(identity) if actor.current.as_ref() != Some(&identity) => {
						actor.transition(identity, "identity changed").await;
					}
					Some(_) => {}
					None => warn!("identity became absent; keeping current connection"),
				}
			}

			frame = actor.next_frame(), if actor.live.is_some() => {
				match frame {
					Some(Ok(frame)) => actor.dispatch(frame),
					Some(Err(e)) => {
						warn!(error = %e, "socket receive failed");
						actor.teardown("receive failed").await;
						actor.set_state(SocketState::Disconnected { reason: Some(e.to_string()) });
					}
					None => {
						info!("socket closed by server");
						actor.teardown("closed by server").await;
						actor.set_state(SocketState::Disconnected {
							reason: Some("closed by server".to_string()),
						});
					}
				}
			}
		}
	}

	actor.teardown("shutdown").await;
	actor.set_state(SocketState::Disconnected {
		reason: Some("shutdown".to_string()),
	});
}

impl SocketActor {
	async fn handle_command(&mut self, cmd: SocketCommand) {
		match cmd {
			SocketCommand::Send { data, reply } => {
				let result = self.send(data).await;
				let _ = reply.send(result);
			}
			SocketCommand::Subscribe { handler_id, handler } => {
				self.subscribers.insert(handler_id, handler);
				debug!(handler_id, subscribers = self.subscribers.len(), "frame handler registered");
			}
			SocketCommand::Unsubscribe { handler_id } => {
				self.subscribers.remove(&handler_id);
				debug!(handler_id, subscribers = self.subscribers.len(), "frame handler removed");
			}
			SocketCommand::Reconnect { reply } => {
				let has_identity = match self.current.clone() {
					Some(identity) => {
						self.transition(identity, "reconnect requested").await;
						true
					}
					None => {
						debug!("reconnect requested without an identity");
						false
					}
				};
				let _ = reply.send(has_identity);
			}
		}
	}

	/// Detach, close, open, attach. Each step completes before the next starts.
	async fn transition(&mut self, identity: Identity, reason: &'static str) {
		self.teardown(reason).await;

		self.current = Some(identity.clone());
		let url = self.server.socket_url(identity.as_str());
		self.set_state(SocketState::Connecting {
			identity: identity.clone(),
		});
		info!(identity = %identity, url = %url, reason, "opening socket");

		match self.connector.connect(&url).await {
			Ok(conn) => {
				self.generation += 1;
				let generation = self.generation;
				self.live = Some(LiveConnection {
					identity: identity.clone(),
					generation,
					url,
					outbound: conn.outbound,
					inbound: conn.inbound,
				});
				info!(identity = %identity, generation, "socket connected");
				self.set_state(SocketState::Connected { identity, generation });
			}
			Err(e) => {
				warn!(identity = %identity, error = %e, "socket connect failed");
				self.set_state(SocketState::Disconnected {
					reason: Some(e.to_string()),
				});
			}
		}
	}

	async fn teardown(&mut self, reason: &'static str) {
		let Some(LiveConnection {
			identity,
			generation,
			url,
			mut outbound,
			inbound,
		}) = self.live.take()
		else {
			return;
		};

		drop(inbound);
		debug!(identity = %identity, generation, "inbound listener detached");

		match tokio::time::timeout(CLOSE_TIMEOUT, outbound.close()).await {
			Ok(Ok(())) => {}
			Ok(Err(e)) => debug!(identity = %identity, error = %e, "socket close failed"),
			Err(_) => debug!(identity = %identity, "socket close timed out"),
		}
		info!(identity = %identity, generation, url = %url, reason, "socket closed");
	}

	async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
		match self.live.as_mut() {
			Some(live) => live.inbound.next().await,
			None => std::future::pending().await,
		}
	}

	fn dispatch(&mut self, frame: Frame) {
		let Some(live) = self.live.as_ref() else {
			return;
		};
		let inbound = InboundFrame {
			identity: live.identity.clone(),
			generation: live.generation,
			frame,
		};
		debug!(
			generation = inbound.generation,
			kind = inbound.frame.kind(),
			len = inbound.frame.len(),
			"frame received"
		);
		self.subscribers.retain(|handler_id, tx| {
			let alive = tx.send(inbound.clone()).is_ok();
			if !alive {
				debug!(handler_id = *handler_id, "frame handler gone");
			}
			alive
		});
	}

	async fn send(&mut self, data: Bytes) -> Result<SendOutcome, TransportError> {
		let Some(live) = self.live.as_mut() else {
			debug!(len = data.len(), "no open socket; dropping outbound payload");
			return Ok(SendOutcome::Dropped);
		};
		let len = data.len();
		live.outbound.send(data).await?;
		debug!(generation = live.generation, len, "payload sent");
		Ok(SendOutcome::Sent)
	}

	fn set_state(&self, state: SocketState) {
		self.state_tx.send_replace(state);
	}
}
