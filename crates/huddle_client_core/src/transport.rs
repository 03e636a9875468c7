#![forbid(unsafe_code)]

//! Socket transport seam.
//!
//! A [`Connection`] is split into an outbound sink of binary payloads and an inbound stream of
//! [`Frame`]s so the socket manager can drop the listener before it closes the sender.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt as _, Stream, StreamExt as _, future};
use huddle_protocol::Frame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::TransportError;

pub type BoxedFrameSink = Pin<Box<dyn Sink<Bytes, Error = TransportError> + Send>>;
pub type BoxedFrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<Connection, TransportError>> + Send + 'a>>;

/// An open socket. The stream ends when the peer closes.
pub struct Connection {
	pub outbound: BoxedFrameSink,
	pub inbound: BoxedFrameStream,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection").finish_non_exhaustive()
	}
}

/// Opens sockets by URL.
pub trait Connector: Send + Sync {
	fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a>;
}

/// WebSocket connector (`tokio-tungstenite`).
#[derive(Debug, Clone)]
pub struct WsConnector {
	connect_timeout: Duration,
}

impl WsConnector {
	pub fn new(connect_timeout: Duration) -> Self {
		Self { connect_timeout }
	}
}

impl Connector for WsConnector {
	fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
		Box::pin(async move {
			let (ws, _resp) = tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
				.await
				.map_err(|_| TransportError::Timeout {
					url: url.to_string(),
					after: self.connect_timeout,
				})?
				.map_err(|e| TransportError::Connect {
					url: url.to_string(),
					message: e.to_string(),
				})?;

			let (sink, stream) = ws.split();

			let outbound = sink
				.with(|data: Bytes| future::ready(Ok::<_, tokio_tungstenite::tungstenite::Error>(Message::Binary(data))))
				.sink_map_err(|e| TransportError::Send(e.to_string()));

			let inbound = stream.filter_map(|msg| {
				future::ready(match msg {
					Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data))),
					Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
					Ok(Message::Close(frame)) => {
						debug!(?frame, "socket closed by peer");
						None
					}
					Ok(_) => None,
					Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
				})
			});

			Ok(Connection {
				outbound: Box::pin(outbound),
				inbound: Box::pin(inbound),
			})
		})
	}
}
