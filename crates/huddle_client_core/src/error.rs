#![forbid(unsafe_code)]

use std::time::Duration;

use huddle_domain::ParseIdError;
use huddle_protocol::ProtocolError;
use thiserror::Error;

/// A backend command rejected the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{command} failed: {message}")]
pub struct BridgeError {
	pub command: &'static str,
	pub message: String,
}

impl BridgeError {
	pub fn new(command: &'static str, message: impl Into<String>) -> Self {
		Self {
			command,
			message: message.into(),
		}
	}
}

/// Real-time socket failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
	#[error("failed to connect to {url}: {message}")]
	Connect { url: String, message: String },

	#[error("connect to {url} timed out after {after:?}")]
	Timeout { url: String, after: Duration },

	#[error("send failed: {0}")]
	Send(String),

	#[error("receive failed: {0}")]
	Receive(String),
}

/// Errors for sync core operations.
#[derive(Debug, Error)]
pub enum SyncError {
	#[error(transparent)]
	Bridge(#[from] BridgeError),

	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Package index request could not be made or decoded.
	#[error("package index request failed: {0}")]
	PackageIndex(String),

	/// Package index answered with a non-2xx status.
	#[error("package index returned HTTP {0}")]
	PackageIndexStatus(u16),

	/// An id coming from the backend or the caller is unusable.
	#[error("invalid id: {0}")]
	InvalidInput(#[from] ParseIdError),

	/// A background task of the core has stopped.
	#[error("{0} is not running")]
	NotRunning(&'static str),
}

impl From<reqwest::Error> for SyncError {
	fn from(e: reqwest::Error) -> Self {
		match e.status() {
			Some(status) => SyncError::PackageIndexStatus(status.as_u16()),
			None => SyncError::PackageIndex(e.to_string()),
		}
	}
}
