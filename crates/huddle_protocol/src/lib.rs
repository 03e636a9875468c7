#![forbid(unsafe_code)]

pub mod commands;
pub mod events;
pub mod frame;

pub use events::{JOIN_GROUP_EVENT, JoinGroupPayload, NEW_MESSAGE_EVENT, NewMessagePayload, PushEvent, RawPushEvent};
pub use frame::Frame;

use thiserror::Error;

/// Violations of the backend/socket contract. Fatal for the offending event or frame only.
#[derive(Debug, Error)]
pub enum ProtocolError {
	#[error("unexpected text frame on binary socket ({len} bytes)")]
	UnexpectedTextFrame { len: usize },

	#[error("invalid {event} payload: {source}")]
	InvalidPayload {
		event: &'static str,
		#[source]
		source: serde_json::Error,
	},

	#[error("unknown push event: {0}")]
	UnknownEvent(String),
}

impl ProtocolError {
	/// Stable short name for logs.
	pub fn kind(&self) -> &'static str {
		match self {
			ProtocolError::UnexpectedTextFrame { .. } => "unexpected_text_frame",
			ProtocolError::InvalidPayload { .. } => "invalid_payload",
			ProtocolError::UnknownEvent(_) => "unknown_event",
		}
	}
}
