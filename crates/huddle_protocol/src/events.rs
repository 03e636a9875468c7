#![forbid(unsafe_code)]

use huddle_domain::GroupId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Backend event emitted after a welcome message made us a member of a group.
pub const JOIN_GROUP_EVENT: &str = "join_group";

/// Backend event emitted after an application message was decrypted.
pub const NEW_MESSAGE_EVENT: &str = "new_message";

/// A push event as it leaves the backend: a name and an untyped JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPushEvent {
	pub name: String,
	#[serde(default)]
	pub payload: serde_json::Value,
}

impl RawPushEvent {
	pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
		Self {
			name: name.into(),
			payload,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinGroupPayload {
	pub group_id: GroupId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessagePayload {
	pub group_id: GroupId,
	pub message: String,
}

/// Typed push events the client listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
	JoinGroup(JoinGroupPayload),
	NewMessage(NewMessagePayload),
}

impl PushEvent {
	pub fn name(&self) -> &'static str {
		match self {
			PushEvent::JoinGroup(_) => JOIN_GROUP_EVENT,
			PushEvent::NewMessage(_) => NEW_MESSAGE_EVENT,
		}
	}

	pub fn group_id(&self) -> &GroupId {
		match self {
			PushEvent::JoinGroup(p) => &p.group_id,
			PushEvent::NewMessage(p) => &p.group_id,
		}
	}

	/// Decode a raw event. Missing fields, wrong field types, a `null` payload and empty ids are
	/// all rejected here, before anything reaches the store.
	pub fn decode(raw: &RawPushEvent) -> Result<Self, ProtocolError> {
		match raw.name.as_str() {
			JOIN_GROUP_EVENT => decode_payload(JOIN_GROUP_EVENT, &raw.payload).map(PushEvent::JoinGroup),
			NEW_MESSAGE_EVENT => decode_payload(NEW_MESSAGE_EVENT, &raw.payload).map(PushEvent::NewMessage),
			other => Err(ProtocolError::UnknownEvent(other.to_string())),
		}
	}

	pub fn to_raw(&self) -> RawPushEvent {
		let payload = match self {
			PushEvent::JoinGroup(p) => serde_json::json!({ "group_id": p.group_id.as_str() }),
			PushEvent::NewMessage(p) => serde_json::json!({
				"group_id": p.group_id.as_str(),
				"message": p.message,
			}),
		};
		RawPushEvent::new(self.name(), payload)
	}
}

fn decode_payload<T: DeserializeOwned>(event: &'static str, payload: &serde_json::Value) -> Result<T, ProtocolError> {
	T::deserialize(payload).map_err(|source| ProtocolError::InvalidPayload { event, source })
}
