#![forbid(unsafe_code)]

use huddle_domain::GroupId;

/// Notifications from the background loops of the sync core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
	/// A `join_group` push added a group to the store.
	GroupJoined { group_id: GroupId },
	/// A `new_message` push appended to a group's log.
	MessageAppended { group_id: GroupId, index: usize },
	/// Malformed push payload or a frame that breaks the socket contract. The offending item was
	/// dropped.
	ProtocolViolation { origin: ViolationOrigin, detail: String },
	/// The backend rejected an inbound frame.
	IngressFailed { detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationOrigin {
	PushEvent,
	Frame,
}
