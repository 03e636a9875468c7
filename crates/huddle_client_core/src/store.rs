#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use huddle_domain::GroupId;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// Group list and per-group message logs, shared by every writer of the sync layer.
///
/// Groups keep insertion order and are deduplicated. Message logs are append-only; a log exists
/// once its first message arrived, reading an unknown group yields an empty log.
#[derive(Debug, Clone)]
pub struct Store {
	inner: Arc<RwLock<Inner>>,
	changes: broadcast::Sender<StoreChange>,
}

#[derive(Debug, Default)]
struct Inner {
	groups: Vec<GroupId>,
	known_groups: HashSet<GroupId>,
	messages: HashMap<GroupId, Vec<String>>,
}

/// Published after every mutation that changed the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
	GroupAdded { group_id: GroupId },
	MessageAppended { group_id: GroupId, index: usize },
}

/// Point-in-time copy of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
	pub groups: Vec<GroupId>,
	pub messages: HashMap<GroupId, Vec<String>>,
}

impl Store {
	pub fn new(change_capacity: usize) -> Self {
		let (changes, _) = broadcast::channel(change_capacity.max(1));
		Self {
			inner: Arc::new(RwLock::new(Inner::default())),
			changes,
		}
	}

	/// Append `group_id` to the group list. Returns `false` when it was already present.
	///
	/// Changes are broadcast under the write lock, so subscribers see them in store order.
	pub fn append_group(&self, group_id: GroupId) -> bool {
		let mut inner = self.inner.write();
		if !inner.known_groups.insert(group_id.clone()) {
			debug!(group_id = %group_id, "store: group already known");
			return false;
		}
		inner.groups.push(group_id.clone());
		debug!(group_id = %group_id, "store: group added");
		let _ = self.changes.send(StoreChange::GroupAdded { group_id });
		true
	}

	/// Append `message` to the log of `group_id`, creating the log on first use. Returns the
	/// position of the new entry.
	pub fn append_message(&self, group_id: GroupId, message: String) -> usize {
		let mut inner = self.inner.write();
		let log = inner.messages.entry(group_id.clone()).or_default();
		log.push(message);
		let index = log.len() - 1;

		debug!(group_id = %group_id, index, "store: message appended");
		let _ = self.changes.send(StoreChange::MessageAppended { group_id, index });
		index
	}

	pub fn groups(&self) -> Vec<GroupId> {
		self.inner.read().groups.clone()
	}

	pub fn contains_group(&self, group_id: &GroupId) -> bool {
		self.inner.read().known_groups.contains(group_id)
	}

	pub fn messages(&self, group_id: &GroupId) -> Vec<String> {
		self.inner.read().messages.get(group_id).cloned().unwrap_or_default()
	}

	pub fn message_count(&self, group_id: &GroupId) -> usize {
		self.inner.read().messages.get(group_id).map_or(0, Vec::len)
	}

	pub fn snapshot(&self) -> StoreSnapshot {
		let inner = self.inner.read();
		StoreSnapshot {
			groups: inner.groups.clone(),
			messages: inner.messages.clone(),
		}
	}

	pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
		self.changes.subscribe()
	}
}
