#![forbid(unsafe_code)]

use std::sync::Arc;

use huddle_domain::{Identity, UserName};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::bridge::BoxedCommandBridge;
use crate::error::SyncError;

/// Current user's identity, published on a watch channel.
///
/// Absent until the backend has a user. Once set it only ever moves to another identity, a failed
/// refetch keeps the last known value.
#[derive(Clone)]
pub struct IdentityResource {
	bridge: BoxedCommandBridge,
	tx: Arc<watch::Sender<Option<Identity>>>,
}

impl IdentityResource {
	pub fn new(bridge: BoxedCommandBridge) -> Self {
		let (tx, _rx) = watch::channel(None);
		Self {
			bridge,
			tx: Arc::new(tx),
		}
	}

	pub fn current(&self) -> Option<Identity> {
		self.tx.borrow().clone()
	}

	/// Receivers see every identity transition; the socket manager keys its connection off this.
	pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
		self.tx.subscribe()
	}

	/// Ask the backend for the identity. A backend failure is not an error: before the first user
	/// exists there simply is no identity.
	pub async fn fetch(&self) -> Option<Identity> {
		match self.bridge.get_identity().await {
			Ok(raw) => match Identity::new(raw) {
				Ok(identity) => {
					self.publish(identity.clone());
					Some(identity)
				}
				Err(e) => {
					error!(error = %e, "backend returned an unusable identity");
					self.current()
				}
			},
			Err(e) => {
				warn!(error = %e, "identity not available");
				self.current()
			}
		}
	}

	/// Create the user, then refetch so subscribers observe the new identity.
	pub async fn create_user(&self, name: UserName) -> Result<Option<Identity>, SyncError> {
		info!(name = %name, "creating user");
		self.bridge.create_user(name).await?;
		Ok(self.fetch().await)
	}

	fn publish(&self, identity: Identity) {
		self.tx.send_if_modified(|current| {
			if current.as_ref() == Some(&identity) {
				return false;
			}
			match current.as_ref() {
				Some(previous) => info!(previous = %previous, identity = %identity, "identity changed"),
				None => info!(identity = %identity, "identity established"),
			}
			*current = Some(identity);
			true
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::FakeBridge;

	#[tokio::test]
	async fn absent_until_a_user_exists() {
		let bridge = FakeBridge::new();
		let identity = IdentityResource::new(bridge.clone().into_boxed());

		assert_eq!(identity.fetch().await, None);
		assert_eq!(identity.current(), None);
	}

	#[tokio::test]
	async fn create_user_refetches_and_notifies() {
		let bridge = FakeBridge::new();
		bridge.set_identity_on_create("u1");
		let identity = IdentityResource::new(bridge.clone().into_boxed());
		let mut rx = identity.subscribe();

		let created = identity.create_user(UserName::new("alice").unwrap()).await.expect("create_user");

		assert_eq!(created, Some(Identity::new("u1").unwrap()));
		assert!(rx.has_changed().unwrap());
		assert_eq!(*rx.borrow_and_update(), Some(Identity::new("u1").unwrap()));
		assert_eq!(bridge.calls(), vec!["create_user:alice", "get_identity"]);
	}

	#[tokio::test]
	async fn same_identity_does_not_notify_twice() {
		let bridge = FakeBridge::new();
		bridge.set_identity("u1");
		let identity = IdentityResource::new(bridge.clone().into_boxed());
		let mut rx = identity.subscribe();

		identity.fetch().await;
		rx.mark_unchanged();
		identity.fetch().await;

		assert!(!rx.has_changed().unwrap());
	}

	#[tokio::test]
	async fn failed_refetch_keeps_last_identity() {
		let bridge = FakeBridge::new();
		bridge.set_identity("u1");
		let identity = IdentityResource::new(bridge.clone().into_boxed());
		identity.fetch().await;

		bridge.clear_identity();

		assert_eq!(identity.fetch().await, Some(Identity::new("u1").unwrap()));
	}

	#[tokio::test]
	async fn create_user_failure_surfaces() {
		let bridge = FakeBridge::new();
		bridge.fail_command("create_user");
		let identity = IdentityResource::new(bridge.clone().into_boxed());

		let err = identity.create_user(UserName::new("bob").unwrap()).await.unwrap_err();

		assert!(matches!(err, SyncError::Bridge(ref e) if e.command == "create_user"), "{err:?}");
		assert_eq!(identity.current(), None);
	}
}
