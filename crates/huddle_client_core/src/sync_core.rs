#![forbid(unsafe_code)]

use std::sync::Arc;

use huddle_domain::{GroupId, Identity, PackageId, UserName};
use huddle_protocol::RawPushEvent;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bridge::BoxedCommandBridge;
use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::event_bridge::run_event_bridge;
use crate::events::SyncEvent;
use crate::identity::IdentityResource;
use crate::ingress::run_ingress;
use crate::packages::PackageIndex;
use crate::socket::{SendOutcome, SocketManager, SocketState, SocketTask};
use crate::store::{Store, StoreChange, StoreSnapshot};
use crate::transport::Connector;

/// The client sync layer.
///
/// Owns the identity resource, the store, the socket task, the event bridge listener and the
/// ingress pipeline. View code reads the store and issues commands through this type only.
pub struct SyncCore {
	bridge: BoxedCommandBridge,
	identity: IdentityResource,
	store: Store,
	socket: SocketManager,
	packages: PackageIndex,
	events_tx: broadcast::Sender<SyncEvent>,
	tasks: CoreTasks,
}

struct CoreTasks {
	socket: SocketTask,
	event_bridge: (oneshot::Sender<()>, JoinHandle<()>),
	ingress: (oneshot::Sender<()>, JoinHandle<()>),
}

impl SyncCore {
	/// Wire up and start the sync layer.
	///
	/// `push_events` carries the backend's push events. The identity is fetched and the group list
	/// hydrated before this returns; neither failing stops startup.
	pub async fn start(
		config: ClientConfig,
		bridge: BoxedCommandBridge,
		push_events: mpsc::UnboundedReceiver<RawPushEvent>,
		connector: Arc<dyn Connector>,
	) -> Result<Self, SyncError> {
		let packages = PackageIndex::new(config.package_index.clone(), config.request_timeout)?;
		let store = Store::new(config.store_change_capacity);
		let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
		let identity = IdentityResource::new(bridge.clone());

		let (socket, socket_task) = SocketManager::start(config.server.clone(), identity.subscribe(), connector);

		let (bridge_shutdown, bridge_shutdown_rx) = oneshot::channel();
		let event_bridge = tokio::spawn(run_event_bridge(
			push_events,
			store.clone(),
			events_tx.clone(),
			bridge_shutdown_rx,
		));

		// Subscribe before the identity exists so the first connection's frames are not missed.
		let (subscription, frames) = socket.subscribe();
		let (ingress_shutdown, ingress_shutdown_rx) = oneshot::channel();
		let ingress = tokio::spawn(run_ingress(
			subscription,
			frames,
			bridge.clone(),
			events_tx.clone(),
			ingress_shutdown_rx,
		));

		let core = Self {
			bridge,
			identity,
			store,
			socket,
			packages,
			events_tx,
			tasks: CoreTasks {
				socket: socket_task,
				event_bridge: (bridge_shutdown, event_bridge),
				ingress: (ingress_shutdown, ingress),
			},
		};

		match core.identity.fetch().await {
			Some(identity) => info!(identity = %identity, "sync core started"),
			None => info!("sync core started without an identity"),
		}
		if let Err(e) = core.hydrate_groups().await {
			warn!(error = %e, "initial group list unavailable");
		}

		Ok(core)
	}

	pub fn identity(&self) -> Option<Identity> {
		self.identity.current()
	}

	pub fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
		self.identity.subscribe()
	}

	/// Refetch the identity from the backend.
	pub async fn refresh_identity(&self) -> Option<Identity> {
		self.identity.fetch().await
	}

	pub async fn create_user(&self, name: UserName) -> Result<Option<Identity>, SyncError> {
		self.identity.create_user(name).await
	}

	pub async fn is_authenticated(&self) -> Result<bool, SyncError> {
		Ok(self.bridge.is_authenticated().await?)
	}

	/// Publish a key package so others can invite this user.
	pub async fn advertise(&self) -> Result<(), SyncError> {
		self.bridge.advertise().await?;
		info!("key package advertised");
		Ok(())
	}

	/// Seed the store from the backend's group list. Already-known groups are skipped.
	///
	/// The whole list is validated before anything is appended: one invalid id rejects the list
	/// and leaves the store untouched.
	pub async fn hydrate_groups(&self) -> Result<usize, SyncError> {
		let groups = self
			.bridge
			.get_groups()
			.await?
			.into_iter()
			.map(GroupId::new)
			.collect::<Result<Vec<_>, _>>()?;
		let mut added = 0;
		for group_id in groups {
			if self.store.append_group(group_id) {
				added += 1;
			}
		}
		info!(added, total = self.store.groups().len(), "groups hydrated");
		Ok(added)
	}

	/// Create a group and append it to the store without waiting for a push event.
	pub async fn create_group(&self) -> Result<GroupId, SyncError> {
		let group_id = GroupId::new(self.bridge.create_group().await?)?;
		self.store.append_group(group_id.clone());
		info!(group_id = %group_id, "group created");
		Ok(group_id)
	}

	/// Encrypt `text` for the group and put it on the socket. The message shows up in the store
	/// only once the backend pushes it back.
	pub async fn send_message(&self, group_id: &GroupId, text: impl Into<String>) -> Result<SendOutcome, SyncError> {
		let bytes = self.bridge.create_message(group_id.clone(), text.into()).await?;
		let outcome = self.socket.send(bytes).await?;
		if outcome == SendOutcome::Dropped {
			warn!(group_id = %group_id, "message created but no socket is open");
		}
		Ok(outcome)
	}

	/// Invite the owner of `package_id` into the group and send the resulting welcome.
	pub async fn invite_package(&self, group_id: &GroupId, package_id: &PackageId) -> Result<SendOutcome, SyncError> {
		let bytes = self
			.bridge
			.invite_package(group_id.clone(), package_id.clone())
			.await?;
		let outcome = self.socket.send(bytes).await?;
		info!(group_id = %group_id, package_id = %package_id, ?outcome, "invite sent");
		Ok(outcome)
	}

	pub async fn list_packages(&self) -> Result<Vec<PackageId>, SyncError> {
		self.packages.list().await
	}

	pub fn groups(&self) -> Vec<GroupId> {
		self.store.groups()
	}

	pub fn messages(&self, group_id: &GroupId) -> Vec<String> {
		self.store.messages(group_id)
	}

	pub fn snapshot(&self) -> StoreSnapshot {
		self.store.snapshot()
	}

	pub fn store(&self) -> &Store {
		&self.store
	}

	pub fn store_changes(&self) -> broadcast::Receiver<StoreChange> {
		self.store.changes()
	}

	pub fn socket(&self) -> &SocketManager {
		&self.socket
	}

	pub fn socket_state(&self) -> watch::Receiver<SocketState> {
		self.socket.state()
	}

	pub async fn reconnect(&self) -> Result<bool, SyncError> {
		self.socket.reconnect().await
	}

	pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
		self.events_tx.subscribe()
	}

	/// Stop the listener loops, close the socket and wait for every task.
	pub async fn shutdown(self) {
		let CoreTasks {
			socket,
			event_bridge: (bridge_shutdown, event_bridge),
			ingress: (ingress_shutdown, ingress),
		} = self.tasks;

		let _ = bridge_shutdown.send(());
		let _ = ingress_shutdown.send(());
		for (name, join) in [("event bridge", event_bridge), ("ingress", ingress)] {
			if let Err(e) = join.await {
				warn!(task = name, error = %e, "task ended abnormally");
			}
		}
		socket.shutdown().await;
		info!("sync core stopped");
	}
}
