#![forbid(unsafe_code)]

use huddle_protocol::{ProtocolError, PushEvent, RawPushEvent};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info};

use crate::events::{SyncEvent, ViolationOrigin};
use crate::store::Store;

/// Decode one push event and apply it to the store. Nothing is written when decoding fails.
pub fn apply_push_event(store: &Store, raw: &RawPushEvent) -> Result<SyncEvent, ProtocolError> {
	match PushEvent::decode(raw)? {
		PushEvent::JoinGroup(p) => {
			store.append_group(p.group_id.clone());
			Ok(SyncEvent::GroupJoined { group_id: p.group_id })
		}
		PushEvent::NewMessage(p) => {
			let index = store.append_message(p.group_id.clone(), p.message);
			Ok(SyncEvent::MessageAppended {
				group_id: p.group_id,
				index,
			})
		}
	}
}

/// Listener loop: applies push events in arrival order until shutdown or until the event source
/// closes.
pub async fn run_event_bridge(
	mut events_rx: mpsc::UnboundedReceiver<RawPushEvent>,
	store: Store,
	sync_tx: broadcast::Sender<SyncEvent>,
	mut shutdown_rx: oneshot::Receiver<()>,
) {
	info!("event bridge listening");

	loop {
		tokio::select! {
			_ = &mut shutdown_rx => {
				debug!("event bridge shutdown requested");
				break;
			}
			raw = events_rx.recv() => {
				let Some(raw) = raw else {
					info!("push event source closed");
					break;
				};
				handle_push_event(&store, &sync_tx, &raw);
			}
		}
	}
}

fn handle_push_event(store: &Store, sync_tx: &broadcast::Sender<SyncEvent>, raw: &RawPushEvent) {
	match apply_push_event(store, raw) {
		Ok(event) => {
			let _ = sync_tx.send(event);
		}
		Err(ProtocolError::UnknownEvent(name)) => {
			debug!(event = %name, "ignoring push event");
		}
		Err(e) => {
			error!(event = %raw.name, kind = e.kind(), error = %e, "malformed push event dropped");
			let _ = sync_tx.send(SyncEvent::ProtocolViolation {
				origin: ViolationOrigin::PushEvent,
				detail: e.to_string(),
			});
		}
	}
}
