#![forbid(unsafe_code)]

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::bridge::{BoxedCommandBridge, CommandBridge};
use crate::error::SyncError;
use crate::events::{SyncEvent, ViolationOrigin};
use crate::socket::{FrameSubscription, InboundFrame};

/// Forward one inbound frame to the backend. Text frames never reach it.
pub async fn ingest_frame(bridge: &dyn CommandBridge, inbound: InboundFrame) -> Result<(), SyncError> {
	let data = inbound.frame.into_binary()?;
	debug!(identity = %inbound.identity, generation = inbound.generation, len = data.len(), "forwarding frame to backend");
	bridge.process_message(data).await?;
	Ok(())
}

/// Ingress loop. Frames are handed to the backend one at a time in arrival order; its push events
/// carry the results back through the event bridge.
pub async fn run_ingress(
	subscription: FrameSubscription,
	mut frames: mpsc::UnboundedReceiver<InboundFrame>,
	bridge: BoxedCommandBridge,
	sync_tx: broadcast::Sender<SyncEvent>,
	mut shutdown_rx: oneshot::Receiver<()>,
) {
	info!("ingress pipeline running");

	loop {
		tokio::select! {
			_ = &mut shutdown_rx => {
				debug!("ingress shutdown requested");
				break;
			}
			inbound = frames.recv() => {
				let Some(inbound) = inbound else {
					info!("frame source closed");
					break;
				};
				match ingest_frame(bridge.as_ref(), inbound).await {
					Ok(()) => {}
					Err(SyncError::Protocol(e)) => {
						error!(kind = e.kind(), error = %e, "protocol violation on socket");
						let _ = sync_tx.send(SyncEvent::ProtocolViolation {
							origin: ViolationOrigin::Frame,
							detail: e.to_string(),
						});
					}
					Err(e) => {
						warn!(error = %e, "backend rejected inbound frame");
						let _ = sync_tx.send(SyncEvent::IngressFailed { detail: e.to_string() });
					}
				}
			}
		}
	}

	drop(subscription);
}
