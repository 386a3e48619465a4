//! Lifecycle of one device's push channel

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};

use super::registry::{SessionGuard, SharedSessionRegistry};
use super::types::{ChannelSink, PushFrame, SessionHandle};

/// Frames buffered per connection before writers wait
const PUSH_BUFFER: usize = 32;

/// Open a push channel for a device
///
/// Registers the channel, queues the `connected` event as its first frame,
/// and spawns the task that keeps it alive. The returned receiver feeds the
/// response body; dropping it ends the session.
#[must_use]
pub fn open(
    registry: &SharedSessionRegistry,
    device_id: &str,
    heartbeat: Duration,
) -> mpsc::Receiver<PushFrame> {
    let (tx, rx) = mpsc::channel(PUSH_BUFFER);

    // Fresh channel with spare capacity, cannot fail
    let _ = tx.try_send(PushFrame::connected());

    let handle = SessionHandle::new(Arc::new(ChannelSink::new(tx.clone())));
    let guard = registry.register_guarded(device_id, handle.clone());
    tokio::spawn(keep_alive(guard, handle, tx, heartbeat));

    rx
}

/// Send heartbeats until the client goes away, the session is closed, or
/// the device loses its registration, then release the session
async fn keep_alive(
    guard: SessionGuard,
    handle: SessionHandle,
    tx: mpsc::Sender<PushFrame>,
    heartbeat: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = tx.closed() => {
                tracing::debug!(
                    device_id = %guard.device_id(),
                    connection_id = %guard.connection_id(),
                    "push channel closed by client"
                );
                break;
            }
            () = handle.closed() => {
                tracing::debug!(
                    device_id = %guard.device_id(),
                    connection_id = %guard.connection_id(),
                    "session closed, ending push channel"
                );
                break;
            }
            _ = ticker.tick() => {
                if !guard.device_registered() {
                    tracing::debug!(
                        device_id = %guard.device_id(),
                        connection_id = %guard.connection_id(),
                        "session removed, closing push channel"
                    );
                    break;
                }
                match tx.try_send(PushFrame::heartbeat()) {
                    // Undelivered frames are already queued; skip this beat
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        }
    }

    drop(guard);
}
