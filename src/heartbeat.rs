//! Periodic heartbeat task.
//!
//! While a command runs, the server's liveness watchdog expects `H` chunks
//! at a steady cadence even when no other traffic flows. The heartbeat runs
//! as its own task writing through the shared [`WriterHandle`], so its
//! frames can never interleave with payload frames mid-wire.
//!
//! A zero interval is a deliberate opt-out: no task is spawned and no `H`
//! chunk is ever sent.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::protocol::ChunkType;
use crate::writer::WriterHandle;

/// Default interval between heartbeats (half the smallest server-side
/// timeout the original harness exercises).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// Handle to a running heartbeat task.
pub struct HeartbeatHandle {
    cancel_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Signal the task to stop and wait for it to finish.
    ///
    /// Returns within at most one interval; must be called before the
    /// transport is torn down so the task never writes to a dead handle.
    pub async fn stop(self) {
        let _ = self.cancel_tx.send(());
        let _ = self.task.await;
    }

    /// Abort the task without waiting. Used on drop paths where no
    /// executor context is available.
    pub fn abort(self) {
        self.task.abort();
    }
}

/// Spawn a heartbeat task writing an `H` chunk every `interval`.
///
/// Returns `None` when `interval` is zero (heartbeats disabled).
pub fn spawn_heartbeat(writer: WriterHandle, interval: Duration) -> Option<HeartbeatHandle> {
    if interval.is_zero() {
        return None;
    }

    let (cancel_tx, mut cancel_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        // First tick one interval from now, not immediately, so a session of
        // length t produces floor(t / interval) +/- 1 heartbeats.
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);

        loop {
            tokio::select! {
                _ = &mut cancel_rx => break,
                _ = ticker.tick() => {
                    if writer.send_empty(ChunkType::Heartbeat).await.is_err() {
                        // Writer gone; the session is tearing down.
                        tracing::debug!("heartbeat stopping: write path closed");
                        break;
                    }
                }
            }
        }
    });

    Some(HeartbeatHandle { cancel_tx, task })
}
