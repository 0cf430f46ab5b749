//! Keeps the relay link up.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use doorlock_access::AccessController;
use doorlock_hardware::LinkEvent;
use doorlock_storage::Registry;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reconnect the relay link whenever it drops, until `cancel` fires.
///
/// `connect` opens the link; it is retried every `delay` while it fails.
/// After a successful reconnect the board is initialized again.
pub async fn supervise_link<R, C, F>(
    controller: Arc<AccessController<R>>,
    mut connect: C,
    delay: Duration,
    cancel: CancellationToken,
) where
    R: Registry,
    C: FnMut() -> F + Send,
    F: Future<Output = doorlock_hardware::Result<()>> + Send,
{
    let board = Arc::clone(controller.board());
    let mut events = board.subscribe();

    loop {
        if board.is_connected() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                event = events.recv() => match event {
                    Ok(LinkEvent::Disconnected) => warn!("Relay link lost"),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "Link events skipped"),
                    Err(RecvError::Closed) => return,
                },
            }
            continue;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        match connect().await {
            Ok(()) => {
                info!(path = %board.link().path(), "Relay link re-established");
                if let Err(e) = controller.initialize().await {
                    warn!(error = %e, "Relay board initialization after reconnect failed");
                }
            }
            Err(e) => {
                warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Relay link reconnect failed");
            }
        }
    }
}
