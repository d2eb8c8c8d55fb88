//! The accept loop. One tracked task per connection, bounded by a semaphore.

use crate::coordinator::handle_connection;
use crate::server_state::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Accepts connections until `shutdown` fires, then waits up to the configured grace period for
/// the connection tasks to wind down.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>, shutdown: CancellationToken) {
    let limiter = Arc::new(Semaphore::new(state.config.max_connections));
    let tracker = TaskTracker::new();

    loop {
        // Waiting for a permit before accepting leaves surplus clients in the listen backlog.
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = limiter.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(error) => {
                    tracing::warn!(?error, "Failed to accept connection.");
                    continue;
                }
            },
        };

        let state = state.clone();
        let shutdown = shutdown.clone();
        tracker.spawn(async move {
            handle_connection(stream, peer, state, shutdown).await;
            drop(permit);
        });
    }

    tracker.close();
    tracing::info!(open_connections = tracker.len(), "Listener stopped, waiting for connections.");
    if tokio::time::timeout(state.config.shutdown_grace(), tracker.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            open_connections = tracker.len(),
            "Connections did not finish within the grace period."
        );
    }
}
