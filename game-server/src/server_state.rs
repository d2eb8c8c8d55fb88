//! The state shared by all connection tasks.

use crate::ConnectionId;
use crate::config::ServerConfig;
use crate::registry::ConnectionRegistry;
use crate::session::GameSession;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// The application state. Handed to every connection as `Arc<ServerState>`.
pub struct ServerState {
    /// The one game session. Its lock is the only game state lock.
    pub session: Mutex<GameSession>,
    /// Everybody we broadcast to. Has its own locking, independent of the session.
    pub registry: ConnectionRegistry,
    pub config: ServerConfig,
    next_connection_id: AtomicU64,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> ServerState {
        ServerState {
            session: Mutex::new(GameSession::new(config.turn_policy)),
            registry: ConnectionRegistry::new(),
            config,
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Hands out consecutive connection ids.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }
}
