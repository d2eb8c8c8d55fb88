//! The authoritative tic-tac-toe server. One task per connection decodes request lines, mutates the
//! shared [`session::GameSession`] under its lock and broadcasts the results through the
//! [`registry::ConnectionRegistry`] after the lock is released.

pub mod board;
pub mod config;
pub mod coordinator;
pub mod registry;
pub mod server;
pub mod server_state;
pub mod session;
pub mod status;

use serde::Serialize;
use std::fmt;

/// Identifies one accepted connection for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
