//! The wire vocabulary of the tic-tac-toe game. It is used consistently across the server and the client.
//! Also contains the player slot identity both sides agree on.

pub mod codec;

pub use codec::{ProtocolError, Request, Response};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The port the game server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5001;

/// The address the client connects to. Fixed to loopback.
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:5001";

/// The buffer sizes for the per connection outbound channels.
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// Lines longer than this are discarded before they reach the decoder.
pub const MAX_LINE_LENGTH: usize = 256;

/// One of the two fixed player identities in a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerSlot {
    /// Plays the crosses and always opens a round.
    One,
    /// Plays the circles.
    Two,
}

impl PlayerSlot {
    /// Both slots in assignment order.
    pub const ALL: [PlayerSlot; 2] = [PlayerSlot::One, PlayerSlot::Two];

    /// The number used on the wire (`Player 1`, `Player 2`).
    pub fn number(self) -> u8 {
        match self {
            PlayerSlot::One => 1,
            PlayerSlot::Two => 2,
        }
    }

    /// Maps the wire number back to a slot.
    pub fn from_number(number: u8) -> Option<PlayerSlot> {
        match number {
            1 => Some(PlayerSlot::One),
            2 => Some(PlayerSlot::Two),
            _ => None,
        }
    }

    /// The opponent.
    pub fn other(self) -> PlayerSlot {
        match self {
            PlayerSlot::One => PlayerSlot::Two,
            PlayerSlot::Two => PlayerSlot::One,
        }
    }

    /// Index into slot tables.
    pub fn index(self) -> usize {
        match self {
            PlayerSlot::One => 0,
            PlayerSlot::Two => 1,
        }
    }

    /// The mark symbol of the slot, crosses for player 1 and circles for player 2.
    pub fn symbol(self) -> char {
        match self {
            PlayerSlot::One => 'X',
            PlayerSlot::Two => 'O',
        }
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {}", self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_numbers_map_both_ways() {
        for slot in PlayerSlot::ALL {
            assert_eq!(PlayerSlot::from_number(slot.number()), Some(slot));
        }
        assert_eq!(PlayerSlot::from_number(0), None);
        assert_eq!(PlayerSlot::from_number(3), None);
    }

    #[test]
    fn client_address_is_loopback_on_the_game_port() {
        let address: std::net::SocketAddr = DEFAULT_SERVER_ADDRESS.parse().unwrap();
        assert!(address.ip().is_loopback());
        assert_eq!(address.port(), DEFAULT_PORT);
    }

    #[test]
    fn other_swaps_slots() {
        assert_eq!(PlayerSlot::One.other(), PlayerSlot::Two);
        assert_eq!(PlayerSlot::Two.other().other(), PlayerSlot::Two);
    }

    #[test]
    fn display_matches_wire_prefix() {
        assert_eq!(PlayerSlot::Two.to_string(), "Player 2");
    }
}
