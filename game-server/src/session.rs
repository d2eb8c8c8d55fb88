//! The single shared game session. It owns the board, the slot occupancy and the turn bookkeeping.
//!
//! The session itself is plain state. The server keeps it behind one `tokio::sync::Mutex` in
//! [`crate::server_state::ServerState`], so every method here runs as one critical section:
//! a move places the mark, checks win before draw and resets the session without anybody else
//! observing the intermediate board.

use crate::ConnectionId;
use crate::board::Board;
use protocol::PlayerSlot;
use serde::{Deserialize, Serialize};

/// Who decides whether a move is in turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPolicy {
    /// The server tracks the player to move and rejects out of turn moves and moves for a slot
    /// the requesting connection does not hold.
    #[default]
    ServerAuthoritative,
    /// Only cell occupancy is checked. Turn order is left to the clients.
    ClientTrust,
}

/// Result of a join request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotAssignment {
    /// The caller got a slot. `session_full` is set if this join occupied the last free slot.
    Joined { slot: PlayerSlot, session_full: bool },
    /// The caller already holds this slot in the running round.
    AlreadySeated(PlayerSlot),
    /// Both slots are taken.
    SlotsFull,
}

/// Why a move was refused. Only logged, the wire just says the press failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveRejection {
    OutOfRange,
    Occupied,
    OutOfTurn,
    /// The requesting connection does not hold the slot named in the move.
    NotSeated,
    /// The opponent has not joined yet.
    WaitingForOpponent,
}

/// Result of a move. Won and drawn rounds have already been reset when this is returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    Accepted,
    AcceptedAndWon,
    AcceptedAndDrawn,
    Rejected(MoveRejection),
}

impl MoveOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, MoveOutcome::Rejected(_))
    }
}

/// Result of a voluntary exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The session was reset and everybody has to be told.
    Honored,
    /// A bystander tried to end a session it does not take part in.
    Ignored,
}

/// Occupancy of one slot for the status report.
#[derive(Clone, Debug, Serialize)]
pub struct SlotSnapshot {
    pub slot: PlayerSlot,
    pub connection: Option<ConnectionId>,
}

/// A copy of the session state for operators.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub round: u64,
    pub turn_policy: TurnPolicy,
    pub slots: Vec<SlotSnapshot>,
    pub next_to_move: PlayerSlot,
    pub marks: usize,
    pub board: Vec<String>,
}

/// The game session. Created once at server start and only ever soft reset.
#[derive(Debug)]
pub struct GameSession {
    board: Board,
    slots: [Option<ConnectionId>; 2],
    next_to_move: PlayerSlot,
    round: u64,
    policy: TurnPolicy,
}

impl GameSession {
    pub fn new(policy: TurnPolicy) -> GameSession {
        GameSession {
            board: Board::new(),
            slots: [None; 2],
            next_to_move: PlayerSlot::One,
            round: 0,
            policy,
        }
    }

    /// Assigns the first free slot to the connection.
    pub fn try_join(&mut self, connection: ConnectionId) -> SlotAssignment {
        if let Some(slot) = self.slot_of(connection) {
            return SlotAssignment::AlreadySeated(slot);
        }
        let Some(slot) = PlayerSlot::ALL
            .into_iter()
            .find(|slot| self.slots[slot.index()].is_none())
        else {
            return SlotAssignment::SlotsFull;
        };
        self.slots[slot.index()] = Some(connection);
        SlotAssignment::Joined {
            slot,
            session_full: self.both_seated(),
        }
    }

    /// Places a mark for the slot. On a win or a draw the session is reset before returning.
    /// Win is checked before draw, a full board with a line is a win.
    pub fn attempt_move(&mut self, slot: PlayerSlot, row: i32, col: i32) -> MoveOutcome {
        if self.policy == TurnPolicy::ServerAuthoritative && slot != self.next_to_move {
            return MoveOutcome::Rejected(MoveRejection::OutOfTurn);
        }
        if self.board.cell(row, col).is_none() {
            return MoveOutcome::Rejected(MoveRejection::OutOfRange);
        }
        if !self.board.place(row, col, slot) {
            return MoveOutcome::Rejected(MoveRejection::Occupied);
        }
        self.next_to_move = slot.other();

        if self.board.winner(slot) {
            self.restart();
            return MoveOutcome::AcceptedAndWon;
        }
        if self.board.is_full() {
            self.restart();
            return MoveOutcome::AcceptedAndDrawn;
        }
        MoveOutcome::Accepted
    }

    /// A move requested by a connection. Under [`TurnPolicy::ServerAuthoritative`] the connection
    /// has to hold the slot it moves for and the opponent has to be seated.
    pub fn play(
        &mut self,
        connection: ConnectionId,
        slot: PlayerSlot,
        row: i32,
        col: i32,
    ) -> MoveOutcome {
        if self.policy == TurnPolicy::ServerAuthoritative {
            if self.slots[slot.index()] != Some(connection) {
                return MoveOutcome::Rejected(MoveRejection::NotSeated);
            }
            if !self.both_seated() {
                return MoveOutcome::Rejected(MoveRejection::WaitingForOpponent);
            }
        }
        self.attempt_move(slot, row, col)
    }

    /// Voluntary exit. Players may always end the session, other connections only while nobody
    /// is seated, so a stale exit cannot tear down a running lobby.
    pub fn exit(&mut self, connection: ConnectionId) -> ExitOutcome {
        if self.slot_of(connection).is_some() || self.occupied() == 0 {
            self.restart();
            ExitOutcome::Honored
        } else {
            ExitOutcome::Ignored
        }
    }

    /// Frees the slot of a departing connection. The board stays as it is.
    pub fn release(&mut self, connection: ConnectionId) -> Option<PlayerSlot> {
        let slot = self.slot_of(connection)?;
        self.slots[slot.index()] = None;
        Some(slot)
    }

    /// Clears the board and the slot occupancy and starts a new round.
    pub fn restart(&mut self) {
        self.board.reset();
        self.slots = [None; 2];
        self.next_to_move = PlayerSlot::One;
        self.round += 1;
    }

    pub fn slot_of(&self, connection: ConnectionId) -> Option<PlayerSlot> {
        PlayerSlot::ALL
            .into_iter()
            .find(|slot| self.slots[slot.index()] == Some(connection))
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn both_seated(&self) -> bool {
        self.occupied() == self.slots.len()
    }

    /// Grows with every restart. Lets coordinators notice that their round ended elsewhere.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn next_to_move(&self) -> PlayerSlot {
        self.next_to_move
    }

    pub fn policy(&self) -> TurnPolicy {
        self.policy
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            round: self.round,
            turn_policy: self.policy,
            slots: PlayerSlot::ALL
                .into_iter()
                .map(|slot| SlotSnapshot {
                    slot,
                    connection: self.slots[slot.index()],
                })
                .collect(),
            next_to_move: self.next_to_move,
            marks: self.board.mark_count(),
            board: self.board.to_string().lines().map(str::to_owned).collect(),
        }
    }
}
