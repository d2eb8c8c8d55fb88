//! The protocol side of the client. It turns server lines into view changes and user actions into
//! request lines, without knowing anything about how the view is drawn.

use protocol::{PlayerSlot, Request, Response};
use std::fmt::{self, Display, Formatter};

/// How a finished round went for this client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundResult {
    Won,
    Lost,
    Draw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientPhase {
    /// No slot yet. A join may be pending.
    Lobby,
    /// Seated as player 1, the opponent has not joined yet.
    Waiting,
    Playing,
    /// The round is over and the play again question is open.
    RoundOver(RoundResult),
    /// The server turned the join away.
    Rejected,
    Ended,
}

/// A line of text for the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prompt {
    WaitingForOpponentToJoin,
    OpponentJoinedYourTurn,
    WaitingForOpponentMove,
    MoveAccepted,
    OpponentMoved,
    InvalidMove,
    RoundOver(RoundResult),
    PlayersFull,
    OpponentLeft,
}

impl Display for Prompt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            Prompt::WaitingForOpponentToJoin => "You play X. Waiting for an opponent to join.",
            Prompt::OpponentJoinedYourTurn => "Player 2 has joined. Your turn to move",
            Prompt::WaitingForOpponentMove => "Waiting for your opponent to move",
            Prompt::MoveAccepted => "Valid move, wait for your opponent.",
            Prompt::OpponentMoved => "Your opponent has moved, now is your turn.",
            Prompt::InvalidMove => "Invalid move. Please try again.",
            Prompt::RoundOver(RoundResult::Won) => {
                "Congratulations. You win. Do you want to play again?"
            }
            Prompt::RoundOver(RoundResult::Lost) => "You lose. Do you want to play again?",
            Prompt::RoundOver(RoundResult::Draw) => "Draw. Do you want to play again?",
            Prompt::PlayersFull => {
                "The game is currently in progress, and all player slots are currently occupied. \
                 Please try again later."
            }
            Prompt::OpponentLeft => "Game Ends. One of the players left.",
        };
        f.write_str(text)
    }
}

/// What changed after a server line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewUpdate {
    pub prompt: Option<Prompt>,
    /// The marks changed and the board should be drawn again.
    pub redraw: bool,
}

impl ViewUpdate {
    fn prompt(prompt: Prompt) -> ViewUpdate {
        ViewUpdate {
            prompt: Some(prompt),
            redraw: false,
        }
    }
}

pub struct ClientProtocolAdapter {
    slot: Option<PlayerSlot>,
    /// Set while our own join request is unanswered. Join notices only assign a slot then.
    pending_join: bool,
    to_move: PlayerSlot,
    input_enabled: bool,
    marks: [[Option<PlayerSlot>; 3]; 3],
    phase: ClientPhase,
    name: Option<String>,
}

impl Default for ClientProtocolAdapter {
    fn default() -> Self {
        ClientProtocolAdapter::new()
    }
}

impl ClientProtocolAdapter {
    pub fn new() -> ClientProtocolAdapter {
        ClientProtocolAdapter {
            slot: None,
            pending_join: false,
            to_move: PlayerSlot::One,
            input_enabled: false,
            marks: [[None; 3]; 3],
            phase: ClientPhase::Lobby,
            name: None,
        }
    }

    pub fn slot(&self) -> Option<PlayerSlot> {
        self.slot
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Whose move the client believes it is.
    pub fn to_move(&self) -> PlayerSlot {
        self.to_move
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn marks(&self) -> &[[Option<PlayerSlot>; 3]; 3] {
        &self.marks
    }

    /// Nothing more will happen on this connection.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, ClientPhase::Rejected | ClientPhase::Ended)
    }

    /// Decodes and applies one server line. Lines that do not decode are skipped.
    pub fn apply_line(&mut self, line: &str) -> Option<ViewUpdate> {
        match Response::decode(line) {
            Ok(response) => Some(self.apply(response)),
            Err(error) => {
                tracing::warn!(%error, "Ignoring server line.");
                None
            }
        }
    }

    pub fn apply(&mut self, response: Response) -> ViewUpdate {
        match response {
            Response::SlotJoined(joined) => self.on_joined(joined),
            Response::SlotsFull => {
                self.pending_join = false;
                self.input_enabled = false;
                self.phase = ClientPhase::Rejected;
                ViewUpdate::prompt(Prompt::PlayersFull)
            }
            Response::MoveAccepted { slot, row, col } => self.on_move(slot, row, col),
            Response::MoveRejected(rejected) => {
                if self.slot == Some(rejected) {
                    ViewUpdate::prompt(Prompt::InvalidMove)
                } else {
                    ViewUpdate::default()
                }
            }
            Response::Win(winner) => {
                let result = if self.slot == Some(winner) {
                    RoundResult::Won
                } else {
                    RoundResult::Lost
                };
                self.on_round_over(result)
            }
            Response::Draw => self.on_round_over(RoundResult::Draw),
            Response::PlayerExited => {
                self.slot = None;
                self.pending_join = false;
                self.input_enabled = false;
                self.phase = ClientPhase::Ended;
                ViewUpdate::prompt(Prompt::OpponentLeft)
            }
        }
    }

    fn on_joined(&mut self, joined: PlayerSlot) -> ViewUpdate {
        if self.slot.is_none() && self.pending_join {
            self.pending_join = false;
            self.slot = Some(joined);
            self.marks = [[None; 3]; 3];
            self.to_move = PlayerSlot::One;
            self.input_enabled = false;
            return match joined {
                PlayerSlot::One => {
                    self.phase = ClientPhase::Waiting;
                    ViewUpdate {
                        prompt: Some(Prompt::WaitingForOpponentToJoin),
                        redraw: true,
                    }
                }
                PlayerSlot::Two => {
                    self.phase = ClientPhase::Playing;
                    ViewUpdate {
                        prompt: Some(Prompt::WaitingForOpponentMove),
                        redraw: true,
                    }
                }
            };
        }
        if self.phase == ClientPhase::Waiting
            && self.slot == Some(PlayerSlot::One)
            && joined == PlayerSlot::Two
        {
            self.phase = ClientPhase::Playing;
            self.input_enabled = self.to_move == PlayerSlot::One;
            return ViewUpdate::prompt(Prompt::OpponentJoinedYourTurn);
        }
        // A notice for somebody else, or a repeat of our own seat.
        ViewUpdate::default()
    }

    fn on_move(&mut self, moved: PlayerSlot, row: i32, col: i32) -> ViewUpdate {
        let Some(cell) = cell_mut(&mut self.marks, row, col) else {
            tracing::warn!(row, col, "Server confirmed a move outside the board.");
            return ViewUpdate::default();
        };
        *cell = Some(moved);
        self.to_move = moved.other();

        let prompt = match self.slot {
            Some(mine) if mine == moved => {
                self.input_enabled = false;
                Some(Prompt::MoveAccepted)
            }
            Some(_) => {
                self.input_enabled = true;
                Some(Prompt::OpponentMoved)
            }
            None => None,
        };
        ViewUpdate {
            prompt,
            redraw: true,
        }
    }

    fn on_round_over(&mut self, result: RoundResult) -> ViewUpdate {
        self.input_enabled = false;
        if self.slot.is_none() {
            // Not our round. The server already cleared its board.
            self.marks = [[None; 3]; 3];
            return ViewUpdate {
                prompt: None,
                redraw: true,
            };
        }
        self.phase = ClientPhase::RoundOver(result);
        ViewUpdate::prompt(Prompt::RoundOver(result))
    }

    /// The name is only kept locally, the server never sees it.
    pub fn submit_name(&mut self, name: &str) -> Option<Request> {
        let name = name.trim();
        if name.is_empty() || self.phase != ClientPhase::Lobby || self.pending_join {
            return None;
        }
        self.name = Some(name.to_owned());
        self.pending_join = true;
        Some(Request::NameSubmitted)
    }

    pub fn press(&mut self, row: i32, col: i32) -> Option<Request> {
        if !self.input_enabled {
            return None;
        }
        let slot = self.slot?;
        Some(Request::MovePressed { slot, row, col })
    }

    /// Answers the play again question of a finished round.
    pub fn answer_replay(&mut self, play_again: bool) -> Option<Request> {
        if !matches!(self.phase, ClientPhase::RoundOver(_)) {
            return None;
        }
        self.slot = None;
        self.input_enabled = false;
        if play_again {
            self.marks = [[None; 3]; 3];
            self.phase = ClientPhase::Lobby;
            self.pending_join = true;
            Some(Request::PlayAgain)
        } else {
            self.phase = ClientPhase::Ended;
            Some(Request::Leave)
        }
    }

    /// Ends the session for everybody. Only offered once a name was entered.
    pub fn exit(&mut self) -> Option<Request> {
        if self.name.is_none() || self.is_finished() {
            return None;
        }
        Some(Request::Exit)
    }
}

fn cell_mut(
    marks: &mut [[Option<PlayerSlot>; 3]; 3],
    row: i32,
    col: i32,
) -> Option<&mut Option<PlayerSlot>> {
    let row = usize::try_from(row).ok()?;
    let col = usize::try_from(col).ok()?;
    marks.get_mut(row)?.get_mut(col)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::PlayerSlot::{One, Two};

    fn seated(slot: PlayerSlot) -> ClientProtocolAdapter {
        let mut adapter = ClientProtocolAdapter::new();
        assert_eq!(adapter.submit_name("Ada"), Some(Request::NameSubmitted));
        adapter.apply(Response::SlotJoined(slot));
        adapter
    }

    #[test]
    fn first_player_waits_then_moves() {
        let mut adapter = seated(One);
        assert_eq!(adapter.slot(), Some(One));
        assert_eq!(adapter.phase(), ClientPhase::Waiting);
        assert!(!adapter.input_enabled());
        assert_eq!(adapter.press(0, 0), None);

        let update = adapter.apply(Response::SlotJoined(Two));
        assert_eq!(update.prompt, Some(Prompt::OpponentJoinedYourTurn));
        assert_eq!(adapter.phase(), ClientPhase::Playing);
        assert!(adapter.input_enabled());
        assert_eq!(
            adapter.press(1, 2),
            Some(Request::MovePressed {
                slot: One,
                row: 1,
                col: 2
            })
        );
    }

    #[test]
    fn second_player_starts_disabled() {
        let mut adapter = seated(Two);
        assert_eq!(adapter.phase(), ClientPhase::Playing);
        assert!(!adapter.input_enabled());

        let update = adapter.apply(Response::MoveAccepted {
            slot: One,
            row: 0,
            col: 0,
        });
        assert_eq!(update.prompt, Some(Prompt::OpponentMoved));
        assert!(update.redraw);
        assert!(adapter.input_enabled());
        assert_eq!(adapter.to_move(), Two);
        assert_eq!(adapter.marks()[0][0], Some(One));
    }

    #[test]
    fn own_move_disables_input() {
        let mut adapter = seated(One);
        adapter.apply(Response::SlotJoined(Two));
        let update = adapter.apply(Response::MoveAccepted {
            slot: One,
            row: 2,
            col: 1,
        });
        assert_eq!(update.prompt, Some(Prompt::MoveAccepted));
        assert!(!adapter.input_enabled());
        assert_eq!(adapter.to_move(), Two);
    }

    #[test]
    fn rejection_keeps_input_state() {
        let mut adapter = seated(One);
        adapter.apply(Response::SlotJoined(Two));
        let update = adapter.apply(Response::MoveRejected(One));
        assert_eq!(update.prompt, Some(Prompt::InvalidMove));
        assert!(adapter.input_enabled());

        assert_eq!(adapter.apply(Response::MoveRejected(Two)), ViewUpdate::default());
    }

    #[test]
    fn bystander_ignores_join_notices() {
        let mut adapter = ClientProtocolAdapter::new();
        assert_eq!(adapter.apply(Response::SlotJoined(Two)), ViewUpdate::default());
        assert_eq!(adapter.slot(), None);
        assert_eq!(adapter.phase(), ClientPhase::Lobby);

        // Moves still show up on the board.
        let update = adapter.apply(Response::MoveAccepted {
            slot: Two,
            row: 1,
            col: 1,
        });
        assert_eq!(update.prompt, None);
        assert_eq!(adapter.marks()[1][1], Some(Two));
        assert_eq!(adapter.press(0, 0), None);
    }

    #[test]
    fn round_over_asks_for_replay() {
        let mut winner = seated(One);
        winner.apply(Response::SlotJoined(Two));
        let update = winner.apply(Response::Win(One));
        assert_eq!(update.prompt, Some(Prompt::RoundOver(RoundResult::Won)));
        assert!(!winner.input_enabled());
        assert_eq!(winner.answer_replay(true), Some(Request::PlayAgain));
        assert_eq!(winner.phase(), ClientPhase::Lobby);
        assert_eq!(winner.slot(), None);

        // The replay joins like a first join.
        winner.apply(Response::SlotJoined(Two));
        assert_eq!(winner.slot(), Some(Two));

        let mut loser = seated(Two);
        loser.apply(Response::Win(One));
        assert_eq!(loser.phase(), ClientPhase::RoundOver(RoundResult::Lost));
        assert_eq!(loser.answer_replay(false), Some(Request::Leave));
        assert!(loser.is_finished());

        let mut drawn = seated(Two);
        drawn.apply(Response::Draw);
        assert_eq!(drawn.phase(), ClientPhase::RoundOver(RoundResult::Draw));
    }

    #[test]
    fn join_notices_after_the_round_keep_the_replay_question() {
        let mut adapter = seated(One);
        adapter.apply(Response::SlotJoined(Two));
        adapter.apply(Response::Win(Two));
        assert_eq!(adapter.phase(), ClientPhase::RoundOver(RoundResult::Lost));

        // Somebody else completes the next session before we answer.
        assert_eq!(adapter.apply(Response::SlotJoined(Two)), ViewUpdate::default());
        assert_eq!(adapter.phase(), ClientPhase::RoundOver(RoundResult::Lost));
        assert!(!adapter.input_enabled());
        assert_eq!(adapter.press(0, 0), None);
        assert_eq!(adapter.answer_replay(true), Some(Request::PlayAgain));
    }

    #[test]
    fn replay_answer_needs_a_finished_round() {
        let mut adapter = seated(One);
        assert_eq!(adapter.answer_replay(true), None);
    }

    #[test]
    fn slots_full_and_exit_end_the_client() {
        let mut adapter = ClientProtocolAdapter::new();
        adapter.submit_name("Bob");
        let update = adapter.apply(Response::SlotsFull);
        assert_eq!(update.prompt, Some(Prompt::PlayersFull));
        assert_eq!(adapter.phase(), ClientPhase::Rejected);
        assert!(adapter.is_finished());

        let mut adapter = seated(Two);
        adapter.apply(Response::PlayerExited);
        assert_eq!(adapter.phase(), ClientPhase::Ended);
        assert_eq!(adapter.slot(), None);
    }

    #[test]
    fn actions_check_their_preconditions() {
        let mut adapter = ClientProtocolAdapter::new();
        assert_eq!(adapter.exit(), None);
        assert_eq!(adapter.submit_name("   "), None);
        assert_eq!(adapter.submit_name(" Cleo "), Some(Request::NameSubmitted));
        assert_eq!(adapter.name(), Some("Cleo"));
        // Only one join in flight.
        assert_eq!(adapter.submit_name("Cleo"), None);
        assert_eq!(adapter.exit(), Some(Request::Exit));
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let mut adapter = ClientProtocolAdapter::new();
        assert_eq!(adapter.apply_line("Player 3 wins"), None);
        assert_eq!(adapter.apply_line("hello"), None);
        assert!(adapter.apply_line("Draw").is_some());
    }
}
