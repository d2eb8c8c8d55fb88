//! Encoding and decoding of the line based message vocabulary.
//!
//! Every message is one line of space separated tokens. Decoding splits a line on single spaces
//! and matches the tokens against the literal templates, so a line either yields exactly one
//! message or a [`ProtocolError`]. Encoding is the [`fmt::Display`] implementation and never
//! contains the trailing newline.
//!
//! ```text
//! Client -> Server                                    Server -> Client
//! Name Submitted                                      Player <N> joined successfully
//! Player wants to play again                          Players are full
//! Player <N> pressed the Button at row <r> and col <c>
//!                                                     Player <N> successfully pressed the Button at row <r> and col <c>
//!                                                     Player <N> failed to press the Button
//! Player Exits                                        Player <N> wins / Draw
//! Player wants to exit                                Player Exits
//! ```

use crate::PlayerSlot;
use std::fmt;
use thiserror::Error;

/// A line that could not be turned into a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The tokens do not match any known template.
    #[error("malformed protocol line: {line:?}")]
    Malformed { line: String },
    /// The player number is neither 1 nor 2.
    #[error("invalid player number {value:?}")]
    InvalidSlot { value: String },
    /// A row or column field is not a decimal integer.
    #[error("invalid number {token:?}")]
    InvalidNumber { token: String },
}

/// Requests a client sends to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Join request, sent once the player entered a name.
    NameSubmitted,
    /// Rejoin after a finished round.
    PlayAgain,
    /// A move. Row and column are not range checked here, the board rejects bad positions.
    MovePressed {
        slot: PlayerSlot,
        row: i32,
        col: i32,
    },
    /// Voluntary exit at any time.
    Exit,
    /// Declines the replay after a finished round.
    Leave,
}

/// Responses the server sends to one or all clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Slot assignment. Broadcast when it completes the session.
    SlotJoined(PlayerSlot),
    /// Third join rejection.
    SlotsFull,
    MoveAccepted {
        slot: PlayerSlot,
        row: i32,
        col: i32,
    },
    /// Sent to the requester only.
    MoveRejected(PlayerSlot),
    Win(PlayerSlot),
    Draw,
    PlayerExited,
}

impl Request {
    /// Decodes one inbound line (without its newline).
    pub fn decode(line: &str) -> Result<Request, ProtocolError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let tokens: Vec<&str> = line.split(' ').collect();
        match tokens.as_slice() {
            ["Name", "Submitted"] => Ok(Request::NameSubmitted),
            ["Player", "wants", "to", "play", "again"] => Ok(Request::PlayAgain),
            ["Player", "Exits"] => Ok(Request::Exit),
            ["Player", "wants", "to", "exit"] => Ok(Request::Leave),
            ["Player", slot, "pressed", "the", "Button", "at", "row", row, "and", "col", col] => {
                Ok(Request::MovePressed {
                    slot: parse_slot(slot)?,
                    row: parse_number(row)?,
                    col: parse_number(col)?,
                })
            }
            _ => Err(malformed(line)),
        }
    }
}

impl Response {
    /// Decodes one line received from the server.
    pub fn decode(line: &str) -> Result<Response, ProtocolError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let tokens: Vec<&str> = line.split(' ').collect();
        match tokens.as_slice() {
            ["Player", slot, "joined", "successfully"] => Ok(Response::SlotJoined(parse_slot(slot)?)),
            ["Players", "are", "full"] => Ok(Response::SlotsFull),
            [
                "Player",
                slot,
                "successfully",
                "pressed",
                "the",
                "Button",
                "at",
                "row",
                row,
                "and",
                "col",
                col,
            ] => Ok(Response::MoveAccepted {
                slot: parse_slot(slot)?,
                row: parse_number(row)?,
                col: parse_number(col)?,
            }),
            ["Player", slot, "failed", "to", "press", "the", "Button"] => {
                Ok(Response::MoveRejected(parse_slot(slot)?))
            }
            ["Player", slot, "wins"] => Ok(Response::Win(parse_slot(slot)?)),
            ["Draw"] => Ok(Response::Draw),
            ["Player", "Exits"] => Ok(Response::PlayerExited),
            _ => Err(malformed(line)),
        }
    }

    /// Win and draw end a round.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Response::Win(_) | Response::Draw)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::NameSubmitted => f.write_str("Name Submitted"),
            Request::PlayAgain => f.write_str("Player wants to play again"),
            Request::MovePressed { slot, row, col } => {
                write!(f, "{slot} pressed the Button at row {row} and col {col}")
            }
            Request::Exit => f.write_str("Player Exits"),
            Request::Leave => f.write_str("Player wants to exit"),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::SlotJoined(slot) => write!(f, "{slot} joined successfully"),
            Response::SlotsFull => f.write_str("Players are full"),
            Response::MoveAccepted { slot, row, col } => {
                write!(f, "{slot} successfully pressed the Button at row {row} and col {col}")
            }
            Response::MoveRejected(slot) => write!(f, "{slot} failed to press the Button"),
            Response::Win(slot) => write!(f, "{slot} wins"),
            Response::Draw => f.write_str("Draw"),
            Response::PlayerExited => f.write_str("Player Exits"),
        }
    }
}

fn malformed(line: &str) -> ProtocolError {
    ProtocolError::Malformed {
        line: line.to_owned(),
    }
}

fn parse_slot(token: &str) -> Result<PlayerSlot, ProtocolError> {
    token
        .parse::<u8>()
        .ok()
        .filter(|_| token.bytes().all(|b| b.is_ascii_digit()))
        .and_then(PlayerSlot::from_number)
        .ok_or_else(|| ProtocolError::InvalidSlot {
            value: token.to_owned(),
        })
}

/// Optional minus sign followed by ASCII digits. `str::parse` alone would also take a plus sign.
fn parse_number(token: &str) -> Result<i32, ProtocolError> {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidNumber {
            token: token.to_owned(),
        });
    }
    token.parse::<i32>().map_err(|_| ProtocolError::InvalidNumber {
        token: token.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_accepted_survives_the_wire() {
        let sent = Response::MoveAccepted {
            slot: PlayerSlot::One,
            row: 2,
            col: 0,
        };
        let line = sent.to_string();
        assert_eq!(line, "Player 1 successfully pressed the Button at row 2 and col 0");
        assert_eq!(Response::decode(&line), Ok(sent));
    }

    #[test]
    fn decodes_every_request_line() {
        assert_eq!(Request::decode("Name Submitted"), Ok(Request::NameSubmitted));
        assert_eq!(
            Request::decode("Player wants to play again"),
            Ok(Request::PlayAgain)
        );
        assert_eq!(Request::decode("Player Exits"), Ok(Request::Exit));
        assert_eq!(Request::decode("Player wants to exit"), Ok(Request::Leave));
        assert_eq!(
            Request::decode("Player 2 pressed the Button at row 1 and col 2"),
            Ok(Request::MovePressed {
                slot: PlayerSlot::Two,
                row: 1,
                col: 2
            })
        );
    }

    #[test]
    fn decodes_every_response_line() {
        let cases = [
            ("Player 1 joined successfully", Response::SlotJoined(PlayerSlot::One)),
            ("Players are full", Response::SlotsFull),
            (
                "Player 2 failed to press the Button",
                Response::MoveRejected(PlayerSlot::Two),
            ),
            ("Player 2 wins", Response::Win(PlayerSlot::Two)),
            ("Draw", Response::Draw),
            ("Player Exits", Response::PlayerExited),
        ];
        for (line, expected) in cases {
            assert_eq!(Response::decode(line), Ok(expected), "{line}");
            assert_eq!(expected.to_string(), line);
        }
    }

    #[test]
    fn request_encoding_uses_literal_wire_text() {
        let request = Request::MovePressed {
            slot: PlayerSlot::One,
            row: 0,
            col: 2,
        };
        assert_eq!(
            request.to_string(),
            "Player 1 pressed the Button at row 0 and col 2"
        );
        assert_eq!(Request::Leave.to_string(), "Player wants to exit");
    }

    #[test]
    fn tolerates_a_trailing_carriage_return() {
        assert_eq!(Request::decode("Name Submitted\r"), Ok(Request::NameSubmitted));
    }

    #[test]
    fn rejects_lines_outside_the_grammar() {
        for line in [
            "",
            "Name  Submitted",
            "Name Submitted now",
            " Name Submitted",
            "name submitted",
            "Player 1 pressed the Button at row 1",
            "Player 1 pressed the Button at row 1 and col 1 please",
        ] {
            assert!(
                matches!(Request::decode(line), Err(ProtocolError::Malformed { .. })),
                "{line:?}"
            );
        }
    }

    #[test]
    fn reports_bad_fields() {
        assert_eq!(
            Request::decode("Player 3 pressed the Button at row 1 and col 1"),
            Err(ProtocolError::InvalidSlot {
                value: "3".to_owned()
            })
        );
        assert_eq!(
            Request::decode("Player +1 pressed the Button at row 1 and col 1"),
            Err(ProtocolError::InvalidSlot {
                value: "+1".to_owned()
            })
        );
        assert_eq!(
            Request::decode("Player 1 pressed the Button at row x and col 1"),
            Err(ProtocolError::InvalidNumber {
                token: "x".to_owned()
            })
        );
        assert_eq!(
            Request::decode("Player 1 pressed the Button at row +1 and col 1"),
            Err(ProtocolError::InvalidNumber {
                token: "+1".to_owned()
            })
        );
        assert!(matches!(
            Request::decode("Player 1 pressed the Button at row 99999999999 and col 1"),
            Err(ProtocolError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn out_of_range_positions_still_decode() {
        assert_eq!(
            Request::decode("Player 1 pressed the Button at row -1 and col 7"),
            Ok(Request::MovePressed {
                slot: PlayerSlot::One,
                row: -1,
                col: 7
            })
        );
    }

    #[test]
    fn terminal_responses() {
        assert!(Response::Draw.is_terminal());
        assert!(Response::Win(PlayerSlot::One).is_terminal());
        assert!(!Response::PlayerExited.is_terminal());
    }
}
