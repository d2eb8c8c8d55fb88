//! Text rendering of the board and parsing of the typed commands.

use protocol::PlayerSlot;
use std::fmt::Write;

pub const HELP: &str = "Commands:\n  name <your name>   join the game\n  <row> <col>        place your mark, e.g. `1 2`\n  yes / no           answer the play again question\n  exit               end the game for everybody";

/// One line typed by the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Name(String),
    Press { row: i32, col: i32 },
    Answer(bool),
    Exit,
    Help,
}

/// Returns `None` for anything that is not a command.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    match first.to_ascii_lowercase().as_str() {
        "name" => {
            let name = line[first.len()..].trim();
            (!name.is_empty()).then(|| Command::Name(name.to_owned()))
        }
        "yes" | "y" if tokens.next().is_none() => Some(Command::Answer(true)),
        "no" | "n" if tokens.next().is_none() => Some(Command::Answer(false)),
        "exit" | "quit" if tokens.next().is_none() => Some(Command::Exit),
        "help" | "?" => Some(Command::Help),
        _ => {
            let row = first.parse().ok()?;
            let col = tokens.next()?.parse().ok()?;
            if tokens.next().is_some() {
                return None;
            }
            Some(Command::Press { row, col })
        }
    }
}

/// Draws the marks with row and column numbers, X for player 1 and O for player 2.
pub fn render_board(marks: &[[Option<PlayerSlot>; 3]; 3]) -> String {
    let mut text = String::from("    0   1   2\n");
    for (row, cells) in marks.iter().enumerate() {
        if row > 0 {
            text.push_str("   ---+---+---\n");
        }
        let _ = write!(text, "{row} ");
        for (col, cell) in cells.iter().enumerate() {
            let symbol = cell.map_or(' ', PlayerSlot::symbol);
            let separator = if col < 2 { "|" } else { "\n" };
            let _ = write!(text, " {symbol} {separator}");
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("name  Ada Lovelace "),
            Some(Command::Name("Ada Lovelace".to_owned()))
        );
        assert_eq!(parse_command("1 2"), Some(Command::Press { row: 1, col: 2 }));
        assert_eq!(parse_command("YES"), Some(Command::Answer(true)));
        assert_eq!(parse_command("n"), Some(Command::Answer(false)));
        assert_eq!(parse_command("exit"), Some(Command::Exit));
        assert_eq!(parse_command("?"), Some(Command::Help));
    }

    #[test]
    fn rejects_noise() {
        for line in ["", "name", "1", "1 2 3", "a b", "yes please", "exit now"] {
            assert_eq!(parse_command(line), None, "{line:?}");
        }
    }

    #[test]
    fn renders_marks() {
        let mut marks = [[None; 3]; 3];
        marks[0][0] = Some(PlayerSlot::One);
        marks[2][1] = Some(PlayerSlot::Two);
        let board = render_board(&marks);
        let lines: Vec<&str> = board.lines().collect();
        assert_eq!(lines[0], "    0   1   2");
        assert_eq!(lines[1], "0  X |   |   ");
        assert_eq!(lines[5], "2    | O |   ");
        assert_eq!(lines.len(), 6);
    }
}
