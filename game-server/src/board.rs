//! The 3x3 board with win and draw evaluation. Pure state, no locking.

use protocol::PlayerSlot;
use std::fmt;

/// The side length of the board.
pub const BOARD_SIZE: usize = 3;

/// All eight lines that win a round: three rows, three columns, two diagonals.
const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// One field of the board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Cell {
    #[default]
    Empty,
    Mark(PlayerSlot),
}

/// The game board. Cells only change through [`Board::place`] and [`Board::reset`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Board {
    cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    pub fn new() -> Board {
        Board::default()
    }

    /// Marks the cell for the slot if the position is on the board and the cell is empty.
    /// Returns false without touching the board otherwise.
    pub fn place(&mut self, row: i32, col: i32, slot: PlayerSlot) -> bool {
        let Some((row, col)) = to_index(row, col) else {
            return false;
        };
        let cell = &mut self.cells[row][col];
        if *cell != Cell::Empty {
            return false;
        }
        *cell = Cell::Mark(slot);
        true
    }

    /// Does the slot own a complete row, column or diagonal?
    pub fn winner(&self, slot: PlayerSlot) -> bool {
        let mark = Cell::Mark(slot);
        LINES
            .iter()
            .any(|line| line.iter().all(|&(row, col)| self.cells[row][col] == mark))
    }

    /// True if no empty cell remains.
    pub fn is_full(&self) -> bool {
        self.cells.iter().flatten().all(|cell| *cell != Cell::Empty)
    }

    pub fn reset(&mut self) {
        self.cells = Default::default();
    }

    /// The cell at the position, `None` for positions off the board.
    pub fn cell(&self, row: i32, col: i32) -> Option<Cell> {
        to_index(row, col).map(|(row, col)| self.cells[row][col])
    }

    /// Number of placed marks.
    pub fn mark_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|cell| **cell != Cell::Empty)
            .count()
    }
}

fn to_index(row: i32, col: i32) -> Option<(usize, usize)> {
    let row = usize::try_from(row).ok().filter(|r| *r < BOARD_SIZE)?;
    let col = usize::try_from(col).ok().filter(|c| *c < BOARD_SIZE)?;
    Some((row, col))
}

/// Three lines of `X`, `O` and `.`.
impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, row) in self.cells.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            for cell in row {
                let symbol = match cell {
                    Cell::Empty => '.',
                    Cell::Mark(slot) => slot.symbol(),
                };
                write!(f, "{symbol}")?;
            }
        }
        Ok(())
    }
}
