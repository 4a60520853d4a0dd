//! Square numbering bridge
//!
//! The game document numbers the 32 playable dark squares 1..32, row-major
//! from the top-left dark square of the red side. Board engines work in
//! (row, col) coordinates on the full 8x8 grid. Even rows hold their dark
//! squares on odd columns, odd rows on even columns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of playable squares on a checkers board
pub const SQUARE_COUNT: i32 = 32;

/// Board edge length
pub const BOARD_SIZE: i32 = 8;

/// Returned by [`square_of`] for coordinates that are not a playable square
pub const INVALID_SQUARE: i32 = -1;

const SQUARES_PER_ROW: i32 = BOARD_SIZE / 2;

/// A (row, col) position on the 8x8 board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub row: i32,
    pub col: i32,
}

impl Coordinate {
    /// Sentinel for square numbers outside 1..32
    pub const INVALID: Coordinate = Coordinate { row: -1, col: -1 };

    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Coordinate of a square number; `Coordinate::INVALID` outside 1..32
pub fn coordinate_of(square: i32) -> Coordinate {
    if !(1..=SQUARE_COUNT).contains(&square) {
        return Coordinate::INVALID;
    }

    let index = square - 1;
    let row = index / SQUARES_PER_ROW;
    let offset = if row % 2 == 0 { 1 } else { 0 };
    let col = (index % SQUARES_PER_ROW) * 2 + offset;

    Coordinate::new(row, col)
}

/// Square number of a coordinate; `INVALID_SQUARE` for off-board or light squares
pub fn square_of(coordinate: Coordinate) -> i32 {
    let Coordinate { row, col } = coordinate;

    if !(0..BOARD_SIZE).contains(&row) || !(0..BOARD_SIZE).contains(&col) {
        return INVALID_SQUARE;
    }
    if (row + col) % 2 == 0 {
        return INVALID_SQUARE;
    }

    row * SQUARES_PER_ROW + col / 2 + 1
}
