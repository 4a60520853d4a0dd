//! Game document model
//!
//! One fetched revision of the shared `game:checkers` document. Only the
//! fields the bot reads are modelled; everything else on the document is
//! ignored on decode.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use super::square::{coordinate_of, Coordinate, BOARD_SIZE};

/// Team identifier; the wire value is the team's index in `teams`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum TeamId {
    Red,
    Blue,
}

impl TeamId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamId::Red => "RED",
            TeamId::Blue => "BLUE",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            TeamId::Red => 0,
            TeamId::Blue => 1,
        }
    }

    pub fn opponent(&self) -> TeamId {
        match self {
            TeamId::Red => TeamId::Blue,
            TeamId::Blue => TeamId::Red,
        }
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i64> for TeamId {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TeamId::Red),
            1 => Ok(TeamId::Blue),
            other => Err(format!("Unknown team id: {}", other)),
        }
    }
}

impl From<TeamId> for i64 {
    fn from(team: TeamId) -> Self {
        team.index() as i64
    }
}

impl FromStr for TeamId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RED" | "0" => Ok(TeamId::Red),
            "BLUE" | "1" => Ok(TeamId::Blue),
            _ => Err(format!("Invalid team '{}', expected RED or BLUE", s)),
        }
    }
}

/// A piece removed by a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    #[serde(rename = "team")]
    pub team_id: TeamId,
    #[serde(rename = "piece")]
    pub piece_id: usize,
}

/// A legal move as published by the game server.
///
/// `locations` holds the landing squares in order: a single entry for a step or
/// single jump, one entry per hop for a multi-jump. The start square and the
/// piece id live on the owning piece and are attached by
/// [`Team::all_valid_moves`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidMove {
    #[serde(default)]
    pub locations: Vec<i32>,
    #[serde(default)]
    pub captures: Vec<Capture>,
    #[serde(default, rename = "king")]
    pub resulting_king: bool,
    #[serde(skip)]
    pub start_square: i32,
    #[serde(skip)]
    pub piece_id: usize,
}

impl ValidMove {
    /// Final landing square, `None` when the server sent no destinations
    pub fn end_square(&self) -> Option<i32> {
        self.locations.last().copied()
    }

    /// Start square followed by every landing square
    pub fn square_sequence(&self) -> Vec<i32> {
        let mut squares = Vec::with_capacity(self.locations.len() + 1);
        squares.push(self.start_square);
        squares.extend_from_slice(&self.locations);
        squares
    }

    pub fn is_jump(&self) -> bool {
        !self.captures.is_empty()
    }

    /// Does this move start and end where a coordinate move does?
    pub fn matches(&self, mv: &CoordinateMove) -> bool {
        if coordinate_of(self.start_square) != mv.from {
            return false;
        }
        match self.end_square() {
            Some(end) => coordinate_of(end) == mv.to,
            None => false,
        }
    }
}

impl fmt::Display for ValidMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {:?}", self.start_square, self.locations)
    }
}

/// Move expressed in board coordinates, as produced by a board engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateMove {
    pub from: Coordinate,
    pub to: Coordinate,
}

impl CoordinateMove {
    pub fn new(from: Coordinate, to: Coordinate) -> Self {
        Self { from, to }
    }
}

/// Index of the published move that corresponds to a coordinate move
pub fn find_corresponding_move(mv: &CoordinateMove, moves: &[ValidMove]) -> Option<usize> {
    moves.iter().position(|candidate| candidate.matches(mv))
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Piece {
    #[serde(rename = "location")]
    pub square: i32,
    #[serde(default, rename = "king")]
    pub is_king: bool,
    #[serde(default, rename = "captured")]
    pub is_captured: bool,
    #[serde(default, rename = "validMoves")]
    pub valid_moves: Vec<ValidMove>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub participant_count: i64,
    #[serde(default)]
    pub pieces: Vec<Piece>,
}

impl Team {
    /// Every valid move of every piece, tagged with its start square and piece id
    pub fn all_valid_moves(&self) -> Vec<ValidMove> {
        self.pieces
            .iter()
            .enumerate()
            .flat_map(|(piece_id, piece)| {
                piece.valid_moves.iter().map(move |mv| ValidMove {
                    start_square: piece.square,
                    piece_id,
                    ..mv.clone()
                })
            })
            .collect()
    }

    pub fn active_pieces(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.iter().filter(|p| !p.is_captured)
    }
}

/// A move already played in the current game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveHistory {
    pub piece: usize,
    pub team: TeamId,
    #[serde(default)]
    pub locations: Vec<i32>,
}

/// One revision of the shared game document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(rename = "activeTeam")]
    pub active_team: TeamId,
    #[serde(
        rename = "winningTeam",
        default,
        deserialize_with = "deserialize_winning_team",
        skip_serializing_if = "Option::is_none"
    )]
    pub winning_team: Option<TeamId>,
    #[serde(rename = "number")]
    pub game_number: u64,
    #[serde(rename = "turn")]
    pub turn_number: u64,
    #[serde(rename = "moveInterval", default)]
    pub move_interval_secs: u64,
    #[serde(default)]
    pub moves: Vec<MoveHistory>,
}

/// Absent, null and negative values all mean "no winner yet"
fn deserialize_winning_team<'de, D>(deserializer: D) -> std::result::Result<Option<TeamId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<i64> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(v) if v < 0 => Ok(None),
        Some(v) => TeamId::try_from(v).map(Some).map_err(serde::de::Error::custom),
    }
}

impl GameStateSnapshot {
    pub fn team(&self, team: TeamId) -> Option<&Team> {
        self.teams.get(team.index())
    }

    /// Valid moves available to a team, empty if the team is missing
    pub fn valid_moves_for(&self, team: TeamId) -> Vec<ValidMove> {
        self.team(team)
            .map(Team::all_valid_moves)
            .unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.winning_team.is_some()
    }

    /// Export the uncaptured pieces onto an 8x8 grid
    pub fn board(&self) -> Board {
        let mut board = Board::empty();
        for (index, team) in self.teams.iter().enumerate() {
            let Ok(team_id) = TeamId::try_from(index as i64) else {
                continue;
            };
            for piece in team.active_pieces() {
                let coordinate = coordinate_of(piece.square);
                if coordinate.is_valid() {
                    board.set(coordinate, Cell::occupied(team_id, piece.is_king));
                }
            }
        }
        board
    }
}

/// Contents of a single board square
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Red,
    RedKing,
    Blue,
    BlueKing,
}

impl Cell {
    pub fn occupied(team: TeamId, king: bool) -> Self {
        match (team, king) {
            (TeamId::Red, false) => Cell::Red,
            (TeamId::Red, true) => Cell::RedKing,
            (TeamId::Blue, false) => Cell::Blue,
            (TeamId::Blue, true) => Cell::BlueKing,
        }
    }

    fn symbol(&self) -> char {
        match self {
            Cell::Empty => '.',
            Cell::Red => 'r',
            Cell::RedKing => 'R',
            Cell::Blue => 'b',
            Cell::BlueKing => 'B',
        }
    }
}

/// Full 8x8 board, row 0 at the top
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: [[Cell; BOARD_SIZE as usize]; BOARD_SIZE as usize],
}

impl Board {
    pub fn empty() -> Self {
        Self {
            cells: [[Cell::Empty; BOARD_SIZE as usize]; BOARD_SIZE as usize],
        }
    }

    pub fn piece_at(&self, coordinate: Coordinate) -> Cell {
        if !(0..BOARD_SIZE).contains(&coordinate.row) || !(0..BOARD_SIZE).contains(&coordinate.col)
        {
            return Cell::Empty;
        }
        self.cells[coordinate.row as usize][coordinate.col as usize]
    }

    fn set(&mut self, coordinate: Coordinate, cell: Cell) {
        self.cells[coordinate.row as usize][coordinate.col as usize] = cell;
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.cells.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for cell in row {
                write!(f, "{}", cell.symbol())?;
            }
        }
        Ok(())
    }
}

/// Sample game document used by tests across the crate
#[cfg(test)]
pub(crate) const SAMPLE_GAME: &str = r#"{"_id":"game:checkers","_rev":"12-abc","number":1,"turn":1,"activeTeam":0,"moveInterval":30,"moves":[],"teams":[{"participantCount":117983,"score":11,"pieces":[{"location":1,"king":true},{"location":2},{"location":3},{"location":4},{"location":5},{"location":6},{"location":7,"validMoves":[{"locations":[11],"captures":[{"team":1,"piece":11}],"king":true}]},{"location":8,"validMoves":[{"locations":[11],"captures":[{"team":1,"piece":8},{"team":1,"piece":9},{"team":1,"piece":10}]},{"locations":[11,15]}]},{"location":9,"validMoves":[{"locations":[13]},{"locations":[14]}]},{"location":10,"validMoves":[{"locations":[14]},{"locations":[15]}]},{"location":11,"captured":true},{"location":12,"king":true,"validMoves":[{"locations":[16]}]}]},{"participantCount":109217,"score":12,"pieces":[{"location":21},{"location":22},{"location":23},{"location":24},{"location":25},{"location":26},{"location":27},{"location":28},{"location":29},{"location":30},{"location":31},{"location":32,"captured":true}]}]}"#;
