use std::fmt;

use serde::{Deserialize, Serialize};

pub const BOARD_WIDTH: usize = 10;
pub const BOARD_HEIGHT: usize = 10;
pub const BOARD_CELLS: usize = BOARD_WIDTH * BOARD_HEIGHT;

/// Row-major index of `(x, y)`, or `None` when the coordinate is off the board.
#[inline]
pub fn cell_index(x: i32, y: i32) -> Option<usize> {
    if x < 0 || y < 0 || x >= BOARD_WIDTH as i32 || y >= BOARD_HEIGHT as i32 {
        return None;
    }
    Some(y as usize * BOARD_WIDTH + x as usize)
}

#[inline]
pub fn cell_position(index: usize) -> (i32, i32) {
    debug_assert!(index < BOARD_CELLS);
    ((index % BOARD_WIDTH) as i32, (index / BOARD_WIDTH) as i32)
}

/// Per-cell occupancy byte as exposed in the occupancy buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Occupancy {
    #[default]
    Empty = 0,
    Piece = 1,
}

impl Occupancy {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Occupancy::Empty),
            1 => Some(Occupancy::Piece),
            _ => None,
        }
    }

    pub fn is_piece(self) -> bool {
        matches!(self, Occupancy::Piece)
    }
}

/// Travel direction stored per cell. `None` is reserved for empty cells and
/// unrouted pieces; the policy service never produces it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    #[default]
    None = 0,
    Up = 1,
    Right = 2,
    Down = 3,
    Left = 4,
}

impl Direction {
    /// Directions a piece can travel in, ordered by policy action index.
    pub const MOVING: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Direction::None),
            1 => Some(Direction::Up),
            2 => Some(Direction::Right),
            3 => Some(Direction::Down),
            4 => Some(Direction::Left),
            _ => None,
        }
    }

    /// Policy actions are `0..=3` and map onto `Up..=Left`.
    pub fn from_policy_action(action: i64) -> Option<Self> {
        usize::try_from(action)
            .ok()
            .and_then(|idx| Self::MOVING.get(idx).copied())
    }

    /// Grid offset of one step; `y` grows downwards.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::None => (0, 0),
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }

    pub fn is_moving(self) -> bool {
        !matches!(self, Direction::None)
    }

    /// Routing-mode cycle: none, up, right, down, left, back to none.
    pub fn next(self) -> Self {
        match self {
            Direction::None => Direction::Up,
            Direction::Up => Direction::Right,
            Direction::Right => Direction::Down,
            Direction::Down => Direction::Left,
            Direction::Left => Direction::None,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            Direction::None => Direction::Left,
            Direction::Up => Direction::None,
            Direction::Right => Direction::Up,
            Direction::Down => Direction::Right,
            Direction::Left => Direction::Down,
        }
    }

    pub fn glyph(self) -> char {
        match self {
            Direction::None => ' ',
            Direction::Up => '^',
            Direction::Right => '>',
            Direction::Down => 'v',
            Direction::Left => '<',
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "clear" | "-" => Some(Direction::None),
            "up" | "u" | "^" => Some(Direction::Up),
            "right" | "r" | ">" => Some(Direction::Right),
            "down" | "d" | "v" => Some(Direction::Down),
            "left" | "l" | "<" => Some(Direction::Left),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::None => "none",
            Direction::Up => "up",
            Direction::Right => "right",
            Direction::Down => "down",
            Direction::Left => "left",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Editing mode: placement edits pieces, routing edits directions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Placement,
    Routing,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Placement => "Placement",
            Mode::Routing => "Routing",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Mode::Placement => Mode::Routing,
            Mode::Routing => Mode::Placement,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
