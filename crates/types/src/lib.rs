//! Shared types module - primitive data structures and constants
//!
//! This crate defines the fundamental value types used throughout netris.
//! All types are plain data with no external dependencies, so they can be
//! shared by the game core, the network layer and any presentation layer.
//!
//! # Coordinates
//!
//! The matrix uses a y-up coordinate system:
//!
//! - **x** grows to the right, column `0` is the left wall
//! - **y** grows upwards, row `0` is the floor
//! - rows `height..height + buffer` form the invisible buffer zone where
//!   pieces spawn
//!
//! # Default Dimensions
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `DEFAULT_WIDTH` | 10 | Matrix columns |
//! | `DEFAULT_HEIGHT` | 20 | Visible matrix rows |
//! | `DEFAULT_BUFFER` | 20 | Invisible rows above the visible area |
//! | `DEFAULT_RANK` | 4 | Cells per piece (tetrominoes) |
//!
//! # Examples
//!
//! ```
//! use netris_types::{Block, Color, Direction, Point};
//!
//! let p = Point::new(1, 2);
//! assert_eq!(p.rotate90(), Point::new(2, -1));
//! assert_eq!(p.reflect(), Point::new(-1, 2));
//!
//! assert_eq!(Direction::Cw.reverse(), Direction::Ccw);
//!
//! let solid = Block::Solid(Color::Cyan);
//! assert!(solid.is_solid());
//! assert_eq!(Block::from_code(solid.code()), Some(solid));
//! ```

use std::fmt;
use std::ops::{Add, Sub};

/// Default matrix width in cells
pub const DEFAULT_WIDTH: i32 = 10;

/// Default visible matrix height in cells
pub const DEFAULT_HEIGHT: i32 = 20;

/// Default height of the invisible buffer zone above the visible area
pub const DEFAULT_BUFFER: i32 = 20;

/// Default piece rank (tetrominoes)
pub const DEFAULT_RANK: i32 = 4;

/// Default number of players a game accepts
pub const DEFAULT_MAX_PLAYERS: usize = 8;

/// Default capacity of per-connection command queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Read deadline for a connection (milliseconds)
pub const READ_TIMEOUT_MS: u64 = 30_000;

/// Write deadline for a single frame (milliseconds)
pub const WRITE_TIMEOUT_MS: u64 = 10_000;

/// Keepalive ping interval (milliseconds)
pub const KEEPALIVE_INTERVAL_MS: u64 = 5_000;

/// Number of dial attempts before a client gives up
pub const DIAL_ATTEMPTS: u32 = 5;

/// Delay between dial attempts (milliseconds)
pub const DIAL_RETRY_DELAY_MS: u64 = 2_000;

/// Drop intervals by level (milliseconds per row)
///
/// Index 0 = Level 0, Index 8 = Level 8
pub const DROP_INTERVALS: [u32; 9] = [1000, 800, 650, 500, 400, 320, 250, 200, 160];

/// Drop interval used past the end of `DROP_INTERVALS`
pub const DROP_INTERVAL_FLOOR_MS: u32 = 120;

/// Identifier the server assigns to a connected player
pub type PlayerId = u64;

/// Identifier of a game hosted by the server
pub type GameId = u32;

/// Integer 2D coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Rotate 90° clockwise about the origin (y-up coordinates)
    pub fn rotate90(self) -> Self {
        Self::new(self.y, -self.x)
    }

    /// Rotate 180° about the origin
    pub fn rotate180(self) -> Self {
        Self::new(-self.x, -self.y)
    }

    /// Rotate 270° clockwise (90° counter-clockwise) about the origin
    pub fn rotate270(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Mirror across the y axis
    pub fn reflect(self) -> Self {
        Self::new(-self.x, self.y)
    }

    /// The four edge-connected neighbours
    pub fn neighbors(self) -> [Point; 4] {
        [
            Self::new(self.x - 1, self.y),
            Self::new(self.x, self.y - 1),
            Self::new(self.x + 1, self.y),
            Self::new(self.x, self.y + 1),
        ]
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Clockwise
    Cw,
    /// Counter-clockwise
    Ccw,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Cw => Direction::Ccw,
            Direction::Ccw => Direction::Cw,
        }
    }
}

/// Block colors, assigned to pieces by their index in the bag's template set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Blue,
    Cyan,
    Yellow,
    Magenta,
    Green,
    Red,
    Orange,
}

impl Color {
    pub const ALL: [Color; 7] = [
        Color::Blue,
        Color::Cyan,
        Color::Yellow,
        Color::Magenta,
        Color::Green,
        Color::Red,
        Color::Orange,
    ];

    /// Color for the n-th template, cycling when there are more than seven
    pub fn for_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    fn offset(self) -> u8 {
        match self {
            Color::Blue => 0,
            Color::Cyan => 1,
            Color::Yellow => 2,
            Color::Magenta => 3,
            Color::Green => 4,
            Color::Red => 5,
            Color::Orange => 6,
        }
    }
}

/// Content of a single matrix cell
///
/// - **Empty**: Nothing here (never stored in the cell map)
/// - **Garbage**: Row injected by an opponent's attack
/// - **Solid**: Part of a locked or active piece
/// - **Ghost**: Landing preview, only ever written to the overlay layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Block {
    #[default]
    Empty,
    Garbage,
    Solid(Color),
    Ghost(Color),
}

impl Block {
    pub fn is_empty(self) -> bool {
        matches!(self, Block::Empty)
    }

    /// Whether the block takes part in collisions and row fills
    pub fn is_solid(self) -> bool {
        matches!(self, Block::Garbage | Block::Solid(_))
    }

    /// Compact numeric code used on the wire
    ///
    /// `0` empty, `1` garbage, `2..=8` solid colors, `9..=15` ghost colors.
    pub fn code(self) -> u8 {
        match self {
            Block::Empty => 0,
            Block::Garbage => 1,
            Block::Solid(c) => 2 + c.offset(),
            Block::Ghost(c) => 9 + c.offset(),
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Block::Empty),
            1 => Some(Block::Garbage),
            2..=8 => Some(Block::Solid(Color::ALL[(code - 2) as usize])),
            9..=15 => Some(Block::Ghost(Color::ALL[(code - 9) as usize])),
            _ => None,
        }
    }

    /// Single character used by the diagnostic text renderer
    pub fn as_char(self) -> char {
        match self {
            Block::Empty => '.',
            Block::Garbage => '#',
            Block::Ghost(_) => '+',
            Block::Solid(c) => match c {
                Color::Blue => 'B',
                Color::Cyan => 'C',
                Color::Yellow => 'Y',
                Color::Magenta => 'M',
                Color::Green => 'G',
                Color::Red => 'R',
                Color::Orange => 'O',
            },
        }
    }
}

/// Input intents accepted from the presentation layer or a bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    /// Move piece one cell left
    MoveLeft,
    /// Move piece one cell right
    MoveRight,
    /// Drop piece one cell (locks when it cannot fall)
    SoftDrop,
    /// Instantly drop and lock the piece
    HardDrop,
    /// Rotate piece 90° clockwise
    RotateCw,
    /// Rotate piece 90° counter-clockwise
    RotateCcw,
}

impl GameAction {
    /// Parse action from string (case-insensitive)
    ///
    /// # Examples
    ///
    /// ```
    /// use netris_types::GameAction;
    ///
    /// assert_eq!(GameAction::from_str("moveLeft"), Some(GameAction::MoveLeft));
    /// assert_eq!(GameAction::from_str("hardDrop"), Some(GameAction::HardDrop));
    /// assert_eq!(GameAction::from_str("hold"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "moveleft" => Some(GameAction::MoveLeft),
            "moveright" => Some(GameAction::MoveRight),
            "softdrop" => Some(GameAction::SoftDrop),
            "harddrop" => Some(GameAction::HardDrop),
            "rotatecw" => Some(GameAction::RotateCw),
            "rotateccw" => Some(GameAction::RotateCcw),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameAction::MoveLeft => "moveLeft",
            GameAction::MoveRight => "moveRight",
            GameAction::SoftDrop => "softDrop",
            GameAction::HardDrop => "hardDrop",
            GameAction::RotateCw => "rotateCw",
            GameAction::RotateCcw => "rotateCcw",
        }
    }
}
