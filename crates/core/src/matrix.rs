//! Matrix module - the playing field state machine
//!
//! The matrix is `width` columns by `height + buffer` rows; the top `buffer`
//! rows are invisible and give pieces room to spawn and rotate. Occupied
//! cells live in a map keyed by `y * width + x`, so an index can hold at most
//! one solid block. A second map, the overlay, carries the ghost piece; it is
//! drawn but never consulted for collisions.
//!
//! Lifecycle of the active piece:
//!
//! ```text
//! Idle --start--> Active --lock--> Locking --deal--> Active
//!                                      \--spawn blocked--> GameOver
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error};

use crate::bag::Bag;
use crate::error::MatrixError;
use crate::piece::Piece;
use crate::rng::SimpleRng;
use crate::scoring::{garbage_for_lines, level_for_lines, score_for_lines};
use crate::snapshot::{ActiveSnapshot, MatrixSnapshot};
use crate::types::{Block, Color, Direction, GameAction, Point};

/// Mixed into the bag seed so garbage holes do not mirror the piece order
const GARBAGE_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Where the matrix is in its piece lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No piece dealt yet
    Idle,
    /// A piece is falling
    Active,
    /// A piece is being committed to the grid
    Locking,
    /// Terminal: a piece could not be placed
    GameOver,
}

/// Notifications produced by lock events, drained with [`Matrix::take_events`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixEvent {
    /// A lock cleared rows and scored points
    Score { lines: usize, points: u32 },
    /// Garbage rows to forward to an opponent
    SendGarbage(u32),
    /// The matrix reached game over
    GameOver,
}

/// Result of a single lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockOutcome {
    pub cleared: usize,
    pub points: u32,
    pub garbage_sent: u32,
    pub garbage_received: u32,
}

/// One player's playing field
#[derive(Debug)]
pub struct Matrix {
    width: i32,
    height: i32,
    buffer: i32,
    cells: BTreeMap<usize, Block>,
    overlay: BTreeMap<usize, Block>,
    piece: Option<Piece>,
    bag: Option<Bag>,
    rng: SimpleRng,
    phase: Phase,
    score: u32,
    lines: u32,
    pending_garbage: u32,
    garbage_sent: u32,
    garbage_received: u32,
    events: Vec<MatrixEvent>,
}

impl Matrix {
    /// Create an empty matrix without a bag; pieces must be spawned by hand
    pub fn new(width: i32, height: i32, buffer: i32) -> Self {
        Self {
            width,
            height,
            buffer,
            cells: BTreeMap::new(),
            overlay: BTreeMap::new(),
            piece: None,
            bag: None,
            rng: SimpleRng::new(GARBAGE_SEED_SALT),
            phase: Phase::Idle,
            score: 0,
            lines: 0,
            pending_garbage: 0,
            garbage_sent: 0,
            garbage_received: 0,
            events: Vec::new(),
        }
    }

    /// Create an empty matrix that deals its pieces from `bag`
    pub fn with_bag(width: i32, height: i32, buffer: i32, bag: Bag) -> Self {
        let mut matrix = Self::new(width, height, buffer);
        matrix.rng = SimpleRng::new(bag.seed() ^ GARBAGE_SEED_SALT);
        matrix.bag = Some(bag);
        matrix
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn buffer(&self) -> i32 {
        self.buffer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == Phase::GameOver
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    pub fn level(&self) -> u32 {
        level_for_lines(self.lines)
    }

    pub fn pending_garbage(&self) -> u32 {
        self.pending_garbage
    }

    pub fn garbage_sent(&self) -> u32 {
        self.garbage_sent
    }

    pub fn garbage_received(&self) -> u32 {
        self.garbage_received
    }

    pub fn piece(&self) -> Option<&Piece> {
        self.piece.as_ref()
    }

    pub fn bag(&self) -> Option<&Bag> {
        self.bag.as_ref()
    }

    /// Absolute cells of the active piece
    pub fn piece_cells(&self) -> Vec<Point> {
        self.piece
            .as_ref()
            .map(Piece::absolute_cells)
            .unwrap_or_default()
    }

    /// Flat index of (x, y), or None when outside the matrix and buffer
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || x >= self.width || y < 0 || y >= self.height + self.buffer {
            return None;
        }
        Some((y * self.width + x) as usize)
    }

    pub fn in_bounds(&self, p: Point) -> bool {
        self.index(p.x, p.y).is_some()
    }

    /// Solid contents of (x, y); out-of-bounds reads as empty
    pub fn block(&self, x: i32, y: i32) -> Block {
        self.index(x, y)
            .and_then(|i| self.cells.get(&i).copied())
            .unwrap_or(Block::Empty)
    }

    /// Overlay contents of (x, y)
    pub fn overlay_block(&self, x: i32, y: i32) -> Block {
        self.index(x, y)
            .and_then(|i| self.overlay.get(&i).copied())
            .unwrap_or(Block::Empty)
    }

    /// Number of occupied solid cells
    pub fn occupied(&self) -> usize {
        self.cells.len()
    }

    /// Whether the active piece fits where it currently is
    pub fn can_add(&self, piece: &Piece) -> bool {
        self.can_add_at(piece.cells(), piece.position())
    }

    /// Whether every cell translated to `location` is in bounds and empty
    pub fn can_add_at(&self, cells: &[Point], location: Point) -> bool {
        cells.iter().all(|&c| {
            let p = c + location;
            self.index(p.x, p.y)
                .is_some_and(|i| !self.cells.contains_key(&i))
        })
    }

    /// Write `block` into every cell translated to `location`
    ///
    /// All cells are validated before anything is written. Overlay writes
    /// only check bounds.
    pub fn add(
        &mut self,
        cells: &[Point],
        block: Block,
        location: Point,
        overlay: bool,
    ) -> Result<(), MatrixError> {
        let mut indices = Vec::with_capacity(cells.len());
        for &c in cells {
            let p = c + location;
            let Some(i) = self.index(p.x, p.y) else {
                return Err(MatrixError::OutOfBounds { x: p.x, y: p.y });
            };
            if !overlay && self.cells.contains_key(&i) {
                return Err(MatrixError::Collision { x: p.x, y: p.y });
            }
            indices.push(i);
        }

        let layer = if overlay {
            &mut self.overlay
        } else {
            &mut self.cells
        };
        for i in indices {
            if block.is_empty() {
                layer.remove(&i);
            } else {
                layer.insert(i, block);
            }
        }
        Ok(())
    }

    /// Deal the first piece
    pub fn start(&mut self) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.deal()
    }

    fn deal(&mut self) -> bool {
        let Some(bag) = self.bag.as_ref() else {
            self.phase = Phase::Idle;
            return false;
        };
        let Some(mino) = bag.take() else {
            self.phase = Phase::Idle;
            return false;
        };
        let color = Color::for_index(bag.template_index(&mino).unwrap_or(0));
        self.spawn(Piece::new(mino, color))
    }

    /// Place `piece` at the spawn point, centred with its lowest cell on the
    /// top visible row
    ///
    /// Returns false (and ends the game) when the spawn point is blocked.
    pub fn spawn(&mut self, mut piece: Piece) -> bool {
        let position = Point::new(
            (self.width - piece.size()) / 2,
            self.height - 1 - piece.bottom(),
        );
        piece.set_position(position);

        if !self.can_add(&piece) {
            debug!(x = position.x, y = position.y, "spawn blocked");
            self.set_game_over();
            return false;
        }

        self.piece = Some(piece);
        self.phase = Phase::Active;
        self.refresh_overlay();
        true
    }

    /// Translate the active piece
    ///
    /// A blocked downward move locks the piece instead.
    pub fn move_piece(&mut self, dx: i32, dy: i32) -> bool {
        if self.phase != Phase::Active {
            return false;
        }
        let Some(piece) = self.piece.as_ref() else {
            return false;
        };

        let target = piece.position() + Point::new(dx, dy);
        if self.can_add_at(piece.cells(), target) {
            if let Some(piece) = self.piece.as_mut() {
                piece.set_position(target);
            }
            self.refresh_overlay();
            return true;
        }

        if dy < 0 {
            if let Err(e) = self.land_piece() {
                error!("lock after blocked move failed: {}", e);
            }
        }
        false
    }

    /// Rotate the active piece, trying wall kicks in table order
    ///
    /// On failure the piece keeps its exact shape and position.
    pub fn rotate_piece(&mut self, rotations: u8, direction: Direction) -> bool {
        if self.phase != Phase::Active {
            return false;
        }
        let Some(piece) = self.piece.as_ref() else {
            return false;
        };

        let (steps, direction) = match rotations % 4 {
            0 => return true,
            3 => (1, direction.reverse()),
            s => (s, direction),
        };

        let candidate = piece.rotated(steps, direction);
        let rotation = piece.rotation_after(steps, direction);
        let origin = piece.position();
        let Some(offset) = piece
            .kicks(direction)
            .into_iter()
            .find(|&k| self.can_add_at(&candidate, origin + k))
        else {
            return false;
        };

        if let Some(piece) = self.piece.as_mut() {
            piece.apply_rotation(candidate, rotation, offset);
        }
        self.refresh_overlay();
        true
    }

    /// One row of gravity; locks the piece when it cannot fall
    pub fn lower_piece(&mut self) -> bool {
        self.move_piece(0, -1)
    }

    /// Lowest position the active piece can fall to
    pub fn ghost_position(&self) -> Option<Point> {
        let piece = self.piece.as_ref()?;
        let mut location = piece.position();
        if !self.can_add_at(piece.cells(), location) {
            return None;
        }
        while self.can_add_at(piece.cells(), location + Point::new(0, -1)) {
            location.y -= 1;
        }
        Some(location)
    }

    /// Drop the active piece to the floor and lock it
    ///
    /// Clears rows, scores, settles garbage and deals the next piece.
    pub fn land_piece(&mut self) -> Result<LockOutcome, MatrixError> {
        let Some(location) = self.ghost_position() else {
            let Some(piece) = self.piece.as_ref() else {
                return Err(MatrixError::NoActivePiece);
            };
            let at = piece.position();
            error!(x = at.x, y = at.y, "active piece does not fit, ending game");
            self.set_game_over();
            return Err(MatrixError::LockFailed { x: at.x, y: at.y });
        };
        let Some(piece) = self.piece.take() else {
            return Err(MatrixError::NoActivePiece);
        };
        self.phase = Phase::Locking;
        self.overlay.clear();

        if let Err(e) = self.add(piece.cells(), piece.solid(), location, false) {
            self.set_game_over();
            return Err(e);
        }

        let cleared = self.clear_filled();
        let points = score_for_lines(cleared);
        self.score = self.score.saturating_add(points);
        self.lines = self.lines.saturating_add(cleared as u32);
        if points > 0 {
            self.events.push(MatrixEvent::Score {
                lines: cleared,
                points,
            });
        }

        let mut outcome = LockOutcome {
            cleared,
            points,
            ..LockOutcome::default()
        };

        // Outgoing attack cancels incoming garbage first.
        let mut attack = garbage_for_lines(cleared);
        let cancelled = attack.min(self.pending_garbage);
        self.pending_garbage -= cancelled;
        attack -= cancelled;
        if attack > 0 {
            self.garbage_sent = self.garbage_sent.saturating_add(attack);
            self.events.push(MatrixEvent::SendGarbage(attack));
            outcome.garbage_sent = attack;
        }

        if cleared == 0 && self.pending_garbage > 0 {
            let rows = std::mem::take(&mut self.pending_garbage);
            outcome.garbage_received = rows;
            if !self.inject_garbage(rows) {
                self.set_game_over();
                return Ok(outcome);
            }
        }

        self.deal();
        Ok(outcome)
    }

    fn row_filled(&self, y: i32) -> bool {
        (0..self.width).all(|x| {
            self.index(x, y)
                .is_some_and(|i| self.cells.contains_key(&i))
        })
    }

    fn remove_row(&mut self, y: i32) {
        let w = self.width as usize;
        let start = y as usize * w;
        let end = start + w;
        self.cells = std::mem::take(&mut self.cells)
            .into_iter()
            .filter_map(|(i, b)| match i {
                i if i < start => Some((i, b)),
                i if i < end => None,
                i => Some((i - w, b)),
            })
            .collect();
    }

    /// Remove every filled row, bottom to top, shifting rows above down
    ///
    /// A row index is re-checked after a removal since the row that slid
    /// into it may be filled as well.
    pub fn clear_filled(&mut self) -> usize {
        let mut cleared = 0;
        let mut y = 0;
        while y < self.height + self.buffer {
            if self.row_filled(y) {
                self.remove_row(y);
                cleared += 1;
            } else {
                y += 1;
            }
        }
        cleared
    }

    /// Rows in the whole stack, buffer included
    fn stack_rows(&self) -> u32 {
        (self.height + self.buffer).max(0) as u32
    }

    /// Queue garbage received from an opponent; it lands with the next lock
    /// that clears nothing
    ///
    /// The queue never holds more than one full stack of rows.
    pub fn add_pending_garbage(&mut self, rows: u32) {
        self.pending_garbage = self
            .pending_garbage
            .saturating_add(rows)
            .min(self.stack_rows());
    }

    /// Push `rows` garbage rows in from the bottom, sharing one hole column
    ///
    /// Returns false when solid cells were pushed out of the top.
    pub fn inject_garbage(&mut self, rows: u32) -> bool {
        if rows == 0 {
            return true;
        }
        let rows = rows.min(self.stack_rows());
        let w = self.width as usize;
        let total = (self.height + self.buffer) as usize;
        let shift = rows as usize * w;
        let limit = total * w;

        let mut overflow = false;
        self.cells = std::mem::take(&mut self.cells)
            .into_iter()
            .filter_map(|(i, b)| {
                let moved = i + shift;
                if moved >= limit {
                    overflow = true;
                    None
                } else {
                    Some((moved, b))
                }
            })
            .collect();

        let hole = self.rng.next_range(self.width as u32) as i32;
        for y in 0..rows as i32 {
            for x in (0..self.width).filter(|&x| x != hole) {
                if let Some(i) = self.index(x, y) {
                    self.cells.insert(i, Block::Garbage);
                }
            }
        }
        self.garbage_received = self.garbage_received.saturating_add(rows);

        if let Some(piece) = self.piece.as_ref() {
            if !self.can_add(piece) {
                overflow = true;
            }
        }
        self.refresh_overlay();
        !overflow
    }

    fn refresh_overlay(&mut self) {
        self.overlay.clear();
        let Some(location) = self.ghost_position() else {
            return;
        };
        let Some(piece) = self.piece.as_ref() else {
            return;
        };
        let cells = piece.cells().to_vec();
        let ghost = piece.ghost();
        let _ = self.add(&cells, ghost, location, true);
    }

    /// Apply an input intent
    pub fn apply_action(&mut self, action: GameAction) -> bool {
        match action {
            GameAction::MoveLeft => self.move_piece(-1, 0),
            GameAction::MoveRight => self.move_piece(1, 0),
            GameAction::SoftDrop => self.lower_piece(),
            GameAction::HardDrop => self.land_piece().is_ok(),
            GameAction::RotateCw => self.rotate_piece(1, Direction::Cw),
            GameAction::RotateCcw => self.rotate_piece(1, Direction::Ccw),
        }
    }

    /// End the game; idempotent
    pub fn set_game_over(&mut self) {
        if self.phase == Phase::GameOver {
            return;
        }
        self.phase = Phase::GameOver;
        self.piece = None;
        self.overlay.clear();
        self.events.push(MatrixEvent::GameOver);
    }

    /// Drain pending notifications
    pub fn take_events(&mut self) -> Vec<MatrixEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> MatrixSnapshot {
        MatrixSnapshot {
            width: self.width,
            height: self.height,
            buffer: self.buffer,
            cells: self.cells.iter().map(|(&i, &b)| (i, b)).collect(),
            active: self.piece.as_ref().map(|p| ActiveSnapshot {
                cells: p.absolute_cells(),
                block: p.solid(),
            }),
            score: self.score,
            lines: self.lines,
            pending_garbage: self.pending_garbage,
            game_over: self.is_game_over(),
        }
    }

    /// Text grid of the visible area, bottom row first
    ///
    /// Solid cells win over the active piece, which wins over the overlay.
    pub fn render(&self) -> String {
        let active = self.piece_cells();
        let mut rows = Vec::with_capacity(self.height as usize);
        for y in 0..self.height {
            let row: String = (0..self.width)
                .map(|x| {
                    let solid = self.block(x, y);
                    if !solid.is_empty() {
                        return solid.as_char();
                    }
                    if let Some(piece) = self.piece.as_ref() {
                        if active.contains(&Point::new(x, y)) {
                            return piece.solid().as_char();
                        }
                    }
                    self.overlay_block(x, y).as_char()
                })
                .collect();
            rows.push(row);
        }
        rows.join("\n")
    }

    /// Set a single solid cell, for tests and scenario setup
    pub fn set_block(&mut self, x: i32, y: i32, block: Block) -> bool {
        let Some(i) = self.index(x, y) else {
            return false;
        };
        if block.is_empty() {
            self.cells.remove(&i);
        } else {
            self.cells.insert(i, block);
        }
        self.refresh_overlay();
        true
    }
}

/// A matrix behind one coarse lock
///
/// Mutations take the write lock; rendering and queries take the read lock.
#[derive(Debug, Clone)]
pub struct SharedMatrix(Arc<RwLock<Matrix>>);

impl SharedMatrix {
    pub fn new(matrix: Matrix) -> Self {
        Self(Arc::new(RwLock::new(matrix)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Matrix> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Matrix> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}
