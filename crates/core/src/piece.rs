//! Piece module - live minos and SRS wall kicks
//!
//! A piece places a mino template inside a square bounding box whose side is
//! the larger of the mino's width and height. Rotation is an affine map about
//! the centre of that box, `(x, y) -> (y, n - 1 - x)` clockwise, so four
//! rotations always return to the spawn orientation.
//!
//! When the natural rotation collides, the wall kick offsets of the piece's
//! table are tried in order. The tables mirror the Super Rotation System:
//! one for straight lines, one for the 2x2 square and one shared by every
//! other shape. Reference: https://tetris.wiki/SRS

use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::mino::Mino;
use crate::types::{Block, Color, Direction, Point};

/// Which wall kick table a piece uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KickTable {
    /// Straight lines (the I tetromino and its relatives)
    I,
    /// The 2x2 square, which never kicks
    O,
    /// J, L, S, T, Z and every other shape
    Jlstz,
}

/// (dx, dy) offsets for one rotation transition, natural position first
type KickRow = [(i32, i32); 5];

/// Indexed by [`kick_index`]
type KickRows = [KickRow; 8];

const O_KICKS: KickRows = [[(0, 0); 5]; 8];

const JLSTZ_KICKS: KickRows = [
    // 0->1 (clockwise)
    [(0, 0), (-1, 0), (-1, 1), (0, -2), (-1, -2)],
    // 0->3 (counter-clockwise)
    [(0, 0), (1, 0), (1, 1), (0, -2), (1, -2)],
    // 1->0 (counter-clockwise)
    [(0, 0), (1, 0), (1, -1), (0, 2), (1, 2)],
    // 1->2 (clockwise)
    [(0, 0), (1, 0), (1, -1), (0, 2), (1, 2)],
    // 2->1 (counter-clockwise)
    [(0, 0), (-1, 0), (-1, 1), (0, -2), (-1, -2)],
    // 2->3 (clockwise)
    [(0, 0), (1, 0), (1, 1), (0, -2), (1, -2)],
    // 3->2 (counter-clockwise)
    [(0, 0), (-1, 0), (-1, -1), (0, 2), (-1, 2)],
    // 3->0 (clockwise)
    [(0, 0), (-1, 0), (-1, -1), (0, 2), (-1, 2)],
];

const I_KICKS: KickRows = [
    // 0->1
    [(0, 0), (-2, 0), (1, 0), (-2, -1), (1, 2)],
    // 0->3
    [(0, 0), (-1, 0), (2, 0), (-1, 2), (2, -1)],
    // 1->0
    [(0, 0), (2, 0), (-1, 0), (2, 1), (-1, -2)],
    // 1->2
    [(0, 0), (-1, 0), (2, 0), (-1, 2), (2, -1)],
    // 2->1
    [(0, 0), (1, 0), (-2, 0), (1, -2), (-2, 1)],
    // 2->3
    [(0, 0), (2, 0), (-1, 0), (2, 1), (-1, -2)],
    // 3->2
    [(0, 0), (-2, 0), (1, 0), (-2, -1), (1, 2)],
    // 3->0
    [(0, 0), (1, 0), (-2, 0), (1, -2), (-2, 1)],
];

/// Row of the kick table for a single-step rotation out of `from`
fn kick_index(from: u8, direction: Direction) -> usize {
    match (from % 4, direction) {
        (0, Direction::Cw) => 0,
        (0, Direction::Ccw) => 1,
        (1, Direction::Ccw) => 2,
        (1, Direction::Cw) => 3,
        (2, Direction::Ccw) => 4,
        (2, Direction::Cw) => 5,
        (3, Direction::Ccw) => 6,
        _ => 7,
    }
}

impl KickTable {
    /// Pick the table for a shape
    pub fn for_mino(mino: &Mino) -> Self {
        if mino.is_square() {
            KickTable::O
        } else if mino.is_line() {
            KickTable::I
        } else {
            KickTable::Jlstz
        }
    }

    fn rows(self) -> &'static KickRows {
        match self {
            KickTable::I => &I_KICKS,
            KickTable::O => &O_KICKS,
            KickTable::Jlstz => &JLSTZ_KICKS,
        }
    }

    /// Offsets to try for a rotation out of state `from`, in order
    ///
    /// The first entry is always the natural (unkicked) position.
    pub fn offsets(self, from: u8, direction: Direction) -> ArrayVec<Point, 5> {
        self.rows()[kick_index(from, direction)]
            .iter()
            .map(|&(dx, dy)| Point::new(dx, dy))
            .collect()
    }
}

/// A falling piece
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    /// Cells in the current orientation, relative to the bounding box origin
    cells: Vec<Point>,
    /// Lower-left corner of the bounding box in matrix coordinates
    position: Point,
    /// 0 = spawn, 1 = one clockwise turn, 2, 3
    rotation: u8,
    /// Side of the bounding box
    size: i32,
    table: KickTable,
    solid: Block,
    ghost: Block,
}

impl Piece {
    /// Build a piece from a template, in spawn orientation at the origin
    ///
    /// The shape is laid flat (wider than tall) and centred in its box the
    /// way SRS lays out the standard tetrominoes.
    pub fn new(mino: Arc<Mino>, color: Color) -> Self {
        let mut flat = mino.flatten();
        if flat.height() > flat.width() {
            flat = Mino::new(flat.points().iter().map(|p| p.rotate90()).collect()).flatten();
        }

        let w = flat.width();
        let h = flat.height();
        let size = w.max(h);
        let offset = Point::new((size - w) / 2, (size - h + 1) / 2);
        let cells = flat.points().iter().map(|&p| p + offset).collect();

        Self {
            table: KickTable::for_mino(&flat),
            cells,
            position: Point::new(0, 0),
            rotation: 0,
            size,
            solid: Block::Solid(color),
            ghost: Block::Ghost(color),
        }
    }

    pub fn cells(&self) -> &[Point] {
        &self.cells
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn rotation(&self) -> u8 {
        self.rotation
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn table(&self) -> KickTable {
        self.table
    }

    pub fn solid(&self) -> Block {
        self.solid
    }

    pub fn ghost(&self) -> Block {
        self.ghost
    }

    /// Cells in matrix coordinates
    pub fn absolute_cells(&self) -> Vec<Point> {
        self.cells.iter().map(|&p| p + self.position).collect()
    }

    /// Lowest row occupied by the piece, relative to its box
    pub fn bottom(&self) -> i32 {
        self.cells.iter().map(|p| p.y).min().unwrap_or(0)
    }

    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    /// Cells after `steps` quarter turns in `direction`, not committed
    pub fn rotated(&self, steps: u8, direction: Direction) -> Vec<Point> {
        let last = self.size - 1;
        let mut out = self.cells.clone();
        for _ in 0..steps % 4 {
            for p in out.iter_mut() {
                *p = match direction {
                    Direction::Cw => Point::new(p.y, last - p.x),
                    Direction::Ccw => Point::new(last - p.y, p.x),
                };
            }
        }
        out
    }

    /// Rotation state reached after `steps` turns in `direction`
    pub fn rotation_after(&self, steps: u8, direction: Direction) -> u8 {
        let steps = steps % 4;
        match direction {
            Direction::Cw => (self.rotation + steps) % 4,
            Direction::Ccw => (self.rotation + 4 - steps) % 4,
        }
    }

    /// Kick offsets for the first turn of a rotation in `direction`
    pub fn kicks(&self, direction: Direction) -> ArrayVec<Point, 5> {
        self.table.offsets(self.rotation, direction)
    }

    /// Commit a rotation computed by [`Piece::rotated`]
    pub fn apply_rotation(&mut self, cells: Vec<Point>, rotation: u8, offset: Point) {
        self.cells = cells;
        self.rotation = rotation % 4;
        self.position = self.position + offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mino(points: &[(i32, i32)]) -> Arc<Mino> {
        Arc::new(Mino::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect()))
    }

    fn sorted(mut v: Vec<Point>) -> Vec<Point> {
        v.sort_unstable();
        v
    }

    #[test]
    fn test_i_piece_spawns_flat_in_4x4_box() {
        let i = Piece::new(mino(&[(0, 0), (0, 1), (0, 2), (0, 3)]), Color::Cyan);
        assert_eq!(i.size(), 4);
        assert_eq!(i.table(), KickTable::I);
        assert!(i.cells().iter().all(|p| p.y == 2));
    }

    #[test]
    fn test_o_piece_rotation_is_identity() {
        let o = Piece::new(mino(&[(0, 0), (1, 0), (0, 1), (1, 1)]), Color::Yellow);
        assert_eq!(o.table(), KickTable::O);
        assert_eq!(
            sorted(o.rotated(1, Direction::Cw)),
            sorted(o.cells().to_vec())
        );
        assert!(o.kicks(Direction::Cw).iter().all(|k| *k == Point::new(0, 0)));
    }

    #[test]
    fn test_four_rotations_restore_shape() {
        let t = Piece::new(mino(&[(0, 0), (1, 0), (2, 0), (1, 1)]), Color::Magenta);
        assert_eq!(t.rotated(4, Direction::Cw), t.cells().to_vec());
        assert_eq!(
            sorted(t.rotated(1, Direction::Cw)),
            sorted(t.rotated(3, Direction::Ccw))
        );
        assert_eq!(t.rotation_after(1, Direction::Ccw), 3);
        assert_eq!(t.rotation_after(2, Direction::Cw), 2);
    }

    #[test]
    fn test_rotated_does_not_commit() {
        let t = Piece::new(mino(&[(0, 0), (1, 0), (2, 0), (1, 1)]), Color::Magenta);
        let before = t.clone();
        let _ = t.rotated(1, Direction::Cw);
        assert_eq!(t, before);
    }

    #[test]
    fn test_ccw_kicks_are_not_mirrored_cw_kicks() {
        let cw = KickTable::Jlstz.offsets(0, Direction::Cw);
        let ccw = KickTable::Jlstz.offsets(0, Direction::Ccw);
        assert_eq!(cw[0], Point::new(0, 0));
        assert_eq!(ccw[0], Point::new(0, 0));
        assert_eq!(cw[1], Point::new(-1, 0));
        assert_eq!(ccw[1], Point::new(1, 0));
        assert_eq!(KickTable::I.offsets(1, Direction::Ccw)[1], Point::new(2, 0));
    }

    #[test]
    fn test_pentomino_uses_jlstz_table() {
        let p = Piece::new(mino(&[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]), Color::Red);
        assert_eq!(p.table(), KickTable::Jlstz);
        assert_eq!(p.size(), 3);
    }
}
