use crate::types::{Block, Point};

/// Active piece as seen by other players
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActiveSnapshot {
    /// Cells in matrix coordinates
    pub cells: Vec<Point>,
    pub block: Block,
}

/// Everything needed to show a matrix on another player's screen
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatrixSnapshot {
    pub width: i32,
    pub height: i32,
    pub buffer: i32,
    /// Occupied cells as (index, block), ascending index
    pub cells: Vec<(usize, Block)>,
    pub active: Option<ActiveSnapshot>,
    pub score: u32,
    pub lines: u32,
    pub pending_garbage: u32,
    pub game_over: bool,
}

impl MatrixSnapshot {
    /// Block at (x, y) or `Block::Empty`
    pub fn block(&self, x: i32, y: i32) -> Block {
        if x < 0 || x >= self.width || y < 0 || y >= self.height + self.buffer {
            return Block::Empty;
        }
        let index = (y * self.width + x) as usize;
        self.cells
            .binary_search_by_key(&index, |&(i, _)| i)
            .map(|pos| self.cells[pos].1)
            .unwrap_or(Block::Empty)
    }
}
