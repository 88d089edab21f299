//! Scoring module - points, garbage and gravity per cleared rows
//!
//! Scoring is applied once per lock event from the number of rows `c` that
//! the lock cleared:
//!
//! | Rows | Points | Garbage sent |
//! |------|--------|--------------|
//! | 0 | 0 | 0 |
//! | 1 | 100 | 0 |
//! | 2 | 300 | 1 |
//! | 3 | 500 | 2 |
//! | 4 | 800 | 4 |
//! | c > 4 | 1000 + 200 * (c - 5) | c |
//!
//! Larger clears only happen with ranks above four.

use crate::types::{DROP_INTERVALS, DROP_INTERVAL_FLOOR_MS};

/// Points for a single lock that cleared `rows` rows
pub fn score_for_lines(rows: usize) -> u32 {
    match rows {
        0 => 0,
        1 => 100,
        2 => 300,
        3 => 500,
        4 => 800,
        c => 1000u32.saturating_add(200u32.saturating_mul((c - 5) as u32)),
    }
}

/// Garbage rows sent to an opponent for a lock that cleared `rows` rows
pub fn garbage_for_lines(rows: usize) -> u32 {
    match rows {
        0 | 1 => 0,
        2 => 1,
        3 => 2,
        4 => 4,
        c => c as u32,
    }
}

/// Level management
/// Level increases every 10 lines cleared
pub fn level_for_lines(total_lines: u32) -> u32 {
    total_lines / 10
}

/// Get drop interval for a level (in milliseconds)
pub fn drop_interval_ms(level: u32) -> u32 {
    DROP_INTERVALS
        .get(level as usize)
        .copied()
        .unwrap_or(DROP_INTERVAL_FLOOR_MS)
}
