//! Mino module - polyomino shapes and their canonical form
//!
//! A mino is an ordered list of edge-connected cells. Two minos describe the
//! same free polyomino when one can be turned into the other by rotation,
//! reflection and translation. The canonical form picks a single
//! representative: every one of the 8 symmetry variants is translated to the
//! origin and encoded as a string, and the lexicographically smallest
//! encoding wins.

use std::collections::BTreeSet;
use std::fmt;

use crate::types::Point;

/// A polyomino shape
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mino(Vec<Point>);

impl Mino {
    pub fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// The single-cell mino
    pub fn unit() -> Self {
        Self(vec![Point::new(0, 0)])
    }

    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Number of cells (the rank)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lower-left and upper-right corners of the bounding box
    pub fn bounds(&self) -> Option<(Point, Point)> {
        let first = *self.0.first()?;
        let mut min = first;
        let mut max = first;
        for p in &self.0[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some((min, max))
    }

    pub fn width(&self) -> i32 {
        self.bounds().map(|(min, max)| max.x - min.x + 1).unwrap_or(0)
    }

    pub fn height(&self) -> i32 {
        self.bounds().map(|(min, max)| max.y - min.y + 1).unwrap_or(0)
    }

    pub fn translate(&self, offset: Point) -> Self {
        Self(self.0.iter().map(|&p| p + offset).collect())
    }

    /// Translate so the minimum x and y are both 0, with points sorted
    pub fn flatten(&self) -> Self {
        let Some((min, _)) = self.bounds() else {
            return Self(Vec::new());
        };
        let mut points: Vec<Point> = self.0.iter().map(|&p| p - min).collect();
        points.sort_unstable();
        Self(points)
    }

    fn map(&self, f: impl Fn(Point) -> Point) -> Self {
        Self(self.0.iter().map(|&p| f(p)).collect())
    }

    /// The 8 symmetry variants: 4 rotations, each with and without reflection
    pub fn variations(&self) -> [Mino; 8] {
        [
            self.clone(),
            self.map(Point::rotate90),
            self.map(Point::rotate180),
            self.map(Point::rotate270),
            self.map(Point::reflect),
            self.map(|p| p.reflect().rotate90()),
            self.map(|p| p.reflect().rotate180()),
            self.map(|p| p.reflect().rotate270()),
        ]
    }

    /// Canonical representative of this shape's free polyomino class
    pub fn canonical(&self) -> Self {
        let mut best: Option<(String, Mino)> = None;
        for variant in self.variations() {
            let flat = variant.flatten();
            let key = flat.to_string();
            match &best {
                Some((best_key, _)) if *best_key <= key => {}
                _ => best = Some((key, flat)),
            }
        }
        best.map(|(_, m)| m).unwrap_or_else(|| Self(Vec::new()))
    }

    /// Empty cells edge-adjacent to the shape, sorted and deduplicated
    pub fn neighborhood(&self) -> Vec<Point> {
        let own: BTreeSet<Point> = self.0.iter().copied().collect();
        let mut out = BTreeSet::new();
        for p in &self.0 {
            for n in p.neighbors() {
                if !own.contains(&n) {
                    out.insert(n);
                }
            }
        }
        out.into_iter().collect()
    }

    /// A copy of this shape with one extra cell appended
    pub fn with_cell(&self, cell: Point) -> Self {
        let mut points = self.0.clone();
        points.push(cell);
        Self(points)
    }

    /// Whether all cells lie in a single row or column
    pub fn is_line(&self) -> bool {
        self.len() > 1 && (self.width() == 1 || self.height() == 1)
    }

    /// Whether the shape is exactly a filled 2x2 square
    pub fn is_square(&self) -> bool {
        self.len() == 4 && self.width() == 2 && self.height() == 2
    }
}

impl fmt::Display for Mino {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.0 {
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mino(points: &[(i32, i32)]) -> Mino {
        Mino::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    #[test]
    fn test_flatten_translates_to_origin() {
        let m = mino(&[(3, 5), (4, 5), (3, 6)]).flatten();
        assert_eq!(m, mino(&[(0, 0), (0, 1), (1, 0)]));
        assert_eq!(m.to_string(), "(0,0)(0,1)(1,0)");
    }

    #[test]
    fn test_canonical_is_rotation_invariant() {
        let l = mino(&[(0, 0), (0, 1), (0, 2), (1, 0)]);
        let canonical = l.canonical();
        for variant in l.variations() {
            assert_eq!(variant.canonical(), canonical);
        }
        for variant in l.translate(Point::new(7, -3)).variations() {
            assert_eq!(variant.canonical(), canonical);
        }
    }

    #[test]
    fn test_reflections_share_canonical_form() {
        let s = mino(&[(1, 0), (2, 0), (0, 1), (1, 1)]);
        let z = mino(&[(0, 0), (1, 0), (1, 1), (2, 1)]);
        assert_eq!(s.canonical(), z.canonical());
    }

    #[test]
    fn test_neighborhood_of_unit() {
        let n = Mino::unit().neighborhood();
        assert_eq!(n.len(), 4);
        assert!(n.contains(&Point::new(-1, 0)));
        assert!(n.contains(&Point::new(0, 1)));
    }

    #[test]
    fn test_line_and_square() {
        assert!(mino(&[(0, 0), (1, 0), (2, 0), (3, 0)]).is_line());
        assert!(mino(&[(0, 0), (0, 1)]).is_line());
        assert!(!Mino::unit().is_line());
        assert!(mino(&[(0, 0), (1, 0), (0, 1), (1, 1)]).is_square());
        assert!(!mino(&[(0, 0), (1, 0), (2, 0), (1, 1)]).is_square());
    }

    #[test]
    fn test_dimensions() {
        let t = mino(&[(0, 0), (1, 0), (2, 0), (1, 1)]);
        assert_eq!(t.width(), 3);
        assert_eq!(t.height(), 2);
        assert_eq!(Mino::new(Vec::new()).width(), 0);
    }
}
