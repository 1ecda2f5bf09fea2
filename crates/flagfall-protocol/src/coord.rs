use serde::{Deserialize, Serialize};

/// Row/column cell coordinate. Signed so intermediate arithmetic
/// (neighborhood scans, knockback) can step off-board before the bounds
/// check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub r: i32,
    pub c: i32,
}

impl Coord {
    #[inline]
    pub const fn new(r: i32, c: i32) -> Self {
        Self { r, c }
    }

    /// Taxicab distance; movement, attack range and most ability ranges.
    #[inline]
    pub fn manhattan(self, other: Coord) -> i32 {
        (self.r - other.r).abs() + (self.c - other.c).abs()
    }

    /// King-move distance; blast footprints and aura zones.
    #[inline]
    pub fn chebyshev(self, other: Coord) -> i32 {
        (self.r - other.r).abs().max((self.c - other.c).abs())
    }

    /// True when the displacement to `other` is purely horizontal or
    /// purely vertical.
    #[inline]
    pub fn is_cardinal_to(self, other: Coord) -> bool {
        self.r == other.r || self.c == other.c
    }

    #[inline]
    pub fn offset(self, dr: i32, dc: i32) -> Coord {
        Coord::new(self.r + dr, self.c + dc)
    }

    /// Unit step (per axis sign) pointing from `self` towards `other`.
    pub fn step_towards(self, other: Coord) -> (i32, i32) {
        ((other.r - self.r).signum(), (other.c - self.c).signum())
    }

    /// The 3x3 neighborhood including the center, row-major.
    pub fn neighborhood3(self) -> impl Iterator<Item = Coord> {
        (-1..=1).flat_map(move |dr| (-1..=1).map(move |dc| self.offset(dr, dc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances() {
        let a = Coord::new(2, 3);
        let b = Coord::new(4, 0);
        assert_eq!(a.manhattan(b), 5);
        assert_eq!(a.chebyshev(b), 3);
        assert!(!a.is_cardinal_to(b));
        assert!(a.is_cardinal_to(Coord::new(2, 10)));
    }

    #[test]
    fn neighborhood_covers_nine_cells() {
        let cells: Vec<_> = Coord::new(0, 0).neighborhood3().collect();
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&Coord::new(-1, -1)));
        assert!(cells.contains(&Coord::new(1, 1)));
    }

    #[test]
    fn step_towards_is_axis_signs() {
        let from = Coord::new(3, 3);
        assert_eq!(from.step_towards(Coord::new(3, 7)), (0, 1));
        assert_eq!(from.step_towards(Coord::new(0, 3)), (-1, 0));
        assert_eq!(from.step_towards(from), (0, 0));
    }
}
