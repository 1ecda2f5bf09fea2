use serde::{Deserialize, Serialize};

use flagfall_protocol::{BoardSnapshot, CellSnapshot, Coord, OreSize, PlayerId};

use crate::{rules::Rules, GameRng};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Cell {
    pub obstacle: bool,
    pub ore: Option<OreSize>,
    pub flag_base: Option<PlayerId>,
}

/// Static cell metadata: obstacles, flag bases, ore deposits. Row-major.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Board {
    rows: i32,
    cols: i32,
    cells: Vec<Cell>,
}

impl Board {
    pub fn empty(rows: i32, cols: i32) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::default(); (rows * cols) as usize],
        }
    }

    #[inline]
    pub fn rows(&self) -> i32 {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> i32 {
        self.cols
    }

    #[inline]
    pub fn in_bounds(&self, at: Coord) -> bool {
        at.r >= 0 && at.r < self.rows && at.c >= 0 && at.c < self.cols
    }

    pub fn cell(&self, at: Coord) -> Option<&Cell> {
        if !self.in_bounds(at) {
            return None;
        }
        Some(&self.cells[(at.r * self.cols + at.c) as usize])
    }

    pub fn cell_mut(&mut self, at: Coord) -> Option<&mut Cell> {
        if !self.in_bounds(at) {
            return None;
        }
        Some(&mut self.cells[(at.r * self.cols + at.c) as usize])
    }

    #[inline]
    pub fn is_obstacle(&self, at: Coord) -> bool {
        self.cell(at).is_some_and(|c| c.obstacle)
    }

    pub fn flag_base(&self, player: PlayerId) -> Coord {
        let mid = self.rows / 2;
        if player == PlayerId::ONE {
            Coord::new(mid, 0)
        } else {
            Coord::new(mid, self.cols - 1)
        }
    }

    pub fn iter_coords(&self) -> impl Iterator<Item = Coord> + '_ {
        (0..self.rows).flat_map(move |r| (0..self.cols).map(move |c| Coord::new(r, c)))
    }

    pub fn to_snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            rows: self.rows as u32,
            cols: self.cols as u32,
            cells: self
                .cells
                .iter()
                .map(|cell| CellSnapshot {
                    obstacle: cell.obstacle,
                    ore: cell.ore,
                    flag_base: cell.flag_base,
                })
                .collect(),
        }
    }
}

/// A freshly generated board plus the roster start slots, one per archetype
/// in `Archetype::ALL` order for each player.
#[derive(Clone, Debug)]
pub struct GeneratedBoard {
    pub board: Board,
    pub start_positions: [[Coord; 5]; 2],
}

/// Seeded board setup: flag bases, per-side obstacles, initial ore, and
/// the ten start slots.
pub fn generate_board(rules: &Rules, rng: &mut GameRng) -> GeneratedBoard {
    let mut board = Board::empty(rules.grid_rows, rules.grid_cols);

    for player in [PlayerId::ONE, PlayerId::TWO] {
        let base = board.flag_base(player);
        board.cell_mut(base).expect("flag base in-bounds").flag_base = Some(player);
    }

    place_obstacles(rules, &mut board, rng);
    seed_ore(rules, &mut board, rng);

    let start_positions = [
        roll_start_positions(rules, &board, PlayerId::ONE, rng),
        roll_start_positions(rules, &board, PlayerId::TWO, rng),
    ];

    GeneratedBoard {
        board,
        start_positions,
    }
}

fn place_obstacles(rules: &Rules, board: &mut Board, rng: &mut GameRng) {
    let mid = rules.midline_col();
    let sides = [
        (rules.home_cols, mid),
        (mid, rules.grid_cols - rules.home_cols),
    ];

    for (col_lo, col_hi) in sides {
        let mut placed = 0;
        let mut attempts = 0;
        while placed < rules.obstacles_per_side && attempts < 1000 {
            attempts += 1;
            let at = Coord::new(
                rng.gen_range_i32(0..board.rows()),
                rng.gen_range_i32(col_lo..col_hi),
            );
            let cell = board.cell(at).expect("rolled in-bounds");
            if cell.obstacle || cell.flag_base.is_some() {
                continue;
            }
            // no two obstacles may touch, diagonals included
            let touches = at
                .neighborhood3()
                .any(|n| n != at && board.cell(n).is_some_and(|c| c.obstacle));
            if touches {
                continue;
            }
            board.cell_mut(at).expect("in-bounds").obstacle = true;
            placed += 1;
        }
    }
}

fn seed_ore(rules: &Rules, board: &mut Board, rng: &mut GameRng) {
    for r in 0..board.rows() {
        for c in rules.ore_min_col..=rules.ore_max_col {
            let at = Coord::new(r, c);
            let cell = board.cell(at).expect("ore column in-bounds");
            if cell.obstacle || cell.flag_base.is_some() {
                continue;
            }
            if rng.chance(rules.ore_initial_chance) {
                let size = roll_ore_size(rng);
                board.cell_mut(at).expect("in-bounds").ore = Some(size);
            }
        }
    }
}

pub fn roll_ore_size(rng: &mut GameRng) -> OreSize {
    let roll = rng.next_f32();
    if roll < 0.6 {
        OreSize::Small
    } else if roll < 0.9 {
        OreSize::Medium
    } else {
        OreSize::Large
    }
}

/// Five start slots on distinct rows of the player's home columns, never
/// on the flag row.
fn roll_start_positions(
    rules: &Rules,
    board: &Board,
    player: PlayerId,
    rng: &mut GameRng,
) -> [Coord; 5] {
    let (col_lo, col_hi) = if player == PlayerId::ONE {
        (0, rules.home_cols)
    } else {
        (rules.grid_cols - rules.home_cols, rules.grid_cols)
    };
    let flag_row = board.rows() / 2;

    let mut rows: Vec<i32> = (0..board.rows()).filter(|&r| r != flag_row).collect();
    // Fisher-Yates, then take the first five
    for i in (1..rows.len()).rev() {
        let j = rng.pick_index(i + 1);
        rows.swap(i, j);
    }

    let mut out = [Coord::new(0, 0); 5];
    for (slot, &row) in out.iter_mut().zip(rows.iter().take(5)) {
        loop {
            let at = Coord::new(row, rng.gen_range_i32(col_lo..col_hi));
            if !board.is_obstacle(at) {
                *slot = at;
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic() {
        let rules = Rules::standard();
        let a = generate_board(&rules, &mut GameRng::seed_from_u64(42));
        let b = generate_board(&rules, &mut GameRng::seed_from_u64(42));
        assert_eq!(a.start_positions, b.start_positions);
        for at in a.board.iter_coords() {
            let ca = a.board.cell(at).unwrap();
            let cb = b.board.cell(at).unwrap();
            assert_eq!(ca.obstacle, cb.obstacle);
            assert_eq!(ca.ore, cb.ore);
        }
    }

    #[test]
    fn flag_bases_sit_on_the_middle_row() {
        let rules = Rules::standard();
        let gen = generate_board(&rules, &mut GameRng::seed_from_u64(1));
        assert_eq!(gen.board.flag_base(PlayerId::ONE), Coord::new(3, 0));
        assert_eq!(gen.board.flag_base(PlayerId::TWO), Coord::new(3, 23));
        assert_eq!(
            gen.board.cell(Coord::new(3, 0)).unwrap().flag_base,
            Some(PlayerId::ONE)
        );
    }

    #[test]
    fn obstacles_stay_in_the_neutral_band_and_never_touch() {
        let rules = Rules::standard();
        let gen = generate_board(&rules, &mut GameRng::seed_from_u64(7));
        let mut count = 0;
        for at in gen.board.iter_coords() {
            if !gen.board.is_obstacle(at) {
                continue;
            }
            count += 1;
            assert!((rules.home_cols..rules.grid_cols - rules.home_cols).contains(&at.c));
            for n in at.neighborhood3() {
                if n != at {
                    assert!(!gen.board.is_obstacle(n), "adjacent obstacles at {at:?}");
                }
            }
        }
        assert_eq!(count, 8);
    }

    #[test]
    fn start_slots_are_home_side_distinct_rows() {
        let rules = Rules::standard();
        let gen = generate_board(&rules, &mut GameRng::seed_from_u64(3));
        for (idx, slots) in gen.start_positions.iter().enumerate() {
            let mut rows: Vec<i32> = slots.iter().map(|s| s.r).collect();
            rows.sort_unstable();
            rows.dedup();
            assert_eq!(rows.len(), 5, "rows must be distinct");
            for s in slots {
                assert_ne!(s.r, 3, "flag row is reserved");
                if idx == 0 {
                    assert!(s.c < rules.home_cols);
                } else {
                    assert!(s.c >= rules.grid_cols - rules.home_cols);
                }
            }
        }
    }
}
