//! Tombala card model and generator
//!
//! A card is a grid of `rows` x 9 cells. Column `c` draws from its decade
//! (1-9, 10-19, ..., 80-90), every row holds the same count of numbers, and
//! numbers inside a column ascend from top to bottom.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::types::{in_range, Number, MAX_NUMBER, MIN_NUMBER};

/// Number of columns on every card, one per decade
pub const COLUMNS: usize = 9;

/// Cosmetic card themes
pub const CARD_THEMES: [&str; 8] = [
    "theme-red",
    "theme-blue",
    "theme-green",
    "theme-purple",
    "theme-orange",
    "theme-teal",
    "theme-pink",
    "theme-yellow",
];

/// Numbers allowed in the given column
pub fn column_range(col: usize) -> RangeInclusive<Number> {
    let start = if col == 0 { MIN_NUMBER } else { (col * 10) as Number };
    let end = if col >= COLUMNS - 1 {
        MAX_NUMBER
    } else {
        (col * 10 + 9) as Number
    };
    start..=end
}

/// Column that a number belongs to
pub fn column_for(number: Number) -> Option<usize> {
    if !in_range(number as u32) {
        return None;
    }
    Some(((number / 10) as usize).min(COLUMNS - 1))
}

/// Card shape parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardLayout {
    /// Rows per card (R)
    pub rows: usize,
    /// Numbers in every row (K)
    pub numbers_per_row: usize,
    /// Upper bound of numbers in one column across all rows (M)
    pub max_per_column: usize,
}

impl Default for CardLayout {
    fn default() -> Self {
        Self {
            rows: 3,
            numbers_per_row: 5,
            max_per_column: 3,
        }
    }
}

impl CardLayout {
    /// True when the layout cannot always yield `numbers_per_row` in every row
    /// while covering every column.
    pub fn is_degenerate(&self) -> bool {
        let total = self.rows * self.numbers_per_row;
        total < COLUMNS || total > COLUMNS * self.max_per_column || self.max_per_column > self.rows
    }
}

/// A single Tombala card
///
/// Immutable once generated; `rows[r][c]` is `None` for an empty cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub rows: Vec<Vec<Option<Number>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl Card {
    /// All numbers on the card, row by row
    pub fn numbers(&self) -> impl Iterator<Item = Number> + '_ {
        self.rows.iter().flatten().flatten().copied()
    }

    /// Numbers in one row, left to right
    pub fn row_numbers(&self, row: usize) -> impl Iterator<Item = Number> + '_ {
        self.rows.get(row).into_iter().flatten().flatten().copied()
    }

    pub fn contains(&self, number: Number) -> bool {
        self.numbers().any(|n| n == number)
    }

    /// Check every layout rule, reporting the first violation
    pub fn validate(&self, layout: &CardLayout) -> Result<(), AppError> {
        let invalid = |msg: String| Err(AppError::InvalidCard(msg));

        if self.rows.len() != layout.rows {
            return invalid(format!("expected {} rows, got {}", layout.rows, self.rows.len()));
        }

        let mut seen = HashSet::new();
        for (r, row) in self.rows.iter().enumerate() {
            if row.len() != COLUMNS {
                return invalid(format!("row {} has {} cells", r, row.len()));
            }
            let count = row.iter().flatten().count();
            if count != layout.numbers_per_row {
                return invalid(format!("row {} has {} numbers", r, count));
            }
            for (c, cell) in row.iter().enumerate() {
                let Some(n) = *cell else { continue };
                if !column_range(c).contains(&n) {
                    return invalid(format!("{} does not belong in column {}", n, c));
                }
                if !seen.insert(n) {
                    return invalid(format!("{} appears twice", n));
                }
            }
        }

        for c in 0..COLUMNS {
            let column: Vec<Number> = self.rows.iter().filter_map(|row| row[c]).collect();
            if column.is_empty() || column.len() > layout.max_per_column {
                return invalid(format!("column {} has {} numbers", c, column.len()));
            }
            if column.windows(2).any(|w| w[0] >= w[1]) {
                return invalid(format!("column {} is not ascending", c));
            }
        }

        Ok(())
    }
}

type Grid = Vec<[Option<Number>; COLUMNS]>;

/// Random card generator
///
/// Builds a card in three phases: column coverage, row fill, and
/// within-column order normalization. Never backtracks.
#[derive(Debug, Clone)]
pub struct CardGenerator {
    layout: CardLayout,
}

impl Default for CardGenerator {
    fn default() -> Self {
        Self {
            layout: CardLayout::default(),
        }
    }
}

impl CardGenerator {
    /// Create a generator for a custom layout
    ///
    /// Layouts that cannot hold a card at all are rejected. Layouts that
    /// can produce short rows are accepted but flagged.
    pub fn new(layout: CardLayout) -> Result<Self, AppError> {
        if layout.rows == 0 || layout.numbers_per_row > COLUMNS || layout.max_per_column == 0 {
            return Err(AppError::InvalidCard(format!("unusable layout {:?}", layout)));
        }
        if layout.is_degenerate() {
            warn!(?layout, "Card layout may produce rows below the target count");
        }
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &CardLayout {
        &self.layout
    }

    /// Generate a single card
    pub fn generate(&self) -> Card {
        let mut rng = rand::thread_rng();
        let layout = self.layout;
        let mut grid: Grid = vec![[None; COLUMNS]; layout.rows];
        let mut column_counts = [0usize; COLUMNS];
        let mut used = HashSet::new();

        // Coverage: one number per column, in a random row that still has room
        for col in 0..COLUMNS {
            let Some(number) = pick_unused(&mut rng, col, &used) else {
                continue;
            };
            let open_rows: Vec<usize> = (0..layout.rows)
                .filter(|&r| grid[r].iter().flatten().count() < layout.numbers_per_row)
                .collect();
            let row = match open_rows.choose(&mut rng) {
                Some(&r) => r,
                None => rng.gen_range(0..layout.rows),
            };
            grid[row][col] = Some(number);
            used.insert(number);
            column_counts[col] += 1;
        }

        // Fill: top up each row to the target count
        for row in 0..layout.rows {
            let mut placed = grid[row].iter().flatten().count();
            if placed >= layout.numbers_per_row {
                continue;
            }

            let mut empty: Vec<usize> = (0..COLUMNS).filter(|&c| grid[row][c].is_none()).collect();
            empty.shuffle(&mut rng);

            for col in empty {
                if placed >= layout.numbers_per_row {
                    break;
                }
                if column_counts[col] >= layout.max_per_column {
                    continue;
                }
                if let Some(number) = pick_unused(&mut rng, col, &used) {
                    grid[row][col] = Some(number);
                    used.insert(number);
                    column_counts[col] += 1;
                    placed += 1;
                }
            }

            if placed < layout.numbers_per_row {
                warn!(
                    row,
                    placed,
                    target = layout.numbers_per_row,
                    "Card row could not be filled to the target count"
                );
            }
        }

        normalize_columns(&mut grid);
        enforce_ascending(&mut grid);

        Card {
            id: format!("card_{}", Uuid::new_v4().simple()),
            rows: grid.into_iter().map(|row| row.to_vec()).collect(),
            theme: CARD_THEMES.choose(&mut rng).map(|t| t.to_string()),
        }
    }

    /// Generate `count` independent cards
    pub fn generate_many(&self, count: usize) -> Vec<Card> {
        (0..count).map(|_| self.generate()).collect()
    }
}

fn pick_unused(rng: &mut impl Rng, col: usize, used: &HashSet<Number>) -> Option<Number> {
    column_range(col).filter(|n| !used.contains(n)).choose(rng)
}

/// Sort each column's values into the rows that already hold a number there.
/// Row counts are untouched.
fn normalize_columns(grid: &mut Grid) {
    for col in 0..COLUMNS {
        let occupied: Vec<usize> = (0..grid.len()).filter(|&r| grid[r][col].is_some()).collect();
        if occupied.len() < 2 {
            continue;
        }
        let mut values: Vec<Number> = occupied.iter().filter_map(|&r| grid[r][col]).collect();
        values.sort_unstable();
        for (&row, value) in occupied.iter().zip(values) {
            grid[row][col] = Some(value);
        }
    }
}

/// Swap adjacent occupied cells until every column strictly ascends
fn enforce_ascending(grid: &mut Grid) {
    for col in 0..COLUMNS {
        let occupied: Vec<usize> = (0..grid.len()).filter(|&r| grid[r][col].is_some()).collect();
        let mut swapped = true;
        while swapped {
            swapped = false;
            for pair in occupied.windows(2) {
                let (upper, lower) = (pair[0], pair[1]);
                if let (Some(a), Some(b)) = (grid[upper][col], grid[lower][col]) {
                    if a > b {
                        grid[upper][col] = Some(b);
                        grid[lower][col] = Some(a);
                        swapped = true;
                    }
                }
            }
        }
    }
}
