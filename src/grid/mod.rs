// Geometric price grid
// Levels are rounded to three decimals so comparisons stay exact across ticks

use crate::error::GridError;
use crate::Result;

const LEVEL_PRECISION: f64 = 1000.0;

fn round_level(price: f64) -> f64 {
    (price * LEVEL_PRECISION).round() / LEVEL_PRECISION
}

/// Immutable, strictly increasing ladder of price levels
#[derive(Debug, Clone, PartialEq)]
pub struct PriceGrid {
    base_price: f64,
    levels: Vec<f64>,
}

impl PriceGrid {
    /// Build the grid around `base_price`
    ///
    /// Fails with a configuration error when `min_price` is not positive,
    /// when `min_price >= max_price`, when the base lies outside
    /// `[min_price, max_price]` or when the width is not in `(0, 1)`.
    pub fn build(base_price: f64, min_price: f64, max_price: f64, width: f64) -> Result<Self> {
        // A geometric walk down never reaches zero
        if !(min_price > 0.0) {
            return Err(GridError::Config(format!(
                "min price {} must be positive",
                min_price
            )));
        }
        if !(min_price < max_price) {
            return Err(GridError::Config(format!(
                "min price {} must be below max price {}",
                min_price, max_price
            )));
        }
        if !(min_price <= base_price && base_price <= max_price) {
            return Err(GridError::Config(format!(
                "base price {} must lie within [{}, {}]",
                base_price, min_price, max_price
            )));
        }
        if !(width > 0.0 && width < 1.0) {
            return Err(GridError::Config(format!(
                "grid width {} must be within (0, 1)",
                width
            )));
        }

        let mut levels = Vec::new();

        // Walk up
        let mut price = base_price;
        let mut last_level = round_level(base_price);
        loop {
            price += price * width;
            let level = round_level(price);
            if price > max_price || level == last_level {
                break;
            }
            levels.push(level);
            last_level = level;
        }

        // Walk down; stops early once rounding collapses neighbouring levels
        price = base_price;
        last_level = round_level(base_price);
        loop {
            price -= price * width;
            let level = round_level(price);
            if price < min_price || level == last_level {
                break;
            }
            levels.push(level);
            last_level = level;
        }

        levels.push(base_price);
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup();
        // Rounding can push a level just outside the bounds
        levels.retain(|&level| level >= min_price && level <= max_price);

        tracing::debug!(
            "Built price grid: base={}, {} levels in [{}, {}]",
            base_price,
            levels.len(),
            min_price,
            max_price
        );

        Ok(Self { base_price, levels })
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Signed number of grid cells between two prices
    ///
    /// Counts levels in `[min(a, b), max(a, b)]`; the result is that count
    /// minus one, positive when `a > b`, with magnitude clamped to `cap`.
    /// Missing or equal endpoints give 0.
    pub fn count_levels_between(&self, a: Option<f64>, b: Option<f64>, cap: u32) -> i32 {
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) if a != b => (a, b),
            _ => return 0,
        };

        let (lower, upper) = if a < b { (a, b) } else { (b, a) };
        let count = self
            .levels
            .iter()
            .filter(|&&level| level >= lower && level <= upper)
            .count();

        if count <= 1 {
            return 0;
        }

        let cells = ((count - 1) as u64).min(cap as u64) as i32;
        if a > b {
            cells
        } else {
            -cells
        }
    }
}
