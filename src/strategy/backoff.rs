// Time-based relaxation of the reversal threshold
//
// The longer the price sits away from the last trade without a new grid
// high, the less reversal is required to trade. Past the third tier a stale
// position is closed outright, but only when the reversal is meaningful
// relative to the current true range.

use crate::config::StrategyParameters;
use crate::models::Trend;

/// Distance from the last trade, in grid widths, that enables tiers 2 and 3
pub const DISTANCE_TRIGGER_GRIDS: f64 = 1.5;
/// Forced exits need a correction above this fraction of ATR
pub const FORCED_EXIT_ATR_FRACTION: f64 = 0.5;
/// The effective threshold never exceeds this multiple of ATR
pub const ATR_THRESHOLD_MULTIPLE: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackoffTier {
    Fresh,
    First,
    Second,
    Third,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffInput {
    pub elapsed_secs: Option<f64>,
    pub base_threshold: f64,
    pub distance_grids: Option<f64>,
    pub direction: Trend,
    pub tendency: Trend,
    pub correction: f64,
    pub atr: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffOutcome {
    pub tier: BackoffTier,
    pub threshold: f64,
    pub force_exit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    first_secs: f64,
    second_secs: f64,
    third_secs: f64,
}

impl BackoffPolicy {
    pub fn new(first_secs: u64, second_secs: u64, third_secs: u64) -> Self {
        Self {
            first_secs: first_secs as f64,
            second_secs: second_secs as f64,
            third_secs: third_secs as f64,
        }
    }

    pub fn from_params(params: &StrategyParameters) -> Self {
        Self::new(
            params.backoff_1st_secs,
            params.backoff_2nd_secs,
            params.backoff_3rd_secs,
        )
    }

    /// Highest tier strictly exceeded
    ///
    /// A clock that was never started counts as past every tier. Without a
    /// prior trade there is no distance, so that only halves the threshold.
    pub fn tier(&self, elapsed_secs: Option<f64>) -> BackoffTier {
        let Some(e) = elapsed_secs else {
            return BackoffTier::Third;
        };
        if e > self.third_secs {
            BackoffTier::Third
        } else if e > self.second_secs {
            BackoffTier::Second
        } else if e > self.first_secs {
            BackoffTier::First
        } else {
            BackoffTier::Fresh
        }
    }

    pub fn evaluate(&self, input: &BackoffInput) -> BackoffOutcome {
        let tier = self.tier(input.elapsed_secs);
        let mut threshold = input.base_threshold;

        // Stretched away from the last trade and reversing toward it
        let stretched = input
            .distance_grids
            .map_or(false, |d| d > DISTANCE_TRIGGER_GRIDS)
            && input.direction.opposes(input.tendency);

        if tier >= BackoffTier::First {
            threshold *= 0.5;
        }
        if tier >= BackoffTier::Second && stretched {
            threshold *= 0.5;
        }

        let force_exit = tier == BackoffTier::Third
            && stretched
            && input.correction.abs() > input.atr * FORCED_EXIT_ATR_FRACTION;

        BackoffOutcome {
            tier,
            threshold,
            force_exit,
        }
    }
}

/// Distance between the current price and the last trade, in grid widths
///
/// Rising prices are measured against the lower of the two, falling
/// prices against the higher. None without a prior trade.
pub fn price_distance_grids(
    current: f64,
    last_trade: Option<f64>,
    direction: Trend,
    grid_width: f64,
) -> Option<f64> {
    let last_trade = last_trade?;
    let denominator = if direction == Trend::Up {
        current.min(last_trade)
    } else {
        current.max(last_trade)
    };
    if denominator <= 0.0 || grid_width <= 0.0 {
        return None;
    }

    Some((current - last_trade).abs() / denominator / grid_width)
}

/// Whether the reversal clears the decayed threshold, capped by ATR
pub fn clears_threshold(correction: f64, threshold: f64, atr: f64) -> bool {
    correction.abs() > threshold.min(atr * ATR_THRESHOLD_MULTIPLE)
}
