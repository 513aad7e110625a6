// Order decision state machine, pure over one tick's inputs
use std::fmt;

use crate::config::StrategyParameters;
use crate::models::Trend;

use super::backoff::{clears_threshold, price_distance_grids, BackoffInput, BackoffPolicy, BackoffTier};

/// Why an order is being placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderReason {
    Drawdown,
    Bounce,
    ForcedExit,
    UpperTurningPoint,
    LowerTurningPoint,
}

impl fmt::Display for OrderReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OrderReason::Drawdown => "drawdown order",
            OrderReason::Bounce => "bounce order",
            OrderReason::ForcedExit => "backoff timeout exit",
            OrderReason::UpperTurningPoint => "intra-grid upper turning point",
            OrderReason::LowerTurningPoint => "intra-grid lower turning point",
        };
        f.write_str(text)
    }
}

/// Order produced by one decision cycle; never persisted
///
/// A positive `grid_count` means the price crossed levels upward, which
/// sells; a negative one buys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderIntent {
    pub grid_count: i32,
    pub direction: Trend,
    pub reason: OrderReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Tendency is flat or direction does not oppose it
    Skip,
    /// Reversal has not cleared the threshold yet
    Wait { correction: f64, threshold: f64 },
    /// Threshold cleared, but no grid level or turning point was crossed
    Hold,
    Order(OrderIntent),
}

/// Everything one decision cycle looks at
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub asset: &'a str,
    pub price: f64,
    pub last_trade_price: Option<f64>,
    pub direction: Trend,
    pub tendency: Trend,
    pub correction: f64,
    pub grid_count: i32,
    pub upper_turning_count: i32,
    pub lower_turning_count: i32,
    pub elapsed_secs: Option<f64>,
    /// ATR as a fraction of the current price
    pub atr: f64,
}

/// Run the order decision state machine for one tick
pub fn evaluate(params: &StrategyParameters, input: &DecisionInput<'_>) -> Decision {
    let asset = input.asset;

    // Never trade with a confirmed move
    if !input.direction.opposes(input.tendency) {
        return Decision::Skip;
    }

    let base_threshold = if input.direction == Trend::Down {
        params.max_drawdown
    } else {
        params.max_bounce
    };
    let distance_grids = price_distance_grids(
        input.price,
        input.last_trade_price,
        input.direction,
        params.grid_width,
    );

    let backoff = BackoffPolicy::from_params(params).evaluate(&BackoffInput {
        elapsed_secs: input.elapsed_secs,
        base_threshold,
        distance_grids,
        direction: input.direction,
        tendency: input.tendency,
        correction: input.correction,
        atr: input.atr,
    });

    if backoff.tier > BackoffTier::Fresh {
        tracing::info!(
            asset = %asset,
            "Backoff {:?}: {} since reset, threshold {:.2}%, {:.2} grids from last trade",
            backoff.tier,
            input
                .elapsed_secs
                .map_or_else(|| "never".to_string(), |e| format!("{:.0} min", e / 60.0)),
            backoff.threshold * 100.0,
            distance_grids.unwrap_or_default()
        );
    }

    if backoff.force_exit {
        tracing::info!(
            asset = %asset,
            "Correction {:.2}% above half ATR {:.2}%, closing stale position",
            input.correction.abs() * 100.0,
            input.atr * 50.0
        );
        return Decision::Order(OrderIntent {
            grid_count: -input.direction.signum(),
            direction: input.direction,
            reason: OrderReason::ForcedExit,
        });
    }

    if !clears_threshold(input.correction, backoff.threshold, input.atr) {
        return Decision::Wait {
            correction: input.correction,
            threshold: backoff.threshold,
        };
    }

    if input.grid_count != 0 {
        let reason = if input.direction == Trend::Down {
            OrderReason::Drawdown
        } else {
            OrderReason::Bounce
        };
        tracing::info!(
            asset = %asset,
            "{} crossed {} grid levels",
            input.price,
            input.grid_count
        );
        return Decision::Order(OrderIntent {
            grid_count: input.grid_count,
            direction: input.direction,
            reason,
        });
    }

    if params.enable_intra_grid_trading {
        if input.direction == Trend::Down && input.upper_turning_count != 0 {
            return Decision::Order(OrderIntent {
                grid_count: 1,
                direction: input.direction,
                reason: OrderReason::UpperTurningPoint,
            });
        }
        if input.direction == Trend::Up && input.lower_turning_count != 0 {
            return Decision::Order(OrderIntent {
                grid_count: -1,
                direction: input.direction,
                reason: OrderReason::LowerTurningPoint,
            });
        }
    }

    Decision::Hold
}
