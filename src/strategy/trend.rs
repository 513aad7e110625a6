// Direction, tendency and turning-point tracking
//
// Direction is the tick-over-tick sign of the price move. Tendency is the
// sign relative to the last trade, so it only changes slowly. A turning
// point is a local extreme where direction flips against the tendency.

use crate::models::{PriceObservation, Trend};

use super::state::ReferenceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurningPoint {
    Upper,
    Lower,
}

/// Current price for this tick
///
/// Precedence: the live feed sample, else the previous sample.
pub fn resolve_current_price(
    live: Option<PriceObservation>,
    previous: Option<PriceObservation>,
) -> Option<PriceObservation> {
    live.or(previous)
}

/// Base price for a freshly built grid
///
/// Precedence: the persisted base, else the current sample.
pub fn resolve_grid_base(
    persisted: Option<PriceObservation>,
    current: PriceObservation,
) -> PriceObservation {
    persisted.unwrap_or(current)
}

/// Price the tendency is measured against
///
/// Precedence: the last trade price, else the grid base price.
pub fn tendency_reference(last_trade: Option<f64>, grid_base: Option<f64>) -> Option<f64> {
    last_trade.or(grid_base)
}

/// Tick-over-tick direction; flat until a previous sample exists
pub fn find_direction(current: f64, previous: Option<f64>) -> Trend {
    match previous {
        Some(previous) => Trend::between(current, previous),
        None => Trend::Flat,
    }
}

pub fn find_tendency(current: f64, reference: Option<f64>) -> Trend {
    match reference {
        Some(reference) => Trend::between(current, reference),
        None => Trend::Flat,
    }
}

/// Record a turning point when direction flips against the tendency
///
/// The *previous* sample is the extreme. A lower turning point is only
/// replaced by a lower price, an upper one only by a higher price.
pub fn refresh_turning_points(
    reference: &mut ReferenceState,
    direction: Trend,
    tendency: Trend,
    current: PriceObservation,
    previous: Option<PriceObservation>,
) -> Option<TurningPoint> {
    let previous = previous?;

    match (direction, tendency) {
        (Trend::Up, Trend::Down) => {
            let improves = reference
                .last_lower_turning
                .map_or(true, |lower| current.price < lower.price);
            if improves {
                reference.last_lower_turning = Some(previous);
                return Some(TurningPoint::Lower);
            }
        }
        (Trend::Down, Trend::Up) => {
            let improves = reference
                .last_upper_turning
                .map_or(true, |upper| current.price > upper.price);
            if improves {
                reference.last_upper_turning = Some(previous);
                return Some(TurningPoint::Upper);
            }
        }
        _ => {}
    }

    None
}

/// Fractional distance from the turning point the price is reversing away from
///
/// Moving up measures the bounce off the lower turning point (positive);
/// moving down measures the pullback from the upper one (negative). Zero
/// when flat or when that turning point has not been recorded.
pub fn correction(direction: Trend, current: f64, reference: &ReferenceState) -> f64 {
    let anchor = match direction {
        Trend::Up => reference.last_lower_turning,
        Trend::Down => reference.last_upper_turning,
        Trend::Flat => None,
    };

    match anchor {
        Some(anchor) if anchor.price > 0.0 => (current - anchor.price) / anchor.price,
        _ => 0.0,
    }
}
