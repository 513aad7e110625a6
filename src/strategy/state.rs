use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

use crate::error::GridError;
use crate::grid::PriceGrid;
use crate::models::{PriceObservation, Trend};
use crate::persistence::StateBag;
use crate::Result;

/// Samples kept for the volatility estimate
pub const RECENT_PRICES_CAPACITY: usize = 60;

/// Reference prices that must survive a restart
///
/// Each field is stored under its own key so the store can apply partial
/// updates. Missing keys load as their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReferenceState {
    pub last_trade: Option<PriceObservation>,
    pub last_upper_turning: Option<PriceObservation>,
    pub last_lower_turning: Option<PriceObservation>,
    pub grid_base: Option<PriceObservation>,
    pub last_reset_grid_count: u32,
    pub direction: Trend,
    pub tendency: Trend,
    pub is_position_created: bool,
}

impl ReferenceState {
    pub fn from_bag(bag: StateBag) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(bag))?)
    }

    pub fn to_bag(&self) -> Result<StateBag> {
        match serde_json::to_value(self)? {
            Value::Object(bag) => Ok(bag),
            other => Err(GridError::Store(format!(
                "reference state serialized to a non-object: {}",
                other
            ))),
        }
    }

    pub fn last_trade_price(&self) -> Option<f64> {
        self.last_trade.map(|t| t.price)
    }
}

/// Everything a processor mutates from tick to tick
///
/// `reference` is persisted; the rest is rebuilt after a restart.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub reference: ReferenceState,
    pub grid: Option<PriceGrid>,
    pub current: Option<PriceObservation>,
    pub previous: Option<PriceObservation>,
    pub recent_prices: VecDeque<f64>,
    pub backoff_reset_at: Option<DateTime<Utc>>,
    pub last_grid_count: i32,
}

impl EngineState {
    /// Rebuild runtime state from persisted reference prices
    ///
    /// The backoff clock restarts from the last trade.
    pub fn restore(reference: ReferenceState) -> Self {
        let backoff_reset_at = reference.last_trade.map(|t| t.timestamp);
        Self {
            reference,
            backoff_reset_at,
            ..Default::default()
        }
    }

    pub fn record_price(&mut self, price: f64) {
        self.recent_prices.push_back(price);
        while self.recent_prices.len() > RECENT_PRICES_CAPACITY {
            self.recent_prices.pop_front();
        }
    }

    /// Restart the backoff clock when the crossed grid count reaches a new high
    ///
    /// Only counts above one qualify. Returns true when the clock was reset.
    pub fn note_grid_count(&mut self, grid_count: i32, now: DateTime<Utc>) -> bool {
        let magnitude = grid_count.unsigned_abs();
        self.last_grid_count = grid_count;

        if magnitude > 1 && magnitude > self.reference.last_reset_grid_count {
            self.backoff_reset_at = Some(now);
            self.reference.last_reset_grid_count = magnitude;
            return true;
        }
        false
    }

    /// Seconds since the backoff clock was last reset, if it ever was
    pub fn backoff_elapsed_secs(&self, now: DateTime<Utc>) -> Option<f64> {
        self.backoff_reset_at
            .map(|reset| (now - reset).num_milliseconds() as f64 / 1000.0)
    }

    /// Move every reference price to `anchor`
    ///
    /// Used after each order attempt: the new trade on success, the
    /// pre-attempt trade on failure. Turning points only make sense relative
    /// to the most recent trade, so they move too.
    pub fn reset_key_prices(&mut self, anchor: Option<PriceObservation>) {
        self.reference.last_trade = anchor;
        self.reference.last_upper_turning = anchor;
        self.reference.last_lower_turning = anchor;
        self.reference.last_reset_grid_count = 0;
        self.backoff_reset_at = anchor.map(|a| a.timestamp);
        self.previous = anchor;
    }
}
