use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single price sample for one asset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceObservation {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(price: f64, timestamp: DateTime<Utc>) -> Self {
        Self { price, timestamp }
    }
}

/// OHLCV candlestick, ascending by `timestamp` (bar open time)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub token: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Sign of a price move: tick-over-tick (direction) or since the last trade (tendency)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    #[default]
    Flat,
}

impl Trend {
    /// Sign of `current - reference`
    pub fn between(current: f64, reference: f64) -> Self {
        if current > reference {
            Trend::Up
        } else if current < reference {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    pub fn signum(self) -> i32 {
        match self {
            Trend::Up => 1,
            Trend::Down => -1,
            Trend::Flat => 0,
        }
    }

    /// True when both are non-flat and point in opposite directions
    pub fn opposes(self, other: Trend) -> bool {
        self.signum() * other.signum() < 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Positive sizes buy, negative sizes sell
    pub fn from_signed(size: f64) -> Self {
        if size >= 0.0 {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// Market order request handed to the execution service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketOrder {
    pub asset: String,
    pub quantity: f64,
    pub side: TradeSide,
    pub reduce_only: bool,
}

impl MarketOrder {
    pub fn new(asset: impl Into<String>, quantity: f64, side: TradeSide, reduce_only: bool) -> Self {
        Self {
            asset: asset.into(),
            quantity,
            side,
            reduce_only,
        }
    }
}

/// Exchange-side reference to a submitted order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRef {
    pub order_id: String,
    pub asset: String,
}

/// Result of submitting a batch of orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub orders: Vec<OrderRef>,
}

/// Authoritative fill information, best effort
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrderDetails {
    pub order_id: String,
    pub avg_px: Option<f64>,
    pub fill_time: Option<DateTime<Utc>>,
}

/// Executed grid trade, appended to the store for auditing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub asset: String,
    pub order_id: Option<String>,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub grid_count: i32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
