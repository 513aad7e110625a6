use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use crate::error::GridError;
use crate::models::{Candle, PriceObservation};
use crate::Result;

#[derive(Default)]
struct Series {
    candles: VecDeque<Candle>,
    latest: Option<PriceObservation>,
}

/// Thread-safe in-memory buffer of one-minute candles
///
/// Price snapshots are folded into the bar they fall in; a snapshot past the
/// current bar opens a new one. Keeps a rolling window per token.
#[derive(Clone)]
pub struct CandleBuffer {
    data: Arc<RwLock<HashMap<String, Series>>>,
    max_candles: usize,
}

impl CandleBuffer {
    /// Create a new candle buffer
    ///
    /// # Arguments
    /// * `max_candles` - Maximum number of candles to keep per token
    pub fn new(max_candles: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            max_candles,
        }
    }

    /// Fold a price snapshot into the current one-minute bar
    ///
    /// `volume` is the traded volume since the previous snapshot. Snapshots
    /// older than the current bar are ignored.
    pub fn record_snapshot(
        &self,
        token: &str,
        price: f64,
        volume: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let bar_open = timestamp
            .duration_trunc(TimeDelta::minutes(1))
            .map_err(|e| GridError::Feed(e.to_string()))?;

        let mut data = self.write()?;
        let series = data.entry(token.to_string()).or_default();

        match series.candles.back_mut() {
            Some(bar) if bar.timestamp == bar_open => {
                bar.high = bar.high.max(price);
                bar.low = bar.low.min(price);
                bar.close = price;
                bar.volume += volume;
            }
            Some(bar) if bar.timestamp > bar_open => {
                tracing::debug!("Dropping out-of-order snapshot for {} at {}", token, timestamp);
                return Ok(());
            }
            _ => {
                series.candles.push_back(Candle {
                    token: token.to_string(),
                    timestamp: bar_open,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume,
                });
            }
        }

        while series.candles.len() > self.max_candles {
            series.candles.pop_front();
        }
        series.latest = Some(PriceObservation::new(price, timestamp));

        Ok(())
    }

    /// Get all candles for a token
    pub fn get_candles(&self, token: &str) -> Result<Vec<Candle>> {
        let data = self.read()?;

        Ok(data
            .get(token)
            .map(|s| s.candles.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Get the N most recent candles for a token
    pub fn get_recent_candles(&self, token: &str, n: usize) -> Result<Vec<Candle>> {
        let data = self.read()?;

        Ok(data
            .get(token)
            .map(|s| s.candles.iter().rev().take(n).rev().cloned().collect())
            .unwrap_or_default())
    }

    pub fn latest_price(&self, token: &str) -> Result<Option<PriceObservation>> {
        let data = self.read()?;
        Ok(data.get(token).and_then(|s| s.latest))
    }

    pub fn candle_count(&self, token: &str) -> Result<usize> {
        let data = self.read()?;
        Ok(data.get(token).map(|s| s.candles.len()).unwrap_or(0))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Series>>> {
        self.data.read().map_err(|e| GridError::Feed(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Series>>> {
        self.data.write().map_err(|e| GridError::Feed(e.to_string()))
    }
}
