/// Volume statistics for the still-forming bar
///
/// Compares the current bar's volume against slow and fast moving averages
/// of per-bar volume.

use chrono::{DateTime, Utc};

use super::moving_average_series;
use crate::models::Candle;

pub const SLOW_VOLUME_WINDOW: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeStats {
    pub volume: f64,          // volume traded so far in the current bar
    pub avg_slow: f64,        // 30-bar moving average, 0 if not enough bars
    pub avg_fast: f64,        // fast moving average, 0 if not enough bars
    pub elapsed_secs: i64,    // seconds into the current bar, at least 1
}

impl VolumeStats {
    /// Fast over slow average, 0 when the slow average is unavailable
    pub fn power(&self) -> f64 {
        if self.avg_slow > 0.0 {
            self.avg_fast / self.avg_slow
        } else {
            0.0
        }
    }
}

/// Calculate volume statistics over candles ordered oldest first
///
/// Returns None when there are no candles.
pub fn calculate_volume_stats(
    candles: &[Candle],
    fast_window: usize,
    now: DateTime<Utc>,
) -> Option<VolumeStats> {
    let current = candles.last()?;
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    let avg_slow = moving_average_series(&volumes, SLOW_VOLUME_WINDOW)
        .last()
        .copied()
        .unwrap_or(0.0);
    let avg_fast = moving_average_series(&volumes, fast_window)
        .last()
        .copied()
        .unwrap_or(0.0);

    let elapsed_secs = (now - current.timestamp).num_seconds().max(1);

    Some(VolumeStats {
        volume: current.volume,
        avg_slow,
        avg_fast,
        elapsed_secs,
    })
}
