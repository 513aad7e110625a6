/// Average True Range (ATR) indicator
///
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// The first bar has no previous close, so its true range is High - Low.
/// ATR here is the simple moving average of true range (not Wilder's smoothing).

use crate::error::GridError;
use crate::models::Candle;
use crate::Result;

/// True range per bar, aligned with the input
pub fn calculate_true_ranges(highs: &[f64], lows: &[f64], closes: &[f64]) -> Result<Vec<f64>> {
    if highs.len() != lows.len() || highs.len() != closes.len() {
        return Err(GridError::DataIntegrity(format!(
            "ATR inputs differ in length: highs={}, lows={}, closes={}",
            highs.len(),
            lows.len(),
            closes.len()
        )));
    }

    let mut true_ranges = Vec::with_capacity(highs.len());
    for i in 0..highs.len() {
        let range = highs[i] - lows[i];
        if i == 0 {
            true_ranges.push(range);
            continue;
        }

        let prev_close = closes[i - 1];
        let tr = range
            .max((highs[i] - prev_close).abs())
            .max((lows[i] - prev_close).abs());
        true_ranges.push(tr);
    }

    Ok(true_ranges)
}

/// Calculate the ATR series, index-aligned with the input bars
///
/// The first `period - 1` positions are `None`. With fewer bars than
/// `period` the result is empty.
pub fn calculate_atr(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
) -> Result<Vec<Option<f64>>> {
    if period == 0 {
        return Err(GridError::DataIntegrity("ATR period must be at least 1".into()));
    }

    let true_ranges = calculate_true_ranges(highs, lows, closes)?;
    if true_ranges.len() < period {
        return Ok(Vec::new());
    }

    let mut atr = vec![None; period - 1];
    atr.extend(
        true_ranges
            .windows(period)
            .map(|w| Some(w.iter().sum::<f64>() / period as f64)),
    );

    Ok(atr)
}

/// Most recent ATR for the given candles
///
/// Needs strictly more than `period` candles, otherwise `None`.
pub fn latest_atr(candles: &[Candle], period: usize) -> Result<Option<f64>> {
    if candles.len() <= period {
        return Ok(None);
    }

    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let atr = calculate_atr(&highs, &lows, &closes, period)?;
    Ok(atr.last().copied().flatten())
}
