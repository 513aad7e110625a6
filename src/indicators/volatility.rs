// Realized volatility of recent price samples
//
// Samples arrive roughly once per second; the per-sample standard deviation
// of log-returns is scaled by sqrt(60) to express it per minute.

pub const SAMPLES_PER_MINUTE: f64 = 60.0;

/// Calculate per-minute volatility over the most recent `window` samples
///
/// Returns 0.0 when fewer than two samples are available. Uses the sample
/// (n - 1) variance, which is undefined for a single return, so two samples
/// also give 0.0.
pub fn calculate_volatility(prices: &[f64], window: usize) -> f64 {
    let start = prices.len().saturating_sub(window);
    let recent = &prices[start..];

    if recent.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = recent.windows(2).map(|w| (w[1] / w[0]).ln()).collect();

    if returns.len() < 2 {
        return 0.0;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;

    variance.sqrt() * SAMPLES_PER_MINUTE.sqrt()
}
