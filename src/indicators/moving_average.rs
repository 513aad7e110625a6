/// Sliding-window moving average over the whole series
///
/// Returns one value per full window (`len - window + 1` values), or an
/// empty vector when the window is zero or longer than the input.
pub fn moving_average_series(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || window > values.len() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(values.len() - window + 1);
    let mut sum: f64 = values[..window].iter().sum();
    result.push(sum / window as f64);

    for i in window..values.len() {
        sum += values[i] - values[i - window];
        result.push(sum / window as f64);
    }

    result
}
