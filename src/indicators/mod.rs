// Technical indicators module
// Volatility, ATR and volume statistics used to gate grid decisions

pub mod atr;
pub mod moving_average;
pub mod volatility;
pub mod volume;

pub use atr::{calculate_atr, calculate_true_ranges, latest_atr};
pub use moving_average::moving_average_series;
pub use volatility::{calculate_volatility, SAMPLES_PER_MINUTE};
pub use volume::{calculate_volume_stats, VolumeStats, SLOW_VOLUME_WINDOW};
