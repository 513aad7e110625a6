use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

/// Grid strategy parameters, immutable per processor instance
///
/// Every field can be overridden on its own; anything left out of the
/// config file or environment keeps the default below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyParameters {
    pub grid_width: f64,           // fractional step between levels
    pub max_drawdown: f64,         // pullback required to sell
    pub max_bounce: f64,           // bounce required to buy
    pub trade_amount: f64,         // units per grid crossed
    pub max_position: f64,         // absolute cap per order
    pub min_price: f64,
    pub max_price: f64,
    pub backoff_1st_secs: u64,
    pub backoff_2nd_secs: u64,
    pub backoff_3rd_secs: u64,
    pub max_trade_grid_count: u32, // cap on grid levels per decision
    pub enable_intra_grid_trading: bool,
    pub atr_period: usize,
    pub volatility_window: usize,
    pub volume_fast_window: usize,
    pub reduce_only: bool,
    pub order_timeout_secs: u64,
}

impl Default for StrategyParameters {
    fn default() -> Self {
        Self {
            grid_width: 0.025,
            max_drawdown: 0.012,
            max_bounce: 0.012,
            trade_amount: 9000.0,
            max_position: 100_000.0,
            min_price: 0.1,
            max_price: 100.0,
            backoff_1st_secs: 30 * 60,
            backoff_2nd_secs: 60 * 60,
            backoff_3rd_secs: 90 * 60,
            max_trade_grid_count: 8,
            enable_intra_grid_trading: false,
            atr_period: 14,
            volatility_window: 30,
            volume_fast_window: 3,
            reduce_only: true,
            order_timeout_secs: 10,
        }
    }
}

/// Process-level settings for the `gridbot` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub asset: String,
    pub token_address: String,
    pub redis_url: Option<String>,
    pub dexscreener_base_url: String,
    pub poll_interval_secs: u64,
    pub candle_buffer_size: usize,
    pub strategy: StrategyParameters,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            asset: "SOL".to_string(),
            token_address: "So11111111111111111111111111111111111111112".to_string(),
            redis_url: None,
            dexscreener_base_url: crate::api::dexscreener::DEXSCREENER_API_BASE.to_string(),
            poll_interval_secs: 1,
            candle_buffer_size: 120,
            strategy: StrategyParameters::default(),
        }
    }
}

impl AppConfig {
    /// Load settings from an optional TOML file, then `GRID__*` environment overrides
    ///
    /// e.g. `GRID__STRATEGY__GRID_WIDTH=0.02` or `GRID__ASSET=JUP`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        } else {
            builder = builder.add_source(File::with_name("gridbot").required(false));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("GRID")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = settings.try_deserialize()?;
        tracing::debug!("Loaded configuration: {:?}", app);

        Ok(app)
    }
}
