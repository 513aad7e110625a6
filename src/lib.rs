// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod grid;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod strategy;

// Re-export commonly used types
pub use config::StrategyParameters;
pub use error::GridError;
pub use grid::PriceGrid;
pub use models::*;
pub use strategy::{GridTradingProcessor, TickOutcome};

// Error handling
pub type Result<T> = std::result::Result<T, GridError>;
