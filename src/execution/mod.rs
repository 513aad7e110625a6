// Price feed and order execution module
pub mod candle_buffer;
pub mod paper;
pub mod price_feed;

use async_trait::async_trait;

use crate::models::{Candle, ExecutionReport, MarketOrder, OrderDetails, OrderRef, PriceObservation};
use crate::Result;

pub use candle_buffer::CandleBuffer;
pub use paper::PaperExecutor;
pub use price_feed::PriceFeedManager;

/// Source of live prices and candle history for an asset
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Most recent sample, None when the feed has nothing yet
    async fn latest_price(&self, asset: &str) -> Option<PriceObservation>;

    /// Candle history, ascending by bar open time
    async fn candles(&self, asset: &str) -> Vec<Candle>;
}

/// Exchange-side order execution service
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn execute(&self, orders: &[MarketOrder]) -> Result<ExecutionReport>;

    /// Authoritative fill details; best effort, may return fewer entries
    async fn fetch_order_details(&self, orders: &[OrderRef]) -> Result<Vec<OrderDetails>>;
}
