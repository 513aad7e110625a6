use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{CandleBuffer, PriceFeed};
use crate::api::{DexScreenerClient, TokenQuote};
use crate::error::GridError;
use crate::models::{Candle, PriceObservation};
use crate::Result;

/// Polls DexScreener and keeps one-minute candles per asset
///
/// DexScreener only reports rolling 24h volume, so per-snapshot volume is
/// the positive change since the previous poll.
pub struct PriceFeedManager {
    dex_client: DexScreenerClient,
    buffer: CandleBuffer,
    addresses: HashMap<String, String>,
    last_volume_24h: Mutex<HashMap<String, f64>>,
}

impl PriceFeedManager {
    /// Create a feed for `(asset, token address)` pairs
    pub fn new(
        dex_client: DexScreenerClient,
        assets: impl IntoIterator<Item = (String, String)>,
        buffer_size: usize,
    ) -> Self {
        Self {
            dex_client,
            buffer: CandleBuffer::new(buffer_size),
            addresses: assets.into_iter().collect(),
            last_volume_24h: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the current quote for an asset and fold it into the buffer
    pub async fn poll(&self, asset: &str) -> Result<PriceObservation> {
        let address = self
            .addresses
            .get(asset)
            .ok_or_else(|| GridError::Feed(format!("unknown asset {}", asset)))?;

        let quote = self.dex_client.get_price(address).await?;
        self.ingest(asset, &quote)?;

        tracing::debug!(asset = %asset, price = %quote.price, "Fetched price snapshot");

        Ok(PriceObservation::new(quote.price, quote.timestamp))
    }

    fn ingest(&self, asset: &str, quote: &TokenQuote) -> Result<()> {
        let volume = {
            let mut last = self
                .last_volume_24h
                .lock()
                .map_err(|e| GridError::Feed(e.to_string()))?;
            let delta = last
                .get(asset)
                .map_or(0.0, |previous| (quote.volume_24h - previous).max(0.0));
            last.insert(asset.to_string(), quote.volume_24h);
            delta
        };

        self.buffer
            .record_snapshot(asset, quote.price, volume, quote.timestamp)
    }

    pub fn buffer(&self) -> &CandleBuffer {
        &self.buffer
    }
}

#[async_trait]
impl PriceFeed for PriceFeedManager {
    async fn latest_price(&self, asset: &str) -> Option<PriceObservation> {
        match self.buffer.latest_price(asset) {
            Ok(latest) => latest,
            Err(e) => {
                tracing::warn!(asset = %asset, "Failed to read latest price: {}", e);
                None
            }
        }
    }

    async fn candles(&self, asset: &str) -> Vec<Candle> {
        self.buffer.get_candles(asset).unwrap_or_else(|e| {
            tracing::warn!(asset = %asset, "Failed to read candles: {}", e);
            Vec::new()
        })
    }
}
