use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::time::{sleep, Duration};

use crate::error::GridError;
use crate::Result;

pub const DEXSCREENER_API_BASE: &str = "https://api.dexscreener.com/latest/dex";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000; // Start with 2 seconds
const PREFERRED_CHAIN: &str = "solana";

/// Spot quote for one token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenQuote {
    pub symbol: String,
    pub price: f64,
    pub volume_24h: f64,
    pub timestamp: DateTime<Utc>,
}

/// Client for DexScreener API
#[derive(Clone)]
pub struct DexScreenerClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    initial_backoff_ms: u64,
}

#[derive(Debug, Deserialize)]
struct DexScreenerResponse {
    #[serde(default)]
    pairs: Option<Vec<PairData>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairData {
    chain_id: String,
    base_token: TokenInfo,
    price_usd: Option<String>,
    #[serde(default)]
    volume: VolumeData,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    symbol: String,
}

#[derive(Debug, Deserialize, Default)]
struct VolumeData {
    #[serde(default)]
    h24: f64,
}

impl DexScreenerClient {
    pub fn new() -> Self {
        Self::with_base_url(DEXSCREENER_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries: MAX_RETRIES,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
        }
    }

    /// Override the retry policy (attempts are at least 1)
    pub fn with_retries(mut self, max_retries: u32, initial_backoff_ms: u64) -> Self {
        self.max_retries = max_retries.max(1);
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Get current price for a token by its mint address
    /// Includes retry logic with exponential backoff for transient failures
    pub async fn get_price(&self, token_address: &str) -> Result<TokenQuote> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.fetch_price_once(token_address).await {
                Ok(quote) => {
                    if attempt > 1 {
                        tracing::info!(
                            "Fetched {} after {} attempts",
                            token_address,
                            attempt
                        );
                    }
                    return Ok(quote);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        let backoff_ms = self.initial_backoff_ms * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            "Attempt {}/{} failed for {}: {}. Retrying in {}ms...",
                            attempt,
                            self.max_retries,
                            token_address,
                            e,
                            backoff_ms
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| GridError::Feed("all retry attempts failed".to_string())))
    }

    async fn fetch_price_once(&self, token_address: &str) -> Result<TokenQuote> {
        let url = format!("{}/tokens/{}", self.base_url, token_address);

        let response: DexScreenerResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let pair = response
            .pairs
            .unwrap_or_default()
            .into_iter()
            .find(|p| p.chain_id == PREFERRED_CHAIN)
            .ok_or_else(|| {
                GridError::Feed(format!("no {} pair found for {}", PREFERRED_CHAIN, token_address))
            })?;

        let raw_price = pair
            .price_usd
            .ok_or_else(|| GridError::Feed(format!("no USD price for {}", token_address)))?;
        let price: f64 = raw_price
            .parse()
            .map_err(|e| GridError::Feed(format!("bad price {:?}: {}", raw_price, e)))?;

        Ok(TokenQuote {
            symbol: pair.base_token.symbol,
            price,
            volume_24h: pair.volume.h24,
            timestamp: Utc::now(),
        })
    }
}

impl Default for DexScreenerClient {
    fn default() -> Self {
        Self::new()
    }
}
