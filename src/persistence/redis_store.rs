use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tokio::time::{timeout, Duration};

use super::{StateBag, StateStore};
use crate::error::GridError;
use crate::models::TradeRecord;
use crate::Result;

const CONNECT_TIMEOUT_SECS: u64 = 5;
const KEY_PREFIX: &str = "gridbot";

/// Redis-backed state store
///
/// Reference state lives in a hash `gridbot:{namespace}`, one field per key,
/// each value JSON encoded. Trades go to the sorted set
/// `gridbot:{namespace}:trades` scored by execution timestamp.
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl RedisStateStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| {
            GridError::Store(format!(
                "Redis connection timeout after {} seconds",
                CONNECT_TIMEOUT_SECS
            ))
        })??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn state_key(namespace: &str) -> String {
        format!("{}:{}", KEY_PREFIX, namespace)
    }

    fn trades_key(namespace: &str) -> String {
        format!("{}:{}:trades", KEY_PREFIX, namespace)
    }

    /// Recent trades, oldest first
    pub async fn load_trades(&self, namespace: &str, limit: isize) -> Result<Vec<TradeRecord>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .zrange(Self::trades_key(namespace), -limit, -1)
            .await?;

        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(GridError::from))
            .collect()
    }

    /// Remove all persisted state for a namespace
    pub async fn clear(&self, namespace: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(vec![Self::state_key(namespace), Self::trades_key(namespace)])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn load(&self, namespace: &str) -> Result<StateBag> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(Self::state_key(namespace)).await?;

        let mut bag = StateBag::new();
        for (key, raw) in fields {
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    bag.insert(key, value);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable field {} in {}: {}", key, namespace, e);
                }
            }
        }

        tracing::debug!("Loaded {} state fields for {}", bag.len(), namespace);

        Ok(bag)
    }

    async fn save(&self, namespace: &str, bag: &StateBag) -> Result<()> {
        if bag.is_empty() {
            return Ok(());
        }

        let fields = bag
            .iter()
            .map(|(key, value)| -> Result<(String, String)> {
                Ok((key.clone(), serde_json::to_string(value)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.conn.clone();
        conn.hset_multiple::<_, _, _, ()>(Self::state_key(namespace), &fields)
            .await?;

        Ok(())
    }

    async fn record_trade(&self, namespace: &str, trade: &TradeRecord) -> Result<()> {
        let value = serde_json::to_string(trade)?;
        let score = trade.timestamp.timestamp_millis() as f64;

        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(Self::trades_key(namespace), value, score)
            .await?;

        tracing::debug!("Recorded {} trade for {}", trade.side, namespace);

        Ok(())
    }
}
