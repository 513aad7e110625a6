// State persistence module
pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::models::TradeRecord;
use crate::Result;

pub use memory::MemoryStateStore;
pub use redis_store::RedisStateStore;

/// Flat key-value bag of persisted fields; values are JSON encoded
pub type StateBag = Map<String, Value>;

/// External key-value store that lets a processor survive restarts
///
/// `save` takes a partial bag: keys present overwrite, keys absent are left
/// untouched.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, namespace: &str) -> Result<StateBag>;

    async fn save(&self, namespace: &str, bag: &StateBag) -> Result<()>;

    /// Append an executed trade for auditing
    async fn record_trade(&self, namespace: &str, trade: &TradeRecord) -> Result<()>;
}
