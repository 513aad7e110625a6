use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{StateBag, StateStore};
use crate::error::GridError;
use crate::models::TradeRecord;
use crate::Result;

#[derive(Default)]
struct Inner {
    bags: HashMap<String, StateBag>,
    trades: HashMap<String, Vec<TradeRecord>>,
    saves: usize,
}

/// Thread-safe in-process state store
///
/// Nothing survives the process; used for paper runs and tests.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a namespace as if it had been saved earlier
    pub fn seed(&self, namespace: &str, bag: StateBag) -> Result<()> {
        let mut inner = self.write()?;
        inner.bags.insert(namespace.to_string(), bag);
        Ok(())
    }

    /// Current contents of a namespace
    pub fn snapshot(&self, namespace: &str) -> Result<StateBag> {
        let inner = self.read()?;
        Ok(inner.bags.get(namespace).cloned().unwrap_or_default())
    }

    pub fn trades(&self, namespace: &str) -> Result<Vec<TradeRecord>> {
        let inner = self.read()?;
        Ok(inner.trades.get(namespace).cloned().unwrap_or_default())
    }

    /// Number of `save` calls across all namespaces
    pub fn save_count(&self) -> Result<usize> {
        Ok(self.read()?.saves)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| GridError::Store(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| GridError::Store(e.to_string()))
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, namespace: &str) -> Result<StateBag> {
        self.snapshot(namespace)
    }

    async fn save(&self, namespace: &str, bag: &StateBag) -> Result<()> {
        let mut inner = self.write()?;
        let stored = inner.bags.entry(namespace.to_string()).or_default();
        for (key, value) in bag {
            stored.insert(key.clone(), value.clone());
        }
        inner.saves += 1;
        Ok(())
    }

    async fn record_trade(&self, namespace: &str, trade: &TradeRecord) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .trades
            .entry(namespace.to_string())
            .or_default()
            .push(trade.clone());
        Ok(())
    }
}
