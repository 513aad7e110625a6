use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{OrderExecutor, PriceFeed};
use crate::error::GridError;
use crate::models::{ExecutionReport, MarketOrder, OrderDetails, OrderRef};
use crate::Result;

/// Simulated executor that fills market orders at the feed's latest price
///
/// Orders for an asset with no price yet are reported as failed.
pub struct PaperExecutor {
    feed: Arc<dyn PriceFeed>,
    fills: Mutex<HashMap<String, OrderDetails>>,
}

impl PaperExecutor {
    pub fn new(feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            feed,
            fills: Mutex::new(HashMap::new()),
        }
    }

    pub fn fill_count(&self) -> usize {
        self.fills.lock().map(|f| f.len()).unwrap_or(0)
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn execute(&self, orders: &[MarketOrder]) -> Result<ExecutionReport> {
        let mut filled = Vec::with_capacity(orders.len());

        for order in orders {
            let Some(quote) = self.feed.latest_price(&order.asset).await else {
                tracing::warn!(asset = %order.asset, "Paper fill rejected: no price");
                return Ok(ExecutionReport {
                    success: false,
                    orders: Vec::new(),
                });
            };

            let order_id = Uuid::new_v4().to_string();
            tracing::info!(
                asset = %order.asset,
                "PAPER {} {} @ {} (reduce_only={}) id={}",
                order.side,
                order.quantity,
                quote.price,
                order.reduce_only,
                order_id
            );

            filled.push((
                OrderRef {
                    order_id: order_id.clone(),
                    asset: order.asset.clone(),
                },
                OrderDetails {
                    order_id,
                    avg_px: Some(quote.price),
                    fill_time: Some(Utc::now()),
                },
            ));
        }

        let mut fills = self
            .fills
            .lock()
            .map_err(|e| GridError::Execution(e.to_string()))?;
        let refs = filled
            .into_iter()
            .map(|(order_ref, details)| {
                fills.insert(details.order_id.clone(), details);
                order_ref
            })
            .collect();

        Ok(ExecutionReport {
            success: true,
            orders: refs,
        })
    }

    async fn fetch_order_details(&self, orders: &[OrderRef]) -> Result<Vec<OrderDetails>> {
        let fills = self
            .fills
            .lock()
            .map_err(|e| GridError::Execution(e.to_string()))?;

        Ok(orders
            .iter()
            .filter_map(|o| fills.get(&o.order_id).cloned())
            .collect())
    }
}
