use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use super::decision::{evaluate, Decision, DecisionInput, OrderIntent};
use super::state::{EngineState, ReferenceState};
use super::trend::{
    correction, find_direction, find_tendency, refresh_turning_points, resolve_current_price,
    resolve_grid_base, tendency_reference,
};
use crate::config::StrategyParameters;
use crate::execution::{OrderExecutor, PriceFeed};
use crate::grid::PriceGrid;
use crate::indicators::{calculate_volatility, calculate_volume_stats, latest_atr};
use crate::models::{Candle, MarketOrder, OrderRef, PriceObservation, TradeRecord, TradeSide};
use crate::persistence::StateStore;
use crate::Result;

const NAMESPACE_PREFIX: &str = "GridTradingProcessor";
/// Before the first trade the grid count is measured from the base, capped here
const INITIAL_GRID_COUNT_CAP: u32 = 2;

/// What one call to [`GridTradingProcessor::tick`] did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Another tick holds the guard; nothing was read or changed
    Busy,
    NoPrice,
    /// First evaluated tick: position flagged as created
    Initialized,
    OutOfRange { price: f64 },
    /// Not enough candles for ATR
    InsufficientHistory,
    Skipped,
    Waiting { correction: f64, threshold: f64 },
    Held,
    Order { intent: OrderIntent, outcome: OrderOutcome },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    /// Size above the position cap; nothing submitted
    Rejected { size: f64 },
    /// Submission failed or timed out; key prices reverted
    Failed { reason: String },
    Filled {
        order_id: Option<String>,
        price: f64,
        timestamp: DateTime<Utc>,
        /// True when the exchange's fill replaced the optimistic values
        reconciled: bool,
    },
}

/// Grid counts measured before turning points are refreshed
#[derive(Debug, Clone, Copy, Default)]
struct CrossingCounts {
    grid: i32,
    upper_turning: i32,
    lower_turning: i32,
}

impl CrossingCounts {
    fn measure(grid: &PriceGrid, reference: &ReferenceState, current: f64, cap: u32) -> Self {
        let last_trade = reference.last_trade_price();

        let grid_count = match last_trade {
            Some(_) => grid.count_levels_between(Some(current), last_trade, cap),
            None => grid.count_levels_between(
                Some(current),
                reference.grid_base.map(|b| b.price),
                cap.min(INITIAL_GRID_COUNT_CAP),
            ),
        };

        Self {
            grid: grid_count,
            upper_turning: grid.count_levels_between(
                reference.last_upper_turning.map(|t| t.price),
                last_trade,
                cap,
            ),
            lower_turning: grid.count_levels_between(
                reference.last_lower_turning.map(|t| t.price),
                last_trade,
                cap,
            ),
        }
    }
}

/// Grid trading strategy for a single asset
///
/// Holds all mutable state behind one async mutex. Each tick takes it with
/// `try_lock`, so overlapping ticks are dropped instead of queued and the
/// guard is released on every return path.
pub struct GridTradingProcessor {
    asset: String,
    namespace: String,
    params: StrategyParameters,
    feed: Arc<dyn PriceFeed>,
    executor: Arc<dyn OrderExecutor>,
    store: Arc<dyn StateStore>,
    state: Mutex<EngineState>,
}

impl GridTradingProcessor {
    /// Create a processor and restore its reference state from the store
    pub async fn new(
        asset: impl Into<String>,
        params: StrategyParameters,
        feed: Arc<dyn PriceFeed>,
        executor: Arc<dyn OrderExecutor>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        let asset = asset.into();
        let namespace = format!("{}/{}", NAMESPACE_PREFIX, asset);

        let bag = store.load(&namespace).await?;
        let reference = ReferenceState::from_bag(bag)?;

        tracing::info!(
            asset = %asset,
            "Restored grid state: last trade {:?}, grid base {:?}, position created {}",
            reference.last_trade_price(),
            reference.grid_base.map(|b| b.price),
            reference.is_position_created
        );

        Ok(Self {
            asset,
            namespace,
            params,
            feed,
            executor,
            store,
            state: Mutex::new(EngineState::restore(reference)),
        })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn params(&self) -> &StrategyParameters {
        &self.params
    }

    /// Copy of the persisted part of the state; waits for a running tick
    pub async fn reference_state(&self) -> ReferenceState {
        self.state.lock().await.reference.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.try_lock().is_err()
    }

    /// Evaluate one price tick
    ///
    /// Only configuration errors are returned as `Err`; every other failure
    /// is logged and reported through the outcome.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let Ok(mut state) = self.state.try_lock() else {
            tracing::debug!(asset = %self.asset, "Previous tick still running, dropping tick");
            return Ok(TickOutcome::Busy);
        };

        self.run_tick(&mut state).await
    }

    async fn run_tick(&self, state: &mut EngineState) -> Result<TickOutcome> {
        let params = &self.params;

        let live = self.feed.latest_price(&self.asset).await;
        state.current = resolve_current_price(live, state.previous);

        let Some(current) = state.current else {
            tracing::debug!(asset = %self.asset, "No price available");
            self.persist(state).await;
            return Ok(TickOutcome::NoPrice);
        };

        state.record_price(current.price);
        let candles = self.feed.candles(&self.asset).await;
        self.log_indicators(state, &candles, current);

        if state.grid.is_none() {
            let base = resolve_grid_base(state.reference.grid_base, current);
            let grid =
                PriceGrid::build(base.price, params.min_price, params.max_price, params.grid_width)?;
            tracing::info!(
                asset = %self.asset,
                "Initialized price grid at base {} with {} levels",
                base.price,
                grid.len()
            );
            state.reference.grid_base = Some(base);
            state.grid = Some(grid);
        }

        let previous = state.previous;
        let direction = find_direction(current.price, previous.map(|p| p.price));
        let tendency = find_tendency(
            current.price,
            tendency_reference(
                state.reference.last_trade_price(),
                state.reference.grid_base.map(|b| b.price),
            ),
        );
        state.reference.direction = direction;
        state.reference.tendency = tendency;

        if !state.reference.is_position_created {
            state.reference.is_position_created = true;
            tracing::info!(asset = %self.asset, "Initial position created at {}", current.price);
            self.persist(state).await;
            return Ok(TickOutcome::Initialized);
        }

        if current.price < params.min_price || current.price > params.max_price {
            tracing::warn!(
                asset = %self.asset,
                "Price {} outside [{}, {}], trading paused",
                current.price,
                params.min_price,
                params.max_price
            );
            self.persist(state).await;
            return Ok(TickOutcome::OutOfRange {
                price: current.price,
            });
        }

        // Measured against the turning points from before this tick
        let counts = state
            .grid
            .as_ref()
            .map(|grid| {
                CrossingCounts::measure(
                    grid,
                    &state.reference,
                    current.price,
                    params.max_trade_grid_count,
                )
            })
            .unwrap_or_default();

        if let Some(turning) =
            refresh_turning_points(&mut state.reference, direction, tendency, current, previous)
        {
            tracing::debug!(asset = %self.asset, "New {:?} turning point", turning);
        }

        if state.note_grid_count(counts.grid, current.timestamp) {
            tracing::info!(
                asset = %self.asset,
                "Grid count reached new high {}, backoff clock restarted",
                counts.grid.abs()
            );
        }

        if !direction.opposes(tendency) {
            self.finish_tick(state, current).await;
            return Ok(TickOutcome::Skipped);
        }

        let atr = match latest_atr(&candles, params.atr_period) {
            Ok(Some(atr)) if current.price > 0.0 => atr / current.price,
            Ok(_) => {
                tracing::debug!(
                    asset = %self.asset,
                    "{} candles, need more than {} for ATR",
                    candles.len(),
                    params.atr_period
                );
                self.finish_tick(state, current).await;
                return Ok(TickOutcome::InsufficientHistory);
            }
            Err(e) => {
                tracing::warn!(asset = %self.asset, "Unusable candle history: {}", e);
                self.finish_tick(state, current).await;
                return Ok(TickOutcome::InsufficientHistory);
            }
        };

        let input = DecisionInput {
            asset: &self.asset,
            price: current.price,
            last_trade_price: state.reference.last_trade_price(),
            direction,
            tendency,
            correction: correction(direction, current.price, &state.reference),
            grid_count: counts.grid,
            upper_turning_count: counts.upper_turning,
            lower_turning_count: counts.lower_turning,
            elapsed_secs: state.backoff_elapsed_secs(current.timestamp),
            atr,
        };

        let outcome = match evaluate(params, &input) {
            Decision::Skip => TickOutcome::Skipped,
            Decision::Wait {
                correction,
                threshold,
            } => {
                tracing::debug!(
                    asset = %self.asset,
                    "Correction {:.2}% below threshold {:.2}%, waiting",
                    correction * 100.0,
                    threshold * 100.0
                );
                TickOutcome::Waiting {
                    correction,
                    threshold,
                }
            }
            Decision::Hold => TickOutcome::Held,
            Decision::Order(intent) => {
                let outcome = self.place_order(state, current, intent).await;
                if let OrderOutcome::Rejected { .. } = outcome {
                    self.finish_tick(state, current).await;
                }
                // Otherwise the previous price was moved with the key prices
                return Ok(TickOutcome::Order { intent, outcome });
            }
        };

        self.finish_tick(state, current).await;
        Ok(outcome)
    }

    async fn finish_tick(&self, state: &mut EngineState, current: PriceObservation) {
        state.previous = Some(current);
        self.persist(state).await;
    }

    /// Submit the order for `intent` and reconcile key prices with the result
    async fn place_order(
        &self,
        state: &mut EngineState,
        current: PriceObservation,
        intent: OrderIntent,
    ) -> OrderOutcome {
        let params = &self.params;
        let size = -(intent.grid_count as f64) * params.trade_amount;

        if size.abs() > params.max_position {
            tracing::warn!(
                asset = %self.asset,
                "Order size {} exceeds max position {}, skipping",
                size,
                params.max_position
            );
            return OrderOutcome::Rejected { size };
        }

        let side = TradeSide::from_signed(size);
        let order = MarketOrder::new(&self.asset, size.abs(), side, params.reduce_only);
        let pre_attempt = state.reference.last_trade;

        tracing::info!(
            asset = %self.asset,
            "{}: {} {} @ {}",
            intent.reason,
            side,
            order.quantity,
            current.price
        );

        let submitted = match timeout(
            Duration::from_secs(params.order_timeout_secs),
            self.executor.execute(std::slice::from_ref(&order)),
        )
        .await
        {
            Ok(Ok(report)) if report.success => Ok(report),
            Ok(Ok(_)) => Err("executor reported failure".to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "no response within {}s",
                params.order_timeout_secs
            )),
        };

        let report = match submitted {
            Ok(report) => report,
            Err(reason) => {
                tracing::error!(asset = %self.asset, "Order failed ({}): {}", intent.reason, reason);
                state.reset_key_prices(pre_attempt);
                self.persist(state).await;
                return OrderOutcome::Failed { reason };
            }
        };

        let order_id = report.orders.first().map(|o| o.order_id.clone());
        let trade = TradeRecord {
            asset: self.asset.clone(),
            order_id: order_id.clone(),
            side,
            quantity: order.quantity,
            price: current.price,
            grid_count: intent.grid_count,
            reason: intent.reason.to_string(),
            timestamp: current.timestamp,
        };
        if let Err(e) = self.store.record_trade(&self.namespace, &trade).await {
            tracing::warn!(asset = %self.asset, "Failed to record trade: {}", e);
        }

        tracing::info!(asset = %self.asset, "Order filled ({}): id {:?}", intent.reason, order_id);

        state.reset_key_prices(Some(current));
        self.persist(state).await;

        let (fill, reconciled) = match self.reconcile_fill(&report.orders).await {
            Some(fill) => {
                tracing::info!(
                    asset = %self.asset,
                    "Key prices reset to exchange fill {} at {}",
                    fill.price,
                    fill.timestamp
                );
                state.reset_key_prices(Some(fill));
                self.persist(state).await;
                (fill, true)
            }
            None => (current, false),
        };

        OrderOutcome::Filled {
            order_id,
            price: fill.price,
            timestamp: fill.timestamp,
            reconciled,
        }
    }

    /// Authoritative fill price and time, when the exchange provides both
    async fn reconcile_fill(&self, orders: &[OrderRef]) -> Option<PriceObservation> {
        if orders.is_empty() {
            tracing::error!(asset = %self.asset, "Fill lookup skipped: no order reference");
            return None;
        }

        let lookup = timeout(
            Duration::from_secs(self.params.order_timeout_secs),
            self.executor.fetch_order_details(orders),
        )
        .await;

        match lookup {
            Ok(Ok(details)) => match details.first() {
                Some(d) => match (d.avg_px, d.fill_time) {
                    (Some(price), Some(fill_time)) => Some(PriceObservation::new(price, fill_time)),
                    _ => {
                        tracing::error!(
                            asset = %self.asset,
                            "Fill lookup for {} incomplete, keeping local prices",
                            d.order_id
                        );
                        None
                    }
                },
                None => {
                    tracing::error!(asset = %self.asset, "Fill lookup returned no orders");
                    None
                }
            },
            Ok(Err(e)) => {
                tracing::error!(asset = %self.asset, "Fill lookup failed: {}", e);
                None
            }
            Err(_) => {
                tracing::error!(asset = %self.asset, "Fill lookup timed out");
                None
            }
        }
    }

    /// Save the reference state; failures are logged, never propagated
    async fn persist(&self, state: &EngineState) {
        let bag = match state.reference.to_bag() {
            Ok(bag) => bag,
            Err(e) => {
                tracing::error!(asset = %self.asset, "Failed to encode state: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.save(&self.namespace, &bag).await {
            tracing::error!(asset = %self.asset, "Failed to save state: {}", e);
        }
    }

    fn log_indicators(&self, state: &EngineState, candles: &[Candle], current: PriceObservation) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }

        let params = &self.params;
        let atr = latest_atr(candles, params.atr_period)
            .ok()
            .flatten()
            .map(|atr| atr / current.price);
        let prices: Vec<f64> = state.recent_prices.iter().copied().collect();
        let volatility = calculate_volatility(&prices, params.volatility_window);

        match calculate_volume_stats(candles, params.volume_fast_window, current.timestamp) {
            Some(volume) => tracing::debug!(
                asset = %self.asset,
                "ATR: {}; volatility: {:.2}%; VOL: {:.0}k/{:.0}k/{:.0}k; power: {:.2}%; remaining: {}s",
                atr.map_or("n/a".to_string(), |a| format!("{:.2}%", a * 100.0)),
                volatility * 100.0,
                volume.volume / 1000.0,
                volume.avg_fast / 1000.0,
                volume.avg_slow / 1000.0,
                volume.power() * 100.0,
                60 - volume.elapsed_secs
            ),
            None => tracing::debug!(
                asset = %self.asset,
                "ATR: n/a; volatility: {:.2}%; no candles",
                volatility * 100.0
            ),
        }
    }
}
