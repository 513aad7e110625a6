use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gridbot::execution::{OrderExecutor, PriceFeed};
use gridbot::persistence::{MemoryStateStore, StateStore};
use gridbot::strategy::{OrderOutcome, OrderReason, ReferenceState};
use gridbot::*;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_test::{assert_pending, assert_ready};

const ASSET: &str = "TEST";
const NAMESPACE: &str = "GridTradingProcessor/TEST";

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct MockFeed {
    price: Mutex<Option<PriceObservation>>,
    candles: Mutex<Vec<Candle>>,
}

impl MockFeed {
    fn set_price(&self, price: f64, timestamp: DateTime<Utc>) {
        *self.price.lock().unwrap() = Some(PriceObservation::new(price, timestamp));
    }

    /// `count` one-minute bars closing at `close` with a high-low range of `range`
    fn set_flat_candles(&self, close: f64, range: f64, count: usize) {
        let start = Utc::now() - Duration::minutes(count as i64);
        *self.candles.lock().unwrap() = (0..count)
            .map(|i| Candle {
                token: ASSET.to_string(),
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close + range / 2.0,
                low: close - range / 2.0,
                close,
                volume: 1000.0,
            })
            .collect();
    }
}

#[async_trait]
impl PriceFeed for MockFeed {
    async fn latest_price(&self, _asset: &str) -> Option<PriceObservation> {
        *self.price.lock().unwrap()
    }

    async fn candles(&self, _asset: &str) -> Vec<Candle> {
        self.candles.lock().unwrap().clone()
    }
}

#[derive(Default, Clone, Copy, PartialEq)]
enum ExecMode {
    #[default]
    Fill,
    Reject,
    Error,
    Hang,
}

#[derive(Default)]
struct MockExecutor {
    mode: ExecMode,
    gate: Option<Arc<Notify>>,
    details: Option<OrderDetails>,
    fail_lookup: bool,
    submitted: Mutex<Vec<MarketOrder>>,
}

impl MockExecutor {
    fn submitted(&self) -> Vec<MarketOrder> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderExecutor for MockExecutor {
    async fn execute(&self, orders: &[MarketOrder]) -> gridbot::Result<ExecutionReport> {
        self.submitted.lock().unwrap().extend_from_slice(orders);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match self.mode {
            ExecMode::Fill => Ok(ExecutionReport {
                success: true,
                orders: vec![OrderRef {
                    order_id: "order-1".to_string(),
                    asset: ASSET.to_string(),
                }],
            }),
            ExecMode::Reject => Ok(ExecutionReport {
                success: false,
                orders: Vec::new(),
            }),
            ExecMode::Error => Err(GridError::Execution("exchange unavailable".to_string())),
            ExecMode::Hang => std::future::pending().await,
        }
    }

    async fn fetch_order_details(&self, _orders: &[OrderRef]) -> gridbot::Result<Vec<OrderDetails>> {
        if self.fail_lookup {
            return Err(GridError::Execution("lookup failed".to_string()));
        }
        Ok(self.details.clone().into_iter().collect())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn params() -> StrategyParameters {
    StrategyParameters {
        max_price: 200.0,
        ..Default::default()
    }
}

/// Store with an established position, grid base 100 and an optional last trade
fn seeded_store(last_trade: Option<PriceObservation>) -> MemoryStateStore {
    let store = MemoryStateStore::new();
    let reference = ReferenceState {
        last_trade,
        grid_base: Some(PriceObservation::new(100.0, Utc::now() - Duration::hours(2))),
        is_position_created: true,
        ..Default::default()
    };
    store.seed(NAMESPACE, reference.to_bag().unwrap()).unwrap();
    store
}

fn trade_minutes_ago(price: f64, minutes: i64) -> Option<PriceObservation> {
    Some(PriceObservation::new(price, Utc::now() - Duration::minutes(minutes)))
}

async fn build(
    params: StrategyParameters,
    feed: &Arc<MockFeed>,
    executor: &Arc<MockExecutor>,
    store: &MemoryStateStore,
) -> GridTradingProcessor {
    GridTradingProcessor::new(
        ASSET,
        params,
        feed.clone(),
        executor.clone(),
        Arc::new(store.clone()),
    )
    .await
    .unwrap()
}

/// Feed `first` then `second` one second apart; returns the second outcome
async fn two_ticks(
    processor: &GridTradingProcessor,
    feed: &MockFeed,
    first: f64,
    second: f64,
) -> TickOutcome {
    let now = Utc::now();
    feed.set_price(first, now - Duration::seconds(1));
    processor.tick().await.unwrap();
    feed.set_price(second, now);
    processor.tick().await.unwrap()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_no_price_persists_and_returns() {
    let feed = Arc::new(MockFeed::default());
    let executor = Arc::new(MockExecutor::default());
    let store = MemoryStateStore::new();
    let processor = build(params(), &feed, &executor, &store).await;

    assert_eq!(processor.tick().await.unwrap(), TickOutcome::NoPrice);
    assert_eq!(store.save_count().unwrap(), 1);
}

#[tokio::test]
async fn test_first_tick_creates_position() {
    let feed = Arc::new(MockFeed::default());
    let executor = Arc::new(MockExecutor::default());
    let store = MemoryStateStore::new();
    let processor = build(params(), &feed, &executor, &store).await;

    feed.set_price(100.0, Utc::now());
    assert_eq!(processor.tick().await.unwrap(), TickOutcome::Initialized);

    let restored = ReferenceState::from_bag(store.snapshot(NAMESPACE).unwrap()).unwrap();
    assert!(restored.is_position_created);
    assert_eq!(restored.grid_base.map(|b| b.price), Some(100.0));
    assert!(restored.last_trade.is_none());
}

#[tokio::test]
async fn test_grid_base_outside_bounds_is_fatal() {
    let feed = Arc::new(MockFeed::default());
    let executor = Arc::new(MockExecutor::default());
    let store = MemoryStateStore::new();
    let processor = build(StrategyParameters::default(), &feed, &executor, &store).await;

    feed.set_price(150.0, Utc::now());
    let err = processor.tick().await.unwrap_err();

    assert!(matches!(err, GridError::Config(_)));
    assert!(err.is_fatal());
}

// ============================================================================
// Decision scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_a_out_of_range_then_trend_following_skip() {
    let feed = Arc::new(MockFeed::default());
    let executor = Arc::new(MockExecutor::default());

    // Default max price 100: paused
    let store = seeded_store(None);
    let processor = build(StrategyParameters::default(), &feed, &executor, &store).await;
    feed.set_price(104.0, Utc::now());
    assert_eq!(
        processor.tick().await.unwrap(),
        TickOutcome::OutOfRange { price: 104.0 }
    );

    // Widened range: rising with an upward tendency never trades
    let store = seeded_store(None);
    let processor = build(params(), &feed, &executor, &store).await;
    let outcome = two_ticks(&processor, &feed, 104.0, 105.06).await;

    assert_eq!(outcome, TickOutcome::Skipped);
    assert!(executor.submitted().is_empty());
}

#[tokio::test]
async fn test_scenario_b_falling_with_tendency_skips() {
    let feed = Arc::new(MockFeed::default());
    let executor = Arc::new(MockExecutor::default());
    let store = seeded_store(trade_minutes_ago(100.0, 5));
    let processor = build(params(), &feed, &executor, &store).await;

    let outcome = two_ticks(&processor, &feed, 98.0, 97.5).await;

    assert_eq!(outcome, TickOutcome::Skipped);
    assert!(executor.submitted().is_empty());
}

#[tokio::test]
async fn test_scenario_c_bounce_buys_one_grid() {
    let feed = Arc::new(MockFeed::default());
    feed.set_flat_candles(97.0, 0.5, 20);
    let executor = Arc::new(MockExecutor::default());
    let store = seeded_store(trade_minutes_ago(100.0, 5));
    let processor = build(params(), &feed, &executor, &store).await;

    let outcome = two_ticks(&processor, &feed, 95.5, 97.0).await;

    match outcome {
        TickOutcome::Order { intent, outcome } => {
            assert_eq!(intent.grid_count, -1);
            assert_eq!(intent.reason, OrderReason::Bounce);
            assert!(matches!(outcome, OrderOutcome::Filled { price, reconciled: false, .. } if price == 97.0));
        }
        other => panic!("expected an order, got {:?}", other),
    }

    let submitted = executor.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].side, TradeSide::Buy);
    assert_eq!(submitted[0].quantity, 9000.0);
    assert!(submitted[0].reduce_only);

    // Key prices move to the trade
    let reference = processor.reference_state().await;
    assert_eq!(reference.last_trade_price(), Some(97.0));
    assert_eq!(reference.last_lower_turning.map(|t| t.price), Some(97.0));
    assert_eq!(reference.last_upper_turning.map(|t| t.price), Some(97.0));
    assert_eq!(reference.last_reset_grid_count, 0);

    let trades = store.trades(NAMESPACE).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].grid_count, -1);
    assert_eq!(trades[0].order_id.as_deref(), Some("order-1"));
}

#[tokio::test]
async fn test_scenario_d_stale_position_forced_exit() {
    let feed = Arc::new(MockFeed::default());
    feed.set_flat_candles(96.0, 0.5, 20);
    let executor = Arc::new(MockExecutor::default());
    let store = seeded_store(trade_minutes_ago(100.0, 95));
    let processor = build(params(), &feed, &executor, &store).await;

    let outcome = two_ticks(&processor, &feed, 95.5, 96.0).await;

    match outcome {
        TickOutcome::Order { intent, .. } => {
            assert_eq!(intent.grid_count, -1);
            assert_eq!(intent.reason, OrderReason::ForcedExit);
        }
        other => panic!("expected a forced exit, got {:?}", other),
    }
    assert_eq!(executor.submitted()[0].side, TradeSide::Buy);
}

#[tokio::test]
async fn test_small_bounce_waits() {
    let feed = Arc::new(MockFeed::default());
    feed.set_flat_candles(97.0, 2.0, 20);
    let executor = Arc::new(MockExecutor::default());
    let store = seeded_store(trade_minutes_ago(100.0, 5));
    let processor = build(params(), &feed, &executor, &store).await;

    // 0.5% bounce against a 1.2% threshold and a wide ATR
    let outcome = two_ticks(&processor, &feed, 96.5, 96.98).await;

    assert!(matches!(outcome, TickOutcome::Waiting { threshold, .. } if threshold == 0.012));
    assert!(executor.submitted().is_empty());
}

#[tokio::test]
async fn test_missing_candles_reports_insufficient_history() {
    let feed = Arc::new(MockFeed::default());
    feed.set_flat_candles(97.0, 0.5, 14);
    let executor = Arc::new(MockExecutor::default());
    let store = seeded_store(trade_minutes_ago(100.0, 5));
    let processor = build(params(), &feed, &executor, &store).await;

    let outcome = two_ticks(&processor, &feed, 95.5, 97.0).await;

    assert_eq!(outcome, TickOutcome::InsufficientHistory);
    assert!(executor.submitted().is_empty());
}

#[tokio::test]
async fn test_intra_grid_turning_point_fires_one_tick_late() {
    let feed = Arc::new(MockFeed::default());
    feed.set_flat_candles(101.0, 0.5, 20);
    let executor = Arc::new(MockExecutor::default());
    let store = seeded_store(trade_minutes_ago(100.0, 5));
    let p = StrategyParameters {
        enable_intra_grid_trading: true,
        ..params()
    };
    let processor = build(p, &feed, &executor, &store).await;

    let now = Utc::now();
    let ticks = [102.0, 102.6, 101.0];
    for (i, price) in ticks.iter().enumerate() {
        feed.set_price(*price, now - Duration::seconds(10 - i as i64));
        let outcome = processor.tick().await.unwrap();
        if i == 2 {
            // Upper turning point 102.6 recorded on this tick, counted on the next
            assert_eq!(outcome, TickOutcome::Held);
        }
    }

    let reference = processor.reference_state().await;
    assert_eq!(reference.last_upper_turning.map(|t| t.price), Some(102.6));

    feed.set_price(100.9, now);
    match processor.tick().await.unwrap() {
        TickOutcome::Order { intent, .. } => {
            assert_eq!(intent.grid_count, 1);
            assert_eq!(intent.reason, OrderReason::UpperTurningPoint);
        }
        other => panic!("expected an intra-grid order, got {:?}", other),
    }
    assert_eq!(executor.submitted()[0].side, TradeSide::Sell);
}

// ============================================================================
// Re-entrancy
// ============================================================================

#[tokio::test]
async fn test_overlapping_tick_is_dropped() {
    let feed = Arc::new(MockFeed::default());
    feed.set_flat_candles(97.0, 0.5, 20);
    let gate = Arc::new(Notify::new());
    let executor = Arc::new(MockExecutor {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let store = seeded_store(trade_minutes_ago(100.0, 5));
    let processor = build(params(), &feed, &executor, &store).await;

    let now = Utc::now();
    feed.set_price(95.5, now - Duration::seconds(1));
    processor.tick().await.unwrap();
    feed.set_price(97.0, now);

    // First tick parks inside order submission
    let mut first = tokio_test::task::spawn(processor.tick());
    assert_pending!(first.poll());
    assert!(processor.is_busy());

    let saves_before = store.save_count().unwrap();
    assert_eq!(processor.tick().await.unwrap(), TickOutcome::Busy);
    assert_eq!(store.save_count().unwrap(), saves_before);
    assert_eq!(executor.submitted().len(), 1);

    gate.notify_one();
    let outcome = assert_ready!(first.poll()).unwrap();
    assert!(matches!(outcome, TickOutcome::Order { .. }));
    assert!(!processor.is_busy());
}

// ============================================================================
// Order reconciliation
// ============================================================================

#[tokio::test]
async fn test_failed_order_keeps_last_trade() {
    for mode in [ExecMode::Reject, ExecMode::Error] {
        let feed = Arc::new(MockFeed::default());
        feed.set_flat_candles(97.0, 0.5, 20);
        let executor = Arc::new(MockExecutor {
            mode,
            ..Default::default()
        });
        let trade = trade_minutes_ago(100.0, 5);
        let store = seeded_store(trade);
        let processor = build(params(), &feed, &executor, &store).await;

        let outcome = two_ticks(&processor, &feed, 95.5, 97.0).await;
        assert!(matches!(
            outcome,
            TickOutcome::Order { outcome: OrderOutcome::Failed { .. }, .. }
        ));

        let reference = processor.reference_state().await;
        assert_eq!(reference.last_trade, trade);
        // Turning points fall back to the pre-attempt trade
        assert_eq!(reference.last_lower_turning, trade);

        let persisted = ReferenceState::from_bag(store.snapshot(NAMESPACE).unwrap()).unwrap();
        assert_eq!(persisted.last_trade, trade);
        assert!(store.trades(NAMESPACE).unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_submission_timeout_is_failure() {
    let feed = Arc::new(MockFeed::default());
    feed.set_flat_candles(97.0, 0.5, 20);
    let executor = Arc::new(MockExecutor {
        mode: ExecMode::Hang,
        ..Default::default()
    });
    let trade = trade_minutes_ago(100.0, 5);
    let store = seeded_store(trade);
    let p = StrategyParameters {
        order_timeout_secs: 1,
        ..params()
    };
    let processor = build(p, &feed, &executor, &store).await;

    let outcome = two_ticks(&processor, &feed, 95.5, 97.0).await;

    assert!(matches!(
        outcome,
        TickOutcome::Order { outcome: OrderOutcome::Failed { .. }, .. }
    ));
    assert_eq!(processor.reference_state().await.last_trade, trade);
}

#[tokio::test]
async fn test_order_above_max_position_rejected() {
    let feed = Arc::new(MockFeed::default());
    feed.set_flat_candles(97.0, 0.5, 20);
    let executor = Arc::new(MockExecutor::default());
    let trade = trade_minutes_ago(100.0, 5);
    let store = seeded_store(trade);
    let p = StrategyParameters {
        max_position: 5000.0,
        ..params()
    };
    let processor = build(p, &feed, &executor, &store).await;

    let outcome = two_ticks(&processor, &feed, 95.5, 97.0).await;

    assert!(matches!(
        outcome,
        TickOutcome::Order { outcome: OrderOutcome::Rejected { size }, .. } if size == 9000.0
    ));
    assert!(executor.submitted().is_empty());
    assert_eq!(processor.reference_state().await.last_trade, trade);
}

#[tokio::test]
async fn test_fill_details_overwrite_key_prices() {
    let feed = Arc::new(MockFeed::default());
    feed.set_flat_candles(97.0, 0.5, 20);
    let fill_time = Utc::now() + Duration::milliseconds(250);
    let executor = Arc::new(MockExecutor {
        details: Some(OrderDetails {
            order_id: "order-1".to_string(),
            avg_px: Some(96.95),
            fill_time: Some(fill_time),
        }),
        ..Default::default()
    });
    let store = seeded_store(trade_minutes_ago(100.0, 5));
    let processor = build(params(), &feed, &executor, &store).await;

    let outcome = two_ticks(&processor, &feed, 95.5, 97.0).await;

    assert!(matches!(
        outcome,
        TickOutcome::Order { outcome: OrderOutcome::Filled { price, reconciled: true, .. }, .. }
            if price == 96.95
    ));

    let persisted = ReferenceState::from_bag(store.snapshot(NAMESPACE).unwrap()).unwrap();
    assert_eq!(
        persisted.last_trade,
        Some(PriceObservation::new(96.95, fill_time))
    );
    // The audit record keeps the decision-time price
    assert_eq!(store.trades(NAMESPACE).unwrap()[0].price, 97.0);
}

#[tokio::test]
async fn test_fill_lookup_failure_keeps_optimistic_prices() {
    for (details, fail_lookup) in [
        (None, true),
        (
            Some(OrderDetails {
                order_id: "order-1".to_string(),
                avg_px: Some(96.95),
                fill_time: None,
            }),
            false,
        ),
    ] {
        let feed = Arc::new(MockFeed::default());
        feed.set_flat_candles(97.0, 0.5, 20);
        let executor = Arc::new(MockExecutor {
            details,
            fail_lookup,
            ..Default::default()
        });
        let store = seeded_store(trade_minutes_ago(100.0, 5));
        let processor = build(params(), &feed, &executor, &store).await;

        let outcome = two_ticks(&processor, &feed, 95.5, 97.0).await;

        assert!(matches!(
            outcome,
            TickOutcome::Order { outcome: OrderOutcome::Filled { price, reconciled: false, .. }, .. }
                if price == 97.0
        ));
        assert_eq!(processor.reference_state().await.last_trade_price(), Some(97.0));
    }
}

#[tokio::test]
async fn test_state_survives_restart() {
    let feed = Arc::new(MockFeed::default());
    feed.set_flat_candles(97.0, 0.5, 20);
    let executor = Arc::new(MockExecutor::default());
    let store = seeded_store(trade_minutes_ago(100.0, 5));

    {
        let processor = build(params(), &feed, &executor, &store).await;
        two_ticks(&processor, &feed, 95.5, 97.0).await;
    }

    let restarted = build(params(), &feed, &executor, &store).await;
    let reference = restarted.reference_state().await;

    assert_eq!(reference.last_trade_price(), Some(97.0));
    assert_eq!(reference.grid_base.map(|b| b.price), Some(100.0));
    assert!(reference.is_position_created);
    assert!(!store.load(NAMESPACE).await.unwrap().is_empty());
}
