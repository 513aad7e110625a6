use anyhow::{Context, Result};
use clap::Parser;
use gridbot::api::DexScreenerClient;
use gridbot::config::AppConfig;
use gridbot::execution::{OrderExecutor, PaperExecutor, PriceFeed, PriceFeedManager};
use gridbot::persistence::{MemoryStateStore, RedisStateStore, StateStore};
use gridbot::{GridError, GridTradingProcessor, TickOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gridbot")]
#[command(about = "Grid trading engine (paper execution)", long_about = None)]
struct Args {
    /// Path to a TOML configuration file (defaults to ./gridbot.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Asset symbol, overrides the configured one
    #[arg(short, long)]
    asset: Option<String>,

    /// Token mint address, overrides the configured one
    #[arg(long)]
    token_address: Option<String>,

    /// Keep state in memory even when a Redis URL is configured
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let mut app = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(asset) = args.asset {
        app.asset = asset;
    }
    if let Some(address) = args.token_address {
        app.token_address = address;
    }

    tracing::info!("gridbot starting for {}", app.asset);
    tracing::info!(
        "  Grid: width {:.2}%, range [{}, {}], {} units per grid",
        app.strategy.grid_width * 100.0,
        app.strategy.min_price,
        app.strategy.max_price,
        app.strategy.trade_amount
    );
    tracing::info!(
        "  Thresholds: drawdown {:.2}%, bounce {:.2}%, intra-grid {}",
        app.strategy.max_drawdown * 100.0,
        app.strategy.max_bounce * 100.0,
        app.strategy.enable_intra_grid_trading
    );

    let feed = Arc::new(PriceFeedManager::new(
        DexScreenerClient::with_base_url(&app.dexscreener_base_url),
        [(app.asset.clone(), app.token_address.clone())],
        app.candle_buffer_size,
    ));
    let executor: Arc<dyn OrderExecutor> = Arc::new(PaperExecutor::new(feed.clone()));
    let store = connect_store(&app, args.memory).await;

    let processor = Arc::new(
        GridTradingProcessor::new(
            app.asset.clone(),
            app.strategy.clone(),
            feed.clone() as Arc<dyn PriceFeed>,
            executor,
            store,
        )
        .await
        .context("failed to create grid processor")?,
    );

    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<GridError>();
    let mut ticker = interval(Duration::from_secs(app.poll_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!("Polling every {}s, press Ctrl+C to stop", app.poll_interval_secs);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = feed.poll(&app.asset).await {
                    tracing::warn!(asset = %app.asset, "Price poll failed: {}", e);
                }

                let processor = processor.clone();
                let fatal_tx = fatal_tx.clone();
                tokio::spawn(async move {
                    match processor.tick().await {
                        Ok(TickOutcome::Order { intent, outcome }) => {
                            tracing::info!(
                                asset = %processor.asset(),
                                "{} ({} grids): {:?}",
                                intent.reason,
                                intent.grid_count,
                                outcome
                            );
                        }
                        Ok(outcome) => {
                            tracing::trace!(asset = %processor.asset(), "Tick: {:?}", outcome);
                        }
                        Err(e) if e.is_fatal() => {
                            let _ = fatal_tx.send(e);
                        }
                        Err(e) => {
                            tracing::error!(asset = %processor.asset(), "Tick failed: {}", e);
                        }
                    }
                });
            }
            Some(e) = fatal_rx.recv() => {
                tracing::error!("Fatal error, stopping: {}", e);
                return Err(e.into());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let reference = processor.reference_state().await;
    tracing::info!(
        "gridbot stopped; last trade {:?}",
        reference.last_trade_price()
    );
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gridbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_store(app: &AppConfig, force_memory: bool) -> Arc<dyn StateStore> {
    if force_memory {
        tracing::info!("Using in-memory state store");
        return Arc::new(MemoryStateStore::new());
    }

    match &app.redis_url {
        Some(url) => match RedisStateStore::new(url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), state will not survive restarts", e);
                Arc::new(MemoryStateStore::new())
            }
        },
        None => {
            tracing::info!("No Redis URL configured, using in-memory state store");
            Arc::new(MemoryStateStore::new())
        }
    }
}
