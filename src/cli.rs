//! CLI definition and dispatch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::events::EngineEvents;
use crate::feed::{FeedClient, FeedMode, ReplayReader};
use crate::services::candles::run_aggregator;
use crate::services::redis_store::run_persistence;
use crate::services::strategies::{
    EmaCrossoverStrategy, MultiConfluenceStrategy, OpeningRangeBreakout, StrategyContext,
};
use crate::services::{
    CandleAggregator, DepthCalculator, PaperExecutor, RedisStore, Scheduler, SqliteStore,
    StrategyEngine, TimeframeConfirmer,
};
use crate::types::{Instrument, SignalStatus};
use crate::websocket::{router, run_fanout, Hub};
use crate::AppState;

/// Process exit code on a fatal feed auth failure.
const EXIT_FEED_AUTH: u8 = 2;
/// Bounded shutdown deadline for task unwind.
const SHUTDOWN_DEADLINE_SECS: u64 = 5;

#[derive(Parser, Debug)]
#[command(name = "paperbull", about = "Real-time paper-trading engine for NSE index data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the live pipeline and subscriber hub
    Serve,
    /// Drive the pipeline from a captured feed dump
    Replay {
        /// Path to the feed dump
        dump: PathBuf,
    },
    /// Insert instrument configurations from a JSON file
    SeedInstruments {
        /// Path to a JSON array of instruments
        file: PathBuf,
    },
}

pub async fn run(cli: Cli) -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Replay { dump } => replay(config, &dump).await,
        Command::SeedInstruments { file } => seed_instruments(config, &file),
    }
}

/// Build the pipeline components shared by serve and replay.
struct Pipeline {
    events: EngineEvents,
    calculator: Arc<DepthCalculator>,
    aggregator: Arc<CandleAggregator>,
    engine: StrategyEngine,
    executor: Arc<PaperExecutor>,
    sqlite: Option<Arc<SqliteStore>>,
}

fn build_pipeline(config: &Arc<Config>, sqlite: Option<Arc<SqliteStore>>) -> Pipeline {
    let events = EngineEvents::new();
    let calculator = Arc::new(DepthCalculator::new());
    let aggregator = Arc::new(CandleAggregator::new(
        config.candle_intervals.clone(),
        config.exchange_tz,
        events.clone(),
    ));
    let confirmer = Arc::new(TimeframeConfirmer::new(aggregator.clone()));

    let ctx = StrategyContext::from_config(config);
    let mut engine = StrategyEngine::new(ctx, events.clone(), sqlite.clone());
    engine.register(Box::new(EmaCrossoverStrategy::new()));
    engine.register(Box::new(OpeningRangeBreakout::new()));
    engine.register(Box::new(
        MultiConfluenceStrategy::new(Some(confirmer)).with_events(events.clone()),
    ));

    let executor = PaperExecutor::new(config, events.clone(), sqlite.clone());
    if let Some(store) = &sqlite {
        if let Some(portfolio) = store.get_portfolio("paper") {
            info!("restored portfolio from store");
            executor.restore_portfolio(portfolio);
        }
        let open = store.open_positions();
        if !open.is_empty() {
            info!(count = open.len(), "restored open positions from store");
            executor.restore_positions(open);
        }
    }

    Pipeline {
        events,
        calculator,
        aggregator,
        engine,
        executor,
        sqlite,
    }
}

async fn serve(config: Arc<Config>) -> ExitCode {
    if !config.has_feed_credentials() {
        eprintln!("error: FEED_ENDPOINT, FEED_TOKEN and FEED_CLIENT_ID are required for serve");
        return ExitCode::FAILURE;
    }

    let sqlite = match SqliteStore::new(&config.sqlite_path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            eprintln!("error: cannot open sqlite store: {e}");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = build_pipeline(&config, sqlite);
    let Pipeline {
        events,
        calculator,
        aggregator,
        engine,
        executor,
        sqlite,
    } = pipeline;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    // Candle aggregation.
    tasks.push(tokio::spawn(run_aggregator(
        aggregator.clone(),
        events.ticks.subscribe(),
        shutdown_rx.clone(),
    )));

    // Strategy engine with its daily-reset channel.
    let (reset_tx, reset_rx) = mpsc::channel(4);
    let strategy_statuses = engine.statuses_handle();
    tasks.push(tokio::spawn(engine.run(
        events.candle_closes.subscribe(),
        events.depth_analytics.subscribe(),
        events.option_chain.subscribe(),
        reset_rx,
        shutdown_rx.clone(),
    )));

    // Executor.
    tasks.push(tokio::spawn(executor.clone().run(
        events.signals.subscribe(),
        events.ticks.subscribe(),
        shutdown_rx.clone(),
    )));

    // Scheduler: daily reset and EOD square-off.
    let scheduler = Scheduler::new(
        config.exchange_tz,
        config.daily_reset_at,
        config.eod_square_off,
        executor.clone(),
        reset_tx,
    );
    tasks.push(tokio::spawn(scheduler.run(shutdown_rx.clone())));

    // Redis persistence, when configured.
    if let Some(url) = &config.redis_url {
        match RedisStore::connect(url).await {
            Ok(store) => {
                tasks.push(tokio::spawn(run_persistence(
                    Arc::new(store),
                    events.ticks.subscribe(),
                    events.candle_closes.subscribe(),
                    shutdown_rx.clone(),
                )));
            }
            Err(e) => warn!("continuing without Redis persistence: {e}"),
        }
    }

    // Feed clients: quote connection, plus 20-level depth when the set
    // fits the vendor's depth limit.
    let feed = FeedClient::new(
        config.clone(),
        events.clone(),
        calculator.clone(),
        FeedMode::Quote,
        shutdown_rx.clone(),
    );
    let mut feed_task = tokio::spawn(feed.clone().run());

    if config.subscription_set.len() <= crate::feed::MAX_DEPTH_INSTRUMENTS {
        let depth_feed = FeedClient::new(
            config.clone(),
            events.clone(),
            calculator,
            FeedMode::Depth,
            shutdown_rx.clone(),
        );
        tasks.push(tokio::spawn(async move {
            if let Err(e) = depth_feed.run().await {
                warn!("depth feed stopped: {e}");
            }
        }));
    } else {
        warn!(
            instruments = config.subscription_set.len(),
            "subscription set exceeds the depth connection limit, skipping 20-level feed"
        );
    }

    // Subscriber hub.
    let hub = Hub::new();
    tasks.push(tokio::spawn(run_fanout(
        hub.clone(),
        events.clone(),
        shutdown_rx.clone(),
    )));

    let state = AppState {
        config: config.clone(),
        events,
        hub,
        feed: Some(feed),
        aggregator,
        executor,
        strategy_statuses,
        sqlite,
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("error: cannot bind {addr}: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!("hub listening on {addr}");

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router(state))
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await;
        if let Err(e) = result {
            error!("hub server error: {e}");
        }
    });
    tasks.push(server);

    // Run until interrupted or the quote feed dies for good.
    let exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            ExitCode::SUCCESS
        }
        result = &mut feed_task => match result {
            Ok(Err(e)) if e.is_fatal() => {
                error!("feed authentication failure: {e}");
                ExitCode::from(EXIT_FEED_AUTH)
            }
            Ok(Err(e)) => {
                error!("feed stopped: {e}");
                ExitCode::FAILURE
            }
            Ok(Ok(())) => ExitCode::SUCCESS,
            Err(e) => {
                error!("feed task panicked: {e}");
                ExitCode::FAILURE
            }
        },
    };

    let _ = shutdown_tx.send(true);
    let unwind = async {
        for task in tasks {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(
        std::time::Duration::from_secs(SHUTDOWN_DEADLINE_SECS),
        unwind,
    )
    .await
    .is_err()
    {
        warn!("shutdown deadline exceeded, exiting anyway");
    }

    info!("shutdown complete");
    exit
}

/// Deterministic replay: the recorded frames drive the same decode path,
/// components are pumped synchronously in arrival order, and the slippage
/// jitter runs on a fixed seed.
async fn replay(config: Arc<Config>, dump: &Path) -> ExitCode {
    let reader = match ReplayReader::open(dump) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("error: cannot open dump {}: {e}", dump.display());
            return ExitCode::FAILURE;
        }
    };

    let sqlite = match SqliteStore::new_in_memory() {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let pipeline = build_pipeline(&config, sqlite.clone());
    let Pipeline {
        events,
        calculator,
        aggregator,
        mut engine,
        executor,
        ..
    } = pipeline;
    executor.seed_rng(0x5EED);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let client = FeedClient::new(
        config.clone(),
        events.clone(),
        calculator,
        FeedMode::Quote,
        shutdown_rx,
    );

    let mut tick_rx = events.ticks.subscribe();
    let mut candle_rx = events.candle_closes.subscribe();
    let mut signal_rx = events.signals.subscribe();

    let mut frames = 0u64;
    let mut pump = |engine: &mut StrategyEngine| {
        while let Ok(closed) = candle_rx.try_recv() {
            engine.on_candle_close(&closed);
        }
    };

    for record in reader {
        frames += 1;
        client.handle_frame_at(&record.frame, record.captured_at);

        while let Ok(tick) = tick_rx.try_recv() {
            aggregator.on_tick(&tick);
            pump(&mut engine);
            while let Ok(signal) = signal_rx.try_recv() {
                if signal.status == SignalStatus::Pending {
                    executor.handle_signal(signal).await;
                }
            }
            executor.on_tick(&tick).await;
        }
    }

    aggregator.close_all();
    pump(&mut engine);
    while let Ok(signal) = signal_rx.try_recv() {
        if signal.status == SignalStatus::Pending {
            executor.handle_signal(signal).await;
        }
    }

    let stats = client.stats();
    println!("replayed {frames} frames ({} packets, {} malformed)", stats.packets, stats.malformed);
    if let Some(portfolio) = executor.portfolio() {
        println!(
            "portfolio: capital {:.2}, total PnL {:.2}, trades {} ({} wins / {} losses)",
            portfolio.total_capital,
            portfolio.total_pnl,
            portfolio.total_trades,
            portfolio.winning_trades,
            portfolio.losing_trades,
        );
    }
    for position in executor.open_positions() {
        println!(
            "open: {} {} x{} @ {:.2} (PnL {:.2})",
            position.strategy_name,
            position.side,
            position.quantity,
            position.entry_price,
            position.unrealized_pnl,
        );
    }

    ExitCode::SUCCESS
}

fn seed_instruments(config: Arc<Config>, file: &Path) -> ExitCode {
    let raw = match std::fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("error: cannot read {}: {e}", file.display());
            return ExitCode::FAILURE;
        }
    };
    let instruments: Vec<Instrument> = match serde_json::from_str(&raw) {
        Ok(instruments) => instruments,
        Err(e) => {
            eprintln!("error: invalid instrument file: {e}");
            return ExitCode::FAILURE;
        }
    };

    let store = match SqliteStore::new(&config.sqlite_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("error: cannot open sqlite store: {e}");
            return ExitCode::FAILURE;
        }
    };

    for instrument in &instruments {
        if let Err(e) = store.save_instrument(instrument) {
            eprintln!("error: failed to save {}: {e}", instrument.security_id);
            return ExitCode::FAILURE;
        }
    }
    println!("seeded {} instruments", instruments.len());
    ExitCode::SUCCESS
}
