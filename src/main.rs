//! A2A Exchange - Entry Point
//!
//! Loads configuration, restores state and serves the A2A endpoint until
//! SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Restore the store snapshot, seed markets on first start
//! 4. Start the ledger journal writer on the store's commit channel
//! 5. Build collaborators: price book, receipt verifier, identity store
//! 6. Spawn metrics, health, price feed and maintenance tasks
//! 7. Serve `/api/a2a` until SIGINT, then snapshot and exit

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use a2a_exchange::adapters::chain::{OfflineVerifier, RpcPaymentVerifier};
use a2a_exchange::adapters::feeds::{BinanceFeed, PriceBook};
use a2a_exchange::adapters::identity::MemoryIdentityStore;
use a2a_exchange::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use a2a_exchange::adapters::persistence::{RepositoryImpl, run_journal_writer};
use a2a_exchange::config::{self, AppConfig};
use a2a_exchange::domain::market::Market;
use a2a_exchange::ports::payments::PaymentVerifier;
use a2a_exchange::ports::repository::Repository;
use a2a_exchange::protocol::auth::AuthGateway;
use a2a_exchange::protocol::context::{AppContext, Collaborators};
use a2a_exchange::protocol::methods::build_registry;
use a2a_exchange::protocol::router::Router;
use a2a_exchange::protocol::server;
use a2a_exchange::store::{Store, Tables};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config_path = std::env::var("A2A_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::loader::load_config(&config_path).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.server.name,
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.server.bind_address,
        seed_markets = config.markets.len(),
        perp_tickers = config.perps.markets.len(),
        "Starting A2A exchange"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let health = Arc::new(HealthState::new());

    // ── 3. Restore state ────────────────────────────────────
    let repository: Option<Arc<dyn Repository>> = if config.persistence.enabled {
        let repo = RepositoryImpl::from_data_dir(&config.persistence.data_dir)
            .await
            .context("Failed to open data directory")?;
        Some(Arc::new(repo))
    } else {
        warn!("Persistence disabled - state is lost on exit");
        None
    };

    let tables = match &repository {
        Some(repo) => repo.load_snapshot().await.context("Failed to load state snapshot")?,
        None => None,
    };
    let tables = tables.unwrap_or_else(|| seed_tables(&config));

    // ── 4. Ledger journal ───────────────────────────────────
    let mut store = Store::from_tables(tables);
    let mut journal_handle = None;
    if let Some(repo) = &repository {
        let (journal_tx, journal_rx) = mpsc::unbounded_channel();
        store = store.with_journal(journal_tx);
        journal_handle = Some(tokio::spawn(run_journal_writer(Arc::clone(repo), journal_rx)));
    }
    let store = Arc::new(store);

    // ── 5. Collaborators ────────────────────────────────────
    let metrics = if config.metrics.enabled {
        Some(Arc::new(MetricsRegistry::new().context("Failed to register metrics")?))
    } else {
        None
    };

    let price_book = Arc::new(PriceBook::from_config(&config.perps.markets, config.feeds.stale_after_secs));

    let payment_verifier: Arc<dyn PaymentVerifier> = match RpcPaymentVerifier::from_config(&config.chain)? {
        Some(verifier) => Arc::new(verifier),
        None => {
            warn!("No chain RPC configured - payment receipts will be rejected");
            Arc::new(OfflineVerifier)
        }
    };

    let identity = Arc::new(MemoryIdentityStore::from_config(&config.auth));
    let token_secret = config::loader::resolve_token_secret(&config.auth);

    let ctx = Arc::new(AppContext::from_config(
        &config,
        Arc::clone(&store),
        Collaborators {
            price_feed: price_book.clone(),
            payment_verifier,
            identity: identity.clone(),
            metrics: metrics.clone(),
        },
        &token_secret,
    ));
    let gateway = AuthGateway::standard(
        Arc::clone(&ctx.tokens),
        identity,
        config.auth.signature_window_secs,
        config.auth.auto_register_agents,
    );
    let router = Arc::new(Router::new(Arc::clone(&ctx), gateway, build_registry(), &config.rate_limits));

    // ── 6. Background tasks ─────────────────────────────────
    let mut tasks = Vec::new();

    if let Some(metrics) = &metrics {
        let metrics = Arc::clone(metrics);
        let bind = config.metrics.bind_address.clone();
        let rx = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = metrics.serve(bind, rx).await {
                error!(error = %e, "Metrics server failed");
            }
        }));
    }

    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_rx = shutdown_tx.subscribe();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = health_server.run(health_rx).await {
            error!(error = %e, "Health server failed");
        }
    }));

    if config.feeds.binance_enabled {
        match BinanceFeed::new(Arc::clone(&price_book), &config.feeds.binance_ws_url, metrics.clone()) {
            Some(feed) => {
                let rx = shutdown_tx.subscribe();
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = feed.run(rx).await {
                        error!(error = %e, "Binance feed task failed");
                    }
                }));
            }
            None => warn!("Binance feed enabled but no ticker has a feed_symbol"),
        }
    }

    tasks.push(tokio::spawn(run_maintenance(
        Arc::clone(&router),
        repository.clone(),
        Arc::clone(&health),
        Arc::clone(&price_book),
        Duration::from_secs(config.persistence.snapshot_interval_seconds.max(1)),
        shutdown_tx.subscribe(),
    )));

    // ── 7. Serve ────────────────────────────────────────────
    let server_rx = shutdown_tx.subscribe();
    let bind = config.server.bind_address.clone();
    let server_router = Arc::clone(&router);
    let server_handle = tokio::spawn(async move { server::serve(server_router, bind, server_rx).await });
    health.serving.store(true, Ordering::Relaxed);
    info!("All tasks spawned - exchange is running");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => warn!("A2A server exited"),
                Ok(Err(e)) => error!(error = %e, "A2A server failed"),
                Err(e) => error!(error = %e, "A2A server task panicked"),
            }
        }
    }

    // ── Graceful shutdown: stop serving → snapshot → flush journal ──
    health.serving.store(false, Ordering::Relaxed);
    let _ = shutdown_tx.send(());

    for task in tasks {
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
    }

    if let Some(repo) = &repository {
        let tables = store.snapshot().await;
        match repo.save_snapshot(&tables).await {
            Ok(()) => info!(wallets = tables.wallets.len(), "Final snapshot written"),
            Err(e) => error!(error = %e, "Failed to write final snapshot"),
        }
    }

    // The journal writer stops once every store handle is dropped.
    drop(router);
    drop(ctx);
    drop(store);
    if let Some(handle) = journal_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Store contents for a first start: the configured seed markets.
fn seed_tables(config: &AppConfig) -> Tables {
    let now = Utc::now();
    let mut tables = Tables::default();
    for seed in &config.markets {
        if seed.end_time <= now {
            warn!(question = %seed.question, "Skipping seed market that already ended");
            continue;
        }
        let market = Market::new(&seed.question, seed.end_time, seed.seed_yes, seed.seed_no);
        tables.markets.insert(market.id.clone(), market);
    }
    info!(markets = tables.markets.len(), "Seeded markets on first start");
    tables
}

/// Periodic snapshots, intent expiry, limiter pruning and health refresh.
async fn run_maintenance(
    router: Arc<Router>,
    repository: Option<Arc<dyn Repository>>,
    health: Arc<HealthState>,
    price_book: Arc<PriceBook>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {}
        }

        let ctx = router.context();
        match ctx.payments.expire_stale().await {
            Ok(0) => {}
            Ok(expired) => info!(expired, "Expired stale payment intents"),
            Err(e) => warn!(error = %e, "Failed to expire payment intents"),
        }

        router.prune_rate_limits();

        health
            .feeds_healthy
            .store(price_book.is_fresh_at(Utc::now()).await, Ordering::Relaxed);

        if let Some(repo) = &repository {
            let tables = ctx.store.snapshot().await;
            let healthy = match repo.save_snapshot(&tables).await {
                Ok(()) => repo.is_healthy().await,
                Err(e) => {
                    warn!(error = %e, "Periodic snapshot failed");
                    false
                }
            };
            health.persistence_healthy.store(healthy, Ordering::Relaxed);
        }
    }
}
