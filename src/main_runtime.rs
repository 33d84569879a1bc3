use modexo::adapters::{
    start_api_server, DexScreenerClient, GammaClient, MemoryRepository, PostgresStore, Repository,
};
use modexo::api::{AdminAuth, AppState};
use modexo::config::{AppConfig, LoggingConfig};
use modexo::error::{ModexoError, Result};
use modexo::services::run_network_sampler;
use modexo::x402::HttpFacilitator;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},modexo=debug,sqlx=warn", config.level))
    });

    // File logging only when MODEXO_LOG_DIR is set.
    //
    // `tracing_appender::rolling::daily` panics if it can't create the initial
    // log file, so writability is checked first.
    let log_dir = std::env::var("MODEXO_LOG_DIR").ok();
    let file_layer = log_dir.as_deref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                dir, e
            );
            return None;
        }
        let test_path = std::path::Path::new(dir).join(".modexo_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(dir, "modexo.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // The guard flushes on drop; the process keeps it for its whole life
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir, e
                );
                None
            }
        }
    });

    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let console_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/modexo.log", dir);
    }
}

pub fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn open_repository(config: &AppConfig) -> Result<Arc<dyn Repository>> {
    match config.database.url.as_deref() {
        Some(url) => {
            let store = PostgresStore::new(url, config.database.max_connections).await?;
            store.migrate().await?;
            info!("Using Postgres repository");
            Ok(Arc::new(store))
        }
        None => {
            warn!("database.url not set, records are kept in memory only");
            Ok(Arc::new(MemoryRepository::new()))
        }
    }
}

/// Run the API server and its background workers until a shutdown signal
pub async fn run_server(config: AppConfig) -> Result<()> {
    if let Err(errors) = config.validate() {
        for e in &errors {
            warn!("Config: {}", e);
        }
    }

    let repository = open_repository(&config).await?;
    let market = Arc::new(DexScreenerClient::new(&config.market_data)?);
    let predictions = Arc::new(GammaClient::new(&config.market_data)?);
    let facilitator = Arc::new(HttpFacilitator::new(&config.x402)?);

    let admin = AdminAuth::from_env();
    match admin.fingerprint() {
        Some(fp) => info!("Admin token configured (fingerprint {})", fp),
        None if admin.is_required() => {
            warn!("MODEXO_API_ADMIN_TOKEN not set, admin endpoints will answer 503")
        }
        None => warn!("Admin auth disabled, admin endpoints are open"),
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let sweep_interval = config.server.sweep_interval_secs;
    let sample_interval = config.network.sample_interval_secs;

    let state = AppState::build(config, market, predictions, repository, facilitator, admin).await;
    info!(
        "Registered {} agents, paying to {} on {}",
        state.registry.all().len(),
        state.config.x402.pay_to,
        state.config.x402.network
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut workers = Vec::new();
    {
        let sweeper = state.sweeper();
        let rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move { sweeper.run(sweep_interval, rx).await }));
    }
    {
        let monitor = state.network.clone();
        let rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            run_network_sampler(monitor, sample_interval, rx).await
        }));
    }
    {
        let orchestrator = state.orchestrator.clone();
        let rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move { orchestrator.run_worker(rx).await }));
    }

    let server_rx = shutdown_rx.clone();
    let mut server =
        tokio::spawn(async move { start_api_server(state, &host, port, server_rx).await });

    let early_exit = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            None
        }
        joined = &mut server => Some(joined),
    };

    let _ = shutdown_tx.send(true);

    let joined = match early_exit {
        Some(joined) => joined,
        None => server.await,
    };

    for worker in workers {
        if tokio::time::timeout(WORKER_SHUTDOWN_TIMEOUT, worker)
            .await
            .is_err()
        {
            warn!("Background worker did not stop within {:?}", WORKER_SHUTDOWN_TIMEOUT);
        }
    }

    let result = joined.map_err(|e| ModexoError::Internal(format!("API server task failed: {}", e)))?;
    info!("Shutdown complete");
    result
}
