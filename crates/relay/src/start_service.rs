use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use actix_web::{App, HttpResponse, HttpServer, web};
use db::{Db, rocksdb::RocksDb};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use oracle::{esplora::EsploraOracle, insight::InsightOracle, mock::MockOracle, oracle::Oracle};
use tokio::{signal, sync::broadcast};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use types::errors::NodeError;

use crate::{
    RelayService,
    config::{ProviderConfig, RelayConfig},
    timer_adapter::RoundTimerControl,
};

type PrometheusHandler = Arc<PrometheusHandle>;

pub fn create_oracle(config: &RelayConfig) -> Result<Box<dyn Oracle>, NodeError> {
    let oracle: Box<dyn Oracle> = match &config.provider {
        ProviderConfig::Esplora { url } => Box::new(EsploraOracle::new(
            config.network,
            url.as_deref(),
            config.request_timeout(),
            config.retry_policy(),
        )?),
        ProviderConfig::Insight { url } => Box::new(InsightOracle::new(
            url,
            config.request_timeout(),
            config.retry_policy(),
        )?),
        ProviderConfig::Mock => {
            tracing::warn!("Using the in-memory mock chain provider");
            Box::new(MockOracle::default())
        }
    };
    Ok(oracle)
}

pub fn open_store(config: &RelayConfig) -> Result<Arc<dyn Db>, NodeError> {
    let db = RocksDb::new(&config.database_directory)?;
    Ok(Arc::new(db))
}

fn init_logging(log_file: Option<PathBuf>) -> Result<(), NodeError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(log_path) = log_file {
        let log_dir = Path::new(&log_path);
        if !log_dir.exists() {
            std::fs::create_dir_all(log_dir).map_err(|e| {
                NodeError::Error(format!(
                    "Failed to create log directory {}: {e}",
                    log_dir.display()
                ))
            })?;
        }

        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "relay.log");
        let file_layer = fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true);

        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);
        registry.with(file_layer).with(console_layer).init();
        tracing::info!(
            "Logging initialized with file output: {}",
            log_path.display()
        );
    } else {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);
        registry.with(console_layer).init();
        tracing::info!("Logging initialized with console output only");
    }
    Ok(())
}

async fn serve_metrics(handle: PrometheusHandler, port: u16) -> Result<(), NodeError> {
    async fn metrics_endpoint(handler: web::Data<PrometheusHandler>) -> HttpResponse {
        metrics::counter!("metrics_scrape_requests_total").increment(1);
        HttpResponse::Ok()
            .content_type("text/plain")
            .body(handler.render())
    }

    async fn health_endpoint() -> HttpResponse {
        HttpResponse::Ok().content_type("text/plain").body("OK")
    }

    tracing::info!("Starting metrics server on 0.0.0.0:{port}");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(handle.clone()))
            .route("/metrics", web::get().to(metrics_endpoint))
            .route("/health", web::get().to(health_endpoint))
    })
    .bind(("0.0.0.0", port))
    .map_err(|e| NodeError::Error(format!("Failed to bind metrics endpoint: {e}")))?
    .run();

    server
        .await
        .map_err(|e| NodeError::Error(format!("Metrics server failed: {e}")))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                if let Err(e) = signal::ctrl_c().await {
                    tracing::error!("Failed to listen for ctrl-c: {e}");
                }
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
        }
        tracing::info!("Received SIGINT, shutting down gracefully...");
    }
}

/// Runs the relay until SIGINT or SIGTERM, then lets the running cycles finish.
pub async fn start_service(
    config: RelayConfig,
    log_file: Option<PathBuf>,
    metrics_port: Option<u16>,
) -> Result<(), NodeError> {
    init_logging(config.log_file_path.clone().or(log_file))?;

    let prometheus_handle: PrometheusHandler = Arc::new(
        PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| NodeError::Error(format!("Failed to install Prometheus recorder: {e}")))?,
    );
    let metrics_port = metrics_port.unwrap_or(config.metrics_port);
    let metrics_server_handle = tokio::spawn(serve_metrics(prometheus_handle, metrics_port));

    let oracle = create_oracle(&config)?;
    let db = open_store(&config)?;
    let service = RelayService::new(&config, db, oracle);

    service.rebuild_in_flight_index()?;

    tracing::info!(
        "Relay started for {} on {} with {} confirmations",
        service.asset.id,
        config.network,
        config.min_confirmations
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let balance_timer =
        service.launch_balance_timer(config.balance_interval(), shutdown_tx.subscribe());
    let broadcast_timer =
        service.launch_broadcast_timer(config.broadcast_interval(), shutdown_tx.subscribe());

    tokio::select! {
        () = shutdown_signal() => {}
        result = metrics_server_handle => {
            match result {
                Ok(Ok(())) => tracing::info!("Metrics server stopped"),
                Ok(Err(e)) => tracing::error!("{e}"),
                Err(e) => tracing::error!("Metrics server error: {e}"),
            }
        }
    }

    if shutdown_tx.send(()).is_err() {
        tracing::warn!("Timers already stopped");
    }
    for (name, handle) in [("balance", balance_timer), ("broadcast", broadcast_timer)] {
        if let Err(e) = handle.await {
            tracing::error!("{name} timer ended abnormally: {e}");
        }
    }

    tracing::info!("Relay stopped");
    Ok(())
}
