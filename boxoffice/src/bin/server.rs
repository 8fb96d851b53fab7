//! Boxoffice HTTP server.
//!
//! Booking ledger, hosted checkout and payment reconciliation behind one
//! axum router, with a background sweep for abandoned reservations.

use anyhow::Context;
use boxoffice::{
    build_router,
    config::Config,
    gateway::{HostedCheckoutGateway, PaymentGateway},
    ledger::{BookingLedger, InMemoryLedgerStore, LedgerStore, PostgresLedgerStore},
    metrics::register_business_metrics,
    reconciliation::{CheckoutCoordinator, CheckoutEnvironment, Sweeper, WebhookVerifier},
    AppState,
};
use boxoffice_core::environment::{Clock, SystemClock};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,boxoffice=debug,sqlx=warn,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Boxoffice server");

    // Load configuration
    let config = Config::from_env().context("invalid configuration")?;
    config.validate().context("invalid configuration")?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        gateway = ?config.gateway.environment,
        database = config.database.url.is_some(),
        "Configuration loaded"
    );

    // Metrics exporter
    let metrics_addr: SocketAddr =
        format!("{}:{}", config.server.metrics_host, config.server.metrics_port)
            .parse()
            .context("invalid metrics address")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    register_business_metrics();
    info!(addr = %metrics_addr, "Prometheus metrics available at /metrics");

    // Ledger storage
    let store: Arc<dyn LedgerStore> = if config.database.url.is_some() {
        info!("Connecting to ledger database...");
        let store = PostgresLedgerStore::connect(&config.database)
            .await
            .context("failed to connect to ledger database")?;
        store.migrate().await.context("ledger migrations failed")?;
        info!("Ledger database connected");
        Arc::new(store)
    } else {
        warn!("DATABASE_URL not set, bookings are kept in memory and lost on restart");
        Arc::new(InMemoryLedgerStore::new())
    };

    // Payment gateway
    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        HostedCheckoutGateway::new(config.gateway.clone()).context("payment gateway misconfigured")?,
    );

    // Booking core
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let ledger = BookingLedger::new(store, clock.clone(), config.booking.venue_offset()?)
        .with_max_tickets(config.booking.max_tickets_per_booking);
    let env = CheckoutEnvironment::new(clock, ledger, gateway, config.reconciliation.pending_ttl());
    let verifier = WebhookVerifier::new(config.gateway.webhook_secret.clone());
    let coordinator = Arc::new(
        CheckoutCoordinator::new(env, verifier)
            .with_settle_timeout(Duration::from_secs(config.reconciliation.settle_timeout_secs)),
    );

    // Background sweep of abandoned reservations
    let (sweeper, sweeper_shutdown) = Sweeper::new(coordinator.clone(), &config.reconciliation);
    let sweeper_handle = sweeper.spawn();

    // HTTP server
    let app = build_router(AppState::new(coordinator));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, stopping sweeper...");
    if sweeper_shutdown.send(true).is_err() {
        warn!("Sweeper already stopped");
    }
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(shutdown_timeout, sweeper_handle).await {
        Ok(Ok(())) => info!("Sweeper stopped"),
        Ok(Err(e)) => error!(error = %e, "Sweeper task failed"),
        Err(_) => warn!(timeout_secs = shutdown_timeout.as_secs(), "Sweeper did not stop in time"),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
