//! Billing Ledger server entry point.

use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_ledger::adapters::http::{webhook_router, WebhookAppState};
use billing_ledger::adapters::{
    LoggingNotifier, PostgresAdminDirectory, PostgresBillingStore, ResendNotifier,
};
use billing_ledger::application::BillingHandlerRegistry;
use billing_ledger::config::{AppConfig, ServerConfig};
use billing_ledger::domain::billing::{BillingEventProcessor, NotificationDispatcher};
use billing_ledger::ports::Notifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");
    }

    let store = Arc::new(PostgresBillingStore::new(pool.clone()));
    let directory = Arc::new(PostgresAdminDirectory::new(pool));

    let notifier: Arc<dyn Notifier> = match config.email.api_key() {
        Some(key) => Arc::new(ResendNotifier::new(
            key.clone(),
            config.email.from_header(),
            config.email.timeout(),
        )?),
        None => {
            warn!("No Resend API key configured, notifications will only be logged");
            Arc::new(LoggingNotifier::new())
        }
    };

    let catalog = Arc::new(config.billing.catalog());
    let registry = BillingHandlerRegistry::new(catalog);
    info!(event_types = ?registry.supported_types(), "Billing handlers registered");
    let processor = BillingEventProcessor::new(
        Arc::new(config.payment.verifier()),
        store.clone(),
        Arc::new(registry),
        store,
        NotificationDispatcher::new(directory, notifier),
    );

    let app = webhook_router()
        .with_state(WebhookAppState::new(Arc::new(processor)))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(config.server.request_timeout()))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, environment = ?config.server.environment, "Billing ledger listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Billing ledger stopped");
    Ok(())
}

/// JSON logs in production, human-readable text elsewhere. `RUST_LOG`
/// overrides the configured filter.
fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    if server.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
