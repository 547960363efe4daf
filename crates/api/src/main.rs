use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_core::clock::SystemClock;
use warden_core::engine::{Engine, Stores};
use warden_core::mailer::{LogMailer, Mailer};
use warden_db::{PgRevocationStore, PgSessionStore, PgUserDirectory};

use warden_api::background::session_sweep;
use warden_api::config::ServerConfig;
use warden_api::mailer::{SmtpConfig, SmtpMailer};
use warden_api::router::build_app_router;
use warden_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden_api=debug,warden_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });
    tracing::info!(
        host = %config.host,
        port = config.port,
        device_cap = config.session.device_cap,
        "Loaded server configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = warden_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    warden_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    warden_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Session engine ---
    let stores = Stores {
        sessions: Arc::new(PgSessionStore::new(pool.clone())),
        revocations: Arc::new(PgRevocationStore::new(pool.clone())),
        users: Arc::new(PgUserDirectory::new(pool.clone())),
    };
    let mailer: Arc<dyn Mailer> = match SmtpConfig::from_lookup(|key| std::env::var(key).ok()) {
        Some(smtp) => {
            tracing::info!(host = %smtp.smtp_host, port = smtp.smtp_port, "SMTP mailer configured");
            Arc::new(
                SmtpMailer::new(smtp, config.public_url.clone())
                    .expect("Failed to build SMTP transport"),
            )
        }
        None => {
            tracing::warn!("SMTP_HOST not set, verification links will only be logged");
            Arc::new(LogMailer::new(config.public_url.clone()))
        }
    };
    let engine = Engine::new(
        config.session.clone(),
        stores,
        mailer,
        Arc::new(SystemClock),
    );

    // --- Background sweep ---
    let sweep_cancel = CancellationToken::new();
    let sweep_handle = tokio::spawn(session_sweep::run(
        Arc::clone(&engine.sessions),
        Duration::from_secs(config.sweep_interval_secs),
        sweep_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        pool: Some(pool.clone()),
        config: Arc::new(config.clone()),
        sessions: engine.sessions,
        identity: engine.identity,
        accounts: engine.accounts,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    sweep_cancel.cancel();
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, sweep_handle).await.is_err() {
        tracing::warn!("Session sweep did not stop within the shutdown timeout");
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
