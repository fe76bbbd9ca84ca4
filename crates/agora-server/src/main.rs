mod config;

use std::sync::Arc;

use tracing::{info, warn};

use agora_api::{AppState, AppStateInner};
use agora_db::Database;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database and image storage
    let db = Database::open(&config.db_path)?;
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    if config.admin_email.is_none() {
        warn!("AGORA_ADMIN_EMAIL is unset; nobody can register as admin");
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret,
        token_ttl: chrono::Duration::hours(config.token_ttl_hours),
        upload_dir: config.upload_dir,
        admin_email: config.admin_email,
        vote_attempts: config.vote_attempts,
    });

    let app = agora_api::router(state);

    info!("Agora server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
