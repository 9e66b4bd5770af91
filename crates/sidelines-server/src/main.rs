mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use sidelines_api::auth::{AppState, AppStateInner};
use sidelines_gateway::feed::ChangeFeed;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sidelines=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = sidelines_db::Database::open(&config.db_path)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        feed: ChangeFeed::default(),
        jwt_secret: config.jwt_secret.clone(),
        project_ref: config.project_ref.clone(),
        service_key: config.service_key.clone(),
    });

    let app = sidelines_api::router(state);

    let addr: SocketAddr = config.addr().parse()?;
    info!("Sidelines server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
