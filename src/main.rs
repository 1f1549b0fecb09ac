mod app;
mod auth;
mod config;
mod db;
mod error;
mod files;
mod state;
mod storage;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "filevault=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let (host, port) = (config.host.clone(), config.port);
    tracing::info!(
        upload_dir = %config.upload.dir.display(),
        max_in_flight = config.upload.max_in_flight,
        "starting filevault"
    );

    let state = AppState::init(config).await?;
    let app = app::build_app(state);
    app::serve(app, &host, port).await
}
