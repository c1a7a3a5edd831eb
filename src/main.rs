use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use deepfake_ml_service::{
    api::{self, AppState},
    config::AppConfig,
    init_tracing,
    manager::ModelManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    println!("🚀 Starting Deepfake ML Service...");
    info!(
        use_ml = config.use_ml,
        allow_downloads = config.allow_downloads,
        text_mode = ?config.text_mode,
        device = %config.device,
        "configuration loaded"
    );

    // -----------------------------
    // Models
    // -----------------------------
    let models = Arc::new(ModelManager::new(&config));
    if config.use_ml && config.eager_load {
        let warm = models.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || warm.warm_up()).await {
            warn!(error = %err, "model warm-up aborted");
        }
    }

    let state = AppState::with_models(config, models);
    info!(strategies = ?state.text.strategy_names(), "text chain ready");

    // -----------------------------
    // Router
    // -----------------------------
    let addr = state.config.bind_addr();
    let app = api::app(state);

    println!("🌐 HTTP listening on http://{addr}");
    println!("🩺 Health at http://{addr}/health");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
