//! Bare liveness server: answers `/health` and nothing else, no models involved.

use anyhow::Context;
use axum::{routing::get, Router};
use tokio::net::TcpListener;

use deepfake_ml_service::{api::handlers::health, config::parse_port, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let host = dotenvy::var("HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port = parse_port(dotenvy::var("PORT").ok().as_deref());
    let addr = format!("{host}:{port}");

    let app = Router::new().route("/health", get(health));

    println!("🩺 quick-health listening on http://{addr}/health");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
