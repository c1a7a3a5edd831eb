use axum::{
    extract::{Request, State},
    http::StatusCode,
    Json,
};
use tracing::error;

use crate::classifier::Prediction;

use super::{
    types::{HealthResponse, ServiceInfo, TextRequest},
    upload::read_image_bytes,
    AppState,
};

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

pub async fn predict_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Json<Prediction> {
    let predictor = state.text.clone();
    let prediction = run_blocking("text", move || predictor.predict(&req.text)).await;
    Json(prediction)
}

pub async fn predict_image(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<Prediction>, (StatusCode, String)> {
    let bytes = read_image_bytes(&state, req).await?;
    let predictor = state.image.clone();
    let prediction = run_blocking("image", move || predictor.predict(&bytes)).await;
    Ok(Json(prediction))
}

/// Inference is CPU-bound; keep it off the async workers.
async fn run_blocking<F>(what: &'static str, job: F) -> Prediction
where
    F: FnOnce() -> Prediction + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(prediction) => prediction,
        Err(err) => {
            error!(error = %err, "{what} prediction task did not complete");
            Prediction::unknown()
        }
    }
}
