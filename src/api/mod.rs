use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    classifier::{ImagePredictor, TextPredictor},
    config::AppConfig,
    manager::ModelManager,
};

pub mod handlers;
pub mod types;
pub mod upload;

use handlers::{health, predict_image, predict_text, service_info};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub models: Arc<ModelManager>,
    pub text: Arc<TextPredictor>,
    pub image: Arc<ImagePredictor>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let models = Arc::new(ModelManager::new(&config));
        Self::with_models(config, models)
    }

    pub fn with_models(config: AppConfig, models: Arc<ModelManager>) -> Self {
        let text = Arc::new(TextPredictor::from_config(&config, models.clone()));
        let image = Arc::new(ImagePredictor::new(config.use_ml, models.clone()));
        Self {
            config: Arc::new(config),
            models,
            text,
            image,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/predict-text", post(predict_text))
        .route("/predict-image", post(predict_image))
}

/// Routes plus body limit, request tracing and permissive CORS, with state attached.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    router()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}
