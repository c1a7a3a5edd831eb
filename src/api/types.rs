use serde::{Deserialize, Serialize};

pub const SERVICE_NAME: &str = "Deepfake ML Service";
pub const SERVICE_HINT: &str = "Use /health, /predict-text, or /predict-image";

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

/// JSON alternative to a multipart image upload.
#[derive(Debug, Deserialize)]
pub struct ImageUpload {
    pub data_base64: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self { status: "OK" }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub status: &'static str,
    pub service: &'static str,
    pub hint: &'static str,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            status: "OK",
            service: SERVICE_NAME,
            hint: SERVICE_HINT,
        }
    }
}
