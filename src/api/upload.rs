use axum::{
    body::to_bytes,
    extract::{FromRequest, Multipart, Request},
    http::{header, HeaderMap, StatusCode},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::{types::ImageUpload, AppState};

pub type UploadError = (StatusCode, String);

const FILE_FIELD: &str = "file";

/// Raw image bytes from either a multipart form or a `{"data_base64": ..}` body.
pub async fn read_image_bytes(state: &AppState, req: Request) -> Result<Vec<u8>, UploadError> {
    if is_multipart(req.headers()) {
        let multipart = <Multipart as FromRequest<AppState>>::from_request(req, state)
            .await
            .map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    format!(
                        "Invalid multipart payload (check Content-Type boundary or use JSON upload): {e}"
                    ),
                )
            })?;
        read_multipart(multipart).await
    } else {
        let limit = state.config.max_upload_bytes;
        let (_parts, body) = req.into_parts();
        let body = to_bytes(body, limit)
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read body: {e}")))?;

        let upload: ImageUpload = serde_json::from_slice(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Expected multipart or JSON upload: {e}"),
            )
        })?;
        decode_base64_payload(&upload.data_base64)
    }
}

/// The `file` field wins; otherwise the first field that carries a filename.
async fn read_multipart(mut multipart: Multipart) -> Result<Vec<u8>, UploadError> {
    let mut first_file: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid multipart payload: {e}"),
        )
    })? {
        let is_file_field = field.name() == Some(FILE_FIELD);
        let has_filename = field.file_name().is_some();

        let bytes = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read field: {e}"),
            )
        })?;

        if is_file_field {
            return Ok(bytes.to_vec());
        }
        if has_filename && first_file.is_none() {
            first_file = Some(bytes.to_vec());
        }
    }

    first_file.ok_or((
        StatusCode::BAD_REQUEST,
        "No file found in multipart upload".to_string(),
    ))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Accepts bare base64 or a `data:<mime>;base64,` URL.
pub fn decode_base64_payload(raw: &str) -> Result<Vec<u8>, UploadError> {
    if raw.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Empty base64 payload".to_string()));
    }

    let cleaned = match raw.split_once(',') {
        Some((prefix, rest)) if prefix.contains("base64") => rest,
        _ => raw,
    };

    STANDARD
        .decode(cleaned.trim())
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(
            decode_base64_payload("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert_eq!(decode_base64_payload("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn empty_or_garbage_payload_is_a_bad_request() {
        assert_eq!(decode_base64_payload("  ").unwrap_err().0, StatusCode::BAD_REQUEST);
        assert_eq!(
            decode_base64_payload("!!not base64!!").unwrap_err().0,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn multipart_detection_ignores_case_and_boundary() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("Multipart/Form-Data; boundary=xyz"),
        );
        assert!(is_multipart(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_multipart(&headers));
    }
}
