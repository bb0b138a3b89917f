//! Image hosting client. Profile photos go to an imgbb-style endpoint as a
//! multipart form (api key + base64 payload); the response envelope carries
//! either a public URL or an error message.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use url::Url;

use crate::error::AppError;

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Uploads the image and returns its public URL.
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<String, AppError>;
}

pub struct ImgbbClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl ImgbbClient {
    pub fn new(endpoint: Url, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadEnvelope {
    pub success: bool,
    pub data: Option<UploadData>,
    pub error: Option<UploadError>,
}

#[derive(Debug, Deserialize)]
pub struct UploadData {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadError {
    pub message: String,
}

#[async_trait]
impl ImageHost for ImgbbClient {
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<String, AppError> {
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        if mime.type_() != mime::IMAGE {
            return Err(AppError::Validation("file must be an image".into()));
        }

        let form = reqwest::multipart::Form::new()
            .text("key", self.api_key.clone())
            .text("name", filename.to_string())
            .text("image", STANDARD.encode(&bytes));

        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("image host unreachable: {e}")))?;

        let envelope: UploadEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::Delivery(format!("malformed image host response: {e}")))?;

        match envelope {
            UploadEnvelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(data.url),
            UploadEnvelope { error, .. } => Err(AppError::Delivery(
                error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "upload failed".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_parses() {
        let envelope: UploadEnvelope = serde_json::from_str(
            r#"{"success": true, "data": {"url": "https://i.example.com/abc.png", "id": "abc"}}"#,
        )
        .unwrap();

        assert!(envelope.success);
        assert_eq!(envelope.data.unwrap().url, "https://i.example.com/abc.png");
    }

    #[test]
    fn error_envelope_parses() {
        let envelope: UploadEnvelope = serde_json::from_str(
            r#"{"success": false, "error": {"message": "Invalid API key"}}"#,
        )
        .unwrap();

        assert!(!envelope.success);
        assert_eq!(envelope.error.unwrap().message, "Invalid API key");
    }
}
