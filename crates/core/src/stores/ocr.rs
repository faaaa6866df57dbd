use crate::error::StoreError;
use crate::traits::{OcrEngine, PageRenderer};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// Shared settings for the two OCR-service clients below.
#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, StoreError> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint)?;
        Ok(Self { endpoint, api_key })
    }
}

#[derive(Deserialize)]
struct RenderResponse {
    pages: Vec<String>,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    text: String,
}

/// Rasterizes PDF pages by delegating to an external rendering service.
/// The PDF travels base64-encoded; pages come back the same way.
pub struct HttpPageRenderer {
    config: OcrEndpointConfig,
    client: Client,
}

impl HttpPageRenderer {
    pub fn new(config: OcrEndpointConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl PageRenderer for HttpPageRenderer {
    async fn render_pages(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut request = self
            .client
            .post(format!("{}/render", self.config.endpoint))
            .json(&json!({
                "pdf_base64": STANDARD.encode(pdf_bytes),
                "dpi": dpi,
            }));

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "page-renderer".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: RenderResponse = response.json().await?;
        parsed
            .pages
            .iter()
            .map(|encoded| {
                STANDARD.decode(encoded).map_err(|error| StoreError::BackendResponse {
                    backend: "page-renderer".to_string(),
                    details: format!("page was not valid base64: {error}"),
                })
            })
            .collect()
    }
}

/// OCR client with the explicit session lifecycle the pipeline expects:
/// `initialize` opens a session, `recognize` is called per page, and
/// `shutdown` must run on every exit path.
pub struct HttpOcrEngine {
    config: OcrEndpointConfig,
    client: Client,
}

impl HttpOcrEngine {
    pub fn new(config: OcrEndpointConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    async fn post_lifecycle(&self, action: &str) -> Result<(), StoreError> {
        let mut request = self
            .client
            .post(format!("{}/session/{}", self.config.endpoint, action));

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "ocr".to_string(),
                details: format!("{action}: {}", response.status()),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl OcrEngine for HttpOcrEngine {
    async fn initialize(&self) -> Result<(), StoreError> {
        self.post_lifecycle("start").await
    }

    async fn recognize(&self, image_bytes: &[u8]) -> Result<String, StoreError> {
        let mut request = self
            .client
            .post(format!("{}/recognize", self.config.endpoint))
            .json(&json!({ "image_base64": STANDARD.encode(image_bytes) }));

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "ocr".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: RecognizeResponse = response.json().await?;
        Ok(parsed.text)
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.post_lifecycle("stop").await
    }
}
