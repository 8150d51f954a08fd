use async_trait::async_trait;
use base64::Engine as _;
use friday_core::config::ProviderConfig;
use friday_core::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::VisionProvider;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Vision-only Gemini client. Sends a single-turn `generateContent` request
/// with the image as an `inlineData` part.
pub struct GeminiVision {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl GeminiVision {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            api_base: config
                .api_base
                .as_deref()
                .unwrap_or(GEMINI_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            model: Self::normalize_model(&config.model).to_string(),
        }
    }

    /// Config may store "gemini/gemini-2.0-flash" but the API expects
    /// "gemini-2.0-flash".
    fn normalize_model(model: &str) -> &str {
        model.strip_prefix("gemini/").unwrap_or(model)
    }

    fn extract_text(resp: &GeminiResponse) -> Option<String> {
        let candidate = resp.candidates.as_ref()?.first()?;
        let parts = &candidate.content.as_ref()?.parts;
        let texts: Vec<&str> = parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }
}

#[async_trait]
impl VisionProvider for GeminiVision {
    async fn analyze_image(&self, prompt: &str, image: &[u8], mime: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(Error::Provider(
                "Gemini API key not configured (set GEMINI_API_KEY)".to_string(),
            ));
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );

        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let request = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": prompt},
                    {"inlineData": {"mimeType": mime, "data": encoded}}
                ],
            }],
        });

        info!(
            model = %self.model,
            image_bytes = image.len(),
            "Calling Gemini vision API"
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Gemini API error");
            return Err(Error::Provider(format!(
                "Gemini API error {}: {}",
                status, raw_body
            )));
        }

        debug!(body_len = raw_body.len(), "Gemini raw response");

        let resp: GeminiResponse = serde_json::from_str(&raw_body).map_err(|e| {
            let snippet: String = raw_body.chars().take(500).collect();
            Error::Provider(format!(
                "Failed to parse Gemini response: {}. Body: {}",
                e, snippet
            ))
        })?;

        Self::extract_text(&resp)
            .ok_or_else(|| Error::Provider("No text in Gemini response".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}
