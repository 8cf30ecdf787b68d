use crate::capture::page_hints::number;
use crate::capture::traits::ListingExtractor;
use crate::capture::types::CapturedPage;
use crate::models::ExtractedListing;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const EXTRACTION_PROMPT: &str = "You read screenshots of real-estate listing pages. \
Reply with a single JSON object with keys price, sqft, rooms, bathroom, property_type, \
latitude, longitude, community, aes_score. Use null for anything not shown. \
aes_score is your 0-10 rating of how visually appealing the property looks.";

/// Field extraction through an OpenAI-compatible multimodal chat endpoint
pub struct VisionExtractor {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl VisionExtractor {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn request_body(&self, page: &CapturedPage) -> Value {
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(&page.screenshot));
        json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": EXTRACTION_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": format!("Listing page: {}", page.url) },
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }
            ]
        })
    }
}

#[async_trait]
impl ListingExtractor for VisionExtractor {
    async fn extract(&self, page: &CapturedPage) -> Result<ExtractedListing> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "Vision extraction request for {}", page.url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(page))
            .send()
            .await
            .context("Failed to reach vision API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Vision API error ({}): {}", status, error_text));
        }

        let chat: ChatResponse = response.json().await.context("Failed to decode vision response")?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No response from vision model"))?;

        let listing = parse_listing(&content)?;
        info!("🧠 Extracted fields for {}", page.url);
        Ok(listing)
    }

    fn extractor_name(&self) -> &'static str {
        "vision"
    }
}

/// Parse model output into a listing, tolerating code fences and numbers sent as text
pub fn parse_listing(content: &str) -> Result<ExtractedListing> {
    let body = strip_fences(content);
    let value: Value = serde_json::from_str(body).context("Model output is not JSON")?;
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("Model output is not a JSON object"))?;

    let float = |key: &str| obj.get(key).and_then(number);
    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(ExtractedListing {
        price: float("price"),
        sqft: float("sqft"),
        rooms: float("rooms").map(|r| r.round() as i64),
        bathroom: float("bathroom"),
        property_type: text("property_type"),
        latitude: float("latitude"),
        longitude: float("longitude"),
        community: text("community"),
        aes_score: float("aes_score"),
    })
}

fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
