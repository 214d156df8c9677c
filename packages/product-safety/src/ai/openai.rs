//! OpenAI implementation of the Extractor and Enricher traits.
//!
//! Every call is a single chat completion in JSON mode at temperature 0.
//!
//! # Example
//!
//! ```rust,ignore
//! use product_safety::ai::OpenAiAnalyst;
//!
//! let analyst = OpenAiAnalyst::new("sk-...").with_model("gpt-4o");
//! let analyzer = Analyzer::new(store, fetcher, analyst);
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::credentials::ApiKey;
use crate::error::{ServiceError, ServiceResult};
use crate::pipeline::prompts::{
    format_enrich_page, format_enrich_product, format_enrich_system, format_extract_product,
    format_extract_reviews, EXTRACT_PRODUCT_PROMPT, EXTRACT_REVIEWS_PROMPT,
};
use crate::pipeline::validate::{parse_model_json, RawDetectionPayload};
use crate::traits::ai::{EnrichmentInput, Enricher, Extractor};
use crate::types::{
    product::{ExtractedProduct, ScrapedContent},
    reference::ReferenceTables,
    reviews::ReviewInsightsPayload,
};

/// Page text handed to the combined fetch+analyze prompt is cut to this many chars.
pub const MAX_PAGE_CHARS: usize = 60_000;

const PAGE_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Error bodies are cut to this many chars.
const MAX_ERROR_BODY: usize = 500;

/// OpenAI-backed product extractor and safety analyst.
#[derive(Clone)]
pub struct OpenAiAnalyst {
    client: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl OpenAiAnalyst {
    pub fn new(api_key: impl Into<ApiKey>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 4096,
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> ServiceResult<Self> {
        ApiKey::from_env("OPENAI_API_KEY")
            .map(Self::new)
            .ok_or_else(|| ServiceError::Unavailable("OPENAI_API_KEY not set".into()))
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One JSON-mode chat completion; returns the message content.
    async fn chat_json(&self, system: &str, user: &str) -> ServiceResult<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        debug!(model = %self.model, prompt_chars = system.len() + user.len(), "Sending chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", self.api_key.bearer())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Http(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &headers, &body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::Parse("No response from OpenAI".into()))?;

        debug!(response_chars = content.len(), "Chat completion received");
        Ok(content)
    }

    /// Plain GET of a product page, reduced to body text.
    async fn fetch_page_text(&self, url: &str) -> ServiceResult<String> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, PAGE_USER_AGENT)
            .send()
            .await
            .map_err(|e| ServiceError::Http(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: format!("fetching {}", url),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| ServiceError::Http(Box::new(e)))?;
        let text = page_text(&html, MAX_PAGE_CHARS);
        debug!(url = %url, html_bytes = html.len(), text_chars = text.len(), "Fetched page for combined analysis");
        Ok(text)
    }
}

/// Map a non-success response to a service error.
fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> ServiceError {
    match status.as_u16() {
        429 => ServiceError::RateLimited {
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        503 | 529 => ServiceError::Overloaded,
        code => ServiceError::Status {
            status: code,
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        },
    }
}

/// Visible text of an HTML page: scripts and styles dropped, whitespace
/// collapsed, cut to `max_chars`.
pub fn page_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let root = Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
        .unwrap_or_else(|| document.root_element());

    let mut words = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| matches!(el.value().name(), "script" | "style" | "noscript"));
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ").chars().take(max_chars).collect()
}

#[async_trait]
impl Extractor for OpenAiAnalyst {
    async fn extract(&self, content: &ScrapedContent) -> ServiceResult<ExtractedProduct> {
        let text = self
            .chat_json(EXTRACT_PRODUCT_PROMPT, &format_extract_product(content))
            .await?;
        Ok(parse_model_json(&text)?)
    }

    async fn extract_reviews(
        &self,
        content: &ScrapedContent,
    ) -> ServiceResult<ReviewInsightsPayload> {
        let text = self
            .chat_json(EXTRACT_REVIEWS_PROMPT, &format_extract_reviews(content))
            .await?;
        Ok(parse_model_json(&text)?)
    }
}

#[async_trait]
impl Enricher for OpenAiAnalyst {
    async fn enrich(
        &self,
        input: EnrichmentInput<'_>,
        allergen_profile: &[String],
        refs: &ReferenceTables,
    ) -> ServiceResult<RawDetectionPayload> {
        let system = format_enrich_system(refs, allergen_profile);
        let user = match input {
            EnrichmentInput::Product(product) => format_enrich_product(product),
            EnrichmentInput::Url(url) => {
                let page = self.fetch_page_text(url).await?;
                format_enrich_page(url, &page)
            }
        };

        let text = self.chat_json(&system, &user).await?;
        Ok(parse_model_json(&text)?)
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_builder() {
        let analyst = OpenAiAnalyst::new("sk-test")
            .with_model("gpt-4o-mini")
            .with_base_url("https://custom.api.com/v1/");

        assert_eq!(analyst.model(), "gpt-4o-mini");
        assert_eq!(analyst.base_url, "https://custom.api.com/v1");
    }

    #[test]
    fn test_status_mapping() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

        let err = status_error(StatusCode::TOO_MANY_REQUESTS, &headers, "");
        assert!(matches!(
            err,
            ServiceError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));

        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, &HeaderMap::new(), "");
        assert!(err.is_transient());

        let err = status_error(
            StatusCode::from_u16(529).unwrap(),
            &HeaderMap::new(),
            "overloaded",
        );
        assert!(matches!(err, ServiceError::Overloaded));

        let err = status_error(StatusCode::BAD_REQUEST, &HeaderMap::new(), "bad input");
        assert!(matches!(err, ServiceError::Status { status: 400, ref body } if body == "bad input"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_page_text_strips_scripts_and_collapses() {
        let html = r#"<html><head><style>.x{}</style></head><body>
            <h1>Acme   Pan</h1><script>track()</script>
            <p>Ingredients:
               PTFE</p></body></html>"#;

        assert_eq!(page_text(html, MAX_PAGE_CHARS), "Acme Pan Ingredients: PTFE");
        assert_eq!(page_text(html, 4), "Acme");
    }
}
