//! Gemini API clients for generation and embeddings
//!
//! Both hold a long-lived reqwest::Client for connection pooling.

use crate::embedding::Embedder;
use crate::error::AssistantError;
use crate::llm::{LanguageModel, Prompt};
use crate::models::Generation;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

fn build_http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

fn require_key(api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(AssistantError::Config(
            "GEMINI_API_KEY not configured".to_string(),
        ));
    }
    Ok(())
}

/// Reusable Gemini generation client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_output_tokens: i32,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        require_key(&api_key)?;

        Ok(Self {
            client: build_http_client(timeout)?,
            api_key,
            model: model.into(),
            base_url: BASE_URL.to_string(),
            temperature: 0.3,
            max_output_tokens: 1024,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(&self, prompt: &Prompt, context: &[String]) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.render_user(context),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: self.max_output_tokens,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: prompt.system.clone(),
                }],
            },
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt, context: &[String]) -> Result<Generation> {
        let url = format!("{}/{}:generateContent?key={}", self.base_url, self.model, self.api_key);
        let request = self.build_request(prompt, context);
        let started = Instant::now();

        info!(model = %self.model, context_chunks = context.len(), "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AssistantError::Llm(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(AssistantError::Llm(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AssistantError::Llm(format!("Gemini parse error: {}", e))
        })?;

        let text = extract_text(&body)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        if let Some(usage) = &body.usage_metadata {
            debug!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "Gemini token usage"
            );
        }
        info!(model = %self.model, latency_ms, chars = text.len(), "Gemini response received");

        Ok(Generation { text, latency_ms })
    }
}

/// Concatenated text parts of the first candidate
fn extract_text(body: &GenerateResponse) -> Result<String> {
    let candidate = body
        .candidates
        .first()
        .ok_or_else(|| AssistantError::Llm("No response from Gemini API".to_string()))?;

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(AssistantError::Llm("Gemini blocked the response".to_string()));
    }

    let text: String = candidate
        .content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect();

    if text.trim().is_empty() {
        return Err(AssistantError::Llm("Empty response from Gemini".to_string()));
    }
    Ok(text)
}

/// Gemini `embedContent` client
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        require_key(&api_key)?;

        Ok(Self {
            client: build_http_client(timeout)?,
            api_key,
            model: model.into(),
            base_url: BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AssistantError::Embedding("cannot embed empty text".to_string()));
        }

        let url = format!("{}/{}:embedContent?key={}", self.base_url, self.model, self.api_key);
        let request = EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content {
                role: None,
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini embedding request failed: {}", e);
                AssistantError::Embedding(format!("Gemini embedding error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini embedding error response: {}", error_text);
            return Err(AssistantError::Embedding(format!(
                "Gemini embedding error: {}",
                error_text
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            AssistantError::Embedding(format!("Gemini embedding parse error: {}", e))
        })?;

        if body.embedding.values.is_empty() {
            return Err(AssistantError::Embedding("Empty embedding returned".to_string()));
        }
        Ok(body.embedding.values)
    }
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i32,
    #[serde(default)]
    candidates_token_count: i32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let client = GeminiClient::new("key", DEFAULT_MODEL, Duration::from_secs(5)).unwrap();
        let prompt = Prompt::new("You are a financial educator", "What is RSI?");
        let request = client.build_request(&prompt, &["[Source 1: RSI]\nMomentum.".to_string()]);

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("What is RSI?"));
        assert!(json.contains("[Source 1: RSI]"));
        assert!(json.contains("systemInstruction"));
        assert!(json.contains("maxOutputTokens"));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let result = GeminiClient::new("  ", DEFAULT_MODEL, Duration::from_secs(5));
        assert!(matches!(result, Err(AssistantError::Config(_))));
        let result = GeminiEmbedder::new("", DEFAULT_EMBEDDING_MODEL, Duration::from_secs(5));
        assert!(matches!(result, Err(AssistantError::Config(_))));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Index funds "}, {"text": "track a market."}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 6}
        }))
        .unwrap();

        assert_eq!(extract_text(&body).unwrap(), "Index funds track a market.");
    }

    #[test]
    fn test_extract_text_rejects_empty_and_blocked() {
        let empty: GenerateResponse = serde_json::from_value(serde_json::json!({"candidates": []})).unwrap();
        assert!(extract_text(&empty).is_err());

        let blocked: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert!(extract_text(&blocked).is_err());
    }
}
