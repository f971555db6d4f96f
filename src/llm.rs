use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Everything a generation call can come back with. Transport failures
/// are folded in so callers route every case from one match.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    Text(String),
    /// HTTP success but no usable candidate text (safety block, empty
    /// completion).
    Empty,
    /// Quota exhausted; the caller should cool down, not retry.
    RateLimited,
    Failed(String),
}

#[async_trait]
pub trait TextApi: Send + Sync {
    async fn generate(&self, prompt: &str) -> GenerateOutcome;
}

// ── Gemini REST client ──

pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(endpoint: &str, model: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("building api client")?;
        Ok(GeminiClient {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Models the key can use for text generation.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1beta/models", self.endpoint);
        let resp = self
            .http
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .context("model list request failed")?
            .error_for_status()
            .context("model list request rejected")?;
        let body: ModelsResponse = resp.json().await.context("bad model list payload")?;
        Ok(generation_models(body))
    }
}

#[async_trait]
impl TextApi for GeminiClient {
    async fn generate(&self, prompt: &str) -> GenerateOutcome {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        );
        let req = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let resp = match self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return GenerateOutcome::Failed(format!("request failed: {}", e)),
        };
        let status = resp.status().as_u16();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return GenerateOutcome::Failed(format!("response read failed: {}", e)),
        };
        debug!("generate: http {} ({} bytes)", status, body.len());
        classify_response(status, &body)
    }
}

/// Map one HTTP status + body onto an outcome. 429 means quota, as does
/// a RESOURCE_EXHAUSTED error payload on any status.
fn classify_response(status: u16, body: &str) -> GenerateOutcome {
    if status == 429 {
        return GenerateOutcome::RateLimited;
    }
    if !(200..300).contains(&status) {
        if let Ok(env) = serde_json::from_str::<ApiErrorEnvelope>(body) {
            if env.error.status == "RESOURCE_EXHAUSTED" {
                return GenerateOutcome::RateLimited;
            }
            return GenerateOutcome::Failed(format!(
                "api error {}: {}",
                env.error.code, env.error.message
            ));
        }
        return GenerateOutcome::Failed(format!("http {}", status));
    }

    match serde_json::from_str::<GenerateResponse>(body) {
        Ok(resp) => {
            let text: String = resp
                .candidates
                .iter()
                .filter_map(|c| c.content.as_ref())
                .flat_map(|c| c.parts.iter())
                .map(|p| p.text.as_str())
                .collect();
            let text = text.trim().to_string();
            if text.is_empty() {
                GenerateOutcome::Empty
            } else {
                GenerateOutcome::Text(text)
            }
        }
        Err(e) => GenerateOutcome::Failed(format!("unparseable response: {}", e)),
    }
}

fn generation_models(resp: ModelsResponse) -> Vec<String> {
    resp.models
        .into_iter()
        .filter(|m| {
            m.supported_generation_methods
                .iter()
                .any(|meth| meth == "generateContent")
        })
        .map(|m| m.name)
        .collect()
}

// ── Wire types ──

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ApiError {
    code: i64,
    status: String,
    message: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
    #[serde(default, rename = "supportedGenerationMethods")]
    supported_generation_methods: Vec<String>,
}

// ── Tests ──
