//! 채팅 모델 모듈
//!
//! Gemini `generateContent` API로 프롬프트에 대한 답변을 생성합니다.
//! 429 / 5xx / 네트워크 오류는 지수 백오프로 재시도하고, 그 외 오류는 즉시 실패합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::embedding::gemini_error_message;

/// 채팅 모델
pub const CHAT_MODEL: &str = "gemini-2.5-flash";
/// 답변 온도
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
/// 최대 재시도 횟수
pub const DEFAULT_MAX_RETRIES: u32 = 6;
const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);
const MAX_OUTPUT_TOKENS: u32 = 8192;

// ============================================================================
// ChatModel Trait
// ============================================================================

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 프롬프트 → 답변 텍스트
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

// ============================================================================
// GeminiChat
// ============================================================================

pub struct GeminiChat {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
    temperature: f32,
    max_retries: u32,
    initial_backoff: Duration,
}

impl GeminiChat {
    pub fn new(api_key: String, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            endpoint: format!(
                "{}/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                CHAT_MODEL
            ),
            client,
            temperature: DEFAULT_TEMPERATURE,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    /// 설정에서 생성 (API 키가 없으면 에러)
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.gemini_api_key()?.to_string();
        Self::new(api_key, &settings.gemini_base_url)
    }

    pub fn with_retry(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff(attempt - 1);
                tracing::warn!(
                    "Retrying chat request in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    self.max_retries
                );
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send chat request: {}", e));
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let parsed: GenerateResponse =
                    serde_json::from_str(&body).context("Failed to parse chat response")?;
                return parsed.into_text();
            }

            let message = gemini_error_message(body);

            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(anyhow::anyhow!("Gemini API error ({}): {}", status, message));
                continue;
            }

            anyhow::bail!("Gemini API error ({}): {}", status, message);
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("Chat request failed after {} retries", self.max_retries)
        }))
    }

    fn name(&self) -> &str {
        CHAT_MODEL
    }
}

// ============================================================================
// API Types
// ============================================================================

/// source: https://ai.google.dev/api/generate-content
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 파트를 이어 붙임
    fn into_text(self) -> Result<String> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Gemini returned no candidates"))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            anyhow::bail!(
                "Gemini returned an empty answer (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            );
        }
        Ok(text)
    }
}

// ============================================================================
// Tests
// ============================================================================
