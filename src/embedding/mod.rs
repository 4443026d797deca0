//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! Reddit 댓글 청크와 사용자 질문을 같은 모델(`gemini-embedding-001`)로
//! 벡터화합니다. 인덱싱과 질의가 같은 프로바이더를 공유해야
//! 유사도 검색이 의미를 가집니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::new(api_key)?;
//! let embedding = embedder.embed("Battery drain after Beta 2").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{Settings, GEMINI_BASE_URL};
use crate::ratelimit::RateLimiter;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 문서(청크) 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 질의 임베딩 (기본 구현: 문서 임베딩과 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출, 호출 속도는 구현체의 limiter가 조절)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// 임베딩 모델
const EMBED_MODEL: &str = "models/gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이 (1000ms = 60 RPM 준수)
const MIN_DELAY_MS: u64 = 1000;
/// 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// 임베딩 용도 (Gemini taskType)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskType {
    Document,
    Query,
}

impl TaskType {
    fn as_str(self) -> &'static str {
        match self {
            TaskType::Document => "RETRIEVAL_DOCUMENT",
            TaskType::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Google Gemini 임베딩 구현체
///
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_endpoint(api_key, GEMINI_BASE_URL, DEFAULT_DIMENSION)
    }

    /// 엔드포인트와 차원을 지정하여 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `base_url` - API 베이스 URL (`.../v1beta`)
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn with_endpoint(api_key: String, base_url: &str, dimension: usize) -> Result<Self> {
        // 유효한 차원 확인
        if ![768, 1536, 3072].contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
            Duration::from_millis(MIN_DELAY_MS),
        )));

        Ok(Self {
            api_key,
            endpoint: format!(
                "{}/{}:embedContent",
                base_url.trim_end_matches('/'),
                EMBED_MODEL
            ),
            client,
            dimension,
            rate_limiter,
        })
    }

    /// 임베딩 차원 반환
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_with_task(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: EMBED_MODEL.to_string(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task.as_str().to_string(),
            output_dimensionality: Some(self.dimension),
        };

        let mut last_error: Option<anyhow::Error> = None;

        // 429 / 5xx / 네트워크 오류만 재시도 (지수 백오프)
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS << (attempt - 1));
                tracing::warn!(
                    "Retrying embedding request in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    MAX_RETRIES
                );
                tokio::time::sleep(backoff).await;
            }

            self.rate_limiter.lock().await.acquire().await;

            let sent = self
                .client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await;
            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send embedding request: {}", e));
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let parsed: EmbedResponse =
                    serde_json::from_str(&body).context("Failed to parse embedding response")?;
                return Ok(parsed.embedding.values);
            }

            let error = anyhow::anyhow!(
                "Gemini API error ({}): {}",
                status,
                gemini_error_message(body)
            );
            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Embedding failed after {} retries", MAX_RETRIES)))
    }
}

/// Gemini API 요청 본문
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답 (채팅 모델과 공유)
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// 에러 본문을 `STATUS: message`로 (파싱 실패 시 원문)
pub(crate) fn gemini_error_message(body: String) -> String {
    match serde_json::from_str::<GeminiError>(&body) {
        Ok(e) => format!("{}: {}", e.error.status, e.error.message),
        Err(_) => body,
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_task(text, TaskType::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_task(text, TaskType::Query).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키를 찾는 환경변수 (우선순위 순)
///
/// GEMINI_API_KEY > GOOGLE_AI_API_KEY > GOOGLE_API_KEY
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_AI_API_KEY", "GOOGLE_API_KEY"];

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에서 임베딩 프로바이더 생성
pub fn create_embedder(settings: &Settings) -> Result<GeminiEmbedding> {
    let api_key = settings.gemini_api_key()?.to_string();
    let embedder =
        GeminiEmbedding::with_endpoint(api_key, &settings.gemini_base_url, DEFAULT_DIMENSION)?;
    tracing::info!(
        "Using Gemini API embedding (dimension: {})",
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::with_endpoint("fake_key".to_string(), GEMINI_BASE_URL, 999);
        assert!(result.is_err());
        assert!(result
            .err()
            .map(|e| e.to_string().contains("Invalid dimension"))
            .unwrap_or(false));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            let result = GeminiEmbedding::with_endpoint("fake_key".to_string(), GEMINI_BASE_URL, dim);
            assert!(result.is_ok());
        }
    }

    #[test]
    fn test_create_embedder_without_key_returns_error() {
        let settings = Settings::with_home(std::path::Path::new("/tmp/unused"));
        let result = create_embedder(&settings);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_text_skips_request() {
        let embedder =
            GeminiEmbedding::with_endpoint("k".to_string(), "http://127.0.0.1:9", 768).unwrap();
        let embedding = embedder.embed("   ").await.unwrap();
        assert_eq!(embedding.len(), 768);
        assert!(embedding.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_query_uses_retrieval_query_task() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-embedding-001:embedContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({ "taskType": "RETRIEVAL_QUERY" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": { "values": [0.25, 0.5, 0.75] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder =
            GeminiEmbedding::with_endpoint("test-key".to_string(), &server.uri(), 768).unwrap();
        let embedding = embedder.embed_query("is battery better?").await.unwrap();
        assert_eq!(embedding, vec![0.25, 0.5, 0.75]);
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "API key not valid", "status": "INVALID_ARGUMENT" }
            })))
            .mount(&server)
            .await;

        let embedder =
            GeminiEmbedding::with_endpoint("bad".to_string(), &server.uri(), 768).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("INVALID_ARGUMENT"));
    }
}
