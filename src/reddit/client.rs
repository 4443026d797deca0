//! Reddit API 클라이언트
//!
//! 앱 전용 OAuth2(client credentials) 토큰으로 `oauth.reddit.com`을 호출합니다.
//! 토큰은 첫 요청 시점에 발급하므로, 클라이언트 생성 자체는 네트워크를 쓰지 않습니다.
//! 자격 증명이 없으면 첫 요청에서 [`RedditError::MissingCredentials`]로 실패합니다.
//!
//! ref: https://github.com/reddit-archive/reddit/wiki/OAuth2

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use super::model::{CommentNode, Listing, MoreChildrenResponse, Submission};
use super::TimeFilter;
use crate::config::RedditConfig;
use crate::ratelimit::RateLimiter;

/// Reddit OAuth 한도 (100 QPM)
const RATE_LIMIT_RPM: u32 = 100;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 리스팅 한 페이지 최대 크기
const PAGE_SIZE: usize = 100;
/// 댓글 트리 요청 시 최대 댓글 수
const COMMENT_LIMIT: usize = 2048;
/// 토큰 만료 전 갱신 여유
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

// ============================================================================
// Errors
// ============================================================================

/// Reddit API 에러
#[derive(Debug, thiserror::Error)]
pub enum RedditError {
    #[error("Reddit credentials missing: set {0}")]
    MissingCredentials(&'static str),

    #[error("Reddit authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Reddit rate limit exceeded")]
    RateLimited,

    #[error("Reddit resource not found: {0}")]
    NotFound(String),

    #[error("Reddit API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Not a Reddit submission URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected Reddit response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Reddit session is closed")]
    Closed,
}

pub type RedditResult<T> = std::result::Result<T, RedditError>;

// ============================================================================
// RedditApi Trait
// ============================================================================

/// Reddit 세션 인터페이스
///
/// 세션은 [`RedditApi::close`]로 닫으며, 닫힌 뒤의 호출은 실패합니다.
#[async_trait]
pub trait RedditApi: Send + Sync {
    /// 커뮤니티 내 검색 (`restrict_sr`)
    async fn search(
        &self,
        subreddit: &str,
        query: &str,
        time_filter: Option<TimeFilter>,
    ) -> RedditResult<Vec<Submission>>;

    /// URL로 게시물 조회
    async fn submission_by_url(&self, url: &str) -> RedditResult<Submission>;

    /// 게시물의 최상위 댓글 트리 (접힌 스텁 포함)
    async fn comments(&self, submission: &Submission) -> RedditResult<Vec<CommentNode>>;

    /// 접힌 댓글 펼치기 (평탄한 목록, 각 노드의 `parent_id`로 위치 결정)
    async fn more_children(
        &self,
        submission: &Submission,
        children: &[String],
    ) -> RedditResult<Vec<CommentNode>>;

    /// "이 스레드 계속" - 지정 댓글의 답글 트리
    async fn comment_subtree(
        &self,
        submission: &Submission,
        comment_id: &str,
    ) -> RedditResult<Vec<CommentNode>>;

    /// 세션 종료 (실패해도 에러를 내지 않음)
    async fn close(&self);
}

// ============================================================================
// RedditClient
// ============================================================================

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

/// reqwest 기반 Reddit 클라이언트
#[derive(Debug)]
pub struct RedditClient {
    config: RedditConfig,
    http: reqwest::Client,
    token: Mutex<Option<AccessToken>>,
    rate_limiter: Mutex<RateLimiter>,
    closed: AtomicBool,
}

impl RedditClient {
    /// 새 클라이언트 생성 (네트워크 호출 없음)
    pub fn new(config: &RedditConfig) -> RedditResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            config: config.clone(),
            http,
            token: Mutex::new(None),
            rate_limiter: Mutex::new(RateLimiter::new(
                RATE_LIMIT_RPM,
                RATE_LIMIT_WINDOW,
                Duration::ZERO,
            )),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> RedditResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RedditError::Closed);
        }
        Ok(())
    }

    /// 액세스 토큰 (만료 시 재발급)
    async fn access_token(&self) -> RedditResult<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if Instant::now() + TOKEN_EXPIRY_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or(RedditError::MissingCredentials("REDDIT_CLIENT_ID"))?;
        let client_secret = self
            .config
            .client_secret
            .as_deref()
            .ok_or(RedditError::MissingCredentials("REDDIT_CLIENT_SECRET"))?;

        tracing::debug!("Requesting Reddit access token");
        let response = self
            .http
            .post(format!("{}/api/v1/access_token", self.config.auth_url))
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RedditError::Auth {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let value = match (parsed.access_token, parsed.error) {
            (Some(value), None) => value,
            (_, error) => {
                return Err(RedditError::Auth {
                    status: status.as_u16(),
                    message: error.unwrap_or_else(|| "no access_token in response".to_string()),
                })
            }
        };

        let expires_in = Duration::from_secs(parsed.expires_in.unwrap_or(3600));
        *guard = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + expires_in,
        });

        Ok(value)
    }

    /// 인증된 GET 요청 후 JSON 파싱
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> RedditResult<T> {
        self.ensure_open()?;
        let token = self.access_token().await?;

        {
            let mut limiter = self.rate_limiter.lock().await;
            limiter.acquire().await;
        }

        let response = self
            .http
            .get(format!("{}{}", self.config.api_url, path))
            .bearer_auth(token)
            .query(&[("raw_json", "1")])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match status.as_u16() {
            s if (200..300).contains(&s) => Ok(serde_json::from_str(&body)?),
            401 | 403 => Err(RedditError::Auth {
                status: status.as_u16(),
                message: body,
            }),
            404 => Err(RedditError::NotFound(path.to_string())),
            429 => Err(RedditError::RateLimited),
            s => Err(RedditError::Api { status: s, body }),
        }
    }
}

#[async_trait]
impl RedditApi for RedditClient {
    async fn search(
        &self,
        subreddit: &str,
        query: &str,
        time_filter: Option<TimeFilter>,
    ) -> RedditResult<Vec<Submission>> {
        let path = format!("/r/{}/search", subreddit);
        let time_filter = time_filter.unwrap_or_default();
        let mut submissions = Vec::new();
        let mut after: Option<String> = None;

        // 페이지 단위로 search_limit까지 수집
        while submissions.len() < self.config.search_limit {
            let page_size = PAGE_SIZE.min(self.config.search_limit - submissions.len());
            let mut params = vec![
                ("q", query.to_string()),
                ("restrict_sr", "on".to_string()),
                ("sort", "relevance".to_string()),
                ("syntax", "lucene".to_string()),
                ("t", time_filter.as_str().to_string()),
                ("limit", page_size.to_string()),
            ];
            if let Some(ref cursor) = after {
                params.push(("after", cursor.clone()));
            }

            let listing: Listing = self.get_json(&path, &params).await?;
            after = listing.data.after.clone();
            let page = listing.into_submissions()?;
            let page_len = page.len();
            submissions.extend(page);

            tracing::debug!(
                "Search page: {} submissions (total {}) for '{}'",
                page_len,
                submissions.len(),
                query
            );

            if after.is_none() || page_len == 0 {
                break;
            }
        }

        submissions.truncate(self.config.search_limit);
        Ok(submissions)
    }

    async fn submission_by_url(&self, url: &str) -> RedditResult<Submission> {
        let id = submission_id_from_url(url)?;
        let listing: Listing = self
            .get_json("/api/info", &[("id", format!("t3_{}", id))])
            .await?;

        listing
            .into_submissions()?
            .into_iter()
            .next()
            .ok_or_else(|| RedditError::NotFound(url.to_string()))
    }

    async fn comments(&self, submission: &Submission) -> RedditResult<Vec<CommentNode>> {
        let path = format!("/comments/{}", submission.id);
        let (_link, comments): (Listing, Listing) = self
            .get_json(
                &path,
                &[
                    ("limit", COMMENT_LIMIT.to_string()),
                    ("sort", "confidence".to_string()),
                ],
            )
            .await?;
        Ok(comments.into_comment_nodes()?)
    }

    async fn more_children(
        &self,
        submission: &Submission,
        children: &[String],
    ) -> RedditResult<Vec<CommentNode>> {
        let response: MoreChildrenResponse = self
            .get_json(
                "/api/morechildren",
                &[
                    ("api_type", "json".to_string()),
                    ("link_id", submission.fullname()),
                    ("children", children.join(",")),
                    ("sort", "confidence".to_string()),
                ],
            )
            .await?;

        if !response.json.errors.is_empty() {
            return Err(RedditError::Api {
                status: 200,
                body: serde_json::Value::Array(response.json.errors).to_string(),
            });
        }

        let mut nodes = Vec::new();
        for thing in response.json.data.map(|d| d.things).unwrap_or_default() {
            if let Some(node) = thing.into_comment_node()? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    async fn comment_subtree(
        &self,
        submission: &Submission,
        comment_id: &str,
    ) -> RedditResult<Vec<CommentNode>> {
        let path = format!("/comments/{}/_/{}", submission.id, comment_id);
        let (_link, comments): (Listing, Listing) = self
            .get_json(&path, &[("limit", COMMENT_LIMIT.to_string())])
            .await?;

        // 응답의 최상위는 요청한 댓글 자신 - 그 답글만 반환
        let focused = comments.into_comment_nodes()?.into_iter().find_map(|node| match node {
            CommentNode::Comment(entry) if entry.id == comment_id => Some(entry.replies),
            _ => None,
        });
        Ok(focused.unwrap_or_default())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let token = self.token.lock().await.take();
        let (Some(token), Some(client_id)) = (token, self.config.client_id.as_deref()) else {
            return;
        };

        // 토큰 폐기 (best-effort)
        let result = self
            .http
            .post(format!("{}/api/v1/revoke_token", self.config.auth_url))
            .basic_auth(client_id, self.config.client_secret.as_deref())
            .form(&[
                ("token", token.value.as_str()),
                ("token_type_hint", "access_token"),
            ])
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("Reddit session closed");
            }
            Ok(resp) => tracing::debug!("Token revoke returned {}", resp.status()),
            Err(e) => tracing::debug!("Token revoke failed: {}", e),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 게시물 URL에서 base36 ID 추출
///
/// 지원 형식:
/// - `https://www.reddit.com/r/<sub>/comments/<id>/<slug>/`
/// - `https://reddit.com/comments/<id>`
/// - `https://redd.it/<id>`
pub fn submission_id_from_url(raw: &str) -> RedditResult<String> {
    let invalid = || RedditError::InvalidUrl(raw.to_string());
    let parsed = Url::parse(raw.trim()).map_err(|_| invalid())?;
    let host = parsed.host_str().ok_or_else(invalid)?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let id = if host == "redd.it" {
        segments.first().copied()
    } else if host == "reddit.com" || host.ends_with(".reddit.com") {
        segments
            .iter()
            .position(|s| *s == "comments")
            .and_then(|i| segments.get(i + 1))
            .copied()
    } else {
        None
    };

    id.filter(|id| id.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_lowercase)
        .ok_or_else(invalid)
}

// ============================================================================
// Tests
// ============================================================================
