//! 소스별 스레드 수집 + 라우터
//!
//! - flair: 커뮤니티 내 `flair_name:"..."` 검색, 결과를 캐시에 저장
//! - url: 게시물 하나 (시간 필터 무시)
//! - keywords: 자유 검색 + 시간 필터 (캐시 없음)
//!
//! 게시물별 댓글 수집은 순서를 보존하는 buffered 스트림으로 겹쳐 실행합니다.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use super::cache::ThreadCache;
use super::client::{RedditApi, RedditClient, RedditResult};
use super::comments::build_thread;
use super::model::{Submission, Thread};
use super::{FetchOutcome, SourceMode, SourceRequest, TimeFilter};
use crate::config::Settings;

/// 게시물 목록 → Thread 목록 (입력 순서 유지)
pub async fn build_threads(
    api: &dyn RedditApi,
    submissions: &[Submission],
    concurrency: usize,
) -> Vec<Thread> {
    stream::iter(submissions.iter().map(|submission| {
        tracing::debug!("Processing submission: {}", submission.title);
        build_thread(api, submission)
    }))
    .buffered(concurrency.max(1))
    .collect()
    .await
}

/// 플레어로 수집 (캐시 우선)
pub async fn fetch_by_flair(
    api: &dyn RedditApi,
    cache: &ThreadCache,
    subreddit: &str,
    flair: &str,
    concurrency: usize,
) -> FetchOutcome {
    if let Some(threads) = cache.load(flair) {
        return FetchOutcome::from_threads(threads);
    }

    tracing::info!("Fetching posts for flair: {}", flair);
    let query = format!("flair_name:\"{}\"", flair);
    let submissions = match api.search(subreddit, &query, None).await {
        Ok(submissions) => submissions,
        Err(e) => {
            tracing::error!("Reddit API error for flair '{}': {}", flair, e);
            return FetchOutcome::Failed(e.to_string());
        }
    };

    let threads = build_threads(api, &submissions, concurrency).await;

    // 빈 결과도 저장 (다음 요청은 네트워크 없이 응답)
    if let Err(e) = cache.store(flair, &threads) {
        tracing::error!("Failed to cache flair '{}': {:#}", flair, e);
    }

    FetchOutcome::from_threads(threads)
}

/// URL로 게시물 하나 수집
pub async fn fetch_by_url(api: &dyn RedditApi, url: &str) -> FetchOutcome {
    tracing::info!("Fetching post by URL: {}", url);
    match api.submission_by_url(url).await {
        Ok(submission) => FetchOutcome::Fetched(vec![build_thread(api, &submission).await]),
        Err(e) => {
            tracing::error!("Reddit API error fetching post by URL: {}", e);
            FetchOutcome::Failed(e.to_string())
        }
    }
}

/// 키워드 + 시간 필터로 수집
pub async fn fetch_by_keywords(
    api: &dyn RedditApi,
    subreddit: &str,
    keywords: &str,
    time_filter: Option<TimeFilter>,
    concurrency: usize,
) -> FetchOutcome {
    tracing::info!(
        "Fetching posts from r/{} with keywords: '{}', time_filter: {}",
        subreddit,
        keywords,
        time_filter.unwrap_or_default()
    );

    match api.search(subreddit, keywords, time_filter).await {
        Ok(submissions) => {
            FetchOutcome::from_threads(build_threads(api, &submissions, concurrency).await)
        }
        Err(e) => {
            tracing::error!("Reddit API error for keywords '{}': {}", keywords, e);
            FetchOutcome::Failed(e.to_string())
        }
    }
}

// ============================================================================
// SourceRouter
// ============================================================================

/// 요청 하나를 해당 수집기로 보내는 라우터
///
/// 라우터는 요청 하나 동안만 세션을 쓰며, 어떤 경로로 끝나든 세션을 닫습니다.
pub struct SourceRouter {
    api: Arc<dyn RedditApi>,
    cache: ThreadCache,
    subreddit: String,
    concurrency: usize,
}

impl SourceRouter {
    pub fn new(
        api: Arc<dyn RedditApi>,
        cache: ThreadCache,
        subreddit: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            api,
            cache,
            subreddit: subreddit.into(),
            concurrency,
        }
    }

    /// 설정으로 새 Reddit 세션을 만든 라우터 (네트워크 호출 없음)
    pub fn from_settings(settings: &Settings, cache_dir: &Path) -> RedditResult<Self> {
        let client = RedditClient::new(&settings.reddit)?;
        Ok(Self::new(
            Arc::new(client),
            ThreadCache::new(cache_dir, settings.cache_policy),
            settings.subreddit.clone(),
            settings.comment_concurrency,
        ))
    }

    pub async fn route(self, request: &SourceRequest) -> FetchOutcome {
        let outcome = self.dispatch(request).await;
        self.api.close().await;

        match &outcome {
            FetchOutcome::Fetched(threads) => tracing::info!(
                "Fetched {} threads for {} '{}'",
                threads.len(),
                request.mode,
                request.identifier
            ),
            FetchOutcome::Empty => tracing::info!(
                "No threads for {} '{}'",
                request.mode,
                request.identifier
            ),
            FetchOutcome::Failed(_) => {}
        }
        outcome
    }

    async fn dispatch(&self, request: &SourceRequest) -> FetchOutcome {
        let identifier = request.identifier.as_str();
        if identifier.is_empty() {
            tracing::error!("Empty identifier for {} source", request.mode);
            return FetchOutcome::Failed("identifier is empty".to_string());
        }

        let api = self.api.as_ref();
        match request.mode {
            SourceMode::Flair => {
                fetch_by_flair(api, &self.cache, &self.subreddit, identifier, self.concurrency)
                    .await
            }
            SourceMode::Url => fetch_by_url(api, identifier).await,
            SourceMode::Keywords => {
                fetch_by_keywords(
                    api,
                    &self.subreddit,
                    identifier,
                    request.time_filter,
                    self.concurrency,
                )
                .await
            }
        }
    }
}
