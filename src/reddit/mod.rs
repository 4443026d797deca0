//! Reddit 데이터 수집 모듈
//!
//! 소스 종류(flair / url / keywords)에 따라 스레드를 수집해 `Vec<Thread>`로 돌려줍니다.
//!
//! ```text
//! SourceRequest → SourceRouter → fetch_by_* → build_thread (댓글 평탄화) → Vec<Thread>
//! ```

pub mod cache;
pub mod client;
pub mod comments;
pub mod fetch;
pub mod model;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Result};

pub use cache::{CacheEntry, CachePolicy, ThreadCache};
pub use client::{RedditApi, RedditClient, RedditError};
pub use fetch::SourceRouter;
pub use model::{Comment, Thread};

use crate::config::Settings;

// ============================================================================
// Source Types
// ============================================================================

/// 수집 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Flair,
    Url,
    Keywords,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Flair => "flair",
            SourceMode::Url => "url",
            SourceMode::Keywords => "keywords",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flair" => Ok(SourceMode::Flair),
            "url" => Ok(SourceMode::Url),
            "keywords" => Ok(SourceMode::Keywords),
            other => bail!("Invalid data type: {}", other),
        }
    }
}

/// 검색 시간 필터 (기본값 `all`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TimeFilter {
    Hour,
    Day,
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl TimeFilter {
    pub const ALL: [TimeFilter; 6] = [
        TimeFilter::Hour,
        TimeFilter::Day,
        TimeFilter::Week,
        TimeFilter::Month,
        TimeFilter::Year,
        TimeFilter::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid time filter: {} (expected hour|day|week|month|year|all)",
                    s
                )
            })
    }
}

/// 수집 요청
///
/// 생성자는 식별자 앞뒤 공백을 제거합니다. 캐시 경로, 검색어, 컬렉션 이름이 모두 같은 값을 씁니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub mode: SourceMode,
    /// flair 라벨, 게시물 URL, 또는 검색어
    pub identifier: String,
    /// keywords 전용 (url에서는 무시)
    pub time_filter: Option<TimeFilter>,
}

impl SourceRequest {
    pub fn flair(label: impl Into<String>) -> Self {
        Self {
            mode: SourceMode::Flair,
            identifier: label.into().trim().to_string(),
            time_filter: None,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            mode: SourceMode::Url,
            identifier: url.into().trim().to_string(),
            time_filter: None,
        }
    }

    pub fn keywords(keywords: impl Into<String>, time_filter: Option<TimeFilter>) -> Self {
        Self {
            mode: SourceMode::Keywords,
            identifier: keywords.into().trim().to_string(),
            time_filter,
        }
    }
}

impl fmt::Display for SourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.mode, self.identifier)?;
        if let (SourceMode::Keywords, Some(tf)) = (self.mode, self.time_filter) {
            write!(f, " ({})", tf)?;
        }
        Ok(())
    }
}

/// 수집 결과
///
/// "일치 항목 없음"과 "오류"를 구분합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(Vec<Thread>),
    Empty,
    Failed(String),
}

impl FetchOutcome {
    pub fn from_threads(threads: Vec<Thread>) -> Self {
        if threads.is_empty() {
            FetchOutcome::Empty
        } else {
            FetchOutcome::Fetched(threads)
        }
    }

    pub fn into_threads(self) -> Vec<Thread> {
        match self {
            FetchOutcome::Fetched(threads) => threads,
            FetchOutcome::Empty | FetchOutcome::Failed(_) => Vec::new(),
        }
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// 설정의 캐시 디렉토리로 수집
pub async fn fetch_threads(settings: &Settings, request: &SourceRequest) -> FetchOutcome {
    fetch_with_cache_dir(settings, request, &settings.cache_dir).await
}

async fn fetch_with_cache_dir(
    settings: &Settings,
    request: &SourceRequest,
    cache_dir: &Path,
) -> FetchOutcome {
    match SourceRouter::from_settings(settings, cache_dir) {
        Ok(router) => router.route(request).await,
        Err(e) => {
            tracing::error!("Failed to create Reddit client: {}", e);
            FetchOutcome::Failed(e.to_string())
        }
    }
}

/// 문자열 인자 진입점 (실패하지 않음)
///
/// 알 수 없는 `mode`나 잘못된 `time_filter`는 로그를 남기고 빈 목록을 반환합니다.
/// `time_filter`는 keywords에서만 해석합니다.
pub async fn get_reddit_data(
    settings: &Settings,
    mode: &str,
    identifier: &str,
    time_filter: Option<&str>,
    cache_dir: &Path,
) -> Vec<Thread> {
    let request = match request_from_args(mode, identifier, time_filter) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("{}", e);
            return Vec::new();
        }
    };

    fetch_with_cache_dir(settings, &request, cache_dir)
        .await
        .into_threads()
}

/// 문자열 인자 → 요청 (`time_filter`는 keywords에서만 해석)
fn request_from_args(
    mode: &str,
    identifier: &str,
    time_filter: Option<&str>,
) -> Result<SourceRequest> {
    Ok(match mode.parse::<SourceMode>()? {
        SourceMode::Flair => SourceRequest::flair(identifier),
        SourceMode::Url => SourceRequest::url(identifier),
        SourceMode::Keywords => {
            let tf = time_filter.map(str::parse::<TimeFilter>).transpose()?;
            SourceRequest::keywords(identifier, tf)
        }
    })
}
