//! 설정 모듈 - 환경변수 기반 런타임 설정
//!
//! 모든 설정은 환경변수에서 읽으며, 없으면 기본값을 사용합니다.
//! API 키/자격 증명은 시작 시점이 아니라 처음 사용할 때 검증합니다.
//!
//! 기본 디렉토리 구조:
//! ```text
//! ~/.reddit-beta-rag/
//!   threads/         # flair 캐시 (JSON) + 인덱싱용 임시 파일
//!   vectors.lance/   # LanceDB 벡터 저장소
//!   logs/            # 로그 파일
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::embedding;
use crate::qa::PromptTemplate;
use crate::reddit::CachePolicy;

/// 기본 대상 커뮤니티
pub const DEFAULT_SUBREDDIT: &str = "android_beta";

/// 미리 정의된 flair 목록 (선택 편의용)
pub const DEFAULT_FLAIRS: &[&str] = &[
    "Android 15 QPR1 Beta 1",
    "Android 15 QPR1 Beta 2",
    "Android 15 QPR1 Beta 3",
    "Android 16 DP1",
    "Android 16 DP2",
    "Android 16 Beta 1",
    "Android 16 Beta 2",
];

/// Reddit OAuth 토큰 엔드포인트
pub const REDDIT_AUTH_URL: &str = "https://www.reddit.com";
/// Reddit OAuth API 엔드포인트
pub const REDDIT_API_URL: &str = "https://oauth.reddit.com";
/// Gemini API 엔드포인트
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 검색 결과 최대 개수 (Reddit 리스팅 기본값)
const DEFAULT_SEARCH_LIMIT: usize = 100;
/// 스레드별 댓글 확장 동시 실행 수
const DEFAULT_COMMENT_CONCURRENCY: usize = 4;
/// 검색할 청크 수
const DEFAULT_TOP_K: usize = 5;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.reddit-beta-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reddit-beta-rag")
}

// ============================================================================
// Settings
// ============================================================================

/// Reddit API 접속 설정
#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    /// 토큰 발급 서버 (테스트 시 목 서버로 교체)
    pub auth_url: String,
    /// OAuth API 서버
    pub api_url: String,
    /// 검색 1회당 최대 게시물 수
    pub search_limit: usize,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: default_user_agent(),
            auth_url: REDDIT_AUTH_URL.to_string(),
            api_url: REDDIT_API_URL.to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// 질의 파이프라인 설정
#[derive(Debug, Clone)]
pub struct QaConfig {
    /// 검색할 최근접 청크 수 (k)
    pub top_k: usize,
    /// 자리표시자 검증을 마친 프롬프트 템플릿
    pub template: PromptTemplate,
}

impl QaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            anyhow::bail!("top_k must be at least 1");
        }
        Ok(())
    }
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            template: PromptTemplate::default(),
        }
    }
}

/// 전체 런타임 설정
#[derive(Debug, Clone)]
pub struct Settings {
    pub home: PathBuf,
    /// flair 캐시 디렉토리
    pub cache_dir: PathBuf,
    /// 벡터 저장소 디렉토리 (캐시 디렉토리와 분리)
    pub vector_dir: PathBuf,
    pub log_dir: PathBuf,
    pub reddit: RedditConfig,
    pub subreddit: String,
    pub comment_concurrency: usize,
    pub cache_policy: CachePolicy,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub qa: QaConfig,
}

impl Settings {
    /// 지정된 홈 디렉토리 기준 기본 설정 (환경변수 무시)
    pub fn with_home(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            cache_dir: home.join("threads"),
            vector_dir: home.join("vectors.lance"),
            log_dir: home.join("logs"),
            reddit: RedditConfig::default(),
            subreddit: DEFAULT_SUBREDDIT.to_string(),
            comment_concurrency: DEFAULT_COMMENT_CONCURRENCY,
            cache_policy: CachePolicy::Forever,
            gemini_api_key: None,
            gemini_base_url: GEMINI_BASE_URL.to_string(),
            qa: QaConfig::default(),
        }
    }

    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 조회 함수로 설정 로드
    ///
    /// 빈 문자열은 미설정으로 취급합니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let home = get("REDDIT_RAG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(get_data_dir);
        let mut settings = Self::with_home(&home);

        if let Some(dir) = get("REDDIT_RAG_CACHE_DIR") {
            settings.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("REDDIT_RAG_VECTOR_DIR") {
            settings.vector_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("REDDIT_RAG_LOG_DIR") {
            settings.log_dir = PathBuf::from(dir);
        }

        settings.reddit.client_id = get("REDDIT_CLIENT_ID");
        settings.reddit.client_secret = get("REDDIT_CLIENT_SECRET");
        if let Some(agent) = get("REDDIT_USER_AGENT") {
            settings.reddit.user_agent = agent;
        }
        if let Some(url) = get("REDDIT_AUTH_URL") {
            settings.reddit.auth_url = url;
        }
        if let Some(url) = get("REDDIT_API_URL") {
            settings.reddit.api_url = url;
        }
        if let Some(limit) = parse_var(&get, "REDDIT_SEARCH_LIMIT")? {
            settings.reddit.search_limit = limit;
        }
        if let Some(subreddit) = get("REDDIT_SUBREDDIT") {
            settings.subreddit = subreddit;
        }
        if let Some(n) = parse_var::<usize, _>(&get, "REDDIT_COMMENT_CONCURRENCY")? {
            settings.comment_concurrency = n.max(1);
        }
        if let Some(hours) = parse_var::<u64, _>(&get, "REDDIT_CACHE_TTL_HOURS")? {
            let secs = hours.checked_mul(3600).ok_or_else(|| {
                anyhow::anyhow!("Invalid value for REDDIT_CACHE_TTL_HOURS: {} is too large", hours)
            })?;
            settings.cache_policy = CachePolicy::Ttl(Duration::from_secs(secs));
        }

        settings.gemini_api_key = embedding::API_KEY_VARS.iter().find_map(|&name| get(name));
        if let Some(url) = get("GEMINI_BASE_URL") {
            settings.gemini_base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(k) = parse_var::<usize, _>(&get, "RAG_TOP_K")? {
            if k == 0 {
                anyhow::bail!("RAG_TOP_K must be at least 1");
            }
            settings.qa.top_k = k;
        }
        if let Some(path) = get("RAG_PROMPT_FILE") {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt template: {}", path))?;
            settings.qa.template = PromptTemplate::new(raw)
                .with_context(|| format!("Invalid prompt template in {}", path))?;
        }

        Ok(settings)
    }

    /// Gemini API 키 반환 (없으면 안내 메시지와 함께 에러)
    pub fn gemini_api_key(&self) -> Result<&str> {
        self.gemini_api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "Gemini API key not found. Set GEMINI_API_KEY, GOOGLE_AI_API_KEY or GOOGLE_API_KEY.\n\
                 Get your API key at: https://aistudio.google.com/app/apikey"
            )
        })
    }

    /// 캐시/벡터/로그 디렉토리 생성
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.cache_dir, &self.vector_dir, &self.log_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }
}

fn default_user_agent() -> String {
    format!("reddit-beta-rag/{}", env!("CARGO_PKG_VERSION"))
}

/// 숫자형 환경변수 파싱
fn parse_var<T, G>(get: &G, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", name, raw, e)),
        None => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_under_home() {
        let settings = Settings::from_lookup(lookup_from(&[("REDDIT_RAG_HOME", "/tmp/rbr")]))
            .unwrap();
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/rbr/threads"));
        assert_eq!(settings.vector_dir, PathBuf::from("/tmp/rbr/vectors.lance"));
        assert_ne!(settings.cache_dir, settings.vector_dir);
        assert_eq!(settings.subreddit, "android_beta");
        assert_eq!(settings.qa.top_k, 5);
        assert_eq!(settings.cache_policy, CachePolicy::Forever);
        assert!(settings.reddit.client_id.is_none());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("REDDIT_RAG_HOME", "/tmp/rbr"),
            ("REDDIT_CLIENT_ID", "id"),
            ("REDDIT_CLIENT_SECRET", "secret"),
            ("REDDIT_CACHE_TTL_HOURS", "2"),
            ("RAG_TOP_K", "2"),
            ("GOOGLE_API_KEY", "g-key"),
            ("GEMINI_BASE_URL", "http://localhost:9999/"),
        ]))
        .unwrap();

        assert_eq!(settings.reddit.client_id.as_deref(), Some("id"));
        assert_eq!(
            settings.cache_policy,
            CachePolicy::Ttl(Duration::from_secs(7200))
        );
        assert_eq!(settings.qa.top_k, 2);
        assert_eq!(settings.gemini_api_key().unwrap(), "g-key");
        assert_eq!(settings.gemini_base_url, "http://localhost:9999");
    }

    #[test]
    fn test_api_key_priority() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "third"),
            ("GEMINI_API_KEY", "first"),
        ]))
        .unwrap();
        assert_eq!(settings.gemini_api_key().unwrap(), "first");
    }

    #[test]
    fn test_missing_api_key_is_error_at_use() {
        let settings = Settings::from_lookup(lookup_from(&[("GEMINI_API_KEY", "  ")])).unwrap();
        let err = settings.gemini_api_key().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let result = Settings::from_lookup(lookup_from(&[("RAG_TOP_K", "many")]));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("RAG_TOP_K"));

        let zero = Settings::from_lookup(lookup_from(&[("RAG_TOP_K", "0")]));
        assert!(zero.is_err());
    }

    #[test]
    fn test_oversized_ttl_is_reported() {
        let result = Settings::from_lookup(lookup_from(&[(
            "REDDIT_CACHE_TTL_HOURS",
            "18446744073709551615",
        )]));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("REDDIT_CACHE_TTL_HOURS"));
    }

    #[test]
    fn test_prompt_file_validated_at_load() {
        let dir = tempfile::TempDir::new().unwrap();

        let bad = dir.path().join("bad.txt");
        std::fs::write(&bad, "Answer briefly.").unwrap();
        let bad_path = bad.display().to_string();
        let err = Settings::from_lookup(lookup_from(&[("RAG_PROMPT_FILE", bad_path.as_str())]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("{context}"));

        let good = dir.path().join("good.txt");
        std::fs::write(&good, "Q: {question}\nC: {context}").unwrap();
        let good_path = good.display().to_string();
        let settings =
            Settings::from_lookup(lookup_from(&[("RAG_PROMPT_FILE", good_path.as_str())]))
                .unwrap();
        assert_eq!(settings.qa.template.render("ctx", "why?"), "Q: why?\nC: ctx");
    }
}
