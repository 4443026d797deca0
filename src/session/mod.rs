//! 사용자 세션
//!
//! 세션 하나가 활성 인덱스, 마지막 답변, 채팅 모델 호출 카운터를 가집니다.
//! 전역 상태 없이 각 핸들러에 명시적으로 넘깁니다. 카운터는 저장하지 않습니다.

use std::fmt;
use std::sync::Arc;

use crate::config::QaConfig;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{collection_name, IndexReport, Indexer, LanceCollection};
use crate::llm::ChatModel;
use crate::qa::{QaAnswer, QaChain};
use crate::reddit::{FetchOutcome, SourceRequest, SourceRouter, Thread};

/// 세션 에러
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No data loaded yet: fetch and index a source first")]
    NoActiveIndex,

    #[error("Question is empty")]
    EmptyQuestion,

    #[error("No threads found for {0}")]
    NoThreads(String),

    #[error("Failed to fetch {source_desc}: {message}")]
    Fetch {
        source_desc: String,
        message: String,
    },

    #[error("No indexed collection for '{0}': run ingest first")]
    NoCollection(String),

    #[error("Indexing failed: {0:#}")]
    Indexing(anyhow::Error),

    #[error("Query failed: {0:#}")]
    Query(anyhow::Error),
}

/// 채팅 모델 호출 카운터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
}

impl fmt::Display for SessionCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests: {}, successes: {}, failures: {}",
            self.requests, self.successes, self.failures
        )
    }
}

/// 현재 질의 대상 인덱스
struct ActiveIndex {
    identifier: String,
    collection: String,
    chain: QaChain,
}

pub struct SessionContext {
    indexer: Indexer,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    qa: QaConfig,
    active: Option<ActiveIndex>,
    last_answer: Option<QaAnswer>,
    counters: SessionCounters,
}

impl SessionContext {
    pub fn new(
        indexer: Indexer,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
        qa: QaConfig,
    ) -> Self {
        Self {
            indexer,
            embedder,
            chat,
            qa,
            active: None,
            last_answer: None,
            counters: SessionCounters::default(),
        }
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn last_answer(&self) -> Option<&QaAnswer> {
        self.last_answer.as_ref()
    }

    /// 활성 인덱스의 (식별자, 컬렉션 이름)
    pub fn active_index(&self) -> Option<(&str, &str)> {
        self.active
            .as_ref()
            .map(|a| (a.identifier.as_str(), a.collection.as_str()))
    }

    /// 수집 + 인덱싱 (라우터는 이 요청 뒤 세션을 닫음)
    ///
    /// 수집 결과가 없거나 실패하면 새로 만든 것이 없으므로 기존 활성 인덱스를 유지합니다.
    pub async fn load(
        &mut self,
        router: SourceRouter,
        request: &SourceRequest,
    ) -> Result<IndexReport, SessionError> {
        match router.route(request).await {
            FetchOutcome::Fetched(threads) => self.index_threads(&request.identifier, &threads).await,
            FetchOutcome::Empty => Err(SessionError::NoThreads(request.to_string())),
            FetchOutcome::Failed(message) => Err(SessionError::Fetch {
                source_desc: request.to_string(),
                message,
            }),
        }
    }

    /// 스레드 인덱싱 후 활성화, 실패하면 활성 인덱스 없음
    pub async fn index_threads(
        &mut self,
        identifier: &str,
        threads: &[Thread],
    ) -> Result<IndexReport, SessionError> {
        self.qa.validate().map_err(SessionError::Indexing)?;
        self.active = None;
        self.last_answer = None;

        let (collection, report) = self
            .indexer
            .index(identifier, threads)
            .await
            .map_err(|e| {
                tracing::error!("Indexing failed for '{}': {:#}", identifier, e);
                SessionError::Indexing(e)
            })?;

        self.activate(identifier, collection)
            .map_err(SessionError::Indexing)?;
        Ok(report)
    }

    /// 이미 인덱싱된 컬렉션을 활성화 (수집 없음)
    pub async fn open_existing(&mut self, identifier: &str) -> Result<(), SessionError> {
        let name = collection_name(identifier);
        let collection = self
            .indexer
            .db()
            .existing_collection(&name)
            .await
            .map_err(SessionError::Query)?
            .ok_or_else(|| SessionError::NoCollection(identifier.to_string()))?;

        self.last_answer = None;
        self.activate(identifier, collection)
            .map_err(SessionError::Query)
    }

    fn activate(&mut self, identifier: &str, collection: LanceCollection) -> anyhow::Result<()> {
        let name = collection.name().to_string();
        let chain = QaChain::new(
            Arc::new(collection),
            self.embedder.clone(),
            self.chat.clone(),
            &self.qa,
        )?;

        tracing::info!("Active index: '{}' ({})", identifier, name);
        self.active = Some(ActiveIndex {
            identifier: identifier.to_string(),
            collection: name,
            chain,
        });
        Ok(())
    }

    /// 질문에 답변
    ///
    /// 빈 질문과 활성 인덱스 없음은 호출 없이 거절합니다 (카운터 변화 없음).
    /// 실패해도 활성 인덱스는 유지됩니다.
    pub async fn ask(&mut self, question: &str) -> Result<&QaAnswer, SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }
        let active = self.active.as_ref().ok_or(SessionError::NoActiveIndex)?;

        self.counters.requests += 1;
        match active.chain.ask(question).await {
            Ok(answer) => {
                self.counters.successes += 1;
                tracing::info!(
                    "Answered question with {} sources ({})",
                    answer.sources.len(),
                    self.counters
                );
                Ok(self.last_answer.insert(answer))
            }
            Err(e) => {
                self.counters.failures += 1;
                tracing::error!("Query failed: {:#} ({})", e, self.counters);
                Err(SessionError::Query(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::VectorDb;
    use crate::reddit::testing::{comment, submission, FakeReddit};
    use crate::reddit::{CachePolicy, Comment, ThreadCache};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct CharEmbedder;

    #[async_trait]
    impl EmbeddingProvider for CharEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            Ok(vec![
                lower.matches("battery").count() as f32,
                lower.matches("camera").count() as f32,
                1.0,
            ])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "chars"
        }
    }

    /// `fail`이 켜져 있으면 실패하는 채팅 모델
    #[derive(Default)]
    struct ToggleChat {
        fail: AtomicBool,
    }

    #[async_trait]
    impl ChatModel for ToggleChat {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("model unavailable");
            }
            Ok("answer".to_string())
        }

        fn name(&self) -> &str {
            "toggle"
        }
    }

    async fn session(dir: &TempDir, chat: Arc<ToggleChat>) -> SessionContext {
        let db = VectorDb::open(&dir.path().join("vectors.lance")).await.unwrap();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(CharEmbedder);
        let indexer = Indexer::new(embedder.clone(), db, dir.path().join("threads"));
        SessionContext::new(indexer, embedder, chat, QaConfig::default())
    }

    fn threads() -> Vec<Thread> {
        vec![Thread {
            title: "Beta".into(),
            text: "battery".into(),
            comments: vec![Comment::new("battery drains overnight")],
        }]
    }

    #[tokio::test]
    async fn test_ask_without_index_or_question() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, Arc::default()).await;

        assert!(matches!(
            session.ask("anything").await,
            Err(SessionError::NoActiveIndex)
        ));
        assert!(matches!(session.ask("   ").await, Err(SessionError::EmptyQuestion)));
        assert_eq!(session.counters(), SessionCounters::default());
    }

    #[tokio::test]
    async fn test_counters_track_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let chat = Arc::new(ToggleChat::default());
        let mut session = session(&dir, chat.clone()).await;

        session.index_threads("Beta", &threads()).await.unwrap();
        assert_eq!(
            session.active_index(),
            Some(("Beta", collection_name("Beta").as_str()))
        );

        let answer = session.ask("battery?").await.unwrap();
        assert_eq!(answer.answer, "answer");

        chat.fail.store(true, Ordering::SeqCst);
        assert!(matches!(session.ask("battery?").await, Err(SessionError::Query(_))));

        assert_eq!(
            session.counters(),
            SessionCounters {
                requests: 2,
                successes: 1,
                failures: 1
            }
        );
        // 실패 후에도 인덱스와 마지막 답변 유지
        assert!(session.active_index().is_some());
        assert_eq!(session.last_answer().map(|a| a.answer.as_str()), Some("answer"));
    }

    #[tokio::test]
    async fn test_failed_indexing_clears_active_index() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, Arc::default()).await;

        session.index_threads("Beta", &threads()).await.unwrap();
        let err = session.index_threads("Other", &[]).await.unwrap_err();
        assert!(matches!(err, SessionError::Indexing(_)));
        assert!(session.active_index().is_none());
    }

    fn router(dir: &TempDir, api: Arc<FakeReddit>) -> SourceRouter {
        SourceRouter::new(
            api,
            ThreadCache::new(dir.path().join("threads"), CachePolicy::Forever),
            "android_beta",
            2,
        )
    }

    fn battery_reddit() -> Arc<FakeReddit> {
        Arc::new(
            FakeReddit::default()
                .with_search_results(vec![submission("a", "Battery thread", 1)])
                .with_comments("a", vec![comment("c", "t3_a", "battery is bad", vec![])]),
        )
    }

    #[tokio::test]
    async fn test_load_through_router() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, Arc::default()).await;
        let api = battery_reddit();

        let report = session
            .load(router(&dir, api.clone()), &SourceRequest::keywords("  battery ", None))
            .await
            .unwrap();
        assert_eq!(report.threads, 1);
        assert_eq!(report.collection, collection_name("battery"));
        assert!(api.is_closed());
    }

    #[tokio::test]
    async fn test_failed_or_empty_load_keeps_previous_index() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, Arc::default()).await;
        session
            .load(router(&dir, battery_reddit()), &SourceRequest::keywords("battery", None))
            .await
            .unwrap();

        let err = session
            .load(
                router(&dir, Arc::new(FakeReddit::default().failing_search())),
                &SourceRequest::keywords("x", None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Fetch { .. }));

        let err = session
            .load(
                router(&dir, Arc::new(FakeReddit::default())),
                &SourceRequest::keywords("nothing", None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoThreads(_)));

        assert_eq!(session.active_index().map(|(id, _)| id), Some("battery"));
        assert_eq!(session.ask("battery?").await.unwrap().answer, "answer");
    }

    #[tokio::test]
    async fn test_counters_survive_reload() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir, Arc::default()).await;

        session
            .load(router(&dir, battery_reddit()), &SourceRequest::keywords("battery", None))
            .await
            .unwrap();
        session.ask("battery?").await.unwrap();
        assert!(session.last_answer().is_some());

        let camera = Arc::new(
            FakeReddit::default()
                .with_search_results(vec![submission("b", "Camera thread", 1)])
                .with_comments("b", vec![comment("d", "t3_b", "camera crashes", vec![])]),
        );
        session
            .load(router(&dir, camera), &SourceRequest::keywords("camera", None))
            .await
            .unwrap();

        // 새 인덱스가 활성화되면 이전 답변은 지워짐
        assert!(session.last_answer().is_none());
        assert_eq!(session.active_index().map(|(id, _)| id), Some("camera"));

        session.ask("camera?").await.unwrap();
        assert_eq!(
            session.counters(),
            SessionCounters {
                requests: 2,
                successes: 2,
                failures: 0
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_qa_config_rejected_before_indexing() {
        let dir = TempDir::new().unwrap();
        let db = VectorDb::open(&dir.path().join("vectors.lance")).await.unwrap();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(CharEmbedder);
        let indexer = Indexer::new(embedder.clone(), db.clone(), dir.path().join("threads"));
        let qa = QaConfig {
            top_k: 0,
            ..QaConfig::default()
        };
        let mut session = SessionContext::new(indexer, embedder, Arc::new(ToggleChat::default()), qa);

        let err = session.index_threads("Beta", &threads()).await.unwrap_err();
        assert!(matches!(err, SessionError::Indexing(_)));
        assert!(db.collection_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_existing() {
        let dir = TempDir::new().unwrap();
        let mut first = session(&dir, Arc::default()).await;

        assert!(matches!(
            first.open_existing("Beta").await,
            Err(SessionError::NoCollection(_))
        ));

        first.index_threads("Beta", &threads()).await.unwrap();
        let mut other = session(&dir, Arc::default()).await;
        other.open_existing("Beta").await.unwrap();
        assert!(other.ask("battery?").await.is_ok());
    }
}
