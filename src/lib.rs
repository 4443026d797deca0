//! reddit-beta-rag - Reddit Android 베타 피드백 RAG 도구
//!
//! r/android_beta 스레드를 flair / URL / 키워드로 수집하고 댓글 트리를 평탄화한 뒤,
//! LanceDB 컬렉션에 임베딩하여 Gemini로 질의응답합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod qa;
pub(crate) mod ratelimit;
pub mod reddit;
pub mod session;

// Re-exports
pub use config::{get_data_dir, Settings};
pub use embedding::{create_embedder, EmbeddingProvider, GeminiEmbedding};
pub use knowledge::{
    collection_name, ChunkConfig, Chunker, IndexReport, Indexer, LanceCollection, SearchResult,
    VectorDb, VectorStore, WindowChunker,
};
pub use llm::{ChatModel, GeminiChat};
pub use qa::{QaAnswer, QaChain};
pub use reddit::{
    fetch_threads, get_reddit_data, Comment, FetchOutcome, RedditApi, RedditClient, SourceMode,
    SourceRequest, SourceRouter, Thread, TimeFilter,
};
pub use session::{SessionContext, SessionCounters, SessionError};
