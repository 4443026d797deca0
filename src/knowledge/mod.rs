//! Knowledge 모듈 - 스레드 인덱싱과 벡터 검색
//!
//! - Loader: 스레드 JSON → 문서
//! - Chunker: 문자 단위 윈도우 분할 (1000 / 200)
//! - LanceDB: 식별자별 컬렉션에 청크 임베딩 저장
//! - Indexer: 위 단계를 묶은 파이프라인

mod chunker;
mod indexer;
mod lance;
mod loader;
mod vector;

// Re-exports
pub use chunker::{ChunkConfig, Chunker, WindowChunker};
pub use indexer::{collection_name, temp_file_name, IndexReport, Indexer, COLLECTION_PREFIX};
pub use lance::{LanceCollection, VectorDb};
pub use loader::{load_documents, write_threads, Document};
pub use vector::{SearchResult, VectorEntry, VectorStore};
