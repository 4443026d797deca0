//! Vector Store - 벡터 검색 트레이트
//!
//! LanceDB ANN (Approximate Nearest Neighbor) 검색을 사용합니다.

use anyhow::Result;
use async_trait::async_trait;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 원본 문서 경로
    pub source: String,
    /// 문서 순번 (1부터)
    pub seq_num: i64,
    /// 문서 내 청크 인덱스 (0-based)
    pub chunk_index: i32,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub source: String,
    pub seq_num: i64,
    pub chunk_index: i32,
    pub chunk_text: String,
    /// 유사도 스코어 (0.0 ~ 1.0)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 컬렉션 하나에 대한 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 추가 (중복 검사 없음)
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 가까운 순으로 최대 `limit`개
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;
}
