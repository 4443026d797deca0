//! 인덱싱 파이프라인
//!
//! ```text
//! Vec<Thread> → temp_<sha256>.json → 문서 → 청크(1000/200) → 임베딩 → reddit_<sha256[..56]> 컬렉션
//! ```
//!
//! 같은 식별자로 다시 인덱싱하면 기존 컬렉션에 그대로 추가됩니다 (중복 제거 없음).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

use super::chunker::{Chunker, WindowChunker};
use super::lance::{LanceCollection, VectorDb};
use super::loader::{load_documents, write_threads};
use super::vector::{VectorEntry, VectorStore};
use crate::embedding::EmbeddingProvider;
use crate::reddit::cache::TEMP_FILE_PREFIX;
use crate::reddit::Thread;

/// 컬렉션 이름 접두사
pub const COLLECTION_PREFIX: &str = "reddit_";
/// 컬렉션 이름에 쓰는 해시 길이 (hex 문자 수)
const COLLECTION_HASH_LEN: usize = 56;

fn sha256_hex(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 식별자 → 컬렉션 이름 (`reddit_` + sha256 hex 앞 56자)
pub fn collection_name(identifier: &str) -> String {
    let hex = sha256_hex(identifier);
    format!("{}{}", COLLECTION_PREFIX, &hex[..COLLECTION_HASH_LEN])
}

/// 식별자 → 임시 파일 이름 (`temp_<sha256 hex>.json`)
pub fn temp_file_name(identifier: &str) -> String {
    format!("{}{}.json", TEMP_FILE_PREFIX, sha256_hex(identifier))
}

/// 인덱싱 결과 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub collection: String,
    pub threads: usize,
    pub documents: usize,
    pub chunks: usize,
    pub temp_file: PathBuf,
}

pub struct Indexer {
    embedder: Arc<dyn EmbeddingProvider>,
    db: VectorDb,
    temp_dir: PathBuf,
    chunker: Box<dyn Chunker>,
}

impl Indexer {
    /// 기본 청커(1000/200)로 생성, 임시 파일은 `temp_dir`에 기록
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, db: VectorDb, temp_dir: PathBuf) -> Self {
        Self {
            embedder,
            db,
            temp_dir,
            chunker: Box::new(WindowChunker::default()),
        }
    }

    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn db(&self) -> &VectorDb {
        &self.db
    }

    /// 스레드를 인덱싱하고 컬렉션 핸들을 반환
    pub async fn index(
        &self,
        identifier: &str,
        threads: &[Thread],
    ) -> Result<(LanceCollection, IndexReport)> {
        if threads.is_empty() {
            bail!("No threads to index for '{}'", identifier);
        }

        // 1. 임시 파일 기록
        let temp_file = self.temp_dir.join(temp_file_name(identifier));
        write_threads(&temp_file, threads)?;

        // 2. 문서 로드 + 청킹
        let documents = load_documents(&temp_file)?;
        let mut pending: Vec<VectorEntry> = Vec::new();
        for doc in &documents {
            for (chunk_index, chunk) in self.chunker.chunk(&doc.content).into_iter().enumerate() {
                pending.push(VectorEntry {
                    source: doc.source.clone(),
                    seq_num: doc.seq_num as i64,
                    chunk_index: chunk_index as i32,
                    chunk_text: chunk,
                    embedding: Vec::new(),
                });
            }
        }
        if pending.is_empty() {
            bail!("No text to index for '{}'", identifier);
        }

        tracing::info!(
            "Indexing '{}': {} documents, {} chunks ({} chunker)",
            identifier,
            documents.len(),
            pending.len(),
            self.chunker.name()
        );

        // 3. 임베딩
        let texts: Vec<String> = pending.iter().map(|e| e.chunk_text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .with_context(|| format!("Failed to embed chunks with {}", self.embedder.name()))?;
        if embeddings.len() != pending.len() {
            bail!(
                "Embedding count mismatch: {} chunks, {} embeddings",
                pending.len(),
                embeddings.len()
            );
        }
        for (entry, embedding) in pending.iter_mut().zip(embeddings) {
            entry.embedding = embedding;
        }

        // 4-5. 컬렉션에 추가
        let name = collection_name(identifier);
        let collection = self.db.collection(&name);
        let inserted = collection
            .insert_batch(&pending)
            .await
            .with_context(|| format!("Failed to store chunks in {}", name))?;

        tracing::info!("Stored {} chunks in collection {}", inserted, name);

        let report = IndexReport {
            collection: name,
            threads: threads.len(),
            documents: documents.len(),
            chunks: inserted,
            temp_file,
        };
        Ok((collection, report))
    }
}
