//! LanceDB Vector Store
//!
//! 하나의 LanceDB 디렉토리 안에 식별자별 컬렉션(테이블)을 둡니다.
//! 테이블은 첫 삽입 시 생성되며, 임베딩 차원은 첫 배치에서 정해집니다.
//! 추가(`add`)가 끝나면 디스크에 반영되므로 별도의 persist 단계는 없습니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::vector::{SearchResult, VectorEntry, VectorStore};

// ============================================================================
// VectorDb
// ============================================================================

/// 영속 벡터 저장소 (LanceDB 디렉토리)
#[derive(Clone)]
pub struct VectorDb {
    db: Connection,
    path: PathBuf,
}

impl VectorDb {
    /// LanceDB 저장소 열기 (없으면 생성)
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 저장된 컬렉션 이름 목록
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        self.db
            .table_names()
            .execute()
            .await
            .context("Failed to list collections")
    }

    /// 컬렉션 핸들 (테이블은 첫 삽입 시 생성)
    pub fn collection(&self, name: &str) -> LanceCollection {
        LanceCollection {
            db: self.db.clone(),
            name: name.to_string(),
        }
    }

    /// 이미 존재하는 컬렉션만 반환
    pub async fn existing_collection(&self, name: &str) -> Result<Option<LanceCollection>> {
        let names = self.collection_names().await?;
        Ok(names
            .iter()
            .any(|n| n == name)
            .then(|| self.collection(name)))
    }
}

// ============================================================================
// LanceCollection
// ============================================================================

/// LanceDB 테이블 하나
#[derive(Clone)]
pub struct LanceCollection {
    db: Connection,
    name: String,
}

impl LanceCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("source", DataType::Utf8, false),
            Field::new("seq_num", DataType::Int64, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("chunk_text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry]) -> Result<RecordBatch> {
        let first = entries
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty entries"))?;
        let dimension = first.embedding.len();
        if dimension == 0 {
            anyhow::bail!("Embedding vectors must not be empty");
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                dimension,
                bad.embedding.len()
            );
        }
        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        let sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
        let seq_nums: Vec<i64> = entries.iter().map(|e| e.seq_num).collect();
        let chunk_indices: Vec<i32> = entries.iter().map(|e| e.chunk_index).collect();
        let chunk_texts: Vec<&str> = entries.iter().map(|e| e.chunk_text.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(sources)),
                Arc::new(Int64Array::from(seq_nums)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(chunk_texts)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;
        Ok(names.contains(&self.name))
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(&self.name)
            .execute()
            .await
            .with_context(|| format!("Failed to open collection {}", self.name))
    }
}

#[async_trait]
impl VectorStore for LanceCollection {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await? {
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to collection")?;
        } else {
            tracing::debug!("Creating collection {}", self.name);
            self.db
                .create_table(&self.name, batches)
                .execute()
                .await
                .context("Failed to create collection")?;
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 || !self.table_exists().await? {
            return Ok(vec![]);
        }

        let results = self
            .open_table()
            .await?
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut search_results = Vec::new();

        for batch in batches {
            let sources: &StringArray = column(&batch, "source")?;
            let seq_nums: &Int64Array = column(&batch, "seq_num")?;
            let chunk_indices: &Int32Array = column(&batch, "chunk_index")?;
            let chunk_texts: &StringArray = column(&batch, "chunk_text")?;
            // LanceDB가 검색 결과에 추가하는 L2 거리
            let distances: &Float32Array = column(&batch, "_distance")?;

            for i in 0..batch.num_rows() {
                search_results.push(SearchResult {
                    source: sources.value(i).to_string(),
                    seq_num: seq_nums.value(i),
                    chunk_index: chunk_indices.value(i),
                    chunk_text: chunk_texts.value(i).to_string(),
                    similarity: 1.0 / (1.0 + distances.value(i)),
                });
            }
        }

        // 배치 경계와 무관하게 가까운 순 정렬
        search_results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        search_results.truncate(limit);
        Ok(search_results)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }
}

/// 이름으로 컬럼을 찾아 구체 배열 타입으로 변환
fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow::anyhow!("Missing or mistyped column: {}", name))
}

// ============================================================================
// Tests
// ============================================================================
