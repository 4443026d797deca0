//! 스레드 JSON 파일 → 문서 로더
//!
//! 인덱싱 전 스레드 배열을 임시 파일로 기록하고, 파일에서 스레드마다 문서 하나를 만듭니다.
//! 문서 본문은 스레드 레코드의 JSON 텍스트입니다.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::reddit::Thread;

/// 로드된 문서
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    /// 원본 파일 경로
    pub source: String,
    /// 파일 내 순번 (1부터)
    pub seq_num: usize,
}

/// 스레드 배열을 JSON 파일로 기록
pub fn write_threads(path: &Path, threads: &[Thread]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_vec(threads).context("Failed to serialize threads")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// JSON 파일에서 문서 로드 (배열이면 원소마다, 아니면 전체가 문서 하나)
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    let source = path.display().to_string();
    let records = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| -> Result<Document> {
            Ok(Document {
                content: serde_json::to_string(&record)?,
                source: source.clone(),
                seq_num: i + 1,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reddit::Comment;
    use tempfile::TempDir;

    #[test]
    fn test_one_document_per_thread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/temp.json");
        let threads = vec![
            Thread {
                title: "A".into(),
                text: "first".into(),
                comments: vec![Comment::new("c1")],
            },
            Thread {
                title: "B".into(),
                text: String::new(),
                comments: vec![],
            },
        ];

        write_threads(&path, &threads).unwrap();
        let docs = load_documents(&path).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].seq_num, 1);
        assert_eq!(docs[1].seq_num, 2);
        let parsed: Thread = serde_json::from_str(&docs[0].content).unwrap();
        assert_eq!(parsed, threads[0]);
        assert!(docs[1].source.ends_with("temp.json"));
    }

    #[test]
    fn test_non_array_is_single_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("one.json");
        fs::write(&path, r#"{"title": "x"}"#).unwrap();

        let docs = load_documents(&path).unwrap();
        assert_eq!(docs.len(), 1);
    }
}
