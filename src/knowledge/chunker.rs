//! Text Chunking Module
//!
//! 문자 단위 슬라이딩 윈도우 분할입니다.
//! 청크 크기 `size`, 겹침 `overlap`이면 윈도우는 `size - overlap`씩 이동하고,
//! 길이 `L`인 텍스트는 `L <= size`이면 1개, 아니면 `ceil((L - overlap) / (size - overlap))`개로 나뉩니다.

use anyhow::{bail, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정 (문자 수)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkConfig {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be positive");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// WindowChunker
// ============================================================================

/// 고정 크기 + 겹침 윈도우 청커
#[derive(Debug, Clone)]
pub struct WindowChunker {
    config: ChunkConfig,
}

impl WindowChunker {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }
}

impl Default for WindowChunker {
    fn default() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }
}

impl Chunker for WindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return vec![];
        }

        let ChunkConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;

        if chars.len() <= chunk_size {
            return vec![text.to_string()];
        }

        let step = chunk_size - chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());

            if end >= chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "window"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_count(len: usize) -> usize {
        if len <= 1000 {
            1
        } else {
            (len - 200).div_ceil(800)
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(WindowChunker::default().chunk("").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = WindowChunker::default();
        let text = "x".repeat(1000);
        assert_eq!(chunker.chunk(&text), vec![text.clone()]);
        assert_eq!(chunker.chunk("short"), vec!["short".to_string()]);
    }

    #[test]
    fn test_chunk_count_formula() {
        let chunker = WindowChunker::default();
        for len in [1001, 1800, 1801, 2600, 5000, 12345] {
            let text = "a".repeat(len);
            assert_eq!(chunker.chunk(&text).len(), expected_count(len), "len {}", len);
        }
    }

    #[test]
    fn test_overlap_between_chunks() {
        let chunker = WindowChunker::default();
        let text: String = (0..2000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunker.chunk(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(&chunks[0][800..], &chunks[1][..200]);
        assert!(text.ends_with(chunks.last().unwrap().as_str()));
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let chunker = WindowChunker::new(ChunkConfig {
            chunk_size: 4,
            chunk_overlap: 1,
        })
        .unwrap();
        let chunks = chunker.chunk("안녕하세요반가워");
        assert_eq!(chunks, vec!["안녕하세", "세요반가", "가워"]);
    }

    #[test]
    fn test_invalid_config() {
        assert!(WindowChunker::new(ChunkConfig {
            chunk_size: 100,
            chunk_overlap: 100,
        })
        .is_err());
        assert!(WindowChunker::new(ChunkConfig {
            chunk_size: 0,
            chunk_overlap: 0,
        })
        .is_err());
    }
}
