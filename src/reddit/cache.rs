//! 플레어 스레드 캐시
//!
//! `<cache_dir>/<flair 라벨>.json` 파일에 Thread 배열을 4칸 들여쓰기 JSON으로 저장합니다.
//! 인덱싱 임시 파일(`temp_*.json`)과 같은 디렉토리를 쓰므로 목록에서는 제외합니다.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

use super::model::Thread;

/// 인덱싱 임시 파일 접두사
pub const TEMP_FILE_PREFIX: &str = "temp_";

/// 캐시 만료 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// 수동으로 지우기 전까지 유효
    #[default]
    Forever,
    /// 파일 수정 시각 기준 만료
    Ttl(Duration),
}

/// 캐시 항목 정보 (`cache list`)
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// 파일 이름에서 복원한 라벨 (`_` → 공백)
    pub label: String,
    pub path: PathBuf,
    /// 스레드 수 (파싱 실패 시 `None`)
    pub threads: Option<usize>,
    pub size: u64,
    pub modified: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct ThreadCache {
    dir: PathBuf,
    policy: CachePolicy,
}

impl ThreadCache {
    pub fn new(dir: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 라벨 → 파일 이름 (공백과 경로 구분자는 `_`)
    pub fn file_name(identifier: &str) -> String {
        let stem: String = identifier
            .chars()
            .map(|c| match c {
                ' ' | '/' | '\\' => '_',
                c => c,
            })
            .collect();
        format!("{}.json", stem)
    }

    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.dir.join(Self::file_name(identifier))
    }

    /// 캐시 읽기
    ///
    /// 파일이 없거나, 만료됐거나, Thread 배열로 파싱되지 않으면 `None`.
    /// 손상된 파일은 지우지 않고 다음 저장에서 덮어씁니다.
    pub fn load(&self, identifier: &str) -> Option<Vec<Thread>> {
        let path = self.path_for(identifier);
        if !path.exists() {
            return None;
        }

        if let CachePolicy::Ttl(ttl) = self.policy {
            let age = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok());
            if age.map_or(true, |age| age > ttl) {
                tracing::info!("Cache expired for '{}', refetching", identifier);
                return None;
            }
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("Failed to read cache {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<Vec<Thread>>(&content) {
            Ok(threads) => {
                tracing::info!(
                    "Loaded {} threads for '{}' from cache",
                    threads.len(),
                    identifier
                );
                Some(threads)
            }
            Err(e) => {
                tracing::error!(
                    "Corrupt cache file {}, fetching fresh data: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// 캐시 저장 (디렉토리 자동 생성)
    pub fn store(&self, identifier: &str, threads: &[Thread]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir: {}", self.dir.display()))?;

        let path = self.path_for(identifier);
        fs::write(&path, to_indented_json(threads)?)
            .with_context(|| format!("Failed to write cache: {}", path.display()))?;

        tracing::info!("Cached {} threads at {}", threads.len(), path.display());
        Ok(path)
    }

    /// 캐시 삭제, 파일이 있었으면 `true`
    pub fn remove(&self, identifier: &str) -> Result<bool> {
        let path = self.path_for(identifier);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove cache: {}", path.display()))?;
        Ok(true)
    }

    /// 캐시 항목 목록 (라벨 순, 임시 파일 제외)
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for item in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read cache dir: {}", self.dir.display()))?
        {
            let item = item?;
            let path = item.path();
            let name = item.file_name().to_string_lossy().to_string();

            if name.starts_with(TEMP_FILE_PREFIX) {
                continue;
            }
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };

            let metadata = item.metadata()?;
            let threads = fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<Vec<Thread>>(&c).ok())
                .map(|t| t.len());
            let modified = metadata
                .modified()
                .map(DateTime::<Local>::from)
                .unwrap_or_else(|_| Local::now());

            entries.push(CacheEntry {
                label: stem.replace('_', " "),
                path,
                threads,
                size: metadata.len(),
                modified,
            });
        }

        entries.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(entries)
    }
}

/// 4칸 들여쓰기 JSON
pub(crate) fn to_indented_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .context("Failed to serialize threads")?;
    Ok(buf)
}
