//! CLI 모듈
//!
//! reddit-beta-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{Settings, DEFAULT_FLAIRS};
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::knowledge::{Indexer, VectorDb};
use crate::llm::GeminiChat;
use crate::qa::QaAnswer;
use crate::reddit::{
    fetch_threads, FetchOutcome, SourceRequest, SourceRouter, ThreadCache, TimeFilter,
};
use crate::session::SessionContext;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "reddit-beta-rag")]
#[command(version, about = "Reddit Android 베타 피드백 RAG 도구", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 수집 대상 (셋 중 하나)
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// 플레어 라벨 (예: "Android 16 Beta 1")
    #[arg(long, group = "source")]
    pub flair: Option<String>,

    /// 게시물 URL
    #[arg(long, group = "source")]
    pub url: Option<String>,

    /// 검색 키워드
    #[arg(long, group = "source")]
    pub keywords: Option<String>,

    /// 키워드 검색 시간 범위
    #[arg(long, value_enum)]
    pub time: Option<TimeFilter>,
}

impl SourceArgs {
    pub fn to_request(&self) -> Result<SourceRequest> {
        match (&self.flair, &self.url, &self.keywords) {
            (Some(flair), None, None) => Ok(SourceRequest::flair(flair.clone())),
            (None, Some(url), None) => {
                if self.time.is_some() {
                    println!("[!] --time 은 URL 모드에서 무시됩니다");
                }
                Ok(SourceRequest::url(url.clone()))
            }
            (None, None, Some(keywords)) => Ok(SourceRequest::keywords(keywords.clone(), self.time)),
            (None, None, None) => bail!("--flair, --url, --keywords 중 하나를 지정해야 합니다"),
            _ => bail!("--flair, --url, --keywords 는 하나만 지정할 수 있습니다"),
        }
    }
}

/// chat REPL의 `:load` 인자
///
/// 공백으로 나뉜 라벨/키워드는 다시 이어 붙입니다 (`:load --flair Android 16 Beta 1`).
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct LoadLine {
    #[arg(long, group = "source", num_args = 1..)]
    flair: Option<Vec<String>>,

    #[arg(long, group = "source")]
    url: Option<String>,

    #[arg(long, group = "source", num_args = 1..)]
    keywords: Option<Vec<String>>,

    #[arg(long, value_enum)]
    time: Option<TimeFilter>,
}

impl LoadLine {
    fn parse_request(args: &str) -> Result<SourceRequest> {
        let line = LoadLine::try_parse_from(args.split_whitespace())?;
        SourceArgs {
            flair: line.flair.map(|words| words.join(" ")),
            url: line.url,
            keywords: line.keywords.map(|words| words.join(" ")),
            time: line.time,
        }
        .to_request()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 스레드를 수집하고 벡터 인덱스 생성
    Ingest {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// 스레드 수집만 (인덱싱 없음)
    Fetch {
        #[command(flatten)]
        source: SourceArgs,

        /// 스레드 배열을 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 기존 인덱스에 질문 (수집 없음)
    Query {
        #[command(flatten)]
        source: SourceArgs,

        /// 질문
        question: String,

        /// 근거 청크 출력
        #[arg(long)]
        show_sources: bool,
    },

    /// 수집 + 인덱싱 후 대화형 질의
    Chat {
        #[command(flatten)]
        source: SourceArgs,

        /// 근거 청크 출력
        #[arg(long)]
        show_sources: bool,
    },

    /// 플레어 캐시 관리
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// 상태 확인
    Status,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// 캐시된 플레어 목록
    List,

    /// 플레어 캐시 삭제 (다음 요청에서 새로 수집)
    Clear {
        /// 플레어 라벨
        flair: String,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    match cli.command {
        Commands::Ingest { source } => cmd_ingest(&settings, &source.to_request()?).await,
        Commands::Fetch { source, json } => {
            cmd_fetch(&settings, &source.to_request()?, json).await
        }
        Commands::Query {
            source,
            question,
            show_sources,
        } => cmd_query(&settings, &source.to_request()?, &question, show_sources).await,
        Commands::Chat {
            source,
            show_sources,
        } => cmd_chat(&settings, &source.to_request()?, show_sources).await,
        Commands::Cache { action } => match action {
            CacheCommand::List => cmd_cache_list(&settings),
            CacheCommand::Clear { flair } => cmd_cache_clear(&settings, &flair),
        },
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 세션 구성 (API 키가 없으면 여기서 실패)
async fn build_session(settings: &Settings) -> Result<SessionContext> {
    settings.ensure_dirs()?;

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(create_embedder(settings)?);
    let chat = Arc::new(GeminiChat::from_settings(settings)?);
    let db = VectorDb::open(&settings.vector_dir)
        .await
        .context("벡터 저장소 열기 실패")?;
    let indexer = Indexer::new(embedder.clone(), db, settings.cache_dir.clone());

    Ok(SessionContext::new(
        indexer,
        embedder,
        chat,
        settings.qa.clone(),
    ))
}

/// 수집 + 인덱싱
async fn load_source(
    settings: &Settings,
    session: &mut SessionContext,
    request: &SourceRequest,
) -> Result<()> {
    println!("[*] 수집 중: {}", request);

    let router = SourceRouter::from_settings(settings, &settings.cache_dir)?;
    let report = session.load(router, request).await?;

    println!(
        "[OK] 스레드 {} 개, 청크 {} 개 인덱싱 완료",
        report.threads, report.chunks
    );
    println!("     컬렉션: {}", report.collection);
    Ok(())
}

/// 인덱스 생성 명령어 (ingest)
async fn cmd_ingest(settings: &Settings, request: &SourceRequest) -> Result<()> {
    let mut session = build_session(settings).await?;
    load_source(settings, &mut session, request).await
}

/// 수집 명령어 (fetch)
async fn cmd_fetch(settings: &Settings, request: &SourceRequest, json: bool) -> Result<()> {
    if !json {
        println!("[*] 수집 중: {}", request);
    }

    let threads = match fetch_threads(settings, request).await {
        FetchOutcome::Fetched(threads) => threads,
        FetchOutcome::Empty => {
            if json {
                println!("[]");
            } else {
                println!("[!] 일치하는 스레드가 없습니다.");
            }
            return Ok(());
        }
        FetchOutcome::Failed(message) => bail!("수집 실패: {}", message),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&threads).context("JSON 직렬화 실패")?
        );
        return Ok(());
    }

    println!("[OK] 스레드 ({} 건):\n", threads.len());
    for (i, thread) in threads.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, truncate_text(&thread.title, 70));
        println!("       댓글 {} 개", thread.comments.len());
    }

    Ok(())
}

/// 질의 명령어 (query)
async fn cmd_query(
    settings: &Settings,
    request: &SourceRequest,
    question: &str,
    show_sources: bool,
) -> Result<()> {
    let mut session = build_session(settings).await?;
    session.open_existing(&request.identifier).await?;

    println!("[*] 질문: \"{}\"\n", question);
    let answer = session.ask(question).await?;
    print_answer(answer, show_sources);
    Ok(())
}

/// 대화형 명령어 (chat)
async fn cmd_chat(settings: &Settings, request: &SourceRequest, show_sources: bool) -> Result<()> {
    let mut session = build_session(settings).await?;
    load_source(settings, &mut session, request).await?;

    let mut show_sources = show_sources;
    println!();
    println!("질문을 입력하세요. (:load <소스> 다시 수집, :sources 근거 토글, :stats 카운터, :quit 종료)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            ":quit" | ":q" => break,
            ":sources" => {
                show_sources = !show_sources;
                println!(
                    "[*] 근거 출력: {}",
                    if show_sources { "켜짐" } else { "꺼짐" }
                );
            }
            ":stats" => println!("[*] {}", session.counters()),
            line => {
                if let Some(args) = load_args(line) {
                    // 실패해도 기존 인덱스와 카운터는 유지
                    let loaded = match LoadLine::parse_request(args) {
                        Ok(request) => load_source(settings, &mut session, &request).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = loaded {
                        println!("[!] {:#}", e);
                    }
                    continue;
                }

                match session.ask(line).await {
                    Ok(answer) => print_answer(answer, show_sources),
                    Err(e) => println!("[!] {}", e),
                }
            }
        }
    }

    println!("[*] 세션 종료 ({})", session.counters());
    Ok(())
}

/// 캐시 목록 명령어
fn cmd_cache_list(settings: &Settings) -> Result<()> {
    let cache = ThreadCache::new(&settings.cache_dir, settings.cache_policy);
    let entries = cache.entries()?;

    if entries.is_empty() {
        println!("[!] 캐시된 플레어가 없습니다.");
        return Ok(());
    }

    println!("[OK] 캐시된 플레어 ({} 건):\n", entries.len());
    for entry in entries {
        let threads = entry
            .threads
            .map(|n| format!("{} 스레드", n))
            .unwrap_or_else(|| "손상됨".to_string());
        println!("  {}", entry.label);
        println!(
            "        {} | {} | {}",
            threads,
            format_bytes(entry.size as usize),
            entry.modified.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

/// 캐시 삭제 명령어
fn cmd_cache_clear(settings: &Settings, flair: &str) -> Result<()> {
    let cache = ThreadCache::new(&settings.cache_dir, settings.cache_policy);
    if cache.remove(flair)? {
        println!("[OK] 캐시 삭제됨: {}", flair);
    } else {
        println!("[!] 캐시가 없습니다: {}", flair);
    }
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("reddit-beta-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", settings.home.display());
    println!("    캐시: {}", settings.cache_dir.display());
    println!("    벡터: {}", settings.vector_dir.display());
    println!("    로그: {}", settings.log_dir.display());
    println!("[*] 커뮤니티: r/{}", settings.subreddit);

    if settings.reddit.client_id.is_some() && settings.reddit.client_secret.is_some() {
        println!("[OK] Reddit 자격 증명: 설정됨");
    } else {
        println!("[!] Reddit 자격 증명: 미설정");
        println!("    설정: export REDDIT_CLIENT_ID=... REDDIT_CLIENT_SECRET=...");
    }

    if settings.gemini_api_key.is_some() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    let cache = ThreadCache::new(&settings.cache_dir, settings.cache_policy);
    match cache.entries() {
        Ok(entries) => println!("[OK] 캐시된 플레어: {} 건", entries.len()),
        Err(e) => println!("[!] 캐시 조회 실패: {}", e),
    }

    if settings.vector_dir.exists() {
        match VectorDb::open(&settings.vector_dir).await {
            Ok(db) => match db.collection_names().await {
                Ok(names) => println!(
                    "[OK] 벡터 컬렉션: {} 개 ({})",
                    names.len(),
                    db.path().display()
                ),
                Err(e) => tracing::debug!("컬렉션 조회 실패: {}", e),
            },
            Err(e) => tracing::debug!("벡터 저장소 열기 실패: {}", e),
        }
    }

    println!();
    println!("[*] 기본 플레어:");
    for flair in DEFAULT_FLAIRS {
        println!("    - {}", flair);
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `:load ...` 줄이면 뒤쪽 인자
fn load_args(line: &str) -> Option<&str> {
    line.strip_prefix(":load")
        .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

fn print_answer(answer: &QaAnswer, show_sources: bool) {
    println!("{}", answer.answer.trim());

    if show_sources {
        println!("\n[*] 근거 청크 ({} 건):", answer.sources.len());
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  {}. [유사도: {:.4}] 문서 #{} 청크 {}",
                i + 1,
                source.similarity,
                source.seq_num,
                source.chunk_index
            );
            println!("     {}", truncate_text(&source.chunk_text, 200));
        }
    }
    println!();
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
