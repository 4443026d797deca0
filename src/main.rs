//! reddit-beta-rag CLI 진입점

use anyhow::Result;
use clap::Parser;

use reddit_beta_rag::config::Settings;

fn main() -> Result<()> {
    let cli = reddit_beta_rag::cli::Cli::parse();
    let settings = Settings::from_env()?;

    // 로깅 초기화
    reddit_beta_rag::logging::init(&settings.log_dir);

    // CLI 실행
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(reddit_beta_rag::cli::run(cli, settings))
}
