use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use crawler::crawl::{CrawlConfig, Crawler};
use crawler::parse::parse_page;
use seo_core::config::Config;
use seo_core::indexer::Indexer;
use seo_core::search::SearchBackend;

/// Pages shorter than this are navigation shells or error stubs; indexing
/// them only pollutes search results.
const MIN_CONTENT_LENGTH: i64 = 50;

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl seed sites into the SEO search index, respecting robots.txt")]
struct Cli {
    /// Seed URLs; overrides SEED_URLS from the environment
    #[arg(long = "seed")]
    seeds: Vec<String>,
    /// Maximum number of pages to emit
    #[arg(long)]
    max_pages: Option<usize>,
    /// Worker count and in-flight fetch cap
    #[arg(long)]
    concurrency: Option<usize>,
    /// Discard links that leave the host they were found on
    #[arg(long)]
    same_domain_only: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if !cli.seeds.is_empty() {
        config.seed_urls = cli.seeds;
    }
    if let Some(max_pages) = cli.max_pages {
        config.crawl_max_pages = max_pages;
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawl_concurrency = concurrency.max(1);
    }
    if let Some(same_domain_only) = cli.same_domain_only {
        config.crawl_same_domain_only = same_domain_only;
    }

    let backend = SearchBackend::new(&config)?;
    backend.ensure_indices().await?;
    let indexer = Indexer::new(backend);

    let crawler = Crawler::new(CrawlConfig::from(&config));
    let mut session = crawler.crawl()?;

    let mut indexed = 0u64;
    let mut skipped = 0u64;
    while let Some((url, html)) = session.next().await {
        let doc = parse_page(&url, &html);
        if doc.content_length.unwrap_or(0) < MIN_CONTENT_LENGTH {
            tracing::info!(%url, "skipping page, content too short");
            skipped += 1;
            continue;
        }
        match indexer.index_document(doc).await {
            Ok(()) => indexed += 1,
            Err(err) => tracing::error!(%url, %err, "failed to index page"),
        }
    }
    session.shutdown().await;

    tracing::info!(indexed, skipped, "crawl finished");
    Ok(())
}
