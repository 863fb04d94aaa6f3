use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use reqwest::{redirect, Client};
use scraper::{Html, Selector};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use url::Url;

use seo_core::config::Config;

use crate::fetch::Fetcher;
use crate::frontier::Frontier;
use crate::queue::WorkQueue;
use crate::robots::RobotsManager;
use crate::urlnorm;

/// A successfully fetched page: its normalized URL and raw HTML body.
pub type CrawledPage = (String, String);

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seed_urls: Vec<String>,
    pub max_pages: usize,
    pub same_domain_only: bool,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff: f64,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CrawlConfig {
    fn from(config: &Config) -> Self {
        Self {
            seed_urls: config.seed_urls.clone(),
            max_pages: config.crawl_max_pages,
            same_domain_only: config.crawl_same_domain_only,
            concurrency: config.crawl_concurrency.max(1),
            max_retries: config.crawl_max_retries.max(1),
            retry_backoff: config.crawl_retry_backoff,
            request_timeout: config.request_timeout,
            user_agent: config.user_agent.clone(),
        }
    }
}

struct CrawlShared {
    config: CrawlConfig,
    frontier: Frontier,
    robots: RobotsManager,
    fetcher: Fetcher,
    client: Client,
    queue: WorkQueue,
    link_selector: Selector,
    start_time: Instant,
}

/// Politeness-aware concurrent crawler. [`crawl`] seeds the frontier, starts
/// the worker pool, and hands back a [`CrawlSession`] streaming fetched
/// pages.
///
/// [`crawl`]: Crawler::crawl
pub struct Crawler {
    config: CrawlConfig,
}

impl Crawler {
    pub fn new(config: CrawlConfig) -> Self {
        Self { config }
    }

    /// Must be called from within a tokio runtime; the session owns every
    /// task it spawns.
    pub fn crawl(&self) -> Result<CrawlSession> {
        let config = self.config.clone();
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(redirect::Policy::limited(5))
            .timeout(config.request_timeout)
            .build()?;
        let fetcher = Fetcher::new(
            client.clone(),
            config.concurrency,
            config.max_retries,
            config.retry_backoff,
        );
        let link_selector = Selector::parse("a").unwrap();
        let shared = Arc::new(CrawlShared {
            frontier: Frontier::new(config.max_pages),
            robots: RobotsManager::new(config.user_agent.clone()),
            queue: WorkQueue::new(),
            start_time: Instant::now(),
            fetcher,
            client,
            link_selector,
            config,
        });

        let mut seeded = 0usize;
        for seed in &shared.config.seed_urls {
            let Some(url) = urlnorm::parse_seed(seed) else {
                tracing::warn!(%seed, "skipping invalid seed url");
                continue;
            };
            let url = String::from(url);
            if shared.frontier.mark_enqueued(&url) {
                shared.queue.push(url);
                seeded += 1;
            }
        }
        if seeded == 0 {
            return Err(anyhow!("no valid seeds"));
        }
        tracing::info!(
            seeds = seeded as u64,
            max_pages = shared.config.max_pages as u64,
            concurrency = shared.config.concurrency as u64,
            same_domain_only = shared.config.same_domain_only,
            "starting crawl"
        );

        let (results_tx, results_rx) = mpsc::channel(shared.config.concurrency * 2);
        let workers = (0..shared.config.concurrency)
            .map(|_| tokio::spawn(worker(shared.clone(), results_tx.clone())))
            .collect();
        drop(results_tx);

        let ticker = tokio::spawn({
            let shared = shared.clone();
            async move {
                loop {
                    sleep(Duration::from_secs(1)).await;
                    if shared.frontier.is_stopped() {
                        break;
                    }
                    log_speed(&shared);
                }
            }
        });

        // Once every queued URL has been acknowledged the frontier is
        // exhausted: closing the queue lets the workers drain out, which
        // drops the result senders and ends the session's stream.
        let supervisor = tokio::spawn({
            let shared = shared.clone();
            async move {
                shared.queue.join().await;
                shared.queue.close();
            }
        });

        Ok(CrawlSession {
            shared,
            results: results_rx,
            workers,
            ticker,
            supervisor,
            shut_down: false,
        })
    }
}

/// A running crawl. Pages arrive through [`next`]; the bounded results
/// channel applies back-pressure to the workers when the consumer is slow.
///
/// [`next`]: CrawlSession::next
pub struct CrawlSession {
    shared: Arc<CrawlShared>,
    results: mpsc::Receiver<CrawledPage>,
    workers: Vec<JoinHandle<()>>,
    ticker: JoinHandle<()>,
    supervisor: JoinHandle<()>,
    shut_down: bool,
}

impl CrawlSession {
    /// The next fetched page, or `None` once the frontier is exhausted or
    /// the page cap was reached and all results were consumed.
    pub async fn next(&mut self) -> Option<CrawledPage> {
        self.results.recv().await
    }

    /// Stop the crawl: suppress new work, cancel the workers and background
    /// tasks, wait for them, and log the final speed. Safe to call twice,
    /// and also used after a natural drain.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.shared.frontier.request_stop();
        self.shared.queue.close();
        self.results.close();
        for worker in &self.workers {
            worker.abort();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
        self.supervisor.abort();
        let _ = (&mut self.supervisor).await;
        self.ticker.abort();
        let _ = (&mut self.ticker).await;
        log_speed(&self.shared);
    }
}

impl Drop for CrawlSession {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
        self.supervisor.abort();
        self.ticker.abort();
    }
}

async fn worker(shared: Arc<CrawlShared>, results: mpsc::Sender<CrawledPage>) {
    while let Some(url) = shared.queue.pop().await {
        if let Err(err) = process(&shared, &url, &results).await {
            tracing::error!(%url, %err, "error processing url");
        }
        // Always acknowledge, even on failure, so the drain detection holds.
        shared.queue.task_done();
    }
}

async fn process(
    shared: &Arc<CrawlShared>,
    url: &str,
    results: &mpsc::Sender<CrawledPage>,
) -> Result<()> {
    if shared.frontier.is_stopped() {
        return Ok(());
    }
    let parsed = Url::parse(url)?;

    shared.robots.ensure_rules(&shared.client, &parsed).await;
    if !shared.robots.is_allowed(&parsed) {
        tracing::info!(url, "blocked by robots.txt");
        shared.frontier.mark_visited(url);
        return Ok(());
    }

    shared.robots.wait_for_crawl_delay(&parsed).await;

    // A URL whose fetch fails terminally is dropped without joining the
    // visited set; the enqueued set still keeps it from being re-queued.
    let body = shared.fetcher.fetch(url).await?;

    let Some(page_number) = shared.frontier.reserve_page_slot() else {
        return Ok(());
    };
    shared.frontier.mark_visited(url);

    let links = if shared.frontier.is_stopped() {
        Vec::new()
    } else {
        extract_links(shared, &parsed, &body)
    };

    if results.send((url.to_string(), body)).await.is_err() {
        // Consumer went away without a clean shutdown.
        shared.frontier.request_stop();
        return Ok(());
    }
    tracing::debug!(url, page_number = page_number as u64, "emitted page");
    log_speed(shared);

    for link in links {
        if shared.frontier.mark_enqueued(&link) {
            shared.queue.push(link);
        }
    }
    Ok(())
}

fn extract_links(shared: &CrawlShared, base: &Url, html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    for anchor in document.select(&shared.link_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(resolved) = urlnorm::normalize(base, href) else {
            continue;
        };
        if shared.config.same_domain_only && !urlnorm::same_host(base, &resolved) {
            continue;
        }
        links.push(String::from(resolved));
    }
    links
}

fn log_speed(shared: &CrawlShared) {
    let elapsed = shared.start_time.elapsed().as_secs_f64();
    if elapsed <= 0.0 {
        return;
    }
    let pages = shared.frontier.pages_crawled();
    tracing::info!(
        pages = pages as u64,
        elapsed_secs = elapsed,
        pages_per_sec = pages as f64 / elapsed,
        "crawl speed"
    );
}
