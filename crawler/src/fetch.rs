use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// HTTP fetcher with a process-wide cap on in-flight requests and linear
/// retry backoff. The concurrency permit is held per attempt, so a URL
/// sitting out a backoff does not occupy a slot.
pub struct Fetcher {
    client: Client,
    permits: Semaphore,
    max_retries: u32,
    retry_backoff: f64,
}

impl Fetcher {
    pub fn new(client: Client, concurrency: usize, max_retries: u32, retry_backoff: f64) -> Self {
        Self {
            client,
            permits: Semaphore::new(concurrency.max(1)),
            max_retries: max_retries.max(1),
            retry_backoff,
        }
    }

    /// Fetch `url` as text, treating any non-2xx status as a failure.
    /// Attempt n failing sleeps `retry_backoff * n` seconds before the next
    /// try; the last error surfaces once all attempts are spent.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            let outcome = async {
                let _permit = self.permits.acquire().await?;
                tracing::info!(url, attempt, max_retries = self.max_retries, "fetching");
                let resp = self.client.get(url).send().await?;
                let resp = resp.error_for_status()?;
                Ok::<String, anyhow::Error>(resp.text().await?)
            }
            .await;

            match outcome {
                Ok(body) => return Ok(body),
                Err(err) => {
                    tracing::warn!(url, attempt, %err, "fetch attempt failed");
                    last_error = Some(err);
                    if attempt < self.max_retries {
                        sleep(Duration::from_secs_f64(
                            self.retry_backoff * f64::from(attempt),
                        ))
                        .await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("failed to fetch {url}")))
    }
}
