use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration, read from the environment. Every knob has the
/// default the service has always shipped with; unparseable values fall back
/// to the default rather than aborting startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub elasticsearch_url: String,
    pub elasticsearch_index: String,
    pub click_events_index: String,
    /// Initial frontier contents.
    pub seed_urls: Vec<String>,
    /// Cap on emitted pages per crawl run.
    pub crawl_max_pages: usize,
    /// If true, discard links that leave the host of the page they were found on.
    pub crawl_same_domain_only: bool,
    /// Total per-request timeout.
    pub request_timeout: Duration,
    /// Sent on every HTTP request and used to select the robots.txt group.
    pub user_agent: String,
    /// Worker count and fetch-semaphore size.
    pub crawl_concurrency: usize,
    /// Attempts per URL before it is dropped.
    pub crawl_max_retries: u32,
    /// Base backoff in seconds; attempt n sleeps `base * n`.
    pub crawl_retry_backoff: f64,
    pub ranking_decay_per_hour: f64,
    pub recent_click_decay_multiplier: f64,
    pub decay_job_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elasticsearch_url: "http://localhost:9200".into(),
            elasticsearch_index: "seo_pages".into(),
            click_events_index: "seo_page_clicks".into(),
            seed_urls: Vec::new(),
            crawl_max_pages: 500,
            crawl_same_domain_only: false,
            request_timeout: Duration::from_secs(10),
            user_agent: "OfflineSEOEngine/1.0".into(),
            crawl_concurrency: 5,
            crawl_max_retries: 3,
            crawl_retry_backoff: 1.5,
            ranking_decay_per_hour: 0.05,
            recent_click_decay_multiplier: 0.85,
            decay_job_interval: Duration::from_secs(1800),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            elasticsearch_url: env_string("ELASTICSEARCH_URL", defaults.elasticsearch_url),
            elasticsearch_index: env_string("ELASTICSEARCH_INDEX", defaults.elasticsearch_index),
            click_events_index: env_string("CLICK_EVENTS_INDEX", defaults.click_events_index),
            seed_urls: env::var("SEED_URLS")
                .map(|raw| parse_list(&raw))
                .unwrap_or(defaults.seed_urls),
            crawl_max_pages: env_parse("CRAWL_MAX_PAGES", defaults.crawl_max_pages),
            crawl_same_domain_only: env::var("CRAWL_SAME_DOMAIN_ONLY")
                .map(|raw| parse_bool(&raw))
                .unwrap_or(defaults.crawl_same_domain_only),
            request_timeout: Duration::from_secs_f64(
                env_parse("REQUEST_TIMEOUT", defaults.request_timeout.as_secs_f64()).max(0.0),
            ),
            user_agent: env_string("USER_AGENT", defaults.user_agent),
            crawl_concurrency: env_parse("CRAWL_CONCURRENCY", defaults.crawl_concurrency).max(1),
            crawl_max_retries: env_parse("CRAWL_MAX_RETRIES", defaults.crawl_max_retries).max(1),
            crawl_retry_backoff: env_parse("CRAWL_RETRY_BACKOFF", defaults.crawl_retry_backoff),
            ranking_decay_per_hour: env_parse(
                "RANKING_DECAY_PER_HOUR",
                defaults.ranking_decay_per_hour,
            ),
            recent_click_decay_multiplier: env_parse(
                "RECENT_CLICK_DECAY_MULTIPLIER",
                defaults.recent_click_decay_multiplier,
            ),
            decay_job_interval: Duration::from_secs(env_parse(
                "DECAY_JOB_INTERVAL_SECONDS",
                defaults.decay_job_interval.as_secs(),
            )),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default,
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_accepts_common_truthy_values() {
        for raw in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(parse_bool(raw), "{raw:?} should be true");
        }
        for raw in ["0", "false", "no", "off", "garbage", ""] {
            assert!(!parse_bool(raw), "{raw:?} should be false");
        }
    }

    #[test]
    fn list_parsing_trims_and_drops_empties() {
        assert_eq!(
            parse_list(" https://a.example/ , https://b.example/ ,, "),
            vec!["https://a.example/".to_string(), "https://b.example/".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn defaults_match_shipped_values() {
        let config = Config::default();
        assert_eq!(config.elasticsearch_index, "seo_pages");
        assert_eq!(config.crawl_max_pages, 500);
        assert_eq!(config.crawl_concurrency, 5);
        assert_eq!(config.crawl_max_retries, 3);
        assert_eq!(config.decay_job_interval, Duration::from_secs(1800));
        assert!((config.recent_click_decay_multiplier - 0.85).abs() < f64::EPSILON);
    }
}
