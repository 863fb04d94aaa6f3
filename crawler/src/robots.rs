use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::Client;
use tokio::time::sleep;
use url::Url;

use crate::urlnorm;

/// Path-prefix rules for one origin. Immutable once cached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsRules {
    pub allows: Vec<String>,
    pub disallows: Vec<String>,
    pub crawl_delay: Option<f64>,
}

impl RobotsRules {
    /// Longest-match precedence: an untouched path is allowed, a path only a
    /// disallow rule matches is denied, and between competing rules the
    /// longer prefix wins with ties going to allow.
    pub fn is_allowed(&self, path: &str) -> bool {
        fn longest_prefix(path: &str, patterns: &[String]) -> i64 {
            patterns
                .iter()
                .filter(|rule| !rule.is_empty() && path.starts_with(rule.as_str()))
                .map(|rule| rule.len() as i64)
                .max()
                .unwrap_or(-1)
        }

        let allow = longest_prefix(path, &self.allows);
        let disallow = longest_prefix(path, &self.disallows);
        if disallow == -1 {
            return true;
        }
        if allow == -1 {
            return false;
        }
        allow >= disallow
    }
}

/// Permissive robots.txt parser. Lines without a colon are skipped,
/// `#` starts a comment, and keys are case-insensitive. Consecutive
/// `user-agent` lines form one group whose rules apply to every agent in it;
/// a line that parses but is not recognized breaks the group, while ignored
/// lines leave it open. Returns the group matching `user_agent` (exact,
/// case-insensitive), falling back to `*`, falling back to allow-all.
pub fn parse_robots(content: &str, user_agent: &str) -> RobotsRules {
    let mut rules_map: HashMap<String, RobotsRules> = HashMap::new();
    let mut current_agents: Vec<String> = Vec::new();
    let mut last_key: Option<String> = None;

    for raw_line in content.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key_lower = key.trim().to_lowercase();
        let value = value.trim();

        match key_lower.as_str() {
            "user-agent" => {
                if last_key.as_deref() == Some("user-agent") {
                    current_agents.push(value.to_string());
                } else {
                    current_agents = vec![value.to_string()];
                }
                rules_map.entry(value.to_string()).or_default();
            }
            "allow" | "disallow" => {
                if current_agents.is_empty() {
                    continue;
                }
                for agent in &current_agents {
                    let rules = rules_map.entry(agent.clone()).or_default();
                    if !value.is_empty() {
                        if key_lower == "allow" {
                            rules.allows.push(value.to_string());
                        } else {
                            rules.disallows.push(value.to_string());
                        }
                    }
                }
            }
            "crawl-delay" => {
                if current_agents.is_empty() {
                    continue;
                }
                let Ok(delay) = value.parse::<f64>() else {
                    continue;
                };
                for agent in &current_agents {
                    rules_map.entry(agent.clone()).or_default().crawl_delay = Some(delay);
                }
            }
            _ => {}
        }

        last_key = Some(key_lower);
    }

    let agent_lower = user_agent.to_lowercase();
    if let Some((_, rules)) = rules_map
        .iter()
        .find(|(agent, _)| agent.to_lowercase() == agent_lower)
    {
        return rules.clone();
    }
    rules_map.remove("*").unwrap_or_default()
}

type OriginLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Per-origin robots.txt cache and crawl-delay pacer.
///
/// Rules are fetched at most once per origin (concurrent callers wait on the
/// in-flight fetch and see the same cached result), and a per-origin mutex
/// serializes the wait-then-bump of the crawl-delay clock so concurrent
/// workers hit one origin at least `crawl_delay` apart, first come first
/// served.
pub struct RobotsManager {
    user_agent: String,
    rules: Mutex<HashMap<String, Arc<RobotsRules>>>,
    fetch_locks: OriginLocks,
    delay_locks: OriginLocks,
    next_allowed: Mutex<HashMap<String, Instant>>,
}

impl RobotsManager {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            rules: Mutex::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
            delay_locks: Mutex::new(HashMap::new()),
            next_allowed: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(locks: &OriginLocks, origin: &str) -> Arc<tokio::sync::Mutex<()>> {
        locks.lock().entry(origin.to_string()).or_default().clone()
    }

    /// Fetch, parse, and cache the rules for this URL's origin if they are
    /// not cached yet. Any failure (transport error or non-200) caches
    /// allow-all; robots problems never stop a crawl.
    pub async fn ensure_rules(&self, client: &Client, url: &Url) -> Arc<RobotsRules> {
        let origin = urlnorm::origin_key(url);
        if let Some(rules) = self.rules.lock().get(&origin) {
            return rules.clone();
        }

        let fetch_lock = Self::lock_for(&self.fetch_locks, &origin);
        let _in_flight = fetch_lock.lock().await;
        if let Some(rules) = self.rules.lock().get(&origin) {
            return rules.clone();
        }

        let robots_url = format!("{origin}/robots.txt");
        tracing::info!(%origin, "fetching robots.txt");
        let rules = match client.get(&robots_url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => match resp.text().await {
                Ok(content) => parse_robots(&content, &self.user_agent),
                Err(err) => {
                    tracing::warn!(%origin, %err, "failed to read robots.txt; allowing by default");
                    RobotsRules::default()
                }
            },
            Ok(resp) => {
                tracing::info!(
                    %origin,
                    status = %resp.status(),
                    "robots.txt not available; allowing by default"
                );
                RobotsRules::default()
            }
            Err(err) => {
                tracing::warn!(%origin, %err, "failed to fetch robots.txt; allowing by default");
                RobotsRules::default()
            }
        };

        let rules = Arc::new(rules);
        self.rules.lock().insert(origin, rules.clone());
        rules
    }

    /// Allow-all for origins with no cached rules.
    pub fn is_allowed(&self, url: &Url) -> bool {
        let origin = urlnorm::origin_key(url);
        let path = urlnorm::robots_path(url);
        match self.rules.lock().get(&origin) {
            Some(rules) => rules.is_allowed(&path),
            None => true,
        }
    }

    /// Sleep until this origin's next allowed request slot, then claim the
    /// slot after it. No-op for origins without a positive crawl-delay.
    pub async fn wait_for_crawl_delay(&self, url: &Url) {
        let origin = urlnorm::origin_key(url);
        let delay = {
            let rules = self.rules.lock();
            rules.get(&origin).and_then(|r| r.crawl_delay).unwrap_or(0.0)
        };
        if delay <= 0.0 {
            return;
        }
        let delay = Duration::from_secs_f64(delay);

        let pacer = Self::lock_for(&self.delay_locks, &origin);
        let _turn = pacer.lock().await;
        let now = Instant::now();
        let next_allowed = self
            .next_allowed
            .lock()
            .get(&origin)
            .copied()
            .unwrap_or(now);
        let wait = next_allowed.saturating_duration_since(now);
        if !wait.is_zero() {
            tracing::info!(%origin, wait_secs = wait.as_secs_f64(), "waiting for crawl-delay");
            sleep(wait).await;
        }
        self.next_allowed
            .lock()
            .insert(origin, Instant::now() + delay);
    }
}
