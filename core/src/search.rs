use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::Config;
use crate::document::{ClickEvent, PageDocument};
use crate::ranking::{compute_ranking_score, current_time_ms};

/// Atomic read-modify-write applied to a ranked document on every click.
/// The decay term is computed against the *previous* click so the score
/// reflects the gap between clicks; the very first click decays nothing.
const CLICK_UPDATE_SCRIPT: &str = r#"
if (ctx._source.clicks_total == null) { ctx._source.clicks_total = 0; }
if (ctx._source.recent_clicks == null) { ctx._source.recent_clicks = 0.0; }
long prevLast = ctx._source.containsKey('last_clicked_at_ms') && ctx._source.last_clicked_at_ms != null ? ctx._source.last_clicked_at_ms : params.now_ms;
ctx._source.clicks_total += 1;
ctx._source.recent_clicks += 1;
ctx._source.last_clicked_at_ms = params.now_ms;
ctx._source.last_clicked_at = params.now_iso;
double decayHours = (params.now_ms - prevLast) / 3_600_000.0;
double decay = decayHours * params.decay_per_hour;
ctx._source.ranking_score = Math.log(ctx._source.clicks_total + 1.0) + (ctx._source.recent_clicks * 0.7) - decay;
"#;

/// Periodic sweep: attenuate `recent_clicks`, floor tiny values to zero, and
/// recompute the score against the wall clock.
const DECAY_SCRIPT: &str = r#"
if (ctx._source.recent_clicks == null) { ctx._source.recent_clicks = 0.0; }
if (ctx._source.clicks_total == null) { ctx._source.clicks_total = 0; }
ctx._source.recent_clicks = ctx._source.recent_clicks * params.recent_click_multiplier;
if (ctx._source.recent_clicks < 0.01) { ctx._source.recent_clicks = 0.0; }
long last = ctx._source.containsKey('last_clicked_at_ms') && ctx._source.last_clicked_at_ms != null ? ctx._source.last_clicked_at_ms : params.now_ms;
double decayHours = (params.now_ms - last) / 3_600_000.0;
double decay = decayHours * params.decay_per_hour;
ctx._source.ranking_score = Math.log(ctx._source.clicks_total + 1.0) + (ctx._source.recent_clicks * 0.7) - decay;
"#;

fn pages_index_body() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
        },
        "mappings": {
            "properties": {
                "url": {"type": "keyword"},
                "canonical_url": {"type": "keyword"},
                "title": {
                    "type": "text",
                    "fields": {"raw": {"type": "keyword", "ignore_above": 256}},
                },
                "content": {"type": "text"},
                "summary": {"type": "text"},
                "h1": {"type": "text"},
                "headings_h1": {"type": "text"},
                "headings_h2": {"type": "text"},
                "headings_h3": {"type": "text"},
                "meta_description": {"type": "text"},
                "meta_keywords": {"type": "text"},
                "lang": {"type": "keyword"},
                "crawled_at": {"type": "date"},
                "content_length": {"type": "integer"},
                "clicks_total": {"type": "long"},
                "recent_clicks": {"type": "double"},
                "last_clicked_at": {"type": "date"},
                "last_clicked_at_ms": {"type": "long"},
                "ranking_score": {"type": "double"},
            }
        },
    })
}

fn clicks_index_body() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
        },
        "mappings": {
            "properties": {
                "url": {"type": "keyword"},
                "user_id": {"type": "keyword"},
                "clicked_at": {"type": "date"},
                "metadata": {"type": "object"},
            }
        },
    })
}

/// Keyword query over the SEO fields with the field boosts the ranking model
/// was tuned for, sorted by click score first and relevance second.
pub fn build_search_body(q: &str) -> Value {
    json!({
        "query": {
            "multi_match": {
                "query": q,
                "fields": ["title^3", "h1^2", "meta_description^1.5", "content"],
            }
        },
        "highlight": {
            "fields": {"content": {}}
        },
        "sort": [
            {"ranking_score": {"order": "desc", "missing": "_last"}},
            {"_score": {"order": "desc"}},
        ],
    })
}

/// One search hit: the stored document plus relevance score and any
/// highlighted `content` fragments.
#[derive(Debug)]
pub struct SearchHit {
    pub source: PageDocument,
    pub score: f64,
    pub content_highlights: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EsSearchResponse {
    hits: EsHits,
}

#[derive(Debug, Deserialize)]
struct EsHits {
    hits: Vec<EsHit>,
}

#[derive(Debug, Deserialize)]
struct EsHit {
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: PageDocument,
    #[serde(default)]
    highlight: HashMap<String, Vec<String>>,
}

/// Thin client for the search backend. One instance is shared process-wide;
/// all ranking writes happen backend-side as scripted atomic updates, so
/// callers never take locks.
#[derive(Clone)]
pub struct SearchBackend {
    http: Client,
    base_url: String,
    pages_index: String,
    clicks_index: String,
    decay_per_hour: f64,
    recent_click_multiplier: f64,
}

impl SearchBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("building search backend client")?;
        Ok(Self {
            http,
            base_url: config.elasticsearch_url.trim_end_matches('/').to_string(),
            pages_index: config.elasticsearch_index.clone(),
            clicks_index: config.click_events_index.clone(),
            decay_per_hour: config.ranking_decay_per_hour,
            recent_click_multiplier: config.recent_click_decay_multiplier,
        })
    }

    pub fn decay_per_hour(&self) -> f64 {
        self.decay_per_hour
    }

    fn index_url(&self, index: &str) -> String {
        format!("{}/{}", self.base_url, index)
    }

    fn doc_url(&self, index: &str, endpoint: &str, id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            index,
            endpoint,
            urlencoding::encode(id)
        )
    }

    /// Create both indices with their mappings when absent. Idempotent.
    pub async fn ensure_indices(&self) -> Result<()> {
        self.ensure_index(&self.pages_index, pages_index_body())
            .await?;
        self.ensure_index(&self.clicks_index, clicks_index_body())
            .await
    }

    async fn ensure_index(&self, index: &str, body: Value) -> Result<()> {
        let url = self.index_url(index);
        let head = self
            .http
            .head(&url)
            .send()
            .await
            .with_context(|| format!("checking index {index}"))?;
        if head.status() == StatusCode::NOT_FOUND {
            let resp = self.http.put(&url).json(&body).send().await?;
            Self::check(resp).await?;
            tracing::info!(index, "created index");
        }
        Ok(())
    }

    /// Upsert a prepared document, keyed by its URL.
    pub async fn index_document(&self, doc: &PageDocument) -> Result<()> {
        let url = self.doc_url(&self.pages_index, "_doc", &doc.url);
        let resp = self.http.put(&url).json(doc).send().await?;
        Self::check(resp).await.map(|_| ())
    }

    /// Same contract as [`index_document`] over a batch, via `_bulk`.
    pub async fn bulk_index(&self, docs: &[PageDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let mut body = String::new();
        for doc in docs {
            body.push_str(&serde_json::to_string(&json!({
                "index": {"_index": self.pages_index, "_id": doc.url}
            }))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(doc)?);
            body.push('\n');
        }
        let resp = self
            .http
            .post(format!("{}/_bulk", self.base_url))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let summary: Value = resp.json().await?;
        if summary
            .get("errors")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Err(anyhow!("bulk index reported item failures"));
        }
        Ok(())
    }

    /// Record a click: append the raw event to the click log, then apply the
    /// scripted increment-and-rescore upsert on the ranked document. The
    /// update waits for a refresh so the new score is visible to the next
    /// search before this returns.
    pub async fn track_click(&self, event: &ClickEvent) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let now_iso = now.format(&Rfc3339)?;
        let now_ms = (now.unix_timestamp_nanos() / 1_000_000) as i64;

        let record = json!({
            "url": event.url,
            "user_id": event.user_id,
            "clicked_at": now_iso,
            "metadata": event.metadata.clone().unwrap_or_default(),
        });
        let resp = self
            .http
            .post(format!("{}/{}/_doc", self.base_url, self.clicks_index))
            .json(&record)
            .send()
            .await?;
        Self::check(resp).await?;

        let body = json!({
            "script": {
                "source": CLICK_UPDATE_SCRIPT,
                "lang": "painless",
                "params": {
                    "now_ms": now_ms,
                    "now_iso": now_iso,
                    "decay_per_hour": self.decay_per_hour,
                },
            },
            "upsert": {
                "url": event.url,
                "title": event.url,
                "summary": "",
                "content": "",
                "clicks_total": 1,
                "recent_clicks": 1.0,
                "last_clicked_at": now_iso,
                "last_clicked_at_ms": now_ms,
                "ranking_score": compute_ranking_score(1, 1.0, Some(now_ms), now_ms, self.decay_per_hour),
            },
        });
        let resp = self
            .http
            .post(self.doc_url(&self.pages_index, "_update", &event.url))
            .query(&[("refresh", "wait_for")])
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await.map(|_| ())
    }

    /// One decay sweep over every stored document. Version conflicts are
    /// skipped; the next sweep picks those documents up.
    pub async fn apply_decay(&self) -> Result<()> {
        let now_ms = current_time_ms();
        tracing::info!(index = %self.pages_index, "applying ranking decay to all documents");
        let body = json!({
            "query": {"match_all": {}},
            "script": {
                "source": DECAY_SCRIPT,
                "lang": "painless",
                "params": {
                    "recent_click_multiplier": self.recent_click_multiplier,
                    "now_ms": now_ms,
                    "decay_per_hour": self.decay_per_hour,
                },
            },
        });
        let resp = self
            .http
            .post(format!(
                "{}/{}/_update_by_query",
                self.base_url, self.pages_index
            ))
            .query(&[("conflicts", "proceed"), ("refresh", "true")])
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await.map(|_| ())
    }

    pub async fn search(&self, q: &str, size: usize) -> Result<Vec<SearchHit>> {
        let resp = self
            .http
            .post(format!("{}/{}/_search", self.base_url, self.pages_index))
            .query(&[("size", size.to_string())])
            .json(&build_search_body(q))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let parsed: EsSearchResponse = resp.json().await.context("decoding search response")?;
        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|mut hit| SearchHit {
                score: hit.score.unwrap_or(0.0),
                content_highlights: hit.highlight.remove("content").unwrap_or_default(),
                source: hit.source,
            })
            .collect())
    }

    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(anyhow!("search backend returned {status}: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_body_carries_boosts_and_sort() {
        let body = build_search_body("rust crawler");
        assert_eq!(body["query"]["multi_match"]["query"], "rust crawler");
        let fields = body["query"]["multi_match"]["fields"].as_array().unwrap();
        assert_eq!(fields[0], "title^3");
        assert_eq!(fields[1], "h1^2");
        assert_eq!(fields[2], "meta_description^1.5");
        assert_eq!(fields[3], "content");
        assert_eq!(body["sort"][0]["ranking_score"]["missing"], "_last");
        assert!(body["highlight"]["fields"].get("content").is_some());
    }

    #[test]
    fn index_bodies_type_ranking_fields() {
        let pages = pages_index_body();
        let props = &pages["mappings"]["properties"];
        assert_eq!(props["url"]["type"], "keyword");
        assert_eq!(props["ranking_score"]["type"], "double");
        assert_eq!(props["clicks_total"]["type"], "long");
        assert_eq!(props["title"]["fields"]["raw"]["type"], "keyword");

        let clicks = clicks_index_body();
        assert_eq!(clicks["mappings"]["properties"]["clicked_at"]["type"], "date");
    }
}
