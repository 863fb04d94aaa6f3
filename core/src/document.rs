use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A page stored in the search backend, keyed by its normalized URL.
///
/// Ranking fields default to "never clicked"; `last_clicked_at*` serialize as
/// absent rather than zero so the backend can tell "never" from epoch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageDocument {
    pub url: String,
    #[serde(default)]
    pub canonical_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub h1: String,
    #[serde(default)]
    pub headings_h1: Vec<String>,
    #[serde(default)]
    pub headings_h2: Vec<String>,
    #[serde(default)]
    pub headings_h3: Vec<String>,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub meta_keywords: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawled_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<i64>,
    #[serde(default)]
    pub clicks_total: i64,
    #[serde(default)]
    pub recent_clicks: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_clicked_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_clicked_at: Option<String>,
    #[serde(default)]
    pub ranking_score: f64,
}

/// An inbound click on a search result, as posted to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEvent {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_clicked_fields_serialize_as_absent() {
        let doc = PageDocument {
            url: "https://example.com/".into(),
            title: "Example".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&doc).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("last_clicked_at"));
        assert!(!object.contains_key("last_clicked_at_ms"));
        assert_eq!(object["clicks_total"], 0);
    }

    #[test]
    fn stub_documents_deserialize_with_defaults() {
        // A click-created stub carries none of the crawl fields.
        let doc: PageDocument = serde_json::from_str(
            r#"{"url":"https://example.com/","title":"https://example.com/",
                "clicks_total":1,"recent_clicks":1.0,"ranking_score":1.4,
                "last_clicked_at_ms":1700000000000}"#,
        )
        .unwrap();
        assert_eq!(doc.clicks_total, 1);
        assert_eq!(doc.content_length, None);
        assert_eq!(doc.crawled_at, None);
        assert_eq!(doc.last_clicked_at_ms, Some(1_700_000_000_000));
        assert!(doc.headings_h2.is_empty());
    }
}
