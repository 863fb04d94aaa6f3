use anyhow::Result;

use crate::document::PageDocument;
use crate::ranking::{compute_ranking_score, current_time_ms};
use crate::search::SearchBackend;

/// Writes crawled documents into the pages index, filling the click-ranking
/// defaults a freshly parsed page does not carry.
pub struct Indexer {
    backend: SearchBackend,
}

impl Indexer {
    pub fn new(backend: SearchBackend) -> Self {
        Self { backend }
    }

    /// A freshly parsed document has zeroed ranking fields; a re-crawled page
    /// keeps whatever score it already earned. A zero score is recomputed so
    /// re-indexing never erases accumulated decay state.
    fn with_click_defaults(&self, doc: &mut PageDocument) {
        if doc.ranking_score == 0.0 {
            doc.ranking_score = compute_ranking_score(
                doc.clicks_total,
                doc.recent_clicks,
                doc.last_clicked_at_ms,
                current_time_ms(),
                self.backend.decay_per_hour(),
            );
        }
    }

    pub async fn index_document(&self, mut doc: PageDocument) -> Result<()> {
        tracing::info!(url = %doc.url, "indexing page");
        self.with_click_defaults(&mut doc);
        self.backend.index_document(&doc).await
    }

    pub async fn bulk_index(&self, mut docs: Vec<PageDocument>) -> Result<()> {
        for doc in &mut docs {
            self.with_click_defaults(doc);
        }
        self.backend.bulk_index(&docs).await
    }
}
