use std::collections::HashSet;

use parking_lot::Mutex;

#[derive(Default)]
struct FrontierState {
    visited: HashSet<String>,
    enqueued: HashSet<String>,
    pages_crawled: usize,
    stop: bool,
}

/// Process-wide crawl bookkeeping: which URLs have been seen, how many pages
/// have been emitted, and the one-shot stop flag. Every operation is atomic
/// under a single mutex.
pub struct Frontier {
    max_pages: usize,
    state: Mutex<FrontierState>,
}

impl Frontier {
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages,
            state: Mutex::new(FrontierState::default()),
        }
    }

    /// Claim a URL for the work queue. False when it was already seen or the
    /// crawl is stopping; a URL can only ever be claimed once.
    pub fn mark_enqueued(&self, url: &str) -> bool {
        let mut state = self.state.lock();
        if state.stop || state.visited.contains(url) || state.enqueued.contains(url) {
            return false;
        }
        state.enqueued.insert(url.to_string());
        true
    }

    pub fn mark_visited(&self, url: &str) {
        self.state.lock().visited.insert(url.to_string());
    }

    /// Claim one of the `max_pages` emission slots, taken after a successful
    /// fetch and before emitting so the cap counts emitted pages exactly.
    /// Returns the page number, or `None` once the cap is reached (which
    /// also raises the stop flag).
    pub fn reserve_page_slot(&self) -> Option<usize> {
        let mut state = self.state.lock();
        if state.pages_crawled >= self.max_pages {
            state.stop = true;
            return None;
        }
        state.pages_crawled += 1;
        if state.pages_crawled >= self.max_pages {
            state.stop = true;
        }
        Some(state.pages_crawled)
    }

    pub fn request_stop(&self) {
        self.state.lock().stop = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stop
    }

    pub fn pages_crawled(&self) -> usize {
        self.state.lock().pages_crawled
    }
}
