//! Request deduplication.
//!
//! Requests are fingerprinted by a canonical form of their URI. The first
//! request for a fingerprint passes; every later one is dropped and bumps the
//! fingerprint's hit counter. When the cache outgrows its size bound, every
//! fingerprint whose hit count is at or below the mean is evicted, so URIs
//! that keep reappearing survive while one-off URIs make room.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, trace};

use super::{DownloaderMiddleware, SpiderMiddleware};
use crate::engine::Droppable;
use crate::request::Request;
use crate::response::Response;

/// Meta key that exempts a request from deduplication.
pub const DONT_FILTER: &str = "dont_filter";

const DUPLICATE_REASON: &str = "Duplicate request";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub ignore_url_fragments: bool,
    pub ignore_trailing_slashes: bool,
    pub ignore_query_string: bool,
    pub max_cache_size: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            ignore_url_fragments: true,
            ignore_trailing_slashes: true,
            ignore_query_string: false,
            max_cache_size: 10_000,
        }
    }
}

impl DedupConfig {
    /// Reduces `uri` to the form used for fingerprinting.
    pub fn canonicalize(&self, uri: &str) -> String {
        let (rest, fragment) = match uri.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (uri, None),
        };
        let (mut path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        if self.ignore_trailing_slashes {
            path = path.trim_end_matches('/');
        }

        let mut canonical = path.to_string();
        if let Some(query) = query.filter(|_| !self.ignore_query_string) {
            canonical.push('?');
            canonical.push_str(query);
        }
        if let Some(fragment) = fragment.filter(|_| !self.ignore_url_fragments) {
            canonical.push('#');
            canonical.push_str(fragment);
        }
        canonical
    }
}

/// Hit counters keyed by URI fingerprint.
struct HitCache {
    hits: HashMap<u64, u64>,
    max_size: usize,
}

impl HitCache {
    /// Records a sighting and reports whether the fingerprint was already known.
    fn record(&mut self, fingerprint: u64) -> bool {
        if let Some(hits) = self.hits.get_mut(&fingerprint) {
            *hits += 1;
            return true;
        }

        self.hits.insert(fingerprint, 1);
        if self.hits.len() > self.max_size {
            self.evict_common_below_mean();
        }
        false
    }

    fn evict_common_below_mean(&mut self) {
        let total: u64 = self.hits.values().sum();
        let mean = total as f64 / self.hits.len() as f64;
        let before = self.hits.len();
        self.hits.retain(|_, hits| *hits as f64 > mean);
        debug!(
            "Dedup cache over capacity, evicted {} of {} fingerprints (mean hits {:.2})",
            before - self.hits.len(),
            before,
            mean
        );
    }

    fn contains(&self, fingerprint: u64) -> bool {
        self.hits.contains_key(&fingerprint)
    }

    fn hits(&self, fingerprint: u64) -> Option<u64> {
        self.hits.get(&fingerprint).copied()
    }

    fn len(&self) -> usize {
        self.hits.len()
    }
}

/// Drops requests whose canonical URI was already seen.
///
/// Usable as either a downloader or a spider middleware. Register one instance
/// in one place only; a shared instance would see each request twice and
/// drop it the second time.
pub struct RequestDeduplicationMiddleware {
    config: DedupConfig,
    cache: Mutex<HitCache>,
}

impl RequestDeduplicationMiddleware {
    pub fn new(config: DedupConfig) -> Self {
        let max_size = config.max_cache_size;
        RequestDeduplicationMiddleware {
            config,
            cache: Mutex::new(HitCache {
                hits: HashMap::new(),
                max_size,
            }),
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    fn fingerprint(&self, uri: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.config.canonicalize(uri).hash(&mut hasher);
        hasher.finish()
    }

    /// Whether a request for `uri` would currently be treated as a duplicate.
    pub fn has_seen(&self, uri: &str) -> bool {
        self.cache.lock().contains(self.fingerprint(uri))
    }

    /// How often `uri` was seen, if it is still cached.
    pub fn hits(&self, uri: &str) -> Option<u64> {
        self.cache.lock().hits(self.fingerprint(uri))
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn filter(&self, mut request: Request) -> Request {
        if request.meta(DONT_FILTER).and_then(|v| v.as_bool()) == Some(true) {
            trace!("Skipping dedup for {}", request.uri());
            return request;
        }

        let fingerprint = self.fingerprint(request.uri());
        if self.cache.lock().record(fingerprint) {
            debug!("Dropping duplicate request: {}", request.uri());
            request.mark_dropped(DUPLICATE_REASON);
        }
        request
    }
}

impl Default for RequestDeduplicationMiddleware {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

#[async_trait]
impl DownloaderMiddleware for RequestDeduplicationMiddleware {
    fn name(&self) -> &str {
        "RequestDeduplicationMiddleware"
    }

    async fn process_request(&self, request: Request) -> Request {
        self.filter(request)
    }
}

#[async_trait]
impl SpiderMiddleware for RequestDeduplicationMiddleware {
    fn name(&self) -> &str {
        "RequestDeduplicationMiddleware"
    }

    async fn process_request(&self, request: Request, _response: &Response) -> Request {
        self.filter(request)
    }
}
