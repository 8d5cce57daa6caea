use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use tracing::{debug, trace};

use super::DownloaderMiddleware;
use crate::request::Request;
use crate::response::Response;

/// Keeps successful responses in memory and attaches them to later requests
/// for the same resource, so the downloader replays them without calling the
/// transport.
pub struct ResponseCacheMiddleware {
    cache: Cache<String, Response>,
}

impl ResponseCacheMiddleware {
    pub fn new(max_entries: u64, time_to_live: Duration) -> Self {
        ResponseCacheMiddleware {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(time_to_live)
                .build(),
        }
    }

    fn key(request: &Request) -> String {
        format!("{} {}", request.method, request.url())
    }

    pub fn contains(&self, request: &Request) -> bool {
        self.cache.contains_key(&Self::key(request))
    }
}

impl Default for ResponseCacheMiddleware {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(3600))
    }
}

#[async_trait]
impl DownloaderMiddleware for ResponseCacheMiddleware {
    fn name(&self) -> &str {
        "ResponseCacheMiddleware"
    }

    async fn process_request(&self, request: Request) -> Request {
        if request.has_cached_response() {
            return request;
        }
        match self.cache.get(&Self::key(&request)) {
            Some(stored) => {
                debug!("Cache hit for {}", request.uri());
                request.with_cached_response(stored)
            }
            None => request,
        }
    }

    async fn process_response(&self, response: Response) -> Response {
        if !response.cached && response.status.is_success() {
            trace!("Caching response for {}", response.request().uri());
            self.cache
                .insert(Self::key(response.request()), response.clone());
        }
        response
    }
}
