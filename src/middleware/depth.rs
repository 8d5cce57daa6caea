use async_trait::async_trait;
use tracing::debug;

use super::SpiderMiddleware;
use crate::engine::Droppable;
use crate::request::Request;
use crate::response::Response;

/// Meta key holding how many links away from a seed a request is.
pub const DEPTH: &str = "depth";

/// Drops discovered requests that are too many links away from the seeds.
///
/// Seeds have depth 0; every request yielded by a parse callback is one
/// deeper than the request whose response it was found on.
#[derive(Debug, Clone)]
pub struct MaxCrawlDepthMiddleware {
    max_depth: u64,
}

impl MaxCrawlDepthMiddleware {
    pub fn new(max_depth: u64) -> Self {
        MaxCrawlDepthMiddleware { max_depth }
    }
}

#[async_trait]
impl SpiderMiddleware for MaxCrawlDepthMiddleware {
    fn name(&self) -> &str {
        "MaxCrawlDepthMiddleware"
    }

    async fn process_request(&self, mut request: Request, response: &Response) -> Request {
        let depth = response.request().meta_u64(DEPTH).unwrap_or(0) + 1;
        request.set_meta(DEPTH, depth);
        if depth > self.max_depth {
            debug!(
                "Request {} at depth {} exceeds max depth {}",
                request.uri(),
                depth,
                self.max_depth
            );
            request.mark_dropped("Max crawl depth exceeded");
        }
        request
    }
}
