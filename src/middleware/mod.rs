//! # Middleware
//!
//! Hooks that see every request, response, item and transport failure on its
//! way through the engine.
//!
//! A middleware implements only the capabilities it cares about. Every trait
//! method has a pass-through default, so a request-only middleware leaves
//! responses and exceptions untouched. The engine wraps each capability in a
//! [`Stage`] and runs the stages through a
//! [`MiddlewareChain`](crate::engine::MiddlewareChain); the first stage that
//! drops a value ends the chain for that value.
//!
//! ## Downloader middleware
//!
//! Sits between the scheduler and the transport: [`DownloaderMiddleware::process_request`]
//! runs before a request is sent, [`DownloaderMiddleware::process_response`]
//! after its response arrives, and [`DownloaderMiddleware::process_exception`]
//! when the transport failed outright.
//!
//! ## Spider middleware
//!
//! Sits around the parse callbacks: it sees responses before they are parsed
//! and the requests and items a callback yields before they re-enter the loop.
//!
//! ## Available middleware
//!
//! - [`RequestDeduplicationMiddleware`]: drops requests for URIs already seen
//! - [`RetryMiddleware`]: turns transport failures into delayed retries
//! - [`HttpErrorMiddleware`]: drops responses with unsuccessful status codes
//! - [`AllowedDomainsMiddleware`]: drops requests to hosts outside a list
//! - [`MaxCrawlDepthMiddleware`]: drops discovered requests past a depth
//! - [`ResponseCacheMiddleware`]: replays stored responses without network I/O

mod allowed_domains;
mod cache;
mod dedup;
mod depth;
mod http_error;
mod retry;

pub use allowed_domains::AllowedDomainsMiddleware;
pub use cache::ResponseCacheMiddleware;
pub use dedup::{DedupConfig, RequestDeduplicationMiddleware, DONT_FILTER};
pub use depth::{MaxCrawlDepthMiddleware, DEPTH};
pub use http_error::HttpErrorMiddleware;
pub use retry::{RetryConfig, RetryMiddleware, RETRY_COUNT};

use async_trait::async_trait;

use crate::engine::{Droppable, Stage};
use crate::error::TransportError;
use crate::item::Item;
use crate::request::Request;
use crate::response::Response;

/// A transport failure for one request, offered to the exception chain.
///
/// A middleware settles the exception either by [`resolve`](Self::resolve)-ing
/// it with a request to schedule instead, or by dropping it outright. An
/// exception that leaves the chain unsettled is logged and reported through
/// the `RequestFailed` event.
#[derive(Debug)]
pub struct RequestException {
    pub request: Request,
    pub error: TransportError,
    resolution: Option<Request>,
    drop_reason: Option<String>,
}

impl RequestException {
    pub fn new(request: Request, error: TransportError) -> Self {
        RequestException {
            request,
            error,
            resolution: None,
            drop_reason: None,
        }
    }

    /// Settles the exception by scheduling `request` in place of the failed one.
    pub fn resolve(&mut self, request: Request) {
        if self.drop_reason.is_none() {
            self.resolution = Some(request);
            self.drop_reason = Some("Resolved by rescheduling".to_string());
        }
    }

    pub fn resolution(&self) -> Option<&Request> {
        self.resolution.as_ref()
    }

    pub fn into_resolution(self) -> Option<Request> {
        self.resolution
    }
}

impl Droppable for RequestException {
    fn drop_reason(&self) -> Option<&str> {
        self.drop_reason.as_deref()
    }

    fn mark_dropped(&mut self, reason: &str) {
        if self.drop_reason.is_none() {
            self.drop_reason = Some(reason.to_string());
        }
    }
}

/// Middleware around the transport.
#[async_trait]
pub trait DownloaderMiddleware: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn process_request(&self, request: Request) -> Request {
        request
    }

    async fn process_response(&self, response: Response) -> Response {
        response
    }

    async fn process_exception(&self, exception: RequestException) -> RequestException {
        exception
    }
}

/// Middleware around the parse callbacks.
///
/// `process_request` and `process_item` receive the response whose parse
/// callback produced the value.
#[async_trait]
pub trait SpiderMiddleware: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn process_response(&self, response: Response) -> Response {
        response
    }

    async fn process_request(&self, request: Request, _response: &Response) -> Request {
        request
    }

    async fn process_item(&self, item: Item, _response: &Response) -> Item {
        item
    }
}

pub(crate) struct DownloaderRequestStage<'a>(pub &'a dyn DownloaderMiddleware);

#[async_trait]
impl Stage<Request> for DownloaderRequestStage<'_> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn process(&self, request: Request) -> Request {
        self.0.process_request(request).await
    }
}

pub(crate) struct DownloaderResponseStage<'a>(pub &'a dyn DownloaderMiddleware);

#[async_trait]
impl Stage<Response> for DownloaderResponseStage<'_> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn process(&self, response: Response) -> Response {
        self.0.process_response(response).await
    }
}

pub(crate) struct DownloaderExceptionStage<'a>(pub &'a dyn DownloaderMiddleware);

#[async_trait]
impl Stage<RequestException> for DownloaderExceptionStage<'_> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn process(&self, exception: RequestException) -> RequestException {
        self.0.process_exception(exception).await
    }
}

pub(crate) struct SpiderResponseStage<'a>(pub &'a dyn SpiderMiddleware);

#[async_trait]
impl Stage<Response> for SpiderResponseStage<'_> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn process(&self, response: Response) -> Response {
        self.0.process_response(response).await
    }
}

pub(crate) struct SpiderRequestStage<'a> {
    pub middleware: &'a dyn SpiderMiddleware,
    pub response: &'a Response,
}

#[async_trait]
impl Stage<Request> for SpiderRequestStage<'_> {
    fn name(&self) -> &str {
        self.middleware.name()
    }

    async fn process(&self, request: Request) -> Request {
        self.middleware.process_request(request, self.response).await
    }
}

pub(crate) struct SpiderItemStage<'a> {
    pub middleware: &'a dyn SpiderMiddleware,
    pub response: &'a Response,
}

#[async_trait]
impl Stage<Item> for SpiderItemStage<'_> {
    fn name(&self) -> &str {
        self.middleware.name()
    }

    async fn process(&self, item: Item) -> Item {
        self.middleware.process_item(item, self.response).await
    }
}
