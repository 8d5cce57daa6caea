//! The `Request` type flowing through the scheduler, downloader and middleware.
//!
//! Requests are owned values. Middleware stages take a request by value and
//! hand back the (possibly modified) request; event subscribers receive it by
//! mutable reference. Once dropped, a request keeps its first drop reason.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde_json::Value;
use url::Url;

use crate::engine::Droppable;
use crate::error::CrawlError;
use crate::response::Response;

/// The callback used when a request does not name one.
pub const DEFAULT_CALLBACK: &str = "parse";

/// Options passed through to the transport untouched by the engine.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub timeout: Option<Duration>,
    pub body: Option<Bytes>,
}

/// A single unit of crawl work.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub headers: HeaderMap,
    pub options: TransportOptions,
    uri: String,
    url: Url,
    meta: HashMap<String, Value>,
    ready_at: Option<SystemTime>,
    cached_response: Option<Box<Response>>,
    callback: String,
    drop_reason: Option<String>,
}

impl Request {
    /// Creates a request for `uri` whose response is handled by the spider callback `callback`.
    pub fn new(method: Method, uri: &str, callback: &str) -> Result<Self, CrawlError> {
        let url = Url::parse(uri).map_err(|source| CrawlError::InvalidUrl {
            uri: uri.to_string(),
            source,
        })?;

        Ok(Request {
            method,
            headers: HeaderMap::new(),
            options: TransportOptions::default(),
            uri: uri.to_string(),
            url,
            meta: HashMap::new(),
            ready_at: None,
            cached_response: None,
            callback: callback.to_string(),
            drop_reason: None,
        })
    }

    /// Creates a `GET` request handled by the default `parse` callback.
    pub fn get(uri: &str) -> Result<Self, CrawlError> {
        Self::new(Method::GET, uri, DEFAULT_CALLBACK)
    }

    /// The URI exactly as it was given.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The parsed form of [`uri`](Self::uri).
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn callback(&self) -> &str {
        &self.callback
    }

    pub fn with_callback(mut self, callback: &str) -> Self {
        self.callback = callback.to_string();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.options.body = Some(body.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        self.meta.insert(key.to_string(), value.into());
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_meta(key, value);
        self
    }

    /// Reads an integer metadata value such as a retry counter or crawl depth.
    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.meta.get(key).and_then(Value::as_u64)
    }

    /// The earliest time the request may be dispatched, if it was delayed.
    pub fn ready_at(&self) -> Option<SystemTime> {
        self.ready_at
    }

    pub fn set_ready_at(&mut self, ready_at: SystemTime) {
        self.ready_at = Some(ready_at);
    }

    pub fn with_ready_at(mut self, ready_at: SystemTime) -> Self {
        self.set_ready_at(ready_at);
        self
    }

    /// Attaches a response that the downloader delivers instead of calling the transport.
    pub fn with_cached_response(mut self, response: Response) -> Self {
        self.cached_response = Some(Box::new(response));
        self
    }

    pub fn has_cached_response(&self) -> bool {
        self.cached_response.is_some()
    }

    pub fn take_cached_response(&mut self) -> Option<Response> {
        self.cached_response.take().map(|response| *response)
    }

    /// Builds a new request for a link found on this request's page.
    ///
    /// Relative links are resolved against this request's URL.
    pub fn follow(&self, href: &str, callback: &str) -> Result<Request, CrawlError> {
        let resolved = self
            .url
            .join(href)
            .map_err(|source| CrawlError::InvalidUrl {
                uri: href.to_string(),
                source,
            })?;
        Request::new(Method::GET, resolved.as_str(), callback)
    }
}

impl Droppable for Request {
    fn drop_reason(&self) -> Option<&str> {
        self.drop_reason.as_deref()
    }

    fn mark_dropped(&mut self, reason: &str) {
        if self.drop_reason.is_none() {
            self.drop_reason = Some(reason.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_uri_is_rejected() {
        let err = Request::get("not a uri").unwrap_err();
        assert!(matches!(err, CrawlError::InvalidUrl { .. }));
    }

    #[test]
    fn test_keeps_original_uri_text() {
        let request = Request::get("https://example.com").unwrap();
        assert_eq!(request.uri(), "https://example.com");
        assert_eq!(request.url().as_str(), "https://example.com/");
        assert_eq!(request.callback(), DEFAULT_CALLBACK);
    }

    #[test]
    fn test_second_drop_keeps_first_reason() {
        let mut request = Request::get("https://example.com").unwrap();
        request.mark_dropped("first");
        request.mark_dropped("second");
        assert!(request.is_dropped());
        assert_eq!(request.drop_reason(), Some("first"));
    }

    #[test]
    fn test_follow_resolves_relative_links() {
        let request = Request::get("https://example.com/blog/").unwrap();
        let next = request.follow("page/2", "parse_page").unwrap();
        assert_eq!(next.uri(), "https://example.com/blog/page/2");
        assert_eq!(next.callback(), "parse_page");
    }

    #[test]
    fn test_meta_round_trip() {
        let request = Request::get("https://example.com")
            .unwrap()
            .with_meta("depth", 2u64);
        assert_eq!(request.meta_u64("depth"), Some(2));
        assert_eq!(request.meta_u64("retry_count"), None);
    }
}
