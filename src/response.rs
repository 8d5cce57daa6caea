//! The `Response` type handed from the downloader to middleware and parse callbacks.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::HeaderMap;
use http::StatusCode;
use serde_json::Value;
use url::Url;

use crate::engine::Droppable;
use crate::error::CrawlError;
use crate::request::Request;
use crate::transport::HttpResponse;

/// A transport response together with the request that produced it.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The final URL after redirects.
    pub url: Url,
    /// Whether the response was delivered from a request's attached cache entry.
    pub cached: bool,
    request: Request,
    meta: HashMap<String, Value>,
    drop_reason: Option<String>,
}

impl Response {
    /// Wraps a raw transport response for `request`.
    pub fn new(request: Request, http: HttpResponse) -> Self {
        Response {
            status: http.status,
            headers: http.headers,
            body: http.body,
            url: http.url,
            cached: false,
            request,
            meta: HashMap::new(),
            drop_reason: None,
        }
    }

    /// Builds a response that is not backed by any network exchange.
    pub fn synthetic(request: Request, status: StatusCode, body: impl Into<Bytes>) -> Self {
        let url = request.url().clone();
        Self::new(
            request,
            HttpResponse {
                status,
                headers: HeaderMap::new(),
                body: body.into(),
                url,
            },
        )
    }

    /// The request this response answers.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Re-targets a stored response at a new request, as done for cache hits.
    pub(crate) fn replay_for(mut self, request: Request) -> Self {
        self.request = request;
        self.cached = true;
        self.drop_reason = None;
        self
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        self.meta.insert(key.to_string(), value.into());
    }

    /// Builds a request for a link on this page, resolved against the final URL.
    pub fn follow(&self, href: &str, callback: &str) -> Result<Request, CrawlError> {
        let resolved = self.url.join(href).map_err(|source| CrawlError::InvalidUrl {
            uri: href.to_string(),
            source,
        })?;
        Request::new(http::Method::GET, resolved.as_str(), callback)
    }
}

impl Droppable for Response {
    fn drop_reason(&self) -> Option<&str> {
        self.drop_reason.as_deref()
    }

    fn mark_dropped(&mut self, reason: &str) {
        if self.drop_reason.is_none() {
            self.drop_reason = Some(reason.to_string());
        }
    }
}
