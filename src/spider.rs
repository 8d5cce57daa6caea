//! # Spider Module
//!
//! Defines the `Spider` trait: where a crawl starts and how its pages are parsed.
//!
//! ## Overview
//!
//! Every request names the parse callback that handles its response (the
//! default is `"parse"`). The engine resolves that name through
//! [`Spider::parse`], which dispatches to the matching routine and returns a
//! lazy [`ParseStream`] of follow-up requests and scraped items. The engine
//! routes the stream's values in the order they are yielded.
//!
//! A spider that is asked for a callback it does not have must return
//! [`CrawlError::UnknownCallback`]; the run aborts with that error.
//!
//! ## Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use crawler_core::prelude::*;
//!
//! struct BlogSpider;
//!
//! #[async_trait]
//! impl Spider for BlogSpider {
//!     fn name(&self) -> &str {
//!         "blog"
//!     }
//!
//!     fn start_urls(&self) -> Vec<&str> {
//!         vec!["https://example.com/blog/"]
//!     }
//!
//!     async fn parse(&self, callback: &str, response: Response) -> Result<ParseStream, CrawlError> {
//!         match callback {
//!             "parse" => {
//!                 let next = response.follow("page/2", "parse_post")?;
//!                 Ok(parse_results([next.into()]))
//!             }
//!             "parse_post" => {
//!                 let item = Item::new().with("url", response.url.as_str());
//!                 Ok(parse_results([item.into()]))
//!             }
//!             other => Err(self.unknown_callback(other)),
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::CrawlError;
use crate::item::ParseStream;
use crate::request::Request;
use crate::response::Response;

/// Defines the contract for a web spider.
#[async_trait]
pub trait Spider: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Returns the initial URLs to start crawling from.
    fn start_urls(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Generates the seed requests, by default one `GET` per start URL.
    fn start_requests(&self) -> Result<Vec<Request>, CrawlError> {
        self.start_urls().into_iter().map(Request::get).collect()
    }

    /// Runs the parse callback named `callback` on `response`.
    async fn parse(&self, callback: &str, response: Response) -> Result<ParseStream, CrawlError>;

    fn unknown_callback(&self, callback: &str) -> CrawlError {
        CrawlError::UnknownCallback {
            spider: self.name().to_string(),
            callback: callback.to_string(),
        }
    }
}
