//! # crawler-core
//!
//! A batch-paced web crawl engine with drop-capable middleware chains.
//!
//! Provides the main components: the `Engine` loop, the FIFO and ready-time
//! schedulers, the batch `Downloader`, the item pipeline, the event bus and
//! the `Spider` trait, plus a set of ready-made middleware and extensions.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crawler_core::prelude::*;
//!
//! struct MySpider;
//!
//! #[async_trait]
//! impl Spider for MySpider {
//!     fn start_urls(&self) -> Vec<&str> {
//!         vec!["https://example.com"]
//!     }
//!
//!     async fn parse(&self, callback: &str, response: Response) -> Result<ParseStream, CrawlError> {
//!         match callback {
//!             "parse" => Ok(parse_results([Item::new().with("url", response.url.as_str()).into()])),
//!             other => Err(self.unknown_callback(other)),
//!         }
//!     }
//! }
//!
//! async fn run_crawler() -> Result<Vec<Item>, CrawlError> {
//!     let run = RunBuilder::new(MySpider).build()?;
//!     let scheduler = Arc::new(FifoScheduler::new(Arc::new(SystemClock)));
//!     let engine = Engine::new(scheduler, Arc::new(ReqwestTransport::default()), EventBus::new());
//!     engine.collect(run).await
//! }
//! ```

pub mod builder;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod extensions;
pub mod item;
pub mod middleware;
pub mod pipeline;
pub mod prelude;
pub mod request;
pub mod response;
pub mod run;
pub mod scheduler;
pub mod spider;
pub mod stats;
pub mod transport;

pub use builder::{CrawlerConfig, RunBuilder};
pub use clock::{Clock, SystemClock, VirtualClock};
pub use engine::{ChainOutcome, Downloader, Droppable, Engine, ItemPipeline, MiddlewareChain, Stage};
pub use error::{CrawlError, TransportError};
pub use events::{Event, EventBus, EventKind};
pub use extensions::Extension;
pub use item::{parse_results, Item, ParseResult, ParseStream};
pub use request::Request;
pub use response::Response;
pub use run::Run;
pub use scheduler::{FifoScheduler, ReadyTimeScheduler, RequestScheduler};
pub use spider::Spider;
pub use stats::StatCollector;
pub use transport::{HttpResponse, Transport};

#[cfg(feature = "reqwest-transport")]
pub use transport::ReqwestTransport;

pub use async_trait::async_trait;
pub use tokio;
