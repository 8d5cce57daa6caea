//! # Builder Module
//!
//! Provides the `RunBuilder`, a fluent API for assembling a [`Run`] from a
//! spider and its components.
//!
//! ## Overview
//!
//! The builder collects the spider, extra seed requests, downloader and spider
//! middleware, item processors and extensions, together with the
//! [`CrawlerConfig`]. [`RunBuilder::build`] validates the configuration, asks
//! the spider for its start requests and freezes everything into a `Run`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use crawler_core::prelude::*;
//!
//! async fn crawl() -> Result<(), CrawlError> {
//!     let clock = Arc::new(SystemClock);
//!     let run = RunBuilder::new(BlogSpider)
//!         .concurrency(8)
//!         .request_delay(Duration::from_millis(250))
//!         .add_downloader_middleware(RequestDeduplicationMiddleware::default())
//!         .add_downloader_middleware(RetryMiddleware::new(RetryConfig::default(), clock.clone()))
//!         .add_item_processor(RequiredFieldsProcessor::new(["title"]))
//!         .build()?;
//!
//!     let scheduler = Arc::new(ReadyTimeScheduler::new(clock));
//!     let mut engine = Engine::new(scheduler, Arc::new(ReqwestTransport::default()), EventBus::new());
//!     engine.start(run).await
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::CrawlError;
use crate::extensions::Extension;
use crate::middleware::{DownloaderMiddleware, SpiderMiddleware};
use crate::pipeline::ItemProcessor;
use crate::request::Request;
use crate::run::Run;
use crate::spider::Spider;

/// Batch size and pacing of a crawl.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// The number of requests prepared per batch.
    pub concurrency: usize,
    /// The minimum time between two paced batches.
    pub request_delay: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            concurrency: 5,
            request_delay: Duration::ZERO,
        }
    }
}

pub struct RunBuilder {
    crawler_config: CrawlerConfig,
    spider: Arc<dyn Spider>,
    seeds: Vec<Request>,
    downloader_middleware: Vec<Arc<dyn DownloaderMiddleware>>,
    spider_middleware: Vec<Arc<dyn SpiderMiddleware>>,
    item_processors: Vec<Arc<dyn ItemProcessor>>,
    extensions: Vec<Arc<dyn Extension>>,
}

impl RunBuilder {
    /// Creates a new `RunBuilder` for a given spider with the default configuration.
    pub fn new<S: Spider>(spider: S) -> Self {
        Self::from_shared(Arc::new(spider))
    }

    pub fn from_shared(spider: Arc<dyn Spider>) -> Self {
        RunBuilder {
            crawler_config: CrawlerConfig::default(),
            spider,
            seeds: Vec::new(),
            downloader_middleware: Vec::new(),
            spider_middleware: Vec::new(),
            item_processors: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CrawlerConfig) -> Self {
        self.crawler_config = config;
        self
    }

    /// Sets how many requests are prepared per batch.
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.crawler_config.concurrency = limit;
        self
    }

    /// Sets the minimum time between two paced batches.
    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.crawler_config.request_delay = delay;
        self
    }

    /// Adds a seed request on top of the spider's start requests.
    pub fn add_seed(mut self, request: Request) -> Self {
        self.seeds.push(request);
        self
    }

    pub fn add_downloader_middleware<M>(mut self, middleware: M) -> Self
    where
        M: DownloaderMiddleware + 'static,
    {
        self.downloader_middleware.push(Arc::new(middleware));
        self
    }

    /// Adds a downloader middleware the caller keeps a handle to.
    pub fn add_shared_downloader_middleware(mut self, middleware: Arc<dyn DownloaderMiddleware>) -> Self {
        self.downloader_middleware.push(middleware);
        self
    }

    pub fn add_spider_middleware<M>(mut self, middleware: M) -> Self
    where
        M: SpiderMiddleware + 'static,
    {
        self.spider_middleware.push(Arc::new(middleware));
        self
    }

    /// Adds a spider middleware the caller keeps a handle to.
    pub fn add_shared_spider_middleware(mut self, middleware: Arc<dyn SpiderMiddleware>) -> Self {
        self.spider_middleware.push(middleware);
        self
    }

    pub fn add_item_processor<P>(mut self, processor: P) -> Self
    where
        P: ItemProcessor + 'static,
    {
        self.item_processors.push(Arc::new(processor));
        self
    }

    /// Adds an extension; extensions are shared so their results stay readable after the run.
    pub fn add_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Validates the configuration and freezes the builder into a [`Run`].
    pub fn build(self) -> Result<Run, CrawlError> {
        if self.crawler_config.concurrency == 0 {
            return Err(CrawlError::Configuration(
                "concurrency must be greater than 0.".to_string(),
            ));
        }

        let mut seeds = self.spider.start_requests()?;
        seeds.extend(self.seeds);
        debug!(
            "Built run for spider '{}' with {} seeds",
            self.spider.name(),
            seeds.len()
        );

        Ok(Run {
            spider: self.spider,
            seeds,
            downloader_middleware: self.downloader_middleware,
            spider_middleware: self.spider_middleware,
            item_processors: self.item_processors,
            extensions: self.extensions,
            config: self.crawler_config,
        })
    }
}
