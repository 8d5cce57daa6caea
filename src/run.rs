//! The immutable description of one crawl.

use std::sync::Arc;
use std::time::Duration;

use crate::builder::CrawlerConfig;
use crate::extensions::Extension;
use crate::middleware::{DownloaderMiddleware, SpiderMiddleware};
use crate::pipeline::ItemProcessor;
use crate::request::Request;
use crate::spider::Spider;

/// Everything the engine needs to execute a crawl.
///
/// A `Run` is assembled by [`RunBuilder`](crate::RunBuilder) and never
/// changes afterwards; the engine only reads from it.
pub struct Run {
    pub(crate) spider: Arc<dyn Spider>,
    pub(crate) seeds: Vec<Request>,
    pub(crate) downloader_middleware: Vec<Arc<dyn DownloaderMiddleware>>,
    pub(crate) spider_middleware: Vec<Arc<dyn SpiderMiddleware>>,
    pub(crate) item_processors: Vec<Arc<dyn ItemProcessor>>,
    pub(crate) extensions: Vec<Arc<dyn Extension>>,
    pub(crate) config: CrawlerConfig,
}

impl Run {
    pub fn spider(&self) -> &Arc<dyn Spider> {
        &self.spider
    }

    pub fn seeds(&self) -> &[Request] {
        &self.seeds
    }

    pub fn downloader_middleware(&self) -> &[Arc<dyn DownloaderMiddleware>] {
        &self.downloader_middleware
    }

    pub fn spider_middleware(&self) -> &[Arc<dyn SpiderMiddleware>] {
        &self.spider_middleware
    }

    pub fn item_processors(&self) -> &[Arc<dyn ItemProcessor>] {
        &self.item_processors
    }

    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    /// How many requests are prepared per batch.
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Minimum time between two paced batches.
    pub fn request_delay(&self) -> Duration {
        self.config.request_delay
    }
}
