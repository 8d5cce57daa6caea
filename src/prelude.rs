//! A "prelude" for users of the `crawler-core` crate.
//!
//! This prelude re-exports the most commonly used traits, structs, and macros
//! so that they can be easily imported.
//!
//! # Example
//!
//! ```
//! use crawler_core::prelude::*;
//! ```

pub use crate::{
    // Core structs
    Engine,
    EventBus,
    Item,
    Request,
    Response,
    RunBuilder,
    // Core traits
    Clock,
    Droppable,
    Extension,
    RequestScheduler,
    Spider,
    Transport,
    // Schedulers and clocks
    FifoScheduler,
    ReadyTimeScheduler,
    SystemClock,
    VirtualClock,
    // Parse results
    ParseResult,
    ParseStream,
    parse_results,
    // Errors
    CrawlError,
    TransportError,
    // Essential re-exports for trait implementation
    async_trait,
};

#[cfg(feature = "reqwest-transport")]
pub use crate::ReqwestTransport;

pub use crate::events::{Event, EventKind};
pub use crate::extensions::{ItemCollector, LoggerExtension, MaxRequestsExtension};
pub use crate::middleware::{
    AllowedDomainsMiddleware, DedupConfig, DownloaderMiddleware, HttpErrorMiddleware,
    MaxCrawlDepthMiddleware, RequestDeduplicationMiddleware, RequestException,
    ResponseCacheMiddleware, RetryConfig, RetryMiddleware, SpiderMiddleware,
};
pub use crate::pipeline::{ItemProcessor, RequiredFieldsProcessor};
pub use crate::stats::StatCollector;
