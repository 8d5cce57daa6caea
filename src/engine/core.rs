//! The crawl loop.
//!
//! The engine ties the scheduler, downloader, spider and item pipeline
//! together for one [`Run`] at a time. All work happens on the task that
//! awaits [`Engine::start`]; only the transport calls of a batch overlap.
//!
//! Each iteration of the loop:
//!
//! 1. takes a paced batch of `concurrency` requests from the scheduler and
//!    prepares them;
//! 2. refills the batch with unpaced requests for every request that was
//!    dropped during preparation, until the batch is full or the scheduler
//!    has nothing ready;
//! 3. drains the batch, parsing each response and routing what the parse
//!    callback yields, in order: requests back to the scheduler, items to the
//!    item pipeline;
//! 4. schedules the retries the exception chain produced.
//!
//! The run ends when the scheduler is empty after a drained batch. A run that
//! fails clears the scheduler, publishing `RequestDropped` for everything it
//! still held, so the next run starts from an empty frontier.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, info, trace, warn};

use super::chain::{ChainOutcome, Droppable, MiddlewareChain, Stage};
use super::downloader::Downloader;
use super::item_pipeline::ItemPipeline;
use crate::error::CrawlError;
use crate::events::{Event, EventBus};
use crate::extensions::Extension;
use crate::item::{Item, ParseResult};
use crate::middleware::{SpiderItemStage, SpiderRequestStage, SpiderResponseStage};
use crate::request::Request;
use crate::response::Response;
use crate::run::Run;
use crate::scheduler::RequestScheduler;
use crate::transport::Transport;

const ABORTED_REASON: &str = "Run aborted";

pub struct Engine {
    scheduler: Arc<dyn RequestScheduler>,
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
}

impl Engine {
    /// Creates an engine.
    ///
    /// Handlers subscribed to `events` see the events of every run this
    /// engine executes; a run's own extensions only see that run.
    pub fn new(
        scheduler: Arc<dyn RequestScheduler>,
        transport: Arc<dyn Transport>,
        events: Arc<EventBus>,
    ) -> Self {
        Engine {
            scheduler,
            transport,
            events,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn scheduler(&self) -> &Arc<dyn RequestScheduler> {
        &self.scheduler
    }

    /// Executes `run` until no work remains.
    ///
    /// Fails only on programming errors, such as a request naming a parse
    /// callback the spider does not have.
    pub async fn start(&self, run: Run) -> Result<(), CrawlError> {
        self.execute(&run, None).await
    }

    /// Executes `run` and returns every item that made it through the item
    /// pipeline without being dropped.
    pub async fn collect(&self, run: Run) -> Result<Vec<Item>, CrawlError> {
        let mut scraped = Vec::new();
        self.execute(&run, Some(&mut scraped)).await?;
        Ok(scraped)
    }

    async fn execute(&self, run: &Run, mut scraped: Option<&mut Vec<Item>>) -> Result<(), CrawlError> {
        let events = EventBus::with_parent(Arc::clone(&self.events));
        for extension in run.extensions() {
            Arc::clone(extension).subscribe(&events);
        }

        self.scheduler.set_delay(run.request_delay());
        let mut downloader = Downloader::new(Arc::clone(&self.transport), Arc::clone(&events))
            .with_middleware(run.downloader_middleware().to_vec());
        let pipeline =
            ItemPipeline::new(Arc::clone(&events)).with_processors(run.item_processors().to_vec());
        let concurrency = run.concurrency();

        info!(
            "Starting run for spider '{}': {} seeds, concurrency {}, delay {:?}",
            run.spider().name(),
            run.seeds().len(),
            concurrency,
            run.request_delay()
        );
        events.publish(&mut Event::RunStarting(run));

        for seed in run.seeds() {
            self.schedule(&events, seed.clone());
        }

        while !self.scheduler.is_empty() {
            for request in self.scheduler.next_requests(concurrency).await {
                downloader.prepare(request).await;
            }

            while downloader.scheduled_requests() < concurrency && !self.scheduler.is_empty() {
                let missing = concurrency - downloader.scheduled_requests();
                let refill = self.scheduler.force_next_requests(missing);
                if refill.is_empty() {
                    trace!("Nothing ready to refill the batch");
                    break;
                }
                trace!("Refilling batch with {} requests", refill.len());
                for request in refill {
                    downloader.prepare(request).await;
                }
            }

            while let Some(response) = downloader.next_response().await {
                let handled = self
                    .handle_response(run, &events, &pipeline, response, scraped.as_deref_mut())
                    .await;
                if let Err(err) = handled {
                    self.abandon(&events, downloader.take_retries());
                    return Err(err);
                }
            }

            for retry in downloader.take_retries() {
                self.schedule(&events, retry);
            }
        }

        events.publish(&mut Event::RunFinished(run));
        info!("Run for spider '{}' finished", run.spider().name());
        Ok(())
    }

    /// Offers `request` to `RequestScheduling` subscribers and queues it unless dropped.
    fn schedule(&self, events: &EventBus, mut request: Request) {
        events.publish(&mut Event::RequestScheduling(&mut request));
        if request.is_dropped() {
            debug!(
                "Request {} dropped before scheduling: {}",
                request.uri(),
                request.drop_reason().unwrap_or_default()
            );
            events.publish(&mut Event::RequestDropped(&mut request));
            return;
        }
        self.scheduler.schedule(request);
    }

    /// Drops `retries` and everything still queued after a failed run.
    fn abandon(&self, events: &EventBus, retries: Vec<Request>) {
        let leftover = self.scheduler.clear();
        warn!(
            "Run aborted with {} queued requests and {} pending retries",
            leftover.len(),
            retries.len()
        );
        for mut request in leftover.into_iter().chain(retries) {
            request.mark_dropped(ABORTED_REASON);
            events.publish(&mut Event::RequestDropped(&mut request));
        }
    }

    async fn handle_response(
        &self,
        run: &Run,
        events: &EventBus,
        pipeline: &ItemPipeline,
        response: Response,
        mut scraped: Option<&mut Vec<Item>>,
    ) -> Result<(), CrawlError> {
        let middleware = run.spider_middleware();

        let chain = MiddlewareChain::new(
            middleware
                .iter()
                .map(|mw| Box::new(SpiderResponseStage(mw.as_ref())) as Box<dyn Stage<Response> + '_>)
                .collect(),
        );
        let response = match chain.process(response).await {
            ChainOutcome::Passed(response) => response,
            ChainOutcome::Dropped { mut value, stage } => {
                debug!("Response from {} dropped by {} before parsing", value.url, stage);
                events.publish(&mut Event::ResponseDropped(&mut value));
                return Ok(());
            }
        };

        let origin = response.clone();
        let callback = origin.request().callback();
        trace!("Parsing {} with callback '{}'", origin.url, callback);
        let mut results = run.spider().parse(callback, response).await?;

        let request_chain = MiddlewareChain::new(
            middleware
                .iter()
                .map(|mw| {
                    Box::new(SpiderRequestStage {
                        middleware: mw.as_ref(),
                        response: &origin,
                    }) as Box<dyn Stage<Request> + '_>
                })
                .collect(),
        );
        let item_chain = MiddlewareChain::new(
            middleware
                .iter()
                .map(|mw| {
                    Box::new(SpiderItemStage {
                        middleware: mw.as_ref(),
                        response: &origin,
                    }) as Box<dyn Stage<Item> + '_>
                })
                .collect(),
        );

        while let Some(result) = results.next().await {
            match result {
                ParseResult::Request(request) => match request_chain.process(request).await {
                    ChainOutcome::Passed(request) => self.schedule(events, request),
                    ChainOutcome::Dropped { mut value, stage } => {
                        debug!("Discovered request {} dropped by {}", value.uri(), stage);
                        events.publish(&mut Event::RequestDropped(&mut value));
                    }
                },
                ParseResult::Item(item) => match item_chain.process(item).await {
                    ChainOutcome::Passed(item) => {
                        if let (Some(item), Some(scraped)) =
                            (pipeline.process(item).await, scraped.as_deref_mut())
                        {
                            scraped.push(item);
                        }
                    }
                    ChainOutcome::Dropped { mut value, stage } => {
                        debug!("Item dropped by {}", stage);
                        events.publish(&mut Event::ItemDropped(&mut value));
                    }
                },
            }
        }
        Ok(())
    }
}

