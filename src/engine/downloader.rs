//! Bounded batch dispatch with the downloader middleware chain around it.
//!
//! The downloader works on one batch at a time. The engine calls
//! [`Downloader::prepare`] for every request of a batch, then drains the
//! batch with [`Downloader::next_response`] (or [`Downloader::flush`]).
//! Requests are only handed to the transport once draining starts, and all of
//! them are in flight together.
//!
//! Event contract, per request:
//!
//! - `RequestSending`, then the request chain; a drop at either point
//!   publishes `RequestDropped`.
//! - A request carrying a cached response is answered from it without I/O.
//! - Each response goes through `ResponseReceiving`, the response chain and
//!   `ResponseReceived`; a drop at any point publishes `ResponseDropped`.
//! - A transport error goes through the exception chain. A resolved exception
//!   yields a request for [`Downloader::take_retries`]; an unresolved one is
//!   logged and published as `RequestFailed`, whether it passed the chain or
//!   was dropped by a middleware without a replacement.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use log::{debug, error, trace, warn};

use super::chain::{ChainOutcome, Droppable, MiddlewareChain, Stage};
use crate::error::TransportError;
use crate::events::{Event, EventBus};
use crate::middleware::{
    DownloaderExceptionStage, DownloaderMiddleware, DownloaderRequestStage,
    DownloaderResponseStage, RequestException,
};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{HttpResponse, Transport};

type Exchange = BoxFuture<'static, (Request, Result<HttpResponse, TransportError>)>;

pub struct Downloader {
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
    middleware: Arc<[Arc<dyn DownloaderMiddleware>]>,
    scheduled: usize,
    pending: Vec<Request>,
    replays: VecDeque<Response>,
    in_flight: FuturesUnordered<Exchange>,
    retries: Vec<Request>,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, events: Arc<EventBus>) -> Self {
        Downloader {
            transport,
            events,
            middleware: Arc::from(Vec::new()),
            scheduled: 0,
            pending: Vec::new(),
            replays: VecDeque::new(),
            in_flight: FuturesUnordered::new(),
            retries: Vec::new(),
        }
    }

    /// Sets the middleware run around every request, in order.
    pub fn with_middleware(mut self, middleware: Vec<Arc<dyn DownloaderMiddleware>>) -> Self {
        self.middleware = Arc::from(middleware);
        self
    }

    /// How many requests of the current batch survived preparation.
    pub fn scheduled_requests(&self) -> usize {
        self.scheduled
    }

    /// Requests produced by the exception chain since the last call.
    pub fn take_retries(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.retries)
    }

    /// Runs `request` through `RequestSending` and the request chain and, if
    /// it survives, adds it to the current batch.
    pub async fn prepare(&mut self, mut request: Request) {
        self.events
            .publish(&mut Event::RequestSending(&mut request));
        if request.is_dropped() {
            debug!(
                "Request {} dropped on send: {}",
                request.uri(),
                request.drop_reason().unwrap_or_default()
            );
            self.events
                .publish(&mut Event::RequestDropped(&mut request));
            return;
        }

        let middleware = Arc::clone(&self.middleware);
        let chain = MiddlewareChain::new(
            middleware
                .iter()
                .map(|mw| Box::new(DownloaderRequestStage(mw.as_ref())) as Box<dyn Stage<Request> + '_>)
                .collect(),
        );
        let mut request = match chain.process(request).await {
            ChainOutcome::Passed(request) => request,
            ChainOutcome::Dropped { mut value, stage } => {
                debug!(
                    "Request {} dropped by {}: {}",
                    value.uri(),
                    stage,
                    value.drop_reason().unwrap_or_default()
                );
                self.events.publish(&mut Event::RequestDropped(&mut value));
                return;
            }
        };

        self.scheduled += 1;
        match request.take_cached_response() {
            Some(stored) => {
                trace!("Replaying cached response for {}", request.uri());
                self.replays.push_back(stored.replay_for(request));
            }
            None => {
                trace!("Queued {} for dispatch", request.uri());
                self.pending.push(request);
            }
        }
    }

    fn dispatch_pending(&mut self) {
        for request in self.pending.drain(..) {
            let transport = Arc::clone(&self.transport);
            self.in_flight.push(
                async move {
                    let result = transport.send(&request).await;
                    (request, result)
                }
                .boxed(),
            );
        }
    }

    /// Returns the next response of the current batch that survived the
    /// response chain, or `None` once the batch is exhausted.
    pub async fn next_response(&mut self) -> Option<Response> {
        loop {
            self.dispatch_pending();

            let response = if let Some(replayed) = self.replays.pop_front() {
                replayed
            } else {
                match self.in_flight.next().await {
                    Some((request, Ok(http))) => Response::new(request, http),
                    Some((request, Err(error))) => {
                        self.handle_exception(request, error).await;
                        continue;
                    }
                    None => {
                        trace!("Batch of {} requests drained", self.scheduled);
                        self.scheduled = 0;
                        return None;
                    }
                }
            };

            if let Some(response) = self.receive(response).await {
                return Some(response);
            }
        }
    }

    /// Drains the whole current batch.
    pub async fn flush(&mut self) -> Vec<Response> {
        let mut responses = Vec::new();
        while let Some(response) = self.next_response().await {
            responses.push(response);
        }
        responses
    }

    async fn receive(&mut self, mut response: Response) -> Option<Response> {
        self.events
            .publish(&mut Event::ResponseReceiving(&mut response));
        if response.is_dropped() {
            self.events
                .publish(&mut Event::ResponseDropped(&mut response));
            return None;
        }

        let middleware = Arc::clone(&self.middleware);
        let chain = MiddlewareChain::new(
            middleware
                .iter()
                .map(|mw| Box::new(DownloaderResponseStage(mw.as_ref())) as Box<dyn Stage<Response> + '_>)
                .collect(),
        );
        let mut response = match chain.process(response).await {
            ChainOutcome::Passed(response) => response,
            ChainOutcome::Dropped { mut value, stage } => {
                debug!(
                    "Response from {} dropped by {}: {}",
                    value.url,
                    stage,
                    value.drop_reason().unwrap_or_default()
                );
                self.events.publish(&mut Event::ResponseDropped(&mut value));
                return None;
            }
        };

        self.events
            .publish(&mut Event::ResponseReceived(&mut response));
        if response.is_dropped() {
            self.events
                .publish(&mut Event::ResponseDropped(&mut response));
            return None;
        }
        Some(response)
    }

    async fn handle_exception(&mut self, request: Request, error: TransportError) {
        let middleware = Arc::clone(&self.middleware);
        let chain = MiddlewareChain::new(
            middleware
                .iter()
                .map(|mw| {
                    Box::new(DownloaderExceptionStage(mw.as_ref()))
                        as Box<dyn Stage<RequestException> + '_>
                })
                .collect(),
        );

        match chain.process(RequestException::new(request, error)).await {
            ChainOutcome::Passed(exception) => {
                error!(
                    "Request {} failed: {}",
                    exception.request.uri(),
                    exception.error
                );
                self.events.publish(&mut Event::RequestFailed {
                    request: &exception.request,
                    error: &exception.error,
                });
            }
            ChainOutcome::Dropped { value, stage } => {
                if value.resolution().is_none() {
                    warn!(
                        "{} discarded failure of {} ({}): {}",
                        stage,
                        value.request.uri(),
                        value.drop_reason().unwrap_or_default(),
                        value.error
                    );
                    self.events.publish(&mut Event::RequestFailed {
                        request: &value.request,
                        error: &value.error,
                    });
                }
                if let Some(retry) = value.into_resolution() {
                    debug!("{} rescheduled {}", stage, retry.uri());
                    self.retries.push(retry);
                }
            }
        }
    }
}
