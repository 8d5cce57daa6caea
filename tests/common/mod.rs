#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use crawler_core::prelude::*;
use crawler_core::HttpResponse;
use http::header::HeaderMap;
use http::StatusCode;
use parking_lot::Mutex;

/// Transport that answers every request locally and records what was sent.
#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, usize>>,
    statuses: HashMap<String, StatusCode>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` sends of `uri` fail with a connection error.
    pub fn failing(self, uri: &str, times: usize) -> Self {
        self.failures.lock().insert(uri.to_string(), times);
        self
    }

    pub fn with_status(mut self, uri: &str, status: StatusCode) -> Self {
        self.statuses.insert(uri.to_string(), status);
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &Request) -> Result<HttpResponse, TransportError> {
        self.sent.lock().push(request.uri().to_string());

        if let Some(remaining) = self.failures.lock().get_mut(request.uri()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::Connect("connection refused".into()));
            }
        }

        Ok(HttpResponse {
            status: self
                .statuses
                .get(request.uri())
                .copied()
                .unwrap_or(StatusCode::OK),
            headers: HeaderMap::new(),
            body: Bytes::from(format!("<html>{}</html>", request.uri())),
            url: request.url().clone(),
        })
    }
}

/// Spider over a fixed link graph.
///
/// The `parse` callback yields one item carrying the page URI, followed by a
/// request for every outgoing link of the page.
#[derive(Default)]
pub struct GraphSpider {
    seeds: Vec<String>,
    links: HashMap<String, Vec<String>>,
}

impl GraphSpider {
    pub fn new(seeds: &[&str]) -> Self {
        GraphSpider {
            seeds: seeds.iter().map(|seed| seed.to_string()).collect(),
            links: HashMap::new(),
        }
    }

    pub fn link(mut self, from: &str, to: &[&str]) -> Self {
        self.links
            .insert(from.to_string(), to.iter().map(|uri| uri.to_string()).collect());
        self
    }
}

#[async_trait]
impl Spider for GraphSpider {
    fn name(&self) -> &str {
        "graph"
    }

    fn start_urls(&self) -> Vec<&str> {
        self.seeds.iter().map(String::as_str).collect()
    }

    async fn parse(&self, callback: &str, response: Response) -> Result<ParseStream, CrawlError> {
        if callback != "parse" {
            return Err(self.unknown_callback(callback));
        }

        let uri = response.request().uri().to_string();
        let mut results = vec![ParseResult::from(Item::new().with("url", uri.as_str()))];
        for link in self.links.get(&uri).into_iter().flatten() {
            results.push(Request::get(link)?.into());
        }
        Ok(parse_results(results))
    }
}

pub struct Harness {
    pub clock: Arc<VirtualClock>,
    pub transport: Arc<FakeTransport>,
    pub engine: Engine,
}

/// Engine over a FIFO scheduler, a virtual clock and `transport`.
pub fn fifo_harness(transport: FakeTransport) -> Harness {
    let clock = Arc::new(VirtualClock::new());
    let scheduler = Arc::new(FifoScheduler::new(clock.clone()));
    harness(clock, scheduler, transport)
}

/// Engine over a ready-time scheduler, a virtual clock and `transport`.
pub fn ready_time_harness(transport: FakeTransport) -> Harness {
    let clock = Arc::new(VirtualClock::new());
    let scheduler = Arc::new(ReadyTimeScheduler::new(clock.clone()));
    harness(clock, scheduler, transport)
}

fn harness(
    clock: Arc<VirtualClock>,
    scheduler: Arc<dyn RequestScheduler>,
    transport: FakeTransport,
) -> Harness {
    let transport = Arc::new(transport);
    let engine = Engine::new(scheduler, transport.clone(), EventBus::new());
    Harness {
        clock,
        transport,
        engine,
    }
}

pub fn urls(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.get("url").and_then(|v| v.as_str()).map(String::from))
        .collect()
}

/// Records the kinds of all events published on `bus`.
pub fn record_events(bus: &EventBus, kinds: &[EventKind]) -> Arc<Mutex<Vec<EventKind>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let seen = Arc::clone(&seen);
        bus.subscribe(*kind, move |event| seen.lock().push(event.kind()));
    }
    seen
}
