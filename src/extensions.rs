//! # Extensions
//!
//! Extensions observe a run through the [`EventBus`]. They are subscribed by
//! the engine when a run starts, before `RunStarting` is published, and may
//! mutate or drop the payloads they receive.
//!
//! - [`LoggerExtension`]: logs every lifecycle event
//! - [`MaxRequestsExtension`]: stops sending once a request budget is spent
//! - [`ItemCollector`]: keeps a copy of every scraped item
//! - [`StatCollector`](crate::stats::StatCollector): counts everything

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::engine::Droppable;
use crate::events::{Event, EventBus, EventKind};
use crate::item::Item;

pub trait Extension: Send + Sync {
    /// Registers the extension's handlers on `events`.
    fn subscribe(self: Arc<Self>, events: &EventBus);
}

/// Logs every event the engine publishes.
#[derive(Debug, Default)]
pub struct LoggerExtension;

impl LoggerExtension {
    fn log(event: &mut Event<'_>) {
        match event {
            Event::RunStarting(run) => info!(
                "Run starting for spider '{}' with {} seeds",
                run.spider().name(),
                run.seeds().len()
            ),
            Event::RunFinished(run) => info!("Run finished for spider '{}'", run.spider().name()),
            Event::RequestScheduling(request) => debug!("Scheduling {}", request.uri()),
            Event::RequestSending(request) => debug!("Sending {}", request.uri()),
            Event::RequestDropped(request) => debug!(
                "Dropped request {}: {}",
                request.uri(),
                request.drop_reason().unwrap_or_default()
            ),
            Event::RequestFailed { request, error } => {
                warn!("Request {} failed: {}", request.uri(), error)
            }
            Event::ResponseReceiving(response) => {
                debug!("Receiving {} from {}", response.status, response.url)
            }
            Event::ResponseReceived(response) => {
                debug!("Received {} from {}", response.status, response.url)
            }
            Event::ResponseDropped(response) => debug!(
                "Dropped response from {}: {}",
                response.url,
                response.drop_reason().unwrap_or_default()
            ),
            Event::ItemScraped(item) => debug!("Scraped item with {} fields", item.all().len()),
            Event::ItemDropped(item) => {
                debug!("Dropped item: {}", item.drop_reason().unwrap_or_default())
            }
        }
    }
}

impl Extension for LoggerExtension {
    fn subscribe(self: Arc<Self>, events: &EventBus) {
        for kind in [
            EventKind::RunStarting,
            EventKind::RunFinished,
            EventKind::RequestScheduling,
            EventKind::RequestSending,
            EventKind::RequestDropped,
            EventKind::RequestFailed,
            EventKind::ResponseReceiving,
            EventKind::ResponseReceived,
            EventKind::ResponseDropped,
            EventKind::ItemScraped,
            EventKind::ItemDropped,
        ] {
            events.subscribe(kind, Self::log);
        }
    }
}

/// Drops every request about to be sent once `max_requests` were let through.
#[derive(Debug)]
pub struct MaxRequestsExtension {
    max_requests: usize,
    sent: AtomicUsize,
}

impl MaxRequestsExtension {
    pub fn new(max_requests: usize) -> Arc<Self> {
        Arc::new(MaxRequestsExtension {
            max_requests,
            sent: AtomicUsize::new(0),
        })
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

impl Extension for MaxRequestsExtension {
    fn subscribe(self: Arc<Self>, events: &EventBus) {
        events.subscribe(EventKind::RequestSending, move |event| {
            let Event::RequestSending(request) = event else {
                return;
            };
            if request.is_dropped() {
                return;
            }
            if self.sent.load(Ordering::SeqCst) >= self.max_requests {
                request.mark_dropped("Max requests reached");
            } else {
                self.sent.fetch_add(1, Ordering::SeqCst);
            }
        });
    }
}

/// Keeps a copy of every item that made it through the item pipeline.
///
/// Items dropped by an `ItemScraped` subscriber that runs before the
/// collector are skipped.
#[derive(Debug, Default)]
pub struct ItemCollector {
    items: Mutex<Vec<Item>>,
}

impl ItemCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn items(&self) -> Vec<Item> {
        self.items.lock().clone()
    }

    pub fn take(&self) -> Vec<Item> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl Extension for ItemCollector {
    fn subscribe(self: Arc<Self>, events: &EventBus) {
        events.subscribe(EventKind::ItemScraped, move |event| {
            if let Event::ItemScraped(item) = event {
                if !item.is_dropped() {
                    self.items.lock().push((**item).clone());
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    #[test]
    fn test_max_requests_drops_after_budget() {
        let bus = EventBus::new();
        let limit = MaxRequestsExtension::new(2);
        limit.clone().subscribe(&bus);

        let mut outcomes = Vec::new();
        for idx in 0..3 {
            let mut request = Request::get(&format!("https://example.com/{}", idx)).unwrap();
            bus.publish(&mut Event::RequestSending(&mut request));
            outcomes.push(request.is_dropped());
        }
        assert_eq!(outcomes, vec![false, false, true]);
        assert_eq!(limit.sent(), 2);
    }

    #[test]
    fn test_collector_keeps_scraped_items() {
        let bus = EventBus::new();
        let collector = ItemCollector::new();
        collector.clone().subscribe(&bus);

        let mut item = Item::new().with("title", "Home");
        bus.publish(&mut Event::ItemScraped(&mut item));
        let mut dropped = Item::new();
        bus.publish(&mut Event::ItemDropped(&mut dropped));

        assert_eq!(collector.items(), vec![Item::new().with("title", "Home")]);
    }

    #[test]
    fn test_collector_skips_items_dropped_on_scrape() {
        let bus = EventBus::new();
        bus.subscribe(EventKind::ItemScraped, |event| {
            if let Event::ItemScraped(item) = event {
                item.mark_dropped("rejected");
            }
        });
        let collector = ItemCollector::new();
        collector.clone().subscribe(&bus);

        let mut item = Item::new().with("title", "Home");
        bus.publish(&mut Event::ItemScraped(&mut item));

        assert!(collector.is_empty());
    }
}
