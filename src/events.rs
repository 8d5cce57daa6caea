//! The event bus connecting the engine to extensions.
//!
//! Payloads are handed to subscribers by mutable reference; a subscriber may
//! rewrite a request, response or item in place, including dropping it. The
//! publisher inspects the payload again after `publish` returns.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::TransportError;
use crate::item::Item;
use crate::request::Request;
use crate::response::Response;
use crate::run::Run;

/// Names of the events the engine publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RunStarting,
    RunFinished,
    RequestScheduling,
    RequestDropped,
    RequestSending,
    RequestFailed,
    ResponseReceiving,
    ResponseDropped,
    ResponseReceived,
    ItemScraped,
    ItemDropped,
}

/// An event together with its payload.
pub enum Event<'a> {
    RunStarting(&'a Run),
    RunFinished(&'a Run),
    RequestScheduling(&'a mut Request),
    RequestDropped(&'a mut Request),
    RequestSending(&'a mut Request),
    /// A transport failure no exception middleware resolved.
    RequestFailed {
        request: &'a Request,
        error: &'a TransportError,
    },
    ResponseReceiving(&'a mut Response),
    ResponseDropped(&'a mut Response),
    ResponseReceived(&'a mut Response),
    ItemScraped(&'a mut Item),
    ItemDropped(&'a mut Item),
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::RunStarting(_) => EventKind::RunStarting,
            Event::RunFinished(_) => EventKind::RunFinished,
            Event::RequestScheduling(_) => EventKind::RequestScheduling,
            Event::RequestDropped(_) => EventKind::RequestDropped,
            Event::RequestSending(_) => EventKind::RequestSending,
            Event::RequestFailed { .. } => EventKind::RequestFailed,
            Event::ResponseReceiving(_) => EventKind::ResponseReceiving,
            Event::ResponseDropped(_) => EventKind::ResponseDropped,
            Event::ResponseReceived(_) => EventKind::ResponseReceived,
            Event::ItemScraped(_) => EventKind::ItemScraped,
            Event::ItemDropped(_) => EventKind::ItemDropped,
        }
    }
}

type Handler = Arc<dyn Fn(&mut Event<'_>) + Send + Sync>;

/// Synchronous publish/subscribe dispatcher.
///
/// A bus may have a parent. Publishing on a child notifies the parent's
/// handlers first, then the child's own; the engine uses a child bus per run
/// so that a run's extensions are released with it.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
    parent: Option<Arc<EventBus>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_parent(parent: Arc<EventBus>) -> Arc<Self> {
        Arc::new(EventBus {
            handlers: RwLock::default(),
            parent: Some(parent),
        })
    }

    /// Registers `handler` for every future event of `kind`, after existing handlers.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&mut Event<'_>) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Calls every handler registered for the event's kind, in subscription order.
    pub fn publish(&self, event: &mut Event<'_>) {
        if let Some(parent) = &self.parent {
            parent.publish(event);
        }
        // Handlers run outside the lock so they may subscribe further handlers.
        let handlers = match self.handlers.read().get(&event.kind()) {
            Some(handlers) => handlers.clone(),
            None => return,
        };
        for handler in handlers {
            handler(&mut *event);
        }
    }

    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        let own = self
            .handlers
            .read()
            .get(&kind)
            .is_some_and(|handlers| !handlers.is_empty());
        own || self
            .parent
            .as_ref()
            .is_some_and(|parent| parent.has_subscribers(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Droppable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscriber_can_drop_payload() {
        let bus = EventBus::new();
        bus.subscribe(EventKind::RequestSending, |event| {
            if let Event::RequestSending(request) = event {
                request.mark_dropped("blocked by subscriber");
            }
        });

        let mut request = Request::get("https://example.com").unwrap();
        bus.publish(&mut Event::RequestSending(&mut request));
        assert_eq!(request.drop_reason(), Some("blocked by subscriber"));
    }

    #[test]
    fn test_only_matching_kind_is_notified() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        bus.subscribe(EventKind::ItemScraped, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut item = Item::new();
        bus.publish(&mut Event::ItemDropped(&mut item));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        bus.publish(&mut Event::ItemScraped(&mut item));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_child_bus_notifies_parent_first() {
        let parent = EventBus::new();
        parent.subscribe(EventKind::ItemScraped, |event| {
            if let Event::ItemScraped(item) = event {
                item.set("order", "parent");
            }
        });
        let child = EventBus::with_parent(Arc::clone(&parent));
        child.subscribe(EventKind::ItemScraped, |event| {
            if let Event::ItemScraped(item) = event {
                let seen = item.get("order").and_then(|v| v.as_str()).unwrap_or("").to_string();
                item.set("order", format!("{},child", seen));
            }
        });

        let mut item = Item::new();
        child.publish(&mut Event::ItemScraped(&mut item));
        assert_eq!(item.get("order").and_then(|v| v.as_str()), Some("parent,child"));

        // The parent never sees the child's handlers.
        let mut other = Item::new();
        parent.publish(&mut Event::ItemScraped(&mut other));
        assert_eq!(other.get("order").and_then(|v| v.as_str()), Some("parent"));
        assert!(child.has_subscribers(EventKind::ItemScraped));
        assert!(!child.has_subscribers(EventKind::ItemDropped));
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        bus.subscribe(EventKind::ItemScraped, |event| {
            if let Event::ItemScraped(item) = event {
                item.set("seen", "first");
            }
        });
        bus.subscribe(EventKind::ItemScraped, |event| {
            if let Event::ItemScraped(item) = event {
                item.set("seen", "second");
            }
        });

        let mut item = Item::new();
        bus.publish(&mut Event::ItemScraped(&mut item));
        assert_eq!(item.get("seen").and_then(|v| v.as_str()), Some("second"));
    }
}
