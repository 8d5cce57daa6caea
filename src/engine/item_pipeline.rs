//! Runs scraped items through the item processors and reports the outcome.

use std::sync::Arc;

use log::{debug, trace};

use super::chain::{ChainOutcome, Droppable, MiddlewareChain, Stage};
use crate::events::{Event, EventBus};
use crate::item::Item;
use crate::pipeline::{ItemProcessor, ProcessorStage};

pub struct ItemPipeline {
    processors: Arc<[Arc<dyn ItemProcessor>]>,
    events: Arc<EventBus>,
}

impl ItemPipeline {
    pub fn new(events: Arc<EventBus>) -> Self {
        ItemPipeline {
            processors: Arc::from(Vec::new()),
            events,
        }
    }

    pub fn with_processors(mut self, processors: Vec<Arc<dyn ItemProcessor>>) -> Self {
        self.processors = Arc::from(processors);
        self
    }

    /// Passes `item` through every processor that handles it.
    ///
    /// Publishes `ItemScraped` for a surviving item and `ItemDropped` for one
    /// dropped by a processor or by an `ItemScraped` subscriber. Returns the
    /// item if it survived both.
    pub async fn process(&self, item: Item) -> Option<Item> {
        let processors = Arc::clone(&self.processors);
        let chain = MiddlewareChain::new(
            processors
                .iter()
                .map(|processor| Box::new(ProcessorStage(processor.as_ref())) as Box<dyn Stage<Item> + '_>)
                .collect(),
        );

        let mut item = match chain.process(item).await {
            ChainOutcome::Passed(item) => item,
            ChainOutcome::Dropped { mut value, stage } => {
                debug!(
                    "Item dropped by processor '{}': {}",
                    stage,
                    value.drop_reason().unwrap_or_default()
                );
                self.events.publish(&mut Event::ItemDropped(&mut value));
                return None;
            }
        };

        self.events.publish(&mut Event::ItemScraped(&mut item));
        if item.is_dropped() {
            debug!(
                "Item dropped on scrape: {}",
                item.drop_reason().unwrap_or_default()
            );
            self.events.publish(&mut Event::ItemDropped(&mut item));
            return None;
        }

        trace!("Item passed {} processors", self.processors.len());
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Tag(&'static str);

    #[async_trait]
    impl ItemProcessor for Tag {
        async fn process_item(&self, item: Item) -> Item {
            item.with("tag", self.0)
        }
    }

    struct PriceOnly;

    #[async_trait]
    impl ItemProcessor for PriceOnly {
        fn should_handle(&self, item: &Item) -> bool {
            item.has("price")
        }

        async fn process_item(&self, mut item: Item) -> Item {
            if item.get("price").and_then(|v| v.as_f64()).unwrap_or(0.0) <= 0.0 {
                item.mark_dropped("Price must be positive");
            }
            item
        }
    }

    fn outcomes(bus: &EventBus) -> Arc<Mutex<Vec<EventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::ItemScraped, EventKind::ItemDropped] {
            let seen = Arc::clone(&seen);
            bus.subscribe(kind, move |event| seen.lock().push(event.kind()));
        }
        seen
    }

    #[tokio::test]
    async fn test_conditional_processor() {
        let bus = EventBus::new();
        let seen = outcomes(&bus);
        let pipeline = ItemPipeline::new(bus)
            .with_processors(vec![Arc::new(PriceOnly), Arc::new(Tag("seen"))]);

        let kept = pipeline.process(Item::new().with("title", "no price")).await;
        assert_eq!(
            kept.and_then(|item| item.get("tag").cloned()),
            Some(serde_json::json!("seen"))
        );

        let dropped = pipeline.process(Item::new().with("price", 0)).await;
        assert!(dropped.is_none());
        assert_eq!(*seen.lock(), vec![EventKind::ItemScraped, EventKind::ItemDropped]);
    }

    #[tokio::test]
    async fn test_scraped_subscriber_can_drop() {
        let bus = EventBus::new();
        bus.subscribe(EventKind::ItemScraped, |event| {
            if let Event::ItemScraped(item) = event {
                item.mark_dropped("rejected downstream");
            }
        });
        let seen = outcomes(&bus);
        let pipeline = ItemPipeline::new(bus);

        assert!(pipeline.process(Item::new()).await.is_none());
        assert_eq!(*seen.lock(), vec![EventKind::ItemScraped, EventKind::ItemDropped]);
    }
}
