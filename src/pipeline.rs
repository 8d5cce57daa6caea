//! # Item Processors
//!
//! Processors form the item pipeline: each scraped item passes through them in
//! registration order. A processor may rewrite the item or drop it; a dropped
//! item skips the remaining processors and is reported as `ItemDropped`.
//!
//! A processor can restrict itself to some items through
//! [`ItemProcessor::should_handle`]; items it does not handle pass by it
//! untouched.

use async_trait::async_trait;

use crate::engine::{Droppable, Stage};
use crate::item::Item;

#[async_trait]
pub trait ItemProcessor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn should_handle(&self, _item: &Item) -> bool {
        true
    }

    async fn process_item(&self, item: Item) -> Item;
}

pub(crate) struct ProcessorStage<'a>(pub &'a dyn ItemProcessor);

#[async_trait]
impl Stage<Item> for ProcessorStage<'_> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn accepts(&self, item: &Item) -> bool {
        self.0.should_handle(item)
    }

    async fn process(&self, item: Item) -> Item {
        self.0.process_item(item).await
    }
}

/// Drops items that lack any of the listed fields.
#[derive(Debug, Clone)]
pub struct RequiredFieldsProcessor {
    fields: Vec<String>,
}

impl RequiredFieldsProcessor {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequiredFieldsProcessor {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ItemProcessor for RequiredFieldsProcessor {
    fn name(&self) -> &str {
        "RequiredFieldsProcessor"
    }

    async fn process_item(&self, mut item: Item) -> Item {
        if let Some(missing) = self.fields.iter().find(|field| !item.has(field)) {
            item.mark_dropped(&format!("Missing required field '{}'", missing));
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_field_drops_item() {
        let processor = RequiredFieldsProcessor::new(["title", "url"]);

        let complete = Item::new().with("title", "Home").with("url", "https://example.com");
        assert!(!processor.process_item(complete).await.is_dropped());

        let partial = Item::new().with("title", "Home");
        let dropped = processor.process_item(partial).await;
        assert_eq!(dropped.drop_reason(), Some("Missing required field 'url'"));
    }
}
