//! The middleware chain shared by the downloader, spider and item pipelines.
//!
//! A chain is an ordered list of stages. A value is passed through each stage
//! in turn; the first stage that returns a dropped value ends the walk and no
//! later stage sees it. Stages may decline a value through
//! [`Stage::accepts`], in which case they are skipped for that value only.

use async_trait::async_trait;
use tracing::trace;

/// Values that can be rejected with a reason somewhere along a pipeline.
pub trait Droppable {
    fn drop_reason(&self) -> Option<&str>;

    /// Marks the value as dropped. Dropping an already dropped value keeps the original reason.
    fn mark_dropped(&mut self, reason: &str);

    fn is_dropped(&self) -> bool {
        self.drop_reason().is_some()
    }
}

/// One step of a chain.
#[async_trait]
pub trait Stage<T: Send>: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this stage wants to see `value` at all.
    fn accepts(&self, _value: &T) -> bool {
        true
    }

    async fn process(&self, value: T) -> T;
}

/// How a value left a chain.
#[derive(Debug)]
pub enum ChainOutcome<T> {
    /// Every stage ran and none dropped the value.
    Passed(T),
    /// The named stage dropped the value; later stages did not run.
    Dropped { value: T, stage: String },
}

impl<T> ChainOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            ChainOutcome::Passed(value) | ChainOutcome::Dropped { value, .. } => value,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, ChainOutcome::Dropped { .. })
    }
}

/// An ordered sequence of stages applied to values of type `T`.
pub struct MiddlewareChain<'a, T> {
    stages: Vec<Box<dyn Stage<T> + 'a>>,
}

impl<'a, T> MiddlewareChain<'a, T>
where
    T: Droppable + Send,
{
    pub fn new(stages: Vec<Box<dyn Stage<T> + 'a>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs `value` through every accepting stage in order, stopping at the first drop.
    pub async fn process(&self, value: T) -> ChainOutcome<T> {
        let mut current = value;

        if current.is_dropped() {
            return ChainOutcome::Dropped {
                value: current,
                stage: String::new(),
            };
        }

        for stage in &self.stages {
            if !stage.accepts(&current) {
                trace!("Stage '{}' skipped value", stage.name());
                continue;
            }

            current = stage.process(current).await;

            if current.is_dropped() {
                trace!(
                    "Stage '{}' dropped value: {}",
                    stage.name(),
                    current.drop_reason().unwrap_or_default()
                );
                return ChainOutcome::Dropped {
                    value: current,
                    stage: stage.name().to_string(),
                };
            }
        }

        ChainOutcome::Passed(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        name: String,
        calls: Arc<AtomicUsize>,
        drops: bool,
        only_with: Option<&'static str>,
    }

    #[async_trait]
    impl Stage<Item> for Counting {
        fn name(&self) -> &str {
            &self.name
        }

        fn accepts(&self, item: &Item) -> bool {
            self.only_with.map_or(true, |key| item.has(key))
        }

        async fn process(&self, mut item: Item) -> Item {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.drops {
                item.mark_dropped(&format!("dropped by {}", self.name));
            }
            item.with(&self.name, true)
        }
    }

    fn stages(
        drop_at: Option<usize>,
        count: usize,
    ) -> (Vec<Box<dyn Stage<Item>>>, Vec<Arc<AtomicUsize>>) {
        let counters: Vec<_> = (0..count).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let stages = counters
            .iter()
            .enumerate()
            .map(|(idx, calls)| {
                Box::new(Counting {
                    name: format!("stage{}", idx),
                    calls: Arc::clone(calls),
                    drops: drop_at == Some(idx),
                    only_with: None,
                }) as Box<dyn Stage<Item>>
            })
            .collect();
        (stages, counters)
    }

    #[tokio::test]
    async fn test_all_stages_run_in_order() {
        let (stages, counters) = stages(None, 3);
        let chain = MiddlewareChain::new(stages);

        let outcome = chain.process(Item::new()).await;
        let item = match outcome {
            ChainOutcome::Passed(item) => item,
            other => panic!("unexpected outcome: {:?}", other),
        };
        let keys: Vec<&str> = item.all().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["stage0", "stage1", "stage2"]);
        assert!(counters.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    }

    #[tokio::test]
    async fn test_drop_short_circuits_for_every_position() {
        for drop_at in 0..4 {
            let (stages, counters) = stages(Some(drop_at), 4);
            let chain = MiddlewareChain::new(stages);

            let outcome = chain.process(Item::new()).await;
            match &outcome {
                ChainOutcome::Dropped { stage, .. } => {
                    assert_eq!(stage, &format!("stage{}", drop_at))
                }
                other => panic!("expected a drop, got {:?}", other),
            }

            let later_calls: usize = counters[drop_at + 1..]
                .iter()
                .map(|c| c.load(Ordering::SeqCst))
                .sum();
            assert_eq!(later_calls, 0);
            assert_eq!(
                outcome.into_inner().drop_reason(),
                Some(format!("dropped by stage{}", drop_at).as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_declining_stage_is_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::new(vec![Box::new(Counting {
            name: "conditional".into(),
            calls: Arc::clone(&calls),
            drops: true,
            only_with: Some("price"),
        }) as Box<dyn Stage<Item>>]);

        let outcome = chain.process(Item::new().with("title", "x")).await;
        assert!(!outcome.is_dropped());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let outcome = chain.process(Item::new().with("price", 3)).await;
        assert!(outcome.is_dropped());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_dropped_value_never_reaches_a_stage() {
        let (stages, counters) = stages(None, 2);
        let chain = MiddlewareChain::new(stages);

        let mut item = Item::new();
        item.mark_dropped("upstream");
        let outcome = chain.process(item).await;

        assert!(outcome.is_dropped());
        assert!(counters.iter().all(|c| c.load(Ordering::SeqCst) == 0));
    }
}
