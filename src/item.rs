//! Scraped items and the results a parse callback yields.

use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::engine::Droppable;
use crate::request::Request;

/// An ordered map of scraped values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Item {
    #[serde(flatten)]
    fields: Map<String, Value>,
    #[serde(skip)]
    drop_reason: Option<String>,
}

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Item {
            fields,
            drop_reason: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// All fields in insertion order.
    pub fn all(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl Droppable for Item {
    fn drop_reason(&self) -> Option<&str> {
        self.drop_reason.as_deref()
    }

    fn mark_dropped(&mut self, reason: &str) {
        if self.drop_reason.is_none() {
            self.drop_reason = Some(reason.to_string());
        }
    }
}

/// One value yielded by a parse callback.
#[derive(Debug)]
pub enum ParseResult {
    Request(Request),
    Item(Item),
}

impl From<Request> for ParseResult {
    fn from(request: Request) -> Self {
        ParseResult::Request(request)
    }
}

impl From<Item> for ParseResult {
    fn from(item: Item) -> Self {
        ParseResult::Item(item)
    }
}

/// The lazy sequence a parse callback produces for one response.
pub type ParseStream = BoxStream<'static, ParseResult>;

/// Wraps an already materialized list of results as a [`ParseStream`].
pub fn parse_results<I>(results: I) -> ParseStream
where
    I: IntoIterator<Item = ParseResult>,
    I::IntoIter: Send + 'static,
{
    stream::iter(results).boxed()
}
