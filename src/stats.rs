//! # Statistics Module
//!
//! Collects metrics about a run by listening to the engine's events.
//!
//! ## Overview
//!
//! The `StatCollector` is an [`Extension`]: once subscribed it counts requests
//! as they are scheduled, sent, dropped and failed, responses as they arrive
//! (by status code, from cache, bytes downloaded) and items as they are
//! scraped or dropped. Counters are atomics, so the collector can be read
//! while the crawl is still running.
//!
//! ## Example
//!
//! ```rust,ignore
//! use crawler_core::prelude::*;
//!
//! let stats = StatCollector::new();
//! let run = RunBuilder::new(MySpider).add_extension(stats.clone()).build()?;
//! engine.start(run).await?;
//!
//! println!("{}", stats.to_json_string_pretty()?);
//! println!("{}", stats.to_markdown_string());
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::CrawlError;
use crate::events::{Event, EventBus, EventKind};
use crate::extensions::Extension;

// A consistent copy of the counters, used by every export format.
#[derive(Debug, Serialize)]
struct StatsSnapshot {
    requests_scheduled: usize,
    requests_sent: usize,
    requests_failed: usize,
    requests_dropped: usize,
    responses_received: usize,
    responses_from_cache: usize,
    responses_dropped: usize,
    total_bytes_downloaded: usize,
    items_scraped: usize,
    items_dropped: usize,
    response_status_counts: BTreeMap<u16, usize>,
    elapsed_secs: f64,
}

impl StatsSnapshot {
    fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_secs)
    }

    fn per_second(&self, count: usize) -> f64 {
        if self.elapsed_secs > 0.0 {
            count as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    fn formatted_bytes(&self) -> String {
        const KB: usize = 1024;
        const MB: usize = 1024 * KB;
        const GB: usize = 1024 * MB;

        if self.total_bytes_downloaded >= GB {
            format!("{:.2} GB", self.total_bytes_downloaded as f64 / GB as f64)
        } else if self.total_bytes_downloaded >= MB {
            format!("{:.2} MB", self.total_bytes_downloaded as f64 / MB as f64)
        } else if self.total_bytes_downloaded >= KB {
            format!("{:.2} KB", self.total_bytes_downloaded as f64 / KB as f64)
        } else {
            format!("{} B", self.total_bytes_downloaded)
        }
    }

    fn status_summary(&self, separator: &str, format: fn(u16, usize) -> String) -> Option<String> {
        if self.response_status_counts.is_empty() {
            return None;
        }
        Some(
            self.response_status_counts
                .iter()
                .map(|(code, count)| format(*code, *count))
                .collect::<Vec<String>>()
                .join(separator),
        )
    }
}

/// Counts what happens during a run.
#[derive(Debug, Default)]
pub struct StatCollector {
    started: Mutex<Option<Instant>>,
    finished: Mutex<Option<Duration>>,

    pub requests_scheduled: AtomicUsize,
    pub requests_sent: AtomicUsize,
    pub requests_failed: AtomicUsize,
    pub requests_dropped: AtomicUsize,

    pub responses_received: AtomicUsize,
    pub responses_from_cache: AtomicUsize,
    pub responses_dropped: AtomicUsize,
    pub response_status_counts: DashMap<u16, usize>,
    pub total_bytes_downloaded: AtomicUsize,

    pub items_scraped: AtomicUsize,
    pub items_dropped: AtomicUsize,
}

impl StatCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn snapshot(&self) -> StatsSnapshot {
        let response_status_counts = self
            .response_status_counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        StatsSnapshot {
            requests_scheduled: self.requests_scheduled.load(Ordering::SeqCst),
            requests_sent: self.requests_sent.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            requests_dropped: self.requests_dropped.load(Ordering::SeqCst),
            responses_received: self.responses_received.load(Ordering::SeqCst),
            responses_from_cache: self.responses_from_cache.load(Ordering::SeqCst),
            responses_dropped: self.responses_dropped.load(Ordering::SeqCst),
            total_bytes_downloaded: self.total_bytes_downloaded.load(Ordering::SeqCst),
            items_scraped: self.items_scraped.load(Ordering::SeqCst),
            items_dropped: self.items_dropped.load(Ordering::SeqCst),
            response_status_counts,
            elapsed_secs: self.elapsed().as_secs_f64(),
        }
    }

    /// Wall time since `RunStarting`, frozen at `RunFinished`.
    pub fn elapsed(&self) -> Duration {
        if let Some(total) = *self.finished.lock() {
            return total;
        }
        self.started
            .lock()
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    pub fn status_count(&self, status: u16) -> usize {
        self.response_status_counts
            .get(&status)
            .map(|count| *count)
            .unwrap_or(0)
    }

    fn record(&self, event: &mut Event<'_>) {
        match event {
            Event::RunStarting(_) => {
                *self.started.lock() = Some(Instant::now());
                *self.finished.lock() = None;
            }
            Event::RunFinished(_) => {
                let elapsed = self.elapsed();
                *self.finished.lock() = Some(elapsed);
            }
            Event::RequestScheduling(_) => {
                self.requests_scheduled.fetch_add(1, Ordering::SeqCst);
            }
            Event::RequestSending(_) => {
                self.requests_sent.fetch_add(1, Ordering::SeqCst);
            }
            Event::RequestDropped(_) => {
                self.requests_dropped.fetch_add(1, Ordering::SeqCst);
            }
            Event::RequestFailed { .. } => {
                self.requests_failed.fetch_add(1, Ordering::SeqCst);
            }
            Event::ResponseReceiving(response) => {
                self.responses_received.fetch_add(1, Ordering::SeqCst);
                if response.cached {
                    self.responses_from_cache.fetch_add(1, Ordering::SeqCst);
                } else {
                    self.total_bytes_downloaded
                        .fetch_add(response.body.len(), Ordering::SeqCst);
                }
                *self
                    .response_status_counts
                    .entry(response.status.as_u16())
                    .or_insert(0) += 1;
            }
            Event::ResponseDropped(_) => {
                self.responses_dropped.fetch_add(1, Ordering::SeqCst);
            }
            Event::ResponseReceived(_) => {}
            Event::ItemScraped(_) => {
                self.items_scraped.fetch_add(1, Ordering::SeqCst);
            }
            Event::ItemDropped(_) => {
                self.items_dropped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub fn to_json_string(&self) -> Result<String, CrawlError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, CrawlError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Exports the current statistics to a Markdown formatted string.
    pub fn to_markdown_string(&self) -> String {
        let snapshot = self.snapshot();
        let status_codes = snapshot
            .status_summary("\n", |code, count| format!("- **{}**: {}", code, count))
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            r#"# Crawl Statistics Report

- **Duration**: {:?}
- **Average Speed**: {:.2} req/s, {:.2} resp/s, {:.2} item/s

## Requests
| Metric     | Count |
|------------|-------|
| Scheduled  | {} |
| Sent       | {} |
| Failed     | {} |
| Dropped    | {} |

## Responses
| Metric     | Count |
|------------|-------|
| Received   | {} |
| From Cache | {} |
| Dropped    | {} |
| Downloaded | {} |

## Items
| Metric     | Count |
|------------|-------|
| Scraped    | {} |
| Dropped    | {} |

## Status Codes
{}
"#,
            snapshot.elapsed(),
            snapshot.per_second(snapshot.requests_sent),
            snapshot.per_second(snapshot.responses_received),
            snapshot.per_second(snapshot.items_scraped),
            snapshot.requests_scheduled,
            snapshot.requests_sent,
            snapshot.requests_failed,
            snapshot.requests_dropped,
            snapshot.responses_received,
            snapshot.responses_from_cache,
            snapshot.responses_dropped,
            snapshot.formatted_bytes(),
            snapshot.items_scraped,
            snapshot.items_dropped,
            status_codes
        )
    }
}

impl Extension for StatCollector {
    fn subscribe(self: Arc<Self>, events: &EventBus) {
        for kind in [
            EventKind::RunStarting,
            EventKind::RunFinished,
            EventKind::RequestScheduling,
            EventKind::RequestSending,
            EventKind::RequestDropped,
            EventKind::RequestFailed,
            EventKind::ResponseReceiving,
            EventKind::ResponseDropped,
            EventKind::ItemScraped,
            EventKind::ItemDropped,
        ] {
            let stats = Arc::clone(&self);
            events.subscribe(kind, move |event| stats.record(event));
        }
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nCrawl Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(f, "  duration : {:?}", snapshot.elapsed())?;
        writeln!(
            f,
            "  speed    : req/s: {:.2}, resp/s: {:.2}, item/s: {:.2}",
            snapshot.per_second(snapshot.requests_sent),
            snapshot.per_second(snapshot.responses_received),
            snapshot.per_second(snapshot.items_scraped)
        )?;
        writeln!(
            f,
            "  requests : scheduled: {}, sent: {}, fail: {}, drop: {}",
            snapshot.requests_scheduled,
            snapshot.requests_sent,
            snapshot.requests_failed,
            snapshot.requests_dropped
        )?;
        writeln!(
            f,
            "  response : received: {}, from_cache: {}, drop: {}, downloaded: {}",
            snapshot.responses_received,
            snapshot.responses_from_cache,
            snapshot.responses_dropped,
            snapshot.formatted_bytes()
        )?;
        writeln!(
            f,
            "  items    : scraped: {}, dropped: {}",
            snapshot.items_scraped, snapshot.items_dropped
        )?;

        let status = snapshot
            .status_summary(", ", |code, count| format!("{}: {}", code, count))
            .unwrap_or_else(|| "none".to_string());
        writeln!(f, "  status   : {}\n", status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Droppable;
    use crate::item::Item;
    use crate::request::Request;
    use crate::response::Response;
    use http::StatusCode;

    #[test]
    fn test_counts_follow_events() {
        let bus = EventBus::new();
        let stats = StatCollector::new();
        stats.clone().subscribe(&bus);

        let mut request = Request::get("https://example.com").unwrap();
        bus.publish(&mut Event::RequestScheduling(&mut request));
        bus.publish(&mut Event::RequestSending(&mut request));

        let mut response = Response::synthetic(request.clone(), StatusCode::NOT_FOUND, "nope");
        bus.publish(&mut Event::ResponseReceiving(&mut response));
        response.mark_dropped("Unsuccessful HTTP status 404");
        bus.publish(&mut Event::ResponseDropped(&mut response));

        let mut item = Item::new();
        bus.publish(&mut Event::ItemScraped(&mut item));

        assert_eq!(stats.requests_scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(stats.requests_sent.load(Ordering::SeqCst), 1);
        assert_eq!(stats.responses_received.load(Ordering::SeqCst), 1);
        assert_eq!(stats.responses_dropped.load(Ordering::SeqCst), 1);
        assert_eq!(stats.total_bytes_downloaded.load(Ordering::SeqCst), 4);
        assert_eq!(stats.status_count(404), 1);
        assert_eq!(stats.items_scraped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exports() {
        let stats = StatCollector::new();
        stats.requests_sent.fetch_add(3, Ordering::SeqCst);
        stats.response_status_counts.insert(200, 3);

        let json: serde_json::Value = serde_json::from_str(&stats.to_json_string().unwrap()).unwrap();
        assert_eq!(json["requests_sent"], 3);
        assert_eq!(json["response_status_counts"]["200"], 3);

        let markdown = stats.to_markdown_string();
        assert!(markdown.contains("| Sent       | 3 |"));
        assert!(markdown.contains("- **200**: 3"));
        assert!(stats.to_string().contains("status   : 200: 3"));
    }
}
