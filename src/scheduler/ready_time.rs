use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{Pacer, RequestScheduler};
use crate::clock::Clock;
use crate::request::Request;

struct Queued {
    ready_at: SystemTime,
    // Insertion sequence; keeps equal ready-at times in scheduling order.
    seq: u64,
    request: Request,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ready_at
            .cmp(&other.ready_at)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Frontier ordered by ready-at time.
///
/// Requests without a ready-at time become eligible at the moment they are
/// scheduled. A batch only contains requests whose ready-at time has passed,
/// so it can be shorter than asked for while later requests wait.
pub struct ReadyTimeScheduler {
    queue: Mutex<BinaryHeap<Reverse<Queued>>>,
    next_seq: AtomicU64,
    pacer: Pacer,
}

impl ReadyTimeScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        ReadyTimeScheduler {
            queue: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
            pacer: Pacer::new(clock),
        }
    }

    fn drain_ready(&self, batch_size: usize) -> Vec<Request> {
        let now = self.pacer.clock().now();
        let mut queue = self.queue.lock();
        let mut batch = Vec::new();

        while batch.len() < batch_size {
            let Some(Reverse(head)) = queue.pop() else {
                break;
            };
            if head.ready_at > now {
                // Heap order means nothing behind the head is ready either.
                queue.push(Reverse(head));
                break;
            }
            batch.push(head.request);
        }

        batch
    }

    fn earliest_ready_at(&self) -> Option<SystemTime> {
        self.queue.lock().peek().map(|Reverse(head)| head.ready_at)
    }
}

#[async_trait]
impl RequestScheduler for ReadyTimeScheduler {
    fn schedule(&self, request: Request) {
        let ready_at = request.ready_at().unwrap_or_else(|| self.pacer.clock().now());
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        trace!("Scheduling request {} (seq {})", request.uri(), seq);
        self.queue.lock().push(Reverse(Queued {
            ready_at,
            seq,
            request,
        }));
    }

    fn len(&self) -> usize {
        self.queue.lock().len()
    }

    async fn next_requests(&self, batch_size: usize) -> Vec<Request> {
        self.pacer.wait_for_turn().await;

        let mut batch = self.drain_ready(batch_size);
        if batch.is_empty() && batch_size > 0 {
            // Everything left is parked; sleep until the first one wakes up.
            if let Some(ready_at) = self.earliest_ready_at() {
                debug!("No request ready yet, waiting for the earliest ready-at time");
                self.pacer.clock().sleep_until(ready_at).await;
                batch = self.drain_ready(batch_size);
            }
        }

        self.pacer.batch_dispatched();
        debug!(
            "Released batch of {} ready requests, {} queued",
            batch.len(),
            self.len()
        );
        batch
    }

    fn force_next_requests(&self, batch_size: usize) -> Vec<Request> {
        self.drain_ready(batch_size)
    }

    fn set_delay(&self, delay: Duration) {
        self.pacer.set_delay(delay);
    }

    fn clear(&self) -> Vec<Request> {
        let queued = std::mem::take(&mut *self.queue.lock());
        self.pacer.reset();
        debug!("Cleared {} queued requests", queued.len());
        queued
            .into_sorted_vec()
            .into_iter()
            .rev()
            .map(|Reverse(queued)| queued.request)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;

    fn request(path: &str) -> Request {
        Request::get(&format!("https://example.com/{}", path)).unwrap()
    }

    fn uris(batch: &[Request]) -> Vec<&str> {
        batch.iter().map(Request::uri).collect()
    }

    #[tokio::test]
    async fn test_requests_without_ready_at_are_immediately_eligible() {
        let clock = Arc::new(VirtualClock::new());
        let scheduler = ReadyTimeScheduler::new(clock.clone());
        scheduler.schedule(request("a"));
        scheduler.schedule(request("b"));

        let batch = scheduler.next_requests(5).await;
        assert_eq!(uris(&batch), vec!["https://example.com/a", "https://example.com/b"]);
        assert_eq!(clock.time_passed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_future_requests_are_held_back() {
        let clock = Arc::new(VirtualClock::new());
        let scheduler = ReadyTimeScheduler::new(clock.clone());
        let later = clock.now() + Duration::from_secs(30);
        scheduler.schedule(request("later").with_ready_at(later));
        scheduler.schedule(request("now"));

        let batch = scheduler.next_requests(2).await;
        assert_eq!(uris(&batch), vec!["https://example.com/now"]);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.force_next_requests(2).is_empty());
    }

    #[tokio::test]
    async fn test_ready_time_orders_batch() {
        let clock = Arc::new(VirtualClock::new());
        let scheduler = ReadyTimeScheduler::new(clock.clone());
        let start = clock.now();
        scheduler.schedule(request("third").with_ready_at(start + Duration::from_secs(3)));
        scheduler.schedule(request("first").with_ready_at(start + Duration::from_secs(1)));
        scheduler.schedule(request("second").with_ready_at(start + Duration::from_secs(2)));
        clock.advance(Duration::from_secs(5));

        let batch = scheduler.force_next_requests(3);
        assert_eq!(
            uris(&batch),
            vec![
                "https://example.com/first",
                "https://example.com/second",
                "https://example.com/third"
            ]
        );
    }

    #[tokio::test]
    async fn test_equal_ready_times_keep_insertion_order() {
        let clock = Arc::new(VirtualClock::new());
        let scheduler = ReadyTimeScheduler::new(clock.clone());
        let at = clock.now();
        for path in ["x", "y", "z"] {
            scheduler.schedule(request(path).with_ready_at(at));
        }

        let batch = scheduler.force_next_requests(3);
        assert_eq!(
            uris(&batch),
            vec!["https://example.com/x", "https://example.com/y", "https://example.com/z"]
        );
    }

    #[tokio::test]
    async fn test_waits_for_parked_request_when_nothing_is_ready() {
        let clock = Arc::new(VirtualClock::new());
        let scheduler = ReadyTimeScheduler::new(clock.clone());
        scheduler.schedule(request("retry").with_ready_at(clock.now() + Duration::from_secs(10)));

        let batch = scheduler.next_requests(1).await;
        assert_eq!(uris(&batch), vec!["https://example.com/retry"]);
        assert_eq!(clock.time_passed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_paced_like_fifo() {
        let clock = Arc::new(VirtualClock::new());
        let scheduler = ReadyTimeScheduler::new(clock.clone());
        scheduler.set_delay(Duration::from_secs(5));
        scheduler.schedule(request("a"));
        scheduler.schedule(request("b"));

        scheduler.next_requests(1).await;
        scheduler.next_requests(1).await;
        assert_eq!(clock.time_passed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_clear_includes_parked_requests() {
        let clock = Arc::new(VirtualClock::new());
        let scheduler = ReadyTimeScheduler::new(clock.clone());
        scheduler.schedule(request("parked").with_ready_at(clock.now() + Duration::from_secs(60)));
        scheduler.schedule(request("ready"));

        let cleared = scheduler.clear();
        assert_eq!(
            uris(&cleared),
            vec!["https://example.com/ready", "https://example.com/parked"]
        );
        assert!(scheduler.is_empty());
    }
}
