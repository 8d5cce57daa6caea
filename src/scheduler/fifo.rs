use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam::queue::SegQueue;
use tracing::{debug, trace};

use super::{Pacer, RequestScheduler};
use crate::clock::Clock;
use crate::request::Request;

/// First-in, first-out frontier with paced batches.
pub struct FifoScheduler {
    request_queue: SegQueue<Request>,
    pacer: Pacer,
}

impl FifoScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        FifoScheduler {
            request_queue: SegQueue::new(),
            pacer: Pacer::new(clock),
        }
    }

    fn pop_batch(&self, batch_size: usize) -> Vec<Request> {
        let mut batch = Vec::with_capacity(batch_size.min(self.request_queue.len()));
        while batch.len() < batch_size {
            match self.request_queue.pop() {
                Some(request) => batch.push(request),
                None => break,
            }
        }
        batch
    }
}

#[async_trait]
impl RequestScheduler for FifoScheduler {
    fn schedule(&self, request: Request) {
        trace!("Scheduling request: {}", request.uri());
        self.request_queue.push(request);
    }

    fn len(&self) -> usize {
        self.request_queue.len()
    }

    async fn next_requests(&self, batch_size: usize) -> Vec<Request> {
        self.pacer.wait_for_turn().await;
        let batch = self.pop_batch(batch_size);
        self.pacer.batch_dispatched();
        debug!(
            "Released batch of {} requests, {} remaining",
            batch.len(),
            self.request_queue.len()
        );
        batch
    }

    fn force_next_requests(&self, batch_size: usize) -> Vec<Request> {
        let batch = self.pop_batch(batch_size);
        trace!("Forced batch of {} requests", batch.len());
        batch
    }

    fn set_delay(&self, delay: Duration) {
        self.pacer.set_delay(delay);
    }

    fn clear(&self) -> Vec<Request> {
        let cleared = self.pop_batch(usize::MAX);
        self.pacer.reset();
        debug!("Cleared {} queued requests", cleared.len());
        cleared
    }
}
