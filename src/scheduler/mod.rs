//! # Scheduler Module
//!
//! Holds the crawl frontier and hands out paced batches of requests.
//!
//! ## Overview
//!
//! Every scheduler keeps a "next batch at" timestamp. A paced call to
//! [`RequestScheduler::next_requests`] first waits on the [`Clock`] until that
//! time, takes its batch, and then pushes the timestamp `delay` into the
//! future. [`RequestScheduler::force_next_requests`] takes a batch without
//! waiting and without moving the timestamp; the engine uses it to refill a
//! batch whose members were dropped before dispatch. The timestamp starts at
//! "now", so the first paced batch is free.
//!
//! ## Variants
//!
//! - [`FifoScheduler`]: plain first-in, first-out order.
//! - [`ReadyTimeScheduler`]: ordered by each request's ready-at time, so a
//!   request can be parked until a later moment (delayed retries).

mod fifo;
mod ready_time;

pub use fifo::FifoScheduler;
pub use ready_time::ReadyTimeScheduler;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::clock::Clock;
use crate::request::Request;

/// The contract every frontier implementation offers to the engine.
#[async_trait]
pub trait RequestScheduler: Send + Sync {
    /// Adds a request to the frontier. Dropped requests are accepted as-is.
    fn schedule(&self, request: Request);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits out the inter-batch delay, then returns up to `batch_size` requests.
    async fn next_requests(&self, batch_size: usize) -> Vec<Request>;

    /// Returns up to `batch_size` requests immediately, leaving the pacing untouched.
    fn force_next_requests(&self, batch_size: usize) -> Vec<Request>;

    fn set_delay(&self, delay: Duration);

    /// Removes every queued request, ready or not, and makes the next paced
    /// batch due immediately.
    fn clear(&self) -> Vec<Request>;
}

/// Pacing state shared by both scheduler variants.
pub(crate) struct Pacer {
    clock: Arc<dyn Clock>,
    delay: Mutex<Duration>,
    next_batch_at: Mutex<SystemTime>,
}

impl Pacer {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Pacer {
            clock,
            delay: Mutex::new(Duration::ZERO),
            next_batch_at: Mutex::new(now),
        }
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Sleeps until the next batch is due.
    pub(crate) async fn wait_for_turn(&self) {
        let due = *self.next_batch_at.lock();
        trace!("Waiting for next batch slot");
        self.clock.sleep_until(due).await;
    }

    /// Makes the next batch due now.
    pub(crate) fn reset(&self) {
        *self.next_batch_at.lock() = self.clock.now();
    }

    /// Records that a paced batch went out now.
    pub(crate) fn batch_dispatched(&self) {
        let delay = *self.delay.lock();
        *self.next_batch_at.lock() = self.clock.now() + delay;
    }
}
