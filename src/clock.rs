//! Wall-time abstraction used for batch pacing.
//!
//! The engine never reads the system time directly. `SystemClock` sleeps for
//! real; `VirtualClock` advances instantly and records how much virtual time
//! has passed, which makes pacing behaviour testable without waiting.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;

    async fn sleep(&self, duration: Duration);

    /// Sleeps until `deadline`; returns immediately if it already passed.
    async fn sleep_until(&self, deadline: SystemTime) {
        if let Ok(remaining) = deadline.duration_since(self.now()) {
            if !remaining.is_zero() {
                self.sleep(remaining).await;
            }
        }
    }
}

/// Clock backed by the operating system and `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock whose time only moves when something sleeps on it.
#[derive(Debug)]
pub struct VirtualClock {
    start: SystemTime,
    current: Mutex<SystemTime>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::starting_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }

    pub fn starting_at(start: SystemTime) -> Self {
        VirtualClock {
            start,
            current: Mutex::new(start),
        }
    }

    /// Total virtual time that has elapsed since construction.
    pub fn time_passed(&self) -> Duration {
        self.current
            .lock()
            .duration_since(self.start)
            .unwrap_or_default()
    }

    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> SystemTime {
        *self.current.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
