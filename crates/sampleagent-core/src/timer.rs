//! One-shot cancellable timers and periodic tickers.
//!
//! Both deliver their events through the application's event channel, so the
//! event loop sees timer firings in order with every other event. A fired
//! one-shot event can still sit in the channel after it was cancelled; each
//! scheduling therefore gets a generation number and `CancellableTimer::accept`
//! only admits the generation that is currently pending.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct CancellableTimer {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl CancellableTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `make(generation)` to be sent after `delay`. Any earlier
    /// scheduling is cancelled first.
    pub fn schedule<E, F>(&mut self, delay: Duration, tx: mpsc::Sender<E>, make: F) -> u64
    where
        E: Send + 'static,
        F: FnOnce(u64) -> E + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(make(generation)).await.is_err() {
                warn!(generation, "Timer fired after event channel closed");
            }
        }));
        debug!(generation, delay_ms = delay.as_millis() as u64, "Timer scheduled");
        generation
    }

    /// Cancel the pending firing, if any. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                handle.abort();
                debug!(generation = self.generation, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Admit a fired event. Only the generation still pending is accepted,
    /// and only once.
    pub fn accept(&mut self, generation: u64) -> bool {
        if self.pending.is_some() && generation == self.generation {
            self.pending = None;
            true
        } else {
            debug!(generation, current = self.generation, "Ignoring stale timer event");
            false
        }
    }
}

impl Drop for CancellableTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Send `make()` every `period` until the receiver goes away. The first
/// event comes after one full period.
pub fn spawn_ticker<E, F>(period: Duration, tx: mpsc::Sender<E>, make: F) -> JoinHandle<()>
where
    E: Send + 'static,
    F: Fn() -> E + Send + 'static,
{
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if tx.send(make()).await.is_err() {
                debug!("Ticker stopped, event channel closed");
                break;
            }
        }
    })
}
