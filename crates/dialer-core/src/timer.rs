//! One-shot fallback countdown for a pending call.
//!
//! Expiry is not handled on the timer task: the task only sends a
//! [`TimerExpired`] message into the owner's queue, so the expiry is
//! processed in order with every other event. Each `arm` bumps a generation
//! counter and the owner accepts an expiry only through [`FallbackTimer::accept`],
//! which rejects stale generations. A cancelled or re-armed countdown can
//! therefore never fire.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// Expiry notice sent by a countdown task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerExpired {
    pub generation: u64,
}

/// Re-armable one-shot timer that reports into an mpsc queue
#[derive(Debug)]
pub struct FallbackTimer<M> {
    tx: mpsc::WeakSender<M>,
    generation: u64,
    armed: Option<ArmedCountdown>,
}

#[derive(Debug)]
struct ArmedCountdown {
    generation: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl<M> FallbackTimer<M>
where
    M: From<TimerExpired> + Send + 'static,
{
    /// The timer holds only a weak sender, so it never keeps the owner's
    /// queue open by itself.
    pub fn new(tx: &mpsc::Sender<M>) -> Self {
        Self {
            tx: tx.downgrade(),
            generation: 0,
            armed: None,
        }
    }

    /// Start a fresh countdown of the full `delay`, replacing any armed one.
    ///
    /// Returns the generation of the new countdown.
    pub fn arm(&mut self, delay: Duration) -> u64 {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            sleep(delay).await;
            let delivered = match tx.upgrade() {
                Some(tx) => tx.send(M::from(TimerExpired { generation })).await.is_ok(),
                None => false,
            };
            if !delivered {
                trace!(generation, "fallback expiry dropped, owner queue closed");
            }
        });

        self.armed = Some(ArmedCountdown {
            generation,
            deadline: Instant::now() + delay,
            task,
        });
        debug!(generation, delay_ms = delay.as_millis() as u64, "fallback timer armed");
        generation
    }

    /// Stop the armed countdown, if any
    pub fn cancel(&mut self) {
        if let Some(countdown) = self.armed.take() {
            countdown.task.abort();
            debug!(generation = countdown.generation, "fallback timer cancelled");
        }
    }

    /// Consume an expiry notice.
    ///
    /// Returns `true` only for the currently armed generation; the timer is
    /// disarmed in that case.
    pub fn accept(&mut self, expired: TimerExpired) -> bool {
        match &self.armed {
            Some(countdown) if countdown.generation == expired.generation => {
                self.armed = None;
                true
            }
            _ => {
                trace!(generation = expired.generation, "stale fallback expiry ignored");
                false
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Time left on the armed countdown
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .as_ref()
            .map(|c| c.deadline.saturating_duration_since(Instant::now()))
    }
}

impl<M> Drop for FallbackTimer<M> {
    fn drop(&mut self) {
        if let Some(countdown) = self.armed.take() {
            countdown.task.abort();
        }
    }
}
