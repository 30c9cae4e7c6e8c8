use core::time::Duration;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::time::{Instant, sleep_until};

/// Dispatch slots for fetch workers, with a provider-wide pause.
///
/// Every worker calls [`Throttler::acquire`] before issuing a request; at most
/// `max_concurrent` permits exist. When one worker is told to back off by the provider it
/// calls [`Throttler::pause_for`], and no worker starts a new request until the pause ends.
///
/// The pause is a resume deadline rather than a flag, so it lifts by itself and
/// overlapping pauses keep the one that ends last.
#[derive(Debug)]
pub struct Throttler {
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    resume_at: watch::Sender<Option<Instant>>,
}

impl Throttler {
    pub fn new(max_concurrent: usize) -> Arc<Self> {
        let max_concurrent = max_concurrent.max(1);
        Arc::new(Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            resume_at: watch::Sender::new(None),
        })
    }

    /// Wait out any pause, then take a dispatch slot.
    ///
    /// The slot is released when the returned permit is dropped.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        loop {
            while let Some(until) = self.pending_pause() {
                sleep_until(until).await;
            }

            let permit = Arc::clone(&self.slots)
                .acquire_owned()
                .await
                .expect("semaphore is never closed");

            // A pause may have started while we queued for the slot.
            if self.pending_pause().is_none() {
                return permit;
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pending_pause().is_some()
    }

    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of slots currently handed out.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.slots.available_permits()
    }

    /// Stop dispatching for `duration`.
    ///
    /// Requests already running are not interrupted. Returns `false` if a pause ending at
    /// the same time or later was already in effect.
    pub fn pause_for(&self, duration: Duration) -> bool {
        let until = Instant::now() + duration;

        self.resume_at.send_if_modified(|current| {
            if current.is_some_and(|existing| existing >= until) {
                return false;
            }
            *current = Some(until);
            true
        })
    }

    fn pending_pause(&self) -> Option<Instant> {
        let until = (*self.resume_at.borrow())?;
        (until > Instant::now()).then_some(until)
    }
}
