//! Request-N credit shared between a producer and the frames granting it.
//!
//! The producer awaits [`Credit::acquire`] before sending each item; inbound
//! REQUEST_N frames call [`Credit::add`]. Accumulated credit saturates at
//! [`REQUEST_MAX`], which means unbounded and is never consumed.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::Notify;

use crate::frame::REQUEST_MAX;

#[derive(Debug, Default)]
pub struct Credit {
    available: AtomicU32,
    notify: Notify,
}

impl Credit {
    /// Credit seeded with `initial` permits.
    #[must_use]
    pub fn new(initial: u32) -> Self {
        Self {
            available: AtomicU32::new(initial.min(REQUEST_MAX)),
            notify: Notify::new(),
        }
    }

    /// Grant `n` more permits.
    pub fn add(&self, n: u32) {
        let _ = self
            .available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != REQUEST_MAX).then(|| current.saturating_add(n).min(REQUEST_MAX))
            });
        self.notify.notify_one();
    }

    /// Take one permit if one is available.
    pub fn try_acquire(&self) -> bool {
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match current {
                0 => None,
                REQUEST_MAX => Some(REQUEST_MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }

    /// Wait for and take one permit.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            self.notify.notified().await;
        }
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool { self.available.load(Ordering::Acquire) == REQUEST_MAX }

    #[must_use]
    pub fn available(&self) -> u32 { self.available.load(Ordering::Acquire) }
}
