//! Keepalive timers and replies.
//!
//! The side that emits keepalives sends `KEEPALIVE(respond)` every tick
//! period. Either side declares the connection dead once no KEEPALIVE has
//! arrived for `ack_timeout * missed_acks`. Inbound frames that ask for a
//! response are answered even when the timers are disabled.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{
    config::KeepAliveConfig,
    error::RSocketError,
    frame::{Frame, KeepAliveFrame},
    send::Sender,
};

#[derive(Debug)]
pub(crate) struct KeepAlive {
    config: KeepAliveConfig,
    emit: bool,
    last_ack: Mutex<Instant>,
}

impl KeepAlive {
    /// `emit` selects whether this side sends keepalives or only watches
    /// for them.
    pub(crate) fn new(config: KeepAliveConfig, emit: bool) -> Self {
        Self {
            config,
            emit,
            last_ack: Mutex::new(Instant::now()),
        }
    }

    /// Record an inbound KEEPALIVE and answer it if asked to.
    pub(crate) fn received(&self, frame: &KeepAliveFrame, sender: &Sender) {
        *self.last_ack.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        if frame.respond {
            let reply = Frame::keepalive(false, sender.position(), frame.data.clone());
            if let Err(error) = sender.send(&reply) {
                tracing::debug!(error = %error, "keepalive reply dropped");
            }
        }
    }

    fn since_last_ack(&self) -> Duration {
        self.last_ack
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Drive the timers until the peer goes silent, returning the timeout
    /// error. Never resolves when the timers are disabled.
    pub(crate) async fn run(&self, sender: &Sender) -> RSocketError {
        if !self.config.is_enabled() {
            return std::future::pending().await;
        }
        let tick = self.config.tick_period;
        let timeout = self.config.timeout();
        let mut ticks = time::interval_at(Instant::now() + tick, tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if self.since_last_ack() > timeout {
                tracing::warn!(timeout_ms = timeout.as_millis(), "keepalive acks missed");
                return RSocketError::Timeout(timeout);
            }
            if self.emit {
                let frame = Frame::keepalive(true, sender.position(), Bytes::new());
                if sender.send(&frame).is_err() {
                    return std::future::pending().await;
                }
            }
        }
    }
}
