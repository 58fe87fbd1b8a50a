//! Metric helpers for `rsframe`.
//!
//! This module defines metric names and simple helper functions wrapping
//! the [`metrics`](https://docs.rs/metrics) crate. With the `metrics`
//! feature disabled every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "rsframe_connections_active";
/// Name of the counter tracking encoded and decoded frames.
pub const FRAMES_PROCESSED: &str = "rsframe_frames_processed_total";
/// Name of the counter tracking streams opened per interaction model.
pub const STREAMS_OPENED: &str = "rsframe_streams_opened_total";
/// Name of the counter tracking errors handed to the error sink.
pub const ERRORS_TOTAL: &str = "rsframe_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames read from the transport.
    Inbound,
    /// Frames handed to the transport.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the open connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the open connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a newly opened stream for the named interaction model.
pub fn inc_streams(model: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(STREAMS_OPENED, "model" => model).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = model;
}

/// Record an error occurrence.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}
