//! Connection configuration.
//!
//! [`ConnectionConfig`] gathers keepalive timing, setup parameters, inbound
//! prefetch, and error reporting for one connection. All setters consume
//! and return the config so it can be built fluently.

use std::time::Duration;

use crate::{frame::SetupFrame, hooks::ErrorSink, payload::Payload};

/// Default inbound prefetch batch.
pub const DEFAULT_PREFETCH: usize = 256;

/// Keepalive timing.
///
/// A zero `tick_period` disables the timers entirely. Inbound KEEPALIVE
/// frames that ask for a response are answered regardless. A server does
/// not use its configured timing; it watches with
/// [`KeepAliveConfig::from_setup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepAliveConfig {
    pub tick_period: Duration,
    pub ack_timeout: Duration,
    pub missed_acks: u32,
}

impl KeepAliveConfig {
    /// Timers disabled.
    pub const DISABLED: Self = Self {
        tick_period: Duration::ZERO,
        ack_timeout: Duration::ZERO,
        missed_acks: 0,
    };

    #[must_use]
    pub fn new(tick_period: Duration, ack_timeout: Duration, missed_acks: u32) -> Self {
        Self {
            tick_period,
            ack_timeout,
            missed_acks,
        }
    }

    /// Timing a server adopts from the client's SETUP: a check every
    /// advertised interval, and dead after `max_lifetime` of silence.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use rsframe::{KeepAliveConfig, Payload, SetupFrame};
    ///
    /// let setup = SetupFrame {
    ///     major_version: 1,
    ///     minor_version: 0,
    ///     keepalive_interval: Duration::from_secs(120),
    ///     max_lifetime: Duration::from_secs(360),
    ///     resume_token: None,
    ///     lease: false,
    ///     metadata_mime_type: "application/binary".to_owned(),
    ///     data_mime_type: "application/binary".to_owned(),
    ///     payload: Payload::default(),
    /// };
    /// let watch = KeepAliveConfig::from_setup(&setup);
    /// assert_eq!(watch.tick_period, Duration::from_secs(120));
    /// assert_eq!(watch.timeout(), Duration::from_secs(360));
    /// ```
    #[must_use]
    pub fn from_setup(setup: &SetupFrame) -> Self {
        Self::new(setup.keepalive_interval, setup.max_lifetime, 1)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool { !self.tick_period.is_zero() }

    /// Silence after which the connection is considered dead.
    #[must_use]
    pub fn timeout(&self) -> Duration { self.ack_timeout.saturating_mul(self.missed_acks) }
}

impl Default for KeepAliveConfig {
    fn default() -> Self { Self::new(Duration::from_secs(20), Duration::from_secs(30), 3) }
}

/// What to do with a frame that names a stream id this side never issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingStreamPolicy {
    /// Treat it as a connection error and dispose the connection.
    #[default]
    Fatal,
    /// Report it to the error sink and drop the frame.
    Report,
}

/// Per-connection settings.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use rsframe::{ConnectionConfig, KeepAliveConfig, MissingStreamPolicy};
///
/// let config = ConnectionConfig::default()
///     .keepalive(KeepAliveConfig::new(
///         Duration::from_millis(500),
///         Duration::from_millis(500),
///         3,
///     ))
///     .data_mime_type("application/json")
///     .missing_stream_policy(MissingStreamPolicy::Report);
/// assert_eq!(config.keepalive_config().timeout(), Duration::from_millis(1500));
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub(crate) keepalive: KeepAliveConfig,
    pub(crate) max_lifetime: Duration,
    pub(crate) metadata_mime_type: String,
    pub(crate) data_mime_type: String,
    pub(crate) setup_payload: Payload,
    pub(crate) missing_stream_policy: MissingStreamPolicy,
    pub(crate) prefetch: usize,
    pub(crate) error_sink: ErrorSink,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            keepalive: KeepAliveConfig::default(),
            max_lifetime: Duration::from_secs(90),
            metadata_mime_type: "application/binary".to_owned(),
            data_mime_type: "application/binary".to_owned(),
            setup_payload: Payload::default(),
            missing_stream_policy: MissingStreamPolicy::default(),
            prefetch: DEFAULT_PREFETCH,
            error_sink: ErrorSink::default(),
        }
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn keepalive(mut self, keepalive: KeepAliveConfig) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Maximum time a client tolerates without hearing from the server,
    /// advertised in SETUP.
    #[must_use]
    pub fn max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }

    #[must_use]
    pub fn metadata_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.metadata_mime_type = mime.into();
        self
    }

    #[must_use]
    pub fn data_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.data_mime_type = mime.into();
        self
    }

    /// Payload carried in the SETUP frame.
    #[must_use]
    pub fn setup_payload(mut self, payload: Payload) -> Self {
        self.setup_payload = payload;
        self
    }

    #[must_use]
    pub fn missing_stream_policy(mut self, policy: MissingStreamPolicy) -> Self {
        self.missing_stream_policy = policy;
        self
    }

    /// Inbound read batch. The reader yields to other tasks after routing
    /// two thirds of a batch; buffering is not limited by it. Clamped to at
    /// least one.
    #[must_use]
    pub fn prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    #[must_use]
    pub fn error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = sink;
        self
    }

    /// Keepalive timing in effect.
    #[must_use]
    pub fn keepalive_config(&self) -> KeepAliveConfig { self.keepalive }
}
