//! Utilities for driving `rsframe` connections in tests.
//!
//! [`TestConnection`] stands in for a network transport so a test can play
//! the remote peer one frame at a time, and [`ErrorLog`] captures what a
//! connection hands to its error sink.
//!
//! ```rust
//! use rsframe::Frame;
//! use rsframe_testing::TestConnection;
//!
//! let (_transport, peer) = TestConnection::new();
//! peer.send(&Frame::cancel(1));
//! assert_eq!(peer.dispose_calls(), 0);
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use rsframe::{ErrorSink, RSocketError};

pub mod logging;
pub mod transport;

pub use logging::{LoggerHandle, logger};
pub use transport::{Peer, TestConnection};

/// Result type for fallible tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Error sink that records every report.
#[derive(Clone, Default)]
pub struct ErrorLog {
    errors: Arc<Mutex<Vec<RSocketError>>>,
}

impl ErrorLog {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// A sink appending to this log.
    #[must_use]
    pub fn sink(&self) -> ErrorSink {
        let errors = Arc::clone(&self.errors);
        ErrorSink::new(move |error| {
            errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(error.clone());
        })
    }

    /// Errors reported so far.
    #[must_use]
    pub fn errors(&self) -> Vec<RSocketError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize { self.errors.lock().unwrap_or_else(PoisonError::into_inner).len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
