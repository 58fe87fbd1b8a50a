//! Panic capture for teardown sweeps.
//!
//! Closing a connection completes or fails every live stream, and some of
//! that work runs user code. A panic in one entry is caught here and
//! reported so the sweep moves on to the next.

use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
};

/// A caught panic payload, displayable as its message.
///
/// ```
/// use rsframe::panic::isolate;
///
/// let caught = isolate(|| panic!("stream 3")).unwrap_err();
/// assert_eq!(caught.to_string(), "stream 3");
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl PanicMessage {
    fn text(&self) -> Option<&str> {
        self.0
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.0.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text() {
            Some(text) => f.write_str(text),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Wrap a payload returned by [`catch_unwind`].
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

/// Run `f`, converting a panic into a [`PanicMessage`].
///
/// # Errors
///
/// Returns the caught payload if `f` panicked.
pub fn isolate<R>(f: impl FnOnce() -> R) -> Result<R, PanicMessage> {
    catch_unwind(AssertUnwindSafe(f)).map_err(format_panic)
}
