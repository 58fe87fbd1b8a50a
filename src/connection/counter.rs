//! Open connection counting and RAII guard.

use std::sync::atomic::{AtomicU64, Ordering};

static OPEN_CONNECTIONS: AtomicU64 = AtomicU64::new(0);

/// Guard counting one open connection until dropped.
#[derive(Debug)]
pub(super) struct ActiveConnection;

impl ActiveConnection {
    pub(super) fn new() -> Self {
        OPEN_CONNECTIONS.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_connections();
        Self
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        OPEN_CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::dec_connections();
    }
}

/// Number of connections in this process that have not been disposed.
#[must_use]
pub fn open_connection_count() -> u64 { OPEN_CONNECTIONS.load(Ordering::Relaxed) }
