//! Concurrent table of live streams keyed by stream id.
//!
//! Entries are inserted when a stream opens and removed exactly once, either
//! by the event that moves the stream to [`StreamState::Closed`] or by
//! [`StreamRegistry::close_all`] during connection teardown. Whoever removes
//! an entry owns its terminal signal.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::{
    error::RSocketError,
    hooks::ErrorSink,
    panic,
    state::{StreamEvent, StreamState},
};

#[derive(Debug)]
struct Tracked<T> {
    state: StreamState,
    entry: T,
}

/// Result of [`StreamRegistry::advance`].
#[derive(Debug)]
pub enum Advance<T> {
    /// No entry: the id was never opened or has already retired.
    Missing,
    /// The event is not accepted in the stream's current state.
    Refused(StreamState),
    /// The stream moved to this state and stays registered.
    Open(StreamState),
    /// The event closed the stream; its entry was removed.
    Closed(T),
}

/// Map from stream id to per-stream state.
#[derive(Debug)]
pub struct StreamRegistry<T> {
    streams: DashMap<u32, Tracked<T>>,
    closed: AtomicBool,
}

impl<T> Default for StreamRegistry<T> {
    fn default() -> Self {
        Self {
            streams: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }
}

impl<T> StreamRegistry<T> {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `entry` under `stream_id` in [`StreamState::Requested`]: the
    /// request frame has been sent or received.
    ///
    /// # Errors
    ///
    /// Hands `entry` back if the registry has been closed, including when
    /// [`close_all`](Self::close_all) ran concurrently with the insert.
    pub fn insert(&self, stream_id: u32, entry: T) -> Result<(), T> {
        if self.is_closed() {
            return Err(entry);
        }
        let state = StreamState::Idle
            .next(StreamEvent::Request)
            .unwrap_or(StreamState::Requested);
        self.streams.insert(stream_id, Tracked { state, entry });
        if self.is_closed() {
            if let Some(entry) = self.remove(stream_id) {
                return Err(entry);
            }
        }
        Ok(())
    }

    /// Run `f` against the entry for `stream_id`.
    ///
    /// The entry's shard stays locked while `f` runs, so `f` must not touch
    /// the registry.
    pub fn with<R>(&self, stream_id: u32, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.streams
            .get_mut(&stream_id)
            .map(|mut tracked| f(&mut tracked.entry))
    }

    /// Current state of `stream_id`, if it is registered.
    #[must_use]
    pub fn state(&self, stream_id: u32) -> Option<StreamState> {
        self.streams.get(&stream_id).map(|tracked| tracked.state)
    }

    /// Apply `event` to `stream_id`'s state machine.
    pub fn advance(&self, stream_id: u32, event: StreamEvent) -> Advance<T> {
        self.advance_with(stream_id, event, |_| {})
    }

    /// Apply `event`, running `f` on the entry if the stream stays open.
    ///
    /// A transition to [`StreamState::Closed`] removes the entry and hands it
    /// back. The closed state is set before removal, so concurrent events
    /// for the same id are refused rather than delivered twice.
    pub fn advance_with(
        &self,
        stream_id: u32,
        event: StreamEvent,
        f: impl FnOnce(&mut T),
    ) -> Advance<T> {
        let Some(mut tracked) = self.streams.get_mut(&stream_id) else {
            return Advance::Missing;
        };
        let Some(next) = tracked.state.next(event) else {
            return Advance::Refused(tracked.state);
        };
        tracked.state = next;
        if !next.is_closed() {
            f(&mut tracked.entry);
            return Advance::Open(next);
        }
        drop(tracked);
        match self.remove(stream_id) {
            Some(entry) => Advance::Closed(entry),
            None => Advance::Missing,
        }
    }

    /// Remove and return the entry for `stream_id` whatever its state.
    pub fn remove(&self, stream_id: u32) -> Option<T> {
        self.streams.remove(&stream_id).map(|(_, tracked)| tracked.entry)
    }

    #[must_use]
    pub fn contains(&self, stream_id: u32) -> bool { self.streams.contains_key(&stream_id) }

    #[must_use]
    pub fn len(&self) -> usize { self.streams.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.streams.is_empty() }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    /// Close the registry and hand every remaining entry to `terminate`.
    ///
    /// A panic inside `terminate` is reported to `sink` and the sweep moves
    /// on to the next entry. Later inserts are refused.
    pub fn close_all(&self, sink: &ErrorSink, mut terminate: impl FnMut(u32, T)) {
        self.closed.store(true, Ordering::Release);
        let ids: Vec<u32> = self.streams.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            let Some(entry) = self.remove(id) else { continue };
            if let Err(panic) = panic::isolate(|| terminate(id, entry)) {
                tracing::warn!(stream_id = id, panic = %panic, "stream teardown panicked");
                sink.report(&RSocketError::Connection(format!(
                    "teardown of stream {id} panicked: {panic}"
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn remove_is_exactly_once() {
        let registry = StreamRegistry::new();
        registry.insert(1, "a").expect("open registry");
        assert!(registry.contains(1));
        assert_eq!(registry.remove(1), Some("a"));
        assert_eq!(registry.remove(1), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn with_mutates_in_place() {
        let registry = StreamRegistry::new();
        registry.insert(3, 1_u32).expect("open registry");
        assert_eq!(registry.with(3, |n| { *n += 1; *n }), Some(2));
        assert_eq!(registry.with(5, |n| *n), None);
    }

    #[test]
    fn entries_start_requested_and_walk_the_table() {
        let registry = StreamRegistry::new();
        registry.insert(1, "rx").expect("open registry");
        assert_eq!(registry.state(1), Some(StreamState::Requested));

        let mut delivered = 0;
        let step = registry.advance_with(1, StreamEvent::Next, |_| delivered += 1);
        assert!(matches!(step, Advance::Open(StreamState::Active)));
        assert_eq!(delivered, 1);

        assert!(matches!(registry.advance(1, StreamEvent::Complete), Advance::Closed("rx")));
        assert!(registry.is_empty());
        assert!(matches!(registry.advance(1, StreamEvent::Next), Advance::Missing));
    }

    #[test]
    fn terminating_stream_refuses_late_frames() {
        let registry = StreamRegistry::new();
        registry.insert(3, ()).expect("open registry");
        assert!(matches!(
            registry.advance(3, StreamEvent::LocalCancel),
            Advance::Open(StreamState::Terminating)
        ));

        let mut delivered = false;
        let late = registry.advance_with(3, StreamEvent::Next, |()| delivered = true);
        assert!(matches!(late, Advance::Refused(StreamState::Terminating)));
        assert!(matches!(registry.advance(3, StreamEvent::Complete), Advance::Refused(_)));
        assert!(!delivered);

        assert!(matches!(registry.advance(3, StreamEvent::CancelSent), Advance::Closed(())));
    }

    #[test]
    fn close_all_drains_and_refuses_inserts() {
        let registry = StreamRegistry::new();
        for id in [1, 3, 5] {
            registry.insert(id, id).expect("open registry");
        }
        let mut seen = Vec::new();
        registry.close_all(&ErrorSink::default(), |id, _| seen.push(id));
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 3, 5]);
        assert_eq!(registry.insert(7, 7), Err(7));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn panicking_terminator_does_not_stop_sweep() {
        let reports = Arc::new(Mutex::new(0));
        let counted = Arc::clone(&reports);
        let sink = ErrorSink::new(move |_| *counted.lock().expect("lock") += 1);
        let registry = StreamRegistry::new();
        registry.insert(1, true).expect("open registry");
        registry.insert(3, false).expect("open registry");
        let mut terminated = 0;
        registry.close_all(&sink, |_, explode| {
            assert!(!explode, "boom");
            terminated += 1;
        });
        assert_eq!(terminated, 1);
        assert_eq!(*reports.lock().expect("lock"), 1);
    }
}
