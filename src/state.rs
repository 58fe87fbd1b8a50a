//! Lifecycle of a single stream as seen by one side.
//!
//! Every interaction model walks the same states. A lazily opened requester
//! stream sits in [`StreamState::Idle`] until its first demand sends the
//! request frame. Once registered, a stream's state lives in its
//! [`StreamRegistry`](crate::registry::StreamRegistry) entry and every
//! inbound frame, outbound payload, and cancel is applied through
//! [`StreamState::next`]. Events that make no sense in the current state
//! yield `None`; the registry refuses them and the frame is dropped.

/// Named stream states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// No frame has been sent for the stream yet.
    Idle,
    /// The request frame is on the wire; nothing has come back.
    Requested,
    /// At least one payload has crossed the stream.
    Active,
    /// A local cancel was decided; the CANCEL frame is being emitted.
    Terminating,
    /// No further frames are sent or accepted.
    Closed,
}

/// Things that happen to a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamEvent {
    /// The opening request frame was sent or received.
    Request,
    /// A payload was delivered.
    Next,
    /// Additional credit was granted.
    RequestN,
    /// The sequence completed normally.
    Complete,
    /// The sequence failed.
    Error,
    /// The local side gave up on the stream.
    LocalCancel,
    /// The peer sent CANCEL.
    RemoteCancel,
    /// The local CANCEL frame was enqueued.
    CancelSent,
}

impl StreamState {
    /// Apply `event`, returning the next state or `None` if the event is
    /// not accepted in this state.
    ///
    /// ```
    /// use rsframe::state::{StreamEvent, StreamState};
    ///
    /// let state = StreamState::Idle.next(StreamEvent::Request);
    /// assert_eq!(state, Some(StreamState::Requested));
    /// assert_eq!(StreamState::Closed.next(StreamEvent::Next), None);
    /// ```
    #[must_use]
    pub const fn next(self, event: StreamEvent) -> Option<Self> {
        use StreamEvent as E;
        use StreamState as S;

        match (self, event) {
            (S::Idle, E::Request) => Some(S::Requested),
            (S::Idle, E::LocalCancel) => Some(S::Closed),
            (S::Requested | S::Active, E::Next) => Some(S::Active),
            (S::Requested | S::Active, E::RequestN) => Some(self),
            (S::Requested | S::Active, E::Complete | E::Error | E::RemoteCancel) => {
                Some(S::Closed)
            }
            (S::Requested | S::Active, E::LocalCancel) => Some(S::Terminating),
            (S::Terminating, E::CancelSent) => Some(S::Closed),
            _ => None,
        }
    }

    /// Report whether frames may still be exchanged.
    #[must_use]
    pub const fn is_open(self) -> bool { matches!(self, Self::Requested | Self::Active) }

    #[must_use]
    pub const fn is_closed(self) -> bool { matches!(self, Self::Closed) }
}
