//! Allocation of locally initiated stream ids.
//!
//! Clients use odd ids starting at 1 and servers even ids starting at 2.
//! Ids advance by two and wrap back to the first id of their parity after
//! [`MAX_STREAM_ID`]; zero is never issued.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::frame::MAX_STREAM_ID;

/// Which end of the connection this side is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// First id this role issues.
    #[must_use]
    pub const fn first_stream_id(self) -> u32 {
        match self {
            Self::Client => 1,
            Self::Server => 2,
        }
    }

    /// Report whether `stream_id` belongs to streams this role initiates.
    #[must_use]
    pub const fn owns(self, stream_id: u32) -> bool {
        stream_id != 0 && stream_id % 2 == self.first_stream_id() % 2
    }
}

/// Issues stream ids of one parity and remembers the highest one issued.
#[derive(Debug)]
pub struct StreamIdAllocator {
    role: Role,
    last: AtomicU32,
    highest: AtomicU32,
}

impl StreamIdAllocator {
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            last: AtomicU32::new(0),
            highest: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role { self.role }

    /// Issue the next id.
    ///
    /// # Examples
    ///
    /// ```
    /// use rsframe::stream_id::{Role, StreamIdAllocator};
    ///
    /// let ids = StreamIdAllocator::new(Role::Server);
    /// assert_eq!(ids.next_id(), 2);
    /// assert_eq!(ids.next_id(), 4);
    /// ```
    pub fn next_id(&self) -> u32 {
        let first = self.role.first_stream_id();
        let advance = |last: u32| -> u32 {
            match last.checked_add(2) {
                Some(next) if last != 0 && next <= MAX_STREAM_ID => next,
                _ => first,
            }
        };
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(advance(last)))
            .unwrap_or_else(|last| last);
        let id = advance(previous);
        self.highest.fetch_max(id, Ordering::AcqRel);
        id
    }

    /// Issue the next id for which `in_use` is false.
    ///
    /// Only matters after wraparound, when old ids may still be live.
    pub fn next_unused(&self, in_use: impl Fn(u32) -> bool) -> u32 {
        loop {
            let id = self.next_id();
            if !in_use(id) {
                return id;
            }
        }
    }

    /// Highest id issued so far, or zero.
    #[must_use]
    pub fn highest_issued(&self) -> u32 { self.highest.load(Ordering::Acquire) }

    /// Report whether `stream_id` was issued at some point.
    ///
    /// Frames for ids above the highest issued one refer to streams that
    /// never existed.
    #[must_use]
    pub fn was_issued(&self, stream_id: u32) -> bool {
        stream_id != 0 && stream_id <= self.highest_issued()
    }
}
