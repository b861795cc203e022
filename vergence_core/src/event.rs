// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Session state-change events.
//!
//! Clients learn that they became visible, focused, or neither through
//! queued [`SessionEvent`]s, never by polling the compositor. Events are
//! produced by the activation-policy code on the server side and drained by
//! each client's own thread, so the queue is bounded and never blocks the
//! producer: when full, the oldest unconsumed event is dropped (and counted)
//! to keep the newest state visible.

use alloc::collections::VecDeque;

/// A state change delivered to one client session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session's visibility and/or focus changed.
    StateChange {
        /// Whether the session's layers are now composited.
        visible: bool,
        /// Whether the session now receives input focus.
        focused: bool,
    },
    /// An overlay session's visibility changed because the primary
    /// application came or went.
    OverlayChange {
        /// Whether the overlay is now composited.
        visible: bool,
    },
}

/// Bounded FIFO queue of [`SessionEvent`]s.
///
/// Overflow policy is drop-oldest: pushing onto a full queue removes the
/// oldest queued event first, so a stalled client wakes up to current state
/// rather than a backlog of history.
#[derive(Debug, Clone)]
pub struct EventQueue {
    inner: VecDeque<SessionEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventQueue {
    /// Default queue capacity used by [`Default`].
    pub const DEFAULT_CAPACITY: usize = 32;

    /// Creates a queue with an explicit capacity.
    ///
    /// `capacity == 0` is promoted to `1`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Enqueues one event, dropping the oldest if the queue is full.
    pub fn push(&mut self, event: SessionEvent) {
        if self.inner.len() == self.capacity {
            self.inner.pop_front();
            self.dropped += 1;
        }
        self.inner.push_back(event);
    }

    /// Pops the oldest queued event, if any.
    pub fn pop(&mut self) -> Option<SessionEvent> {
        self.inner.pop_front()
    }

    /// Discards everything still queued.
    pub fn drain(&mut self) {
        self.inner.clear();
    }

    /// Returns the current queue length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` when no events are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of events lost to overflow.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}
