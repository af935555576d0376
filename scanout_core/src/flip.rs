// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flip scheduling for one overlay plane.
//!
//! A display device holds at most one flip per plane. The [`FlipScheduler`]
//! decides what happens to the flip requests that arrive while one is still
//! in flight, and tracks which ring slots the device may still be reading.
//!
//! Three slot roles are tracked:
//!
//! - **scanout**: the slot the last acknowledged flip put on screen.
//! - **in flight**: submitted to the device, completion not yet seen.
//! - **waiting**: requested by the producer, not yet submitted.
//!
//! A slot in any of these roles is *busy*: the producer must not write to it.
//!
//! The scheduler is pure bookkeeping. [`plan`](FlipScheduler::plan) decides
//! what a request would do without changing anything, the caller performs
//! the device call, and only then [`record`](FlipScheduler::record) commits
//! the decision. A rejected device call therefore leaves the scheduler
//! exactly as it was.

use alloc::collections::VecDeque;

/// What happens to flip requests that arrive while a flip is in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FlipPolicy {
    /// Keep at most one waiting request; a newer request replaces it and the
    /// replaced buffer is released to the producer unseen.
    #[default]
    Coalesce,
    /// Present every request in order. When every buffer but the current one
    /// is busy, the next request blocks until the device catches up.
    Queue,
}

/// What plane teardown does with a flip the device has not completed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CancelPolicy {
    /// Cancel it at the device.
    #[default]
    Abandon,
    /// Block until it completes.
    Wait,
}

/// Flip behavior of one plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FlipConfig {
    /// Handling of requests that arrive during a flip.
    pub policy: FlipPolicy,
    /// Handling of an outstanding flip at teardown or reconfiguration.
    pub cancel: CancelPolicy,
}

impl FlipConfig {
    /// Coalescing flips, abandoned on teardown.
    #[must_use]
    pub const fn coalescing() -> Self {
        Self {
            policy: FlipPolicy::Coalesce,
            cancel: CancelPolicy::Abandon,
        }
    }

    /// Strictly ordered flips, drained on teardown.
    #[must_use]
    pub const fn queued() -> Self {
        Self {
            policy: FlipPolicy::Queue,
            cancel: CancelPolicy::Wait,
        }
    }
}

/// Decision for one flip request, from [`FlipScheduler::plan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlipAction {
    /// Single-buffered plane: present in place, nothing to track.
    Direct,
    /// Submit the slot to the device now.
    Submit(usize),
    /// Hold the slot until the in-flight flip completes.
    Defer(usize),
    /// Hold the slot in place of the waiting one, which is dropped.
    Replace {
        /// Slot being requested.
        index: usize,
        /// Waiting slot that will never be presented.
        dropped: usize,
    },
}

impl FlipAction {
    /// The slot this action presents, if any.
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Direct => None,
            Self::Submit(index) | Self::Defer(index) | Self::Replace { index, .. } => Some(index),
        }
    }
}

/// Flip counters for one plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FlipStats {
    /// Flip requests recorded.
    pub requested: u64,
    /// Flips handed to the device, including direct presents.
    pub submitted: u64,
    /// Waiting requests replaced by newer ones.
    pub coalesced: u64,
    /// Device completions accepted.
    pub completed: u64,
    /// Requests cancelled before they were presented.
    pub abandoned: u64,
}

/// Slots retired by [`FlipScheduler::abandon`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Abandoned {
    /// The slot the device had been asked to flip to.
    pub in_flight: Option<usize>,
    /// Number of waiting requests dropped.
    pub waiting: usize,
}

/// Flip bookkeeping for a ring of `buffer_count` slots.
#[derive(Clone, Debug)]
pub struct FlipScheduler {
    buffer_count: usize,
    policy: FlipPolicy,
    scanout: Option<usize>,
    in_flight: Option<usize>,
    waiting: VecDeque<usize>,
    stats: FlipStats,
}

impl FlipScheduler {
    /// Creates a scheduler for a ring of `buffer_count` slots.
    #[must_use]
    pub fn new(buffer_count: usize, policy: FlipPolicy) -> Self {
        Self {
            buffer_count,
            policy,
            scanout: None,
            in_flight: None,
            waiting: VecDeque::with_capacity(buffer_count.saturating_sub(1)),
            stats: FlipStats::default(),
        }
    }

    /// Number of ring slots tracked.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Active policy.
    #[must_use]
    pub fn policy(&self) -> FlipPolicy {
        self.policy
    }

    /// Slot acknowledged as on screen.
    #[must_use]
    pub fn scanout(&self) -> Option<usize> {
        self.scanout
    }

    /// Slot submitted to the device and not yet completed.
    #[must_use]
    pub fn in_flight(&self) -> Option<usize> {
        self.in_flight
    }

    /// Requested slots not yet submitted, oldest first.
    pub fn waiting(&self) -> impl Iterator<Item = usize> + '_ {
        self.waiting.iter().copied()
    }

    /// In-flight plus waiting requests.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        usize::from(self.in_flight.is_some()) + self.waiting.len()
    }

    /// Counters since creation or the last [`reset`](Self::reset).
    #[must_use]
    pub fn stats(&self) -> FlipStats {
        self.stats
    }

    /// Whether the device may still read slot `index`.
    ///
    /// Always `false` for a single-buffered ring: its only buffer is both
    /// drawn and scanned out.
    #[must_use]
    pub fn is_busy(&self, index: usize) -> bool {
        self.buffer_count > 1
            && (self.scanout == Some(index)
                || self.in_flight == Some(index)
                || self.waiting.contains(&index))
    }

    /// Whether a new request must wait for a completion before it can be
    /// recorded. Only ever true under [`FlipPolicy::Queue`].
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.policy == FlipPolicy::Queue
            && self.buffer_count > 1
            && self.outstanding() >= self.buffer_count - 1
    }

    /// Decides what a request to present slot `index` does. Pure.
    #[must_use]
    pub fn plan(&self, index: usize) -> FlipAction {
        if self.buffer_count <= 1 {
            return FlipAction::Direct;
        }
        if self.in_flight.is_none() {
            return FlipAction::Submit(index);
        }
        match (self.policy, self.waiting.back()) {
            (FlipPolicy::Coalesce, Some(&dropped)) => FlipAction::Replace { index, dropped },
            _ => FlipAction::Defer(index),
        }
    }

    /// Commits a decision from [`plan`](Self::plan) after the device accepted
    /// it.
    pub fn record(&mut self, action: FlipAction) {
        self.stats.requested += 1;
        match action {
            FlipAction::Direct => self.stats.submitted += 1,
            FlipAction::Submit(index) => self.submitted(index),
            FlipAction::Defer(index) => self.waiting.push_back(index),
            FlipAction::Replace { index, dropped } => {
                if let Some(slot) = self.waiting.iter_mut().find(|w| **w == dropped) {
                    *slot = index;
                } else {
                    self.waiting.push_back(index);
                }
                self.stats.coalesced += 1;
            }
        }
    }

    /// Accepts a completion for slot `index`.
    ///
    /// Returns the waiting slot the caller should now submit, which the
    /// caller confirms with [`submitted`](Self::submitted) or gives up with
    /// [`discard`](Self::discard). Completions that do not match the
    /// in-flight slot are stale and ignored.
    pub fn complete(&mut self, index: usize) -> Option<usize> {
        if self.in_flight != Some(index) {
            return None;
        }
        self.in_flight = None;
        self.scanout = Some(index);
        self.stats.completed += 1;
        self.waiting.pop_front()
    }

    /// Marks slot `index` as submitted to the device.
    pub fn submitted(&mut self, index: usize) {
        self.in_flight = Some(index);
        self.stats.submitted += 1;
    }

    /// Gives up on a slot returned by [`complete`](Self::complete) that the
    /// device refused.
    ///
    /// Every request queued after it is dropped too: none of them may reach
    /// the device ahead of `index`. Returns the number of requests dropped,
    /// `index` included.
    pub fn discard(&mut self, index: usize) -> usize {
        debug_assert!(self.in_flight.is_none(), "slot {index} refused while a flip is in flight");
        let later = self.waiting.len();
        self.waiting.clear();
        let dropped = later + 1;
        self.stats.abandoned += u64::try_from(dropped).unwrap_or(u64::MAX);
        dropped
    }

    /// Drops every outstanding request. The caller cancels the in-flight one
    /// at the device.
    pub fn abandon(&mut self) -> Abandoned {
        let abandoned = Abandoned {
            in_flight: self.in_flight.take(),
            waiting: self.waiting.len(),
        };
        self.waiting.clear();
        let dropped = usize::from(abandoned.in_flight.is_some()) + abandoned.waiting;
        self.stats.abandoned += u64::try_from(dropped).unwrap_or(u64::MAX);
        abandoned
    }

    /// Starts over for a fresh ring of `buffer_count` slots.
    pub fn reset(&mut self, buffer_count: usize) {
        *self = Self::new(buffer_count, self.policy);
    }
}
