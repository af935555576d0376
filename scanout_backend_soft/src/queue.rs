// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-plane completion queue.

use std::collections::VecDeque;

use scanout_core::device::FlipCompletion;

/// Bounded FIFO of flip completions with a `drop_oldest` overflow policy.
///
/// A plane that stops polling would otherwise grow the queue without bound;
/// once full, the oldest completion is discarded and counted.
#[derive(Debug, Clone)]
pub(crate) struct CompletionQueue {
    items: VecDeque<FlipCompletion>,
    capacity: usize,
    dropped_count: u64,
}

impl CompletionQueue {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            dropped_count: 0,
        }
    }

    pub(crate) fn push(&mut self, completion: FlipCompletion) {
        if self.items.len() == self.capacity {
            let _ = self.items.pop_front();
            self.dropped_count += 1;
        }
        self.items.push_back(completion);
    }

    pub(crate) fn pop(&mut self) -> Option<FlipCompletion> {
        self.items.pop_front()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn dropped_count(&self) -> u64 {
        self.dropped_count
    }
}
