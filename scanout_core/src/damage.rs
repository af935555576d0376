// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Spatial damage tracking for partial repaint of ring buffers.
//!
//! With more than one buffer in a ring, a buffer that comes back around for
//! drawing is stale by everything painted into the other buffers since it was
//! last drawn. Each ring slot therefore accumulates a [`DamageRegion`]; the
//! painter takes the region of the current slot, repaints it, and the region
//! resets.

use alloc::vec::Vec;

use kurbo::Rect;

/// A region of a buffer that needs repainting.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum DamageRegion {
    /// The entire buffer needs repainting.
    #[default]
    Full,
    /// A list of axis-aligned rectangles in buffer pixels.
    Rects(Vec<Rect>),
    /// Nothing changed; the buffer content is current.
    None,
}

impl DamageRegion {
    /// Returns `true` if no region needs repainting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Adds one rectangle. Zero-area rectangles are ignored.
    pub fn add_rect(&mut self, rect: Rect) {
        let rect = rect.abs();
        if rect.area() <= 0.0 {
            return;
        }
        match self {
            Self::Full => {}
            Self::Rects(rects) => rects.push(rect),
            Self::None => *self = Self::Rects(alloc::vec![rect]),
        }
    }

    /// Merges another damage region into this one.
    pub fn merge(&mut self, other: &Self) {
        match (&*self, other) {
            (Self::Full, _) | (_, Self::Full) => *self = Self::Full,
            (Self::None, _) => *self = other.clone(),
            (_, Self::None) => {}
            (Self::Rects(a), Self::Rects(b)) => {
                let mut merged = a.clone();
                merged.extend_from_slice(b);
                *self = Self::Rects(merged);
            }
        }
    }

    /// Smallest rectangle covering the region, clamped to `bounds`.
    ///
    /// `Full` yields `bounds`; `None` yields `None`.
    #[must_use]
    pub fn bounding_box(&self, bounds: Rect) -> Option<Rect> {
        match self {
            Self::Full => Some(bounds),
            Self::None => None,
            Self::Rects(rects) => {
                let union = rects.iter().copied().reduce(|a, b| a.union(b))?;
                let clipped = union.intersect(bounds);
                (clipped.area() > 0.0).then_some(clipped)
            }
        }
    }
}
