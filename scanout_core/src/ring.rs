// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed ring of presentation buffers.
//!
//! A [`BufferRing`] owns `buffer_count` identically shaped [`Surface`]s and
//! the rotation index naming the one the producer draws into next. The ring
//! never reallocates: surfaces live exactly as long as the ring.
//!
//! Rotation is crate-private. Only the flip path in
//! [`OverlayPlane`](crate::plane::OverlayPlane) advances the index, after it
//! has handed the current buffer to the device, so drawing code can never
//! skip ahead into a buffer that is still on screen.

use alloc::vec::Vec;
use core::fmt;

use kurbo::Rect;

use crate::damage::DamageRegion;
use crate::error::{AllocationError, InvalidStateError};
use crate::surface::{PixelMemory, RawHandle, Surface, SurfaceDesc};

/// Largest ring this crate will build, whatever the device allows.
pub const MAX_BUFFERS: usize = 4;

struct Slot<M> {
    surface: Surface<M>,
    damage: DamageRegion,
}

/// `buffer_count` surfaces plus a rotation index.
pub struct BufferRing<M> {
    desc: SurfaceDesc,
    slots: Vec<Slot<M>>,
    index: usize,
}

impl<M> fmt::Debug for BufferRing<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRing")
            .field("desc", &self.desc)
            .field("buffer_count", &self.slots.len())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<M: PixelMemory> BufferRing<M> {
    /// Builds a ring of `count` surfaces described by `desc`.
    ///
    /// `alloc` is called once per slot, in slot order, with the slot index
    /// and the descriptor. Memory returned for earlier slots is dropped if a
    /// later slot fails.
    ///
    /// # Errors
    ///
    /// - [`AllocationError::InvalidCount`] if `count` is zero or above
    ///   [`MAX_BUFFERS`].
    /// - [`AllocationError::ZeroSize`] for an empty descriptor.
    /// - Whatever `alloc` returns, or [`AllocationError::Undersized`] if it
    ///   returns memory too small for `desc`.
    pub fn allocate<F>(
        desc: SurfaceDesc,
        count: usize,
        mut alloc: F,
    ) -> Result<Self, AllocationError>
    where
        F: FnMut(usize, &SurfaceDesc) -> Result<M, AllocationError>,
    {
        if count == 0 || count > MAX_BUFFERS {
            return Err(AllocationError::InvalidCount {
                count,
                max: MAX_BUFFERS,
            });
        }
        if desc.is_empty() {
            return Err(AllocationError::ZeroSize {
                width: desc.width,
                height: desc.height,
            });
        }

        let mut slots = Vec::with_capacity(count);
        for slot in 0..count {
            let memory = alloc(slot, &desc)?;
            slots.push(Slot {
                surface: Surface::new(desc, memory)?,
                damage: DamageRegion::Full,
            });
        }

        Ok(Self {
            desc,
            slots,
            index: 0,
        })
    }

    /// Number of buffers in the ring.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.slots.len()
    }

    /// The rotation index of the current buffer.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Geometry shared by every buffer.
    #[must_use]
    pub fn desc(&self) -> &SurfaceDesc {
        &self.desc
    }

    /// The surface the producer should draw into now.
    #[must_use]
    pub fn current(&self) -> &Surface<M> {
        &self.slots[self.index].surface
    }

    /// Mutable access to the current surface.
    ///
    /// The ring does not know whether the device is done with this buffer;
    /// [`OverlayPlane::surface_mut`](crate::plane::OverlayPlane::surface_mut)
    /// is the gated entry point for drawing code.
    pub fn current_mut(&mut self) -> &mut Surface<M> {
        &mut self.slots[self.index].surface
    }

    /// The surface in slot `index`, if it exists.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Surface<M>> {
        self.slots.get(index).map(|slot| &slot.surface)
    }

    /// Iterates surfaces in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Surface<M>> {
        self.slots.iter().map(|slot| &slot.surface)
    }

    /// Rotates to the next buffer.
    pub(crate) fn advance(&mut self) {
        self.index = (self.index + 1) % self.slots.len();
    }

    /// Low-level memory handle of slot `index`, for zero-copy hand-off.
    ///
    /// The handle is only meaningful until the next rotation; do not write
    /// through it while the slot is on screen.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError::BufferIndex`] if `index` is out of range.
    pub fn raw(&self, index: usize) -> Result<Option<RawHandle>, InvalidStateError> {
        self.get(index)
            .map(Surface::raw_handle)
            .ok_or(InvalidStateError::BufferIndex {
                index,
                count: self.slots.len(),
            })
    }

    /// Records that `rect` is being repainted into the current buffer,
    /// making it stale in every other buffer.
    pub fn add_damage(&mut self, rect: Rect) {
        let mut region = DamageRegion::None;
        region.add_rect(rect);
        if region.is_empty() {
            return;
        }
        let current = self.index;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i != current {
                slot.damage.merge(&region);
            }
        }
    }

    /// Accumulated damage of slot `index`.
    #[must_use]
    pub fn damage(&self, index: usize) -> Option<&DamageRegion> {
        self.slots.get(index).map(|slot| &slot.damage)
    }

    /// Takes the damage the current buffer must repaint, leaving it clean.
    pub fn take_damage(&mut self) -> DamageRegion {
        core::mem::replace(&mut self.slots[self.index].damage, DamageRegion::None)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::format::PixelFormat;

    fn heap_ring(count: usize) -> BufferRing<Vec<u8>> {
        let desc = SurfaceDesc::new(8, 4, PixelFormat::Rgb565);
        BufferRing::allocate(desc, count, |_, d| Ok(vec![0; d.byte_len()])).unwrap()
    }

    #[test]
    fn advance_wraps_around() {
        let mut ring = heap_ring(3);
        assert_eq!(ring.index(), 0);
        ring.advance();
        ring.advance();
        assert_eq!(ring.index(), 2);
        ring.advance();
        assert_eq!(ring.index(), 0);
    }

    #[test]
    fn single_buffer_advance_stays_put() {
        let mut ring = heap_ring(1);
        ring.advance();
        assert_eq!(ring.index(), 0);
    }

    #[test]
    fn zero_and_oversized_counts_are_rejected() {
        let desc = SurfaceDesc::new(8, 4, PixelFormat::Rgb565);
        for count in [0, MAX_BUFFERS + 1] {
            let err = BufferRing::<Vec<u8>>::allocate(desc, count, |_, d| {
                Ok(vec![0; d.byte_len()])
            })
            .unwrap_err();
            assert_eq!(
                err,
                AllocationError::InvalidCount {
                    count,
                    max: MAX_BUFFERS
                }
            );
        }
    }

    #[test]
    fn allocator_failure_aborts_ring() {
        let desc = SurfaceDesc::new(8, 4, PixelFormat::Rgb565);
        let mut calls = 0;
        let err = BufferRing::<Vec<u8>>::allocate(desc, 3, |slot, d| {
            calls += 1;
            if slot == 1 {
                Err(AllocationError::OutOfMemory {
                    slot,
                    bytes: d.byte_len(),
                })
            } else {
                Ok(vec![0; d.byte_len()])
            }
        })
        .unwrap_err();
        assert_eq!(calls, 2, "allocation stops at the first failure");
        assert!(matches!(err, AllocationError::OutOfMemory { slot: 1, .. }));
    }

    #[test]
    fn raw_rejects_out_of_range_index() {
        let ring = heap_ring(2);
        assert_eq!(ring.raw(1), Ok(None));
        assert_eq!(
            ring.raw(2),
            Err(InvalidStateError::BufferIndex { index: 2, count: 2 })
        );
    }

    #[test]
    fn damage_accumulates_until_slot_is_drawn() {
        let mut ring = heap_ring(2);
        // Fresh buffers need a full paint.
        assert_eq!(ring.take_damage(), DamageRegion::Full);
        ring.add_damage(Rect::new(0.0, 0.0, 2.0, 2.0));
        ring.advance();

        // Slot 1 has never been drawn, so it is still fully stale.
        assert_eq!(ring.take_damage(), DamageRegion::Full);
        ring.add_damage(Rect::new(4.0, 0.0, 6.0, 2.0));
        ring.advance();

        // Slot 0 only missed what was drawn into slot 1.
        assert_eq!(
            ring.take_damage(),
            DamageRegion::Rects(vec![Rect::new(4.0, 0.0, 6.0, 2.0)])
        );
        assert_eq!(ring.damage(1), Some(&DamageRegion::None));
    }
}
