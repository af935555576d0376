// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The painting-layer facade.
//!
//! A [`Screen`] owns one device handle, every [`OverlayPlane`] created on it,
//! and one [`ImageCache`]. Painting code addresses planes through
//! [`PlaneKey`] handles and needs only three calls:
//!
//! - [`current_surface_for`](Screen::current_surface_for) to draw,
//! - [`request_flip`](Screen::request_flip) to present,
//! - [`cached_image`](Screen::cached_image) to fetch decoded artwork.
//!
//! Plane slots are recycled through a free list; a generation counter per
//! slot makes keys of destroyed planes fail with
//! [`InvalidStateError::UnknownPlane`] instead of reaching a newer plane.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Rect;

use crate::cache::{CacheConfig, Image, ImageCache, ImageSource};
use crate::damage::DamageRegion;
use crate::device::{PlaneDevice, PlaneId};
use crate::error::{DecodeError, InvalidStateError, PlaneError};
use crate::flip::{FlipAction, FlipConfig};
use crate::plane::OverlayPlane;
use crate::surface::Surface;
use crate::trace::Tracer;

/// A handle to a plane owned by a [`Screen`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneKey {
    idx: u32,
    generation: u32,
}

impl PlaneKey {
    /// Slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Generation of the slot when the key was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for PlaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlaneKey({}@gen{})", self.idx, self.generation)
    }
}

struct Slot<D: PlaneDevice> {
    generation: u32,
    plane: Option<OverlayPlane<D>>,
}

/// Overlay planes and an image cache behind one device.
pub struct Screen<D: PlaneDevice + Clone, S: ImageSource> {
    device: D,
    flip_config: FlipConfig,
    slots: Vec<Slot<D>>,
    free_list: Vec<u32>,
    images: ImageCache<S>,
}

impl<D: PlaneDevice + Clone, S: ImageSource> fmt::Debug for Screen<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screen")
            .field("flip_config", &self.flip_config)
            .field("planes", &self.planes().count())
            .field("images", &self.images)
            .finish_non_exhaustive()
    }
}

impl<D: PlaneDevice + Clone, S: ImageSource> Screen<D, S> {
    /// Creates a screen with coalescing flips and the default cache step.
    #[must_use]
    pub fn new(device: D, source: S) -> Self {
        Self::with_config(device, source, FlipConfig::default(), CacheConfig::default())
    }

    /// Creates a screen whose planes use `flip_config`.
    #[must_use]
    pub fn with_config(
        device: D,
        source: S,
        flip_config: FlipConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            device,
            flip_config,
            slots: Vec::new(),
            free_list: Vec::new(),
            images: ImageCache::with_config(source, cache_config),
        }
    }

    /// The shared device handle.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    // -- planes ------------------------------------------------------------

    /// Binds hardware plane `id` with the screen's flip configuration.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::PlaneInUse`] if a live plane is already bound to
    /// `id`.
    pub fn create_plane(&mut self, id: PlaneId) -> Result<PlaneKey, InvalidStateError> {
        self.create_plane_with(id, self.flip_config)
    }

    /// Binds hardware plane `id` with its own flip configuration.
    ///
    /// # Errors
    ///
    /// See [`create_plane`](Self::create_plane).
    pub fn create_plane_with(
        &mut self,
        id: PlaneId,
        config: FlipConfig,
    ) -> Result<PlaneKey, InvalidStateError> {
        if self.planes().any(|(_, plane)| plane.id() == id) {
            return Err(InvalidStateError::PlaneInUse(id));
        }
        let plane = OverlayPlane::with_config(self.device.clone(), id, config);
        let key = if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.plane = Some(plane);
            PlaneKey {
                idx,
                generation: slot.generation,
            }
        } else {
            let idx = slot_index(self.slots.len());
            self.slots.push(Slot {
                generation: 0,
                plane: Some(plane),
            });
            PlaneKey { idx, generation: 0 }
        };
        Ok(key)
    }

    /// Destroys the plane behind `key`. Returns `false` for a stale key.
    pub fn destroy_plane(&mut self, key: PlaneKey) -> bool {
        let Some(slot) = self.slot_mut(key) else {
            return false;
        };
        let Some(plane) = slot.plane.take() else {
            return false;
        };
        plane.destroy();
        self.free_list.push(key.idx);
        true
    }

    /// The plane behind `key`.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::UnknownPlane`] for a stale or foreign key.
    pub fn plane(&self, key: PlaneKey) -> Result<&OverlayPlane<D>, InvalidStateError> {
        self.slots
            .get(key.idx as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.plane.as_ref())
            .ok_or(InvalidStateError::UnknownPlane)
    }

    /// Mutable access to the plane behind `key`.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::UnknownPlane`] for a stale or foreign key.
    pub fn plane_mut(
        &mut self,
        key: PlaneKey,
    ) -> Result<&mut OverlayPlane<D>, InvalidStateError> {
        self.slot_mut(key)
            .and_then(|slot| slot.plane.as_mut())
            .ok_or(InvalidStateError::UnknownPlane)
    }

    /// Every live plane with its key, in slot order.
    pub fn planes(&self) -> impl Iterator<Item = (PlaneKey, &OverlayPlane<D>)> + '_ {
        self.slots.iter().zip(0_u32..).filter_map(|(slot, idx)| {
            slot.plane.as_ref().map(|plane| {
                (
                    PlaneKey {
                        idx,
                        generation: slot.generation,
                    },
                    plane,
                )
            })
        })
    }

    fn slot_mut(&mut self, key: PlaneKey) -> Option<&mut Slot<D>> {
        self.slots
            .get_mut(key.idx as usize)
            .filter(|slot| slot.generation == key.generation)
    }

    // -- painting-layer interface ------------------------------------------

    /// The buffer to draw the next frame of plane `key` into.
    ///
    /// Blocks while that buffer is still owned by the display.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::UnknownPlane`] for a stale key, otherwise see
    /// [`OverlayPlane::surface_mut`].
    pub fn current_surface_for(
        &mut self,
        key: PlaneKey,
    ) -> Result<&mut Surface<D::Memory>, PlaneError> {
        self.plane_mut(key)?.surface_mut()
    }

    /// Presents the buffer just drawn for plane `key`.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::UnknownPlane`] for a stale key, otherwise see
    /// [`OverlayPlane::schedule_flip`].
    pub fn request_flip(&mut self, key: PlaneKey) -> Result<FlipAction, PlaneError> {
        self.request_flip_traced(key, &mut Tracer::none())
    }

    /// [`request_flip`](Self::request_flip) with trace events.
    ///
    /// # Errors
    ///
    /// See [`request_flip`](Self::request_flip).
    pub fn request_flip_traced(
        &mut self,
        key: PlaneKey,
        tracer: &mut Tracer<'_>,
    ) -> Result<FlipAction, PlaneError> {
        self.plane_mut(key)?.schedule_flip_traced(tracer)
    }

    /// A decoded image scaled by `hscale` by `vscale`, from the screen's
    /// cache. See [`ImageCache::get`].
    ///
    /// # Errors
    ///
    /// See [`ImageCache::get`].
    pub fn cached_image(
        &mut self,
        source: &str,
        hscale: f32,
        vscale: f32,
        approximate: bool,
    ) -> Result<Arc<Image>, DecodeError> {
        self.images.get(source, hscale, vscale, approximate)
    }

    /// [`cached_image`](Self::cached_image) with trace events.
    ///
    /// # Errors
    ///
    /// See [`ImageCache::get`].
    pub fn cached_image_traced(
        &mut self,
        source: &str,
        hscale: f32,
        vscale: f32,
        approximate: bool,
        tracer: &mut Tracer<'_>,
    ) -> Result<Arc<Image>, DecodeError> {
        self.images
            .get_traced(source, hscale, vscale, approximate, tracer)
    }

    /// Records that `rect` of plane `key` is being repainted.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError`] for a stale key or an unconfigured plane.
    pub fn damage(&mut self, key: PlaneKey, rect: Rect) -> Result<(), InvalidStateError> {
        self.plane_mut(key)?.add_damage(rect)
    }

    /// Takes the stale region of the current buffer of plane `key`.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError`] for a stale key or an unconfigured plane.
    pub fn take_damage(&mut self, key: PlaneKey) -> Result<DamageRegion, InvalidStateError> {
        self.plane_mut(key)?.take_damage()
    }

    /// Drops every cached image.
    pub fn clear_images(&mut self) {
        self.images.clear();
    }

    /// The image cache.
    #[must_use]
    pub fn images(&self) -> &ImageCache<S> {
        &self.images
    }

    /// Mutable access to the image cache.
    pub fn images_mut(&mut self) -> &mut ImageCache<S> {
        &mut self.images
    }

    /// Processes completions on every plane. Returns the total processed.
    ///
    /// # Errors
    ///
    /// The first error any plane reported; the remaining planes are still
    /// polled.
    pub fn poll(&mut self) -> Result<usize, PlaneError> {
        let mut processed = 0;
        let mut first_err = None;
        for plane in self.slots.iter_mut().filter_map(|slot| slot.plane.as_mut()) {
            match plane.poll() {
                Ok(n) => processed += n,
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(processed), Err)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "a display controller has far fewer than u32::MAX planes"
)]
fn slot_index(len: usize) -> u32 {
    len as u32
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;
    use alloc::vec;

    use super::*;
    use crate::device::{FlipCompletion, PlaneCaps};
    use crate::error::{AllocationError, DeviceError};
    use crate::format::PixelFormat;
    use crate::surface::SurfaceDesc;

    #[derive(Clone, Default)]
    struct NullDevice;

    impl PlaneDevice for NullDevice {
        type Memory = Vec<u8>;

        fn caps(&self, _: PlaneId) -> PlaneCaps {
            PlaneCaps::permissive(PixelFormat::Xrgb8888)
        }

        fn allocate(
            &mut self,
            _: PlaneId,
            _: usize,
            desc: &SurfaceDesc,
        ) -> Result<Vec<u8>, AllocationError> {
            Ok(vec![0; desc.byte_len()])
        }

        fn set_position(&mut self, _: PlaneId, _: i32, _: i32) -> Result<(), DeviceError> {
            Ok(())
        }

        fn set_scale(&mut self, _: PlaneId, _: f64) -> Result<(), DeviceError> {
            Ok(())
        }

        fn set_pan_size(&mut self, _: PlaneId, _: u32, _: u32) -> Result<(), DeviceError> {
            Ok(())
        }

        fn set_pan_position(&mut self, _: PlaneId, _: i32, _: i32) -> Result<(), DeviceError> {
            Ok(())
        }

        fn apply(&mut self, _: PlaneId) -> Result<(), DeviceError> {
            Ok(())
        }

        fn hide(&mut self, _: PlaneId) {}

        fn flip(&mut self, _: PlaneId, _: usize, _: &Surface<Vec<u8>>) -> Result<(), DeviceError> {
            Ok(())
        }

        fn poll_completion(&mut self, _: PlaneId) -> Option<FlipCompletion> {
            None
        }

        fn wait_completion(&mut self, _: PlaneId) -> Result<FlipCompletion, DeviceError> {
            Err(DeviceError::NoPendingFlip)
        }

        fn abandon_flip(&mut self, _: PlaneId) {}

        fn release(&mut self, _: PlaneId) {}
    }

    struct NoImages;

    impl ImageSource for NoImages {
        fn decode(&mut self, id: &str) -> Result<Image, DecodeError> {
            Err(DecodeError::NotFound(id.to_string()))
        }

        fn scale(&mut self, _: &str, _: &Image, _: u32, _: u32) -> Result<Image, DecodeError> {
            unreachable!("nothing decodes")
        }
    }

    #[test]
    fn stale_keys_are_rejected() {
        let mut screen = Screen::new(NullDevice, NoImages);
        let key = screen.create_plane(PlaneId(0)).unwrap();
        assert!(screen.destroy_plane(key));
        assert!(!screen.destroy_plane(key));

        let reused = screen.create_plane(PlaneId(0)).unwrap();
        assert_eq!(reused.index(), key.index());
        assert_ne!(reused, key);
        assert_eq!(
            screen.request_flip(key).unwrap_err(),
            PlaneError::InvalidState(InvalidStateError::UnknownPlane)
        );
        assert!(screen.plane(reused).is_ok());
    }

    #[test]
    fn hardware_plane_binds_once() {
        let mut screen = Screen::new(NullDevice, NoImages);
        screen.create_plane(PlaneId(2)).unwrap();
        assert_eq!(
            screen.create_plane(PlaneId(2)),
            Err(InvalidStateError::PlaneInUse(PlaneId(2)))
        );
        screen.create_plane(PlaneId(3)).unwrap();
        assert_eq!(screen.planes().count(), 2);
    }

    #[test]
    fn drawing_needs_a_configured_plane() {
        let mut screen = Screen::new(NullDevice, NoImages);
        let key = screen.create_plane(PlaneId(0)).unwrap();
        assert!(matches!(
            screen.current_surface_for(key),
            Err(PlaneError::InvalidState(InvalidStateError::NotConfigured { .. }))
        ));
        assert!(screen.damage(key, Rect::new(0.0, 0.0, 1.0, 1.0)).is_err());
    }

    #[test]
    fn cached_image_errors_pass_through() {
        let mut screen = Screen::new(NullDevice, NoImages);
        assert!(matches!(
            screen.cached_image("logo", 1.0, 1.0, true),
            Err(DecodeError::NotFound(id)) if id == "logo"
        ));
        assert_eq!(screen.images().stats().failures, 1);
    }
}
