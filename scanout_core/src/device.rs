// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device contract for display drivers.
//!
//! An [`OverlayPlane`](crate::plane::OverlayPlane) never talks to hardware
//! directly. Everything it needs from the display controller goes through
//! [`PlaneDevice`]:
//!
//! - **Capabilities**: [`PlaneDevice::caps`] reports the native format and
//!   the geometry, buffer count and scaler limits of one plane.
//! - **Buffer memory**: [`PlaneDevice::allocate`] hands out scanout-capable
//!   memory for one ring slot. The plane owns it from then on and drops it
//!   only after every flip referencing it has been retired.
//! - **Staged registers**: `set_position`, `set_scale`, `set_pan_size` and
//!   `set_pan_position` write shadow registers; [`PlaneDevice::apply`]
//!   latches them together.
//! - **Flips**: [`PlaneDevice::flip`] queues a buffer for scanout at the next
//!   vertical blank. The device signals completion through
//!   [`poll_completion`](PlaneDevice::poll_completion) or the blocking
//!   [`wait_completion`](PlaneDevice::wait_completion).
//!
//! # Sharing
//!
//! Every plane holds its own handle to the device. Implementations are
//! expected to be cheap handles onto shared driver state (a file descriptor,
//! an `Rc<RefCell<_>>`, an `Arc<Mutex<_>>`) so that
//! [`Screen`](crate::screen::Screen) can clone one into each plane it creates.

use core::fmt;

use crate::error::{AllocationError, DeviceError};
use crate::format::PixelFormat;
use crate::ring::MAX_BUFFERS;
use crate::surface::{PixelMemory, Surface, SurfaceDesc};
use crate::time::HostTime;

/// Identifier of a hardware plane on the display controller.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaneId(pub u32);

impl fmt::Debug for PlaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlaneId({})", self.0)
    }
}

/// What a hardware plane can scan out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneCaps {
    /// The only pixel format the plane scans out.
    pub format: PixelFormat,
    /// Widest buffer the plane accepts.
    pub max_width: u32,
    /// Tallest buffer the plane accepts.
    pub max_height: u32,
    /// Largest ring the plane can flip between.
    pub max_buffers: usize,
    /// Smallest scaler factor.
    pub min_scale: f64,
    /// Largest scaler factor.
    pub max_scale: f64,
}

impl PlaneCaps {
    /// Limits loose enough for software devices and tests.
    #[must_use]
    pub const fn permissive(format: PixelFormat) -> Self {
        Self {
            format,
            max_width: 8192,
            max_height: 8192,
            max_buffers: MAX_BUFFERS,
            min_scale: 1.0 / 16.0,
            max_scale: 16.0,
        }
    }

    /// A plane without a scaler.
    #[must_use]
    pub const fn unscaled(mut self) -> Self {
        self.min_scale = 1.0;
        self.max_scale = 1.0;
        self
    }

    /// Whether `factor` is inside the scaler range.
    #[must_use]
    pub fn supports_scale(&self, factor: f64) -> bool {
        factor.is_finite() && factor >= self.min_scale && factor <= self.max_scale
    }
}

/// Notification that a flipped buffer is now on screen and the previously
/// scanned-out buffer has been released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlipCompletion {
    /// Ring slot that was presented.
    pub index: usize,
    /// When the flip latched.
    pub presented_at: HostTime,
}

/// A display controller driving one or more overlay planes.
///
/// Register writes (`set_*`) take effect on the next [`apply`](Self::apply).
/// At most one flip per plane is outstanding at the device at any time;
/// [`FlipScheduler`](crate::flip::FlipScheduler) holds the rest back.
pub trait PlaneDevice {
    /// Scanout memory for one buffer.
    type Memory: PixelMemory;

    /// Limits of `plane`.
    fn caps(&self, plane: PlaneId) -> PlaneCaps;

    /// Current time on the device's monotonic clock.
    fn now(&self) -> HostTime {
        HostTime::ZERO
    }

    /// Allocates scanout memory for ring slot `slot` of `plane`.
    ///
    /// # Errors
    ///
    /// Returns an [`AllocationError`] if the device is out of buffer memory.
    fn allocate(
        &mut self,
        plane: PlaneId,
        slot: usize,
        desc: &SurfaceDesc,
    ) -> Result<Self::Memory, AllocationError>;

    /// Stages the plane's top-left corner in output coordinates.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the driver refuses the value.
    fn set_position(&mut self, plane: PlaneId, x: i32, y: i32) -> Result<(), DeviceError>;

    /// Stages the scaler factor.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the driver refuses the value.
    fn set_scale(&mut self, plane: PlaneId, factor: f64) -> Result<(), DeviceError>;

    /// Stages the size of the pan window inside the buffer.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the driver refuses the value.
    fn set_pan_size(&mut self, plane: PlaneId, width: u32, height: u32)
    -> Result<(), DeviceError>;

    /// Stages the origin of the pan window inside the buffer.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the driver refuses the value.
    fn set_pan_position(&mut self, plane: PlaneId, x: i32, y: i32) -> Result<(), DeviceError>;

    /// Latches all staged registers and enables the plane.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the combination is rejected; the
    /// previously latched state stays in effect.
    fn apply(&mut self, plane: PlaneId) -> Result<(), DeviceError>;

    /// Disables the plane. Hiding a hidden plane is a no-op.
    fn hide(&mut self, plane: PlaneId);

    /// Presents the only buffer of a single-buffered plane, immediately.
    ///
    /// No completion is signalled. The default latches the registers again,
    /// which is all a device scanning out of the same buffer needs.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the device rejects the present.
    fn present(
        &mut self,
        plane: PlaneId,
        surface: &Surface<Self::Memory>,
    ) -> Result<(), DeviceError> {
        _ = surface;
        self.apply(plane)
    }

    /// Queues ring slot `index`, backed by `surface`, for scanout at the next
    /// vertical blank.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceError`] if the flip is rejected; nothing is queued.
    fn flip(
        &mut self,
        plane: PlaneId,
        index: usize,
        surface: &Surface<Self::Memory>,
    ) -> Result<(), DeviceError>;

    /// Returns the next completion for `plane` without blocking.
    fn poll_completion(&mut self, plane: PlaneId) -> Option<FlipCompletion>;

    /// Blocks until the outstanding flip of `plane` completes.
    ///
    /// # Errors
    ///
    /// [`DeviceError::NoPendingFlip`] if nothing is outstanding,
    /// [`DeviceError::Timeout`] or [`DeviceError::Lost`] if the completion
    /// never arrives.
    fn wait_completion(&mut self, plane: PlaneId) -> Result<FlipCompletion, DeviceError>;

    /// Cancels the outstanding flip of `plane`, if any.
    ///
    /// On return the device no longer references the buffer of the
    /// cancelled flip, so its memory may be freed.
    fn abandon_flip(&mut self, plane: PlaneId);

    /// Returns the plane to the device. Called once, after all of its
    /// buffer memory has been dropped.
    fn release(&mut self, plane: PlaneId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_range_is_inclusive() {
        let caps = PlaneCaps::permissive(PixelFormat::Rgb565);
        assert!(caps.supports_scale(1.0 / 16.0));
        assert!(caps.supports_scale(16.0));
        assert!(!caps.supports_scale(16.5));
        assert!(!caps.supports_scale(f64::NAN));
        assert!(!caps.supports_scale(f64::INFINITY));
    }

    #[test]
    fn unscaled_plane_accepts_only_identity() {
        let caps = PlaneCaps::permissive(PixelFormat::Xrgb8888).unscaled();
        assert!(caps.supports_scale(1.0));
        assert!(!caps.supports_scale(0.5));
    }
}
