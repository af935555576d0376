// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overlay planes: a buffer ring bound to a hardware scanout plane.
//!
//! # Lifecycle
//!
//! ```text
//!   Created ──configure──► Configured ──show──► Visible ◄──show── Hidden
//!                                │                 │                ▲
//!                                └──────hide───────┴──────hide──────┘
//!
//!   any state ──destroy / drop──► Destroyed
//! ```
//!
//! Position, scale and pan window are *staged*: the `set_*` methods only
//! record values, and [`OverlayPlane::apply`] validates them and latches them
//! on the device in one step. A rejected apply leaves the previously latched
//! state in effect.
//!
//! # Write gating
//!
//! [`OverlayPlane::surface_mut`] is the only way to get write access to a
//! ring buffer. It blocks on the device completion channel while the current
//! buffer is still being scanned out or is queued for a flip, so the producer
//! can never tear a frame the display is reading.
//!
//! # Teardown
//!
//! Dropping a plane (or calling [`OverlayPlane::destroy`]) retires any flip
//! the device has not completed *before* the ring's memory is freed, then
//! hides and releases the hardware plane.

use core::fmt;

use kurbo::{Point, Rect, Size};

use crate::damage::DamageRegion;
use crate::device::{FlipCompletion, PlaneCaps, PlaneDevice, PlaneId};
use crate::error::{DeviceError, InvalidStateError, PlaneError};
use crate::flip::{CancelPolicy, FlipAction, FlipConfig, FlipScheduler, FlipStats};
use crate::format::PixelFormat;
use crate::ring::{BufferRing, MAX_BUFFERS};
use crate::surface::{RawHandle, Surface, SurfaceDesc};
use crate::trace::{
    FlipAbandonEvent, FlipCompleteEvent, FlipRequestEvent, PlaneApplyEvent, PlaneStateEvent,
    Tracer,
};

/// Where an [`OverlayPlane`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaneLifecycle {
    /// Bound to a device plane, no buffers yet.
    Created,
    /// Buffers allocated, never shown or reconfigured since last shown.
    Configured,
    /// Scanned out.
    Visible,
    /// Buffers kept, plane disabled.
    Hidden,
    /// Buffers freed and the device plane released.
    Destroyed,
}

impl PlaneLifecycle {
    /// Whether the plane has a buffer ring.
    #[must_use]
    pub const fn is_configured(self) -> bool {
        matches!(self, Self::Configured | Self::Visible | Self::Hidden)
    }
}

/// Buffer geometry requested from [`OverlayPlane::configure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlaneGeometry {
    /// Buffer width in pixels.
    pub width: u32,
    /// Buffer height in pixels.
    pub height: u32,
    /// Number of buffers in the ring.
    pub buffer_count: usize,
}

impl PlaneGeometry {
    /// Creates a geometry.
    #[must_use]
    pub const fn new(width: u32, height: u32, buffer_count: usize) -> Self {
        Self {
            width,
            height,
            buffer_count,
        }
    }
}

/// Register values of a plane, staged or latched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneState {
    /// Top-left corner in output coordinates.
    pub position: Point,
    /// Scaler factor applied to the pan window.
    pub scale: f64,
    /// Window of the buffer that is scanned out, in buffer pixels.
    pub pan: Rect,
}

#[derive(Clone, Copy, Debug)]
struct Staged {
    position: Point,
    scale: f64,
    pan_origin: Point,
    /// `None` pans over the whole buffer.
    pan_size: Option<Size>,
}

impl Default for Staged {
    fn default() -> Self {
        Self {
            position: Point::ZERO,
            scale: 1.0,
            pan_origin: Point::ZERO,
            pan_size: None,
        }
    }
}

/// A hardware overlay plane with its buffer ring and flip scheduler.
pub struct OverlayPlane<D: PlaneDevice> {
    device: D,
    id: PlaneId,
    caps: PlaneCaps,
    config: FlipConfig,
    state: PlaneLifecycle,
    ring: Option<BufferRing<D::Memory>>,
    scheduler: FlipScheduler,
    staged: Staged,
    applied: Option<PlaneState>,
}

impl<D: PlaneDevice> fmt::Debug for OverlayPlane<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayPlane")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("format", &self.caps.format)
            .field("ring", &self.ring)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl<D: PlaneDevice> OverlayPlane<D> {
    /// Binds hardware plane `id` with coalescing flips.
    ///
    /// The pixel format is fixed to the plane's native format.
    #[must_use]
    pub fn new(device: D, id: PlaneId) -> Self {
        Self::with_config(device, id, FlipConfig::default())
    }

    /// Binds hardware plane `id` with explicit flip behavior.
    #[must_use]
    pub fn with_config(device: D, id: PlaneId, config: FlipConfig) -> Self {
        let caps = device.caps(id);
        tracing::debug!(plane = id.0, format = ?caps.format, "plane created");
        Self {
            device,
            id,
            caps,
            config,
            state: PlaneLifecycle::Created,
            ring: None,
            scheduler: FlipScheduler::new(0, config.policy),
            staged: Staged::default(),
            applied: None,
        }
    }

    // -- accessors ---------------------------------------------------------

    /// Hardware plane identifier.
    #[must_use]
    pub fn id(&self) -> PlaneId {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PlaneLifecycle {
        self.state
    }

    /// Pixel format of every buffer, fixed at creation.
    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.caps.format
    }

    /// Device limits read at creation.
    #[must_use]
    pub fn caps(&self) -> &PlaneCaps {
        &self.caps
    }

    /// Flip behavior.
    #[must_use]
    pub fn flip_config(&self) -> FlipConfig {
        self.config
    }

    /// Buffer geometry, once configured.
    #[must_use]
    pub fn geometry(&self) -> Option<PlaneGeometry> {
        self.ring.as_ref().map(|ring| {
            let desc = ring.desc();
            PlaneGeometry::new(desc.width, desc.height, ring.buffer_count())
        })
    }

    /// Number of buffers, or zero before [`configure`](Self::configure).
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.ring.as_ref().map_or(0, BufferRing::buffer_count)
    }

    /// Rotation index of the current buffer, once configured.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.ring.as_ref().map(BufferRing::index)
    }

    /// The buffer ring, once configured.
    #[must_use]
    pub fn ring(&self) -> Option<&BufferRing<D::Memory>> {
        self.ring.as_ref()
    }

    /// Flip bookkeeping.
    #[must_use]
    pub fn scheduler(&self) -> &FlipScheduler {
        &self.scheduler
    }

    /// Flip counters.
    #[must_use]
    pub fn flip_stats(&self) -> FlipStats {
        self.scheduler.stats()
    }

    /// Staged register values, with the pan window resolved against the
    /// current buffer size.
    #[must_use]
    pub fn staged(&self) -> PlaneState {
        let size = self.staged.pan_size.unwrap_or_else(|| {
            self.ring.as_ref().map_or(Size::ZERO, |ring| {
                Size::new(f64::from(ring.desc().width), f64::from(ring.desc().height))
            })
        });
        PlaneState {
            position: self.staged.position,
            scale: self.staged.scale,
            pan: Rect::from_origin_size(self.staged.pan_origin, size),
        }
    }

    /// Register values last latched on the device.
    #[must_use]
    pub fn applied(&self) -> Option<PlaneState> {
        self.applied
    }

    /// Staged scaler factor.
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.staged.scale
    }

    /// The device handle.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    // -- configuration -----------------------------------------------------

    /// Allocates a ring of buffers, moving the plane to `Configured`.
    ///
    /// Reconfiguring allocates the new ring before touching the old one, so
    /// on failure the plane is exactly as it was. On success any outstanding
    /// flip is retired per [`CancelPolicy`] before the old buffers are freed,
    /// and a visible plane is hidden until shown again.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::UnsupportedFormat`] if `format` is not the plane's.
    /// - [`DeviceError::UnsupportedGeometry`] or
    ///   [`DeviceError::UnsupportedBufferCount`] beyond the plane's limits.
    /// - [`AllocationError`](crate::error::AllocationError) if buffer memory
    ///   cannot be provided.
    pub fn configure(
        &mut self,
        geometry: PlaneGeometry,
        format: PixelFormat,
    ) -> Result<(), PlaneError> {
        self.configure_traced(geometry, format, &mut Tracer::none())
    }

    /// [`configure`](Self::configure) with trace events.
    ///
    /// # Errors
    ///
    /// See [`configure`](Self::configure).
    pub fn configure_traced(
        &mut self,
        geometry: PlaneGeometry,
        format: PixelFormat,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), PlaneError> {
        self.validate_geometry(geometry, format)
            .inspect_err(|e| tracing::warn!(plane = self.id.0, error = %e, "configure rejected"))?;

        let desc = SurfaceDesc::new(geometry.width, geometry.height, format);
        let id = self.id;
        let device = &mut self.device;
        let ring = BufferRing::allocate(desc, geometry.buffer_count, |slot, desc| {
            device.allocate(id, slot, desc)
        })
        .inspect_err(|e| tracing::warn!(plane = id.0, error = %e, "buffer allocation failed"))?;

        self.retire_flips(tracer);
        if self.state == PlaneLifecycle::Visible {
            self.device.hide(self.id);
            self.applied = None;
        }
        self.ring = Some(ring);
        self.scheduler.reset(geometry.buffer_count);
        tracing::debug!(
            plane = self.id.0,
            width = geometry.width,
            height = geometry.height,
            buffers = geometry.buffer_count,
            "plane configured"
        );
        self.transition(PlaneLifecycle::Configured, tracer);
        Ok(())
    }

    fn validate_geometry(
        &self,
        geometry: PlaneGeometry,
        format: PixelFormat,
    ) -> Result<(), DeviceError> {
        let caps = &self.caps;
        if format != caps.format {
            return Err(DeviceError::UnsupportedFormat {
                requested: format,
                native: caps.format,
            });
        }
        if geometry.width > caps.max_width || geometry.height > caps.max_height {
            return Err(DeviceError::UnsupportedGeometry {
                width: geometry.width,
                height: geometry.height,
                max_width: caps.max_width,
                max_height: caps.max_height,
            });
        }
        let max = caps.max_buffers.min(MAX_BUFFERS);
        if geometry.buffer_count > max {
            return Err(DeviceError::UnsupportedBufferCount {
                requested: geometry.buffer_count,
                max,
            });
        }
        Ok(())
    }

    // -- visibility --------------------------------------------------------

    /// Latches the staged registers and enables scanout.
    ///
    /// Showing a visible plane re-applies its staged state.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::NotConfigured`] before
    /// [`configure`](Self::configure); a [`DeviceError`] if the staged state
    /// is rejected, in which case the plane stays in its previous state.
    pub fn show(&mut self) -> Result<(), PlaneError> {
        self.show_traced(&mut Tracer::none())
    }

    /// [`show`](Self::show) with trace events.
    ///
    /// # Errors
    ///
    /// See [`show`](Self::show).
    pub fn show_traced(&mut self, tracer: &mut Tracer<'_>) -> Result<(), PlaneError> {
        self.require_configured("show")?;
        self.latch(tracer)?;
        self.transition(PlaneLifecycle::Visible, tracer);
        Ok(())
    }

    /// Disables scanout, keeping the buffers. Does nothing before
    /// [`configure`](Self::configure) or when already hidden.
    pub fn hide(&mut self) {
        self.hide_traced(&mut Tracer::none());
    }

    /// [`hide`](Self::hide) with trace events.
    pub fn hide_traced(&mut self, tracer: &mut Tracer<'_>) {
        if !matches!(
            self.state,
            PlaneLifecycle::Configured | PlaneLifecycle::Visible
        ) {
            return;
        }
        self.device.hide(self.id);
        self.transition(PlaneLifecycle::Hidden, tracer);
    }

    // -- staged registers --------------------------------------------------

    /// Stages the top-left corner in output coordinates.
    pub fn set_position(&mut self, position: Point) {
        self.staged.position = position;
    }

    /// Stages the scaler factor.
    pub fn set_scale(&mut self, factor: f64) {
        self.staged.scale = factor;
    }

    /// Stages the pan window: `size` pixels of the buffer starting at
    /// `origin`.
    pub fn set_pan(&mut self, size: Size, origin: Point) {
        self.staged.pan_size = Some(size);
        self.staged.pan_origin = origin;
    }

    /// Stages the pan window size, keeping its origin.
    pub fn set_pan_size(&mut self, size: Size) {
        self.staged.pan_size = Some(size);
    }

    /// Stages the pan window origin, keeping its size.
    pub fn set_pan_position(&mut self, origin: Point) {
        self.staged.pan_origin = origin;
    }

    /// Validates the staged registers and, on a visible plane, latches them
    /// on the device.
    ///
    /// On a configured or hidden plane the values are only validated; they
    /// are latched by the next [`show`](Self::show).
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::NotConfigured`] before
    /// [`configure`](Self::configure), [`DeviceError::UnsupportedScale`] or
    /// [`DeviceError::PanOutOfBounds`] for invalid staged values, or whatever
    /// the device reports. The previously latched state stays in effect.
    pub fn apply(&mut self) -> Result<(), PlaneError> {
        self.apply_traced(&mut Tracer::none())
    }

    /// [`apply`](Self::apply) with trace events.
    ///
    /// # Errors
    ///
    /// See [`apply`](Self::apply).
    pub fn apply_traced(&mut self, tracer: &mut Tracer<'_>) -> Result<(), PlaneError> {
        self.require_configured("apply")?;
        if self.state == PlaneLifecycle::Visible {
            self.latch(tracer)
        } else {
            self.validate_staged().map(drop).map_err(PlaneError::from)
        }
    }

    fn validate_staged(&self) -> Result<Registers, DeviceError> {
        let staged = self.staged();
        if !self.caps.supports_scale(staged.scale) {
            return Err(DeviceError::UnsupportedScale {
                factor: staged.scale,
                min: self.caps.min_scale,
                max: self.caps.max_scale,
            });
        }
        let regs = Registers::from_state(&staged);
        let (buffer_width, buffer_height) = self
            .ring
            .as_ref()
            .map_or((0, 0), |ring| (ring.desc().width, ring.desc().height));
        let fits = |origin: i32, len: u32, limit: u32| {
            origin >= 0 && len > 0 && i64::from(origin) + i64::from(len) <= i64::from(limit)
        };
        if !fits(regs.pan_x, regs.pan_width, buffer_width)
            || !fits(regs.pan_y, regs.pan_height, buffer_height)
        {
            return Err(DeviceError::PanOutOfBounds {
                x: regs.pan_x,
                y: regs.pan_y,
                width: regs.pan_width,
                height: regs.pan_height,
                buffer_width,
                buffer_height,
            });
        }
        Ok(regs)
    }

    fn latch(&mut self, tracer: &mut Tracer<'_>) -> Result<(), PlaneError> {
        let regs = self.validate_staged()?;
        let id = self.id;
        let device = &mut self.device;
        device
            .set_position(id, regs.x, regs.y)
            .and_then(|()| device.set_scale(id, regs.scale))
            .and_then(|()| device.set_pan_size(id, regs.pan_width, regs.pan_height))
            .and_then(|()| device.set_pan_position(id, regs.pan_x, regs.pan_y))
            .and_then(|()| device.apply(id))
            .inspect_err(|e| tracing::warn!(plane = id.0, error = %e, "apply rejected"))?;

        let state = self.staged();
        self.applied = Some(state);
        tracer.plane_apply(&PlaneApplyEvent {
            plane: id,
            position: state.position,
            scale: state.scale,
            pan: state.pan,
            at: self.device.now(),
        });
        Ok(())
    }

    // -- drawing -----------------------------------------------------------

    /// The current buffer, read-only. Never blocks.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::NotConfigured`] before
    /// [`configure`](Self::configure).
    pub fn current(&self) -> Result<&Surface<D::Memory>, InvalidStateError> {
        self.ring
            .as_ref()
            .map(BufferRing::current)
            .ok_or(self.not_configured("current"))
    }

    /// Whether [`surface_mut`](Self::surface_mut) would return without
    /// blocking, based on the completions processed so far. Call
    /// [`poll`](Self::poll) first for an up-to-date answer.
    #[must_use]
    pub fn is_current_writable(&self) -> bool {
        self.ring
            .as_ref()
            .is_some_and(|ring| !self.scheduler.is_busy(ring.index()))
    }

    /// Write access to the current buffer.
    ///
    /// Processes pending completions, then blocks on the device while the
    /// current buffer is on screen or queued for a flip.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::NotConfigured`] before
    /// [`configure`](Self::configure), or a [`DeviceError`] from the
    /// completion channel.
    pub fn surface_mut(&mut self) -> Result<&mut Surface<D::Memory>, PlaneError> {
        self.require_configured("surface_mut")?;
        let mut tracer = Tracer::none();
        self.poll_traced(&mut tracer)?;
        while !self.is_current_writable() && self.scheduler.in_flight().is_some() {
            self.wait_one(&mut tracer)?;
        }
        let err = self.not_configured("surface_mut");
        Ok(self.ring.as_mut().ok_or(err)?.current_mut())
    }

    /// Records that `rect` is being repainted into the current buffer.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::NotConfigured`] before
    /// [`configure`](Self::configure).
    pub fn add_damage(&mut self, rect: Rect) -> Result<(), InvalidStateError> {
        let err = self.not_configured("add_damage");
        self.ring.as_mut().ok_or(err)?.add_damage(rect);
        Ok(())
    }

    /// Takes the region of the current buffer that is stale.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::NotConfigured`] before
    /// [`configure`](Self::configure).
    pub fn take_damage(&mut self) -> Result<DamageRegion, InvalidStateError> {
        let err = self.not_configured("take_damage");
        Ok(self.ring.as_mut().ok_or(err)?.take_damage())
    }

    /// Device handle of buffer `index`.
    ///
    /// This bypasses write gating: do not write through a handle whose buffer
    /// is busy, and do not keep it past the next flip.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::NotConfigured`] before
    /// [`configure`](Self::configure), [`InvalidStateError::BufferIndex`] for
    /// an index outside the ring.
    pub fn raw(&self, index: usize) -> Result<Option<RawHandle>, InvalidStateError> {
        self.ring
            .as_ref()
            .ok_or(self.not_configured("raw"))?
            .raw(index)
    }

    // -- flipping ----------------------------------------------------------

    /// Presents the current buffer and rotates to the next one.
    ///
    /// With one buffer this is an immediate in-place present and the index
    /// never changes. With more, the buffer is flipped or held back per the
    /// [`FlipPolicy`](crate::flip::FlipPolicy). Under
    /// [`FlipPolicy::Queue`](crate::flip::FlipPolicy::Queue) this blocks while
    /// every other buffer is busy.
    ///
    /// If the device rejects the flip, the index and the flip bookkeeping are
    /// unchanged.
    ///
    /// # Errors
    ///
    /// [`InvalidStateError::NotConfigured`] before
    /// [`configure`](Self::configure), or a [`DeviceError`].
    pub fn schedule_flip(&mut self) -> Result<FlipAction, PlaneError> {
        self.schedule_flip_traced(&mut Tracer::none())
    }

    /// [`schedule_flip`](Self::schedule_flip) with trace events.
    ///
    /// # Errors
    ///
    /// See [`schedule_flip`](Self::schedule_flip).
    pub fn schedule_flip_traced(
        &mut self,
        tracer: &mut Tracer<'_>,
    ) -> Result<FlipAction, PlaneError> {
        self.require_configured("schedule_flip")?;
        self.poll_traced(tracer)?;
        while self.scheduler.is_saturated() {
            self.wait_one(tracer)?;
        }

        let id = self.id;
        let Some(ring) = self.ring.as_mut() else {
            return Err(self.not_configured("schedule_flip").into());
        };
        let action = self.scheduler.plan(ring.index());
        let result = match action {
            FlipAction::Direct => self.device.present(id, ring.current()),
            FlipAction::Submit(index) => self.device.flip(id, index, ring.current()),
            FlipAction::Defer(_) | FlipAction::Replace { .. } => Ok(()),
        };
        result.inspect_err(|e| tracing::warn!(plane = id.0, error = %e, "flip rejected"))?;

        self.scheduler.record(action);
        ring.advance();
        tracing::trace!(plane = id.0, ?action, next = ring.index(), "flip scheduled");
        tracer.flip_request(&FlipRequestEvent {
            plane: id,
            action,
            at: self.device.now(),
        });
        Ok(action)
    }

    /// Processes every completion the device has signalled, submitting held
    /// back flips as the device frees up. Returns the number processed.
    ///
    /// # Errors
    ///
    /// A [`DeviceError`] if a held back flip is rejected. That flip is
    /// dropped; the remaining completions stay queued for the next call.
    pub fn poll(&mut self) -> Result<usize, PlaneError> {
        self.poll_traced(&mut Tracer::none())
    }

    /// [`poll`](Self::poll) with trace events.
    ///
    /// # Errors
    ///
    /// See [`poll`](Self::poll).
    pub fn poll_traced(&mut self, tracer: &mut Tracer<'_>) -> Result<usize, PlaneError> {
        if self.ring.is_none() {
            return Ok(0);
        }
        let mut processed = 0;
        while let Some(completion) = self.device.poll_completion(self.id) {
            processed += 1;
            self.complete(completion, tracer)?;
        }
        Ok(processed)
    }

    fn wait_one(&mut self, tracer: &mut Tracer<'_>) -> Result<(), PlaneError> {
        let completion = self.device.wait_completion(self.id)?;
        self.complete(completion, tracer)?;
        Ok(())
    }

    fn complete(
        &mut self,
        completion: FlipCompletion,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), DeviceError> {
        let id = self.id;
        let next = self.scheduler.complete(completion.index);
        tracer.flip_complete(&FlipCompleteEvent {
            plane: id,
            index: completion.index,
            presented_at: completion.presented_at,
            next,
        });
        let (Some(next), Some(ring)) = (next, self.ring.as_ref()) else {
            return Ok(());
        };
        let Some(surface) = ring.get(next) else {
            self.drop_waiting(next, tracer);
            return Ok(());
        };
        match self.device.flip(id, next, surface) {
            Ok(()) => {
                self.scheduler.submitted(next);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(plane = id.0, index = next, error = %e, "deferred flip rejected");
                self.drop_waiting(next, tracer);
                Err(e)
            }
        }
    }

    /// Gives up on the refused slot `index` and every request behind it.
    fn drop_waiting(&mut self, index: usize, tracer: &mut Tracer<'_>) {
        let waiting = self.scheduler.discard(index);
        tracing::debug!(plane = self.id.0, index, waiting, "waiting flips dropped");
        tracer.flip_abandon(&FlipAbandonEvent {
            plane: self.id,
            in_flight: None,
            waiting,
            at: self.device.now(),
        });
    }

    /// Settles every outstanding flip: waits for them under
    /// [`CancelPolicy::Wait`], then cancels whatever is left.
    fn retire_flips(&mut self, tracer: &mut Tracer<'_>) {
        if self.scheduler.outstanding() == 0 {
            return;
        }
        if self.config.cancel == CancelPolicy::Wait {
            while self.scheduler.in_flight().is_some() {
                let Ok(completion) = self.device.wait_completion(self.id) else {
                    break;
                };
                if self.complete(completion, tracer).is_err() {
                    break;
                }
            }
        }
        let gone = self.scheduler.abandon();
        if gone.in_flight.is_some() {
            self.device.abandon_flip(self.id);
        }
        if gone.in_flight.is_some() || gone.waiting > 0 {
            tracing::debug!(
                plane = self.id.0,
                in_flight = ?gone.in_flight,
                waiting = gone.waiting,
                "outstanding flips abandoned"
            );
            tracer.flip_abandon(&FlipAbandonEvent {
                plane: self.id,
                in_flight: gone.in_flight,
                waiting: gone.waiting,
                at: self.device.now(),
            });
        }
    }

    // -- teardown ----------------------------------------------------------

    /// Retires outstanding flips, frees the buffers and releases the
    /// hardware plane. Equivalent to dropping the plane.
    pub fn destroy(mut self) {
        self.teardown(&mut Tracer::none());
    }

    /// [`destroy`](Self::destroy) with trace events.
    pub fn destroy_traced(mut self, tracer: &mut Tracer<'_>) {
        self.teardown(tracer);
    }

    fn teardown(&mut self, tracer: &mut Tracer<'_>) {
        if self.state == PlaneLifecycle::Destroyed {
            return;
        }
        self.retire_flips(tracer);
        if self.state != PlaneLifecycle::Created {
            self.device.hide(self.id);
        }
        self.ring = None;
        self.applied = None;
        self.device.release(self.id);
        self.transition(PlaneLifecycle::Destroyed, tracer);
    }

    // -- helpers -----------------------------------------------------------

    fn transition(&mut self, to: PlaneLifecycle, tracer: &mut Tracer<'_>) {
        let from = core::mem::replace(&mut self.state, to);
        if from != to {
            tracing::debug!(plane = self.id.0, ?from, ?to, "plane state");
            tracer.plane_state(&PlaneStateEvent {
                plane: self.id,
                from,
                to,
                at: self.device.now(),
            });
        }
    }

    fn not_configured(&self, op: &'static str) -> InvalidStateError {
        InvalidStateError::NotConfigured {
            op,
            state: self.state,
        }
    }

    fn require_configured(&self, op: &'static str) -> Result<(), InvalidStateError> {
        if self.state.is_configured() {
            Ok(())
        } else {
            Err(self.not_configured(op))
        }
    }
}

impl<D: PlaneDevice> Drop for OverlayPlane<D> {
    fn drop(&mut self) {
        self.teardown(&mut Tracer::none());
    }
}

/// Staged state rounded to device register units.
#[derive(Clone, Copy, Debug)]
struct Registers {
    x: i32,
    y: i32,
    scale: f64,
    pan_x: i32,
    pan_y: i32,
    pan_width: u32,
    pan_height: u32,
}

impl Registers {
    fn from_state(state: &PlaneState) -> Self {
        Self {
            x: to_coord(state.position.x),
            y: to_coord(state.position.y),
            scale: state.scale,
            pan_x: to_coord(state.pan.x0),
            pan_y: to_coord(state.pan.y0),
            pan_width: to_extent(state.pan.width()),
            pan_height: to_extent(state.pan.height()),
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "rounded and clamped to the i32 range first"
)]
fn to_coord(v: f64) -> i32 {
    if v.is_nan() {
        return 0;
    }
    libm::round(v).clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "rounded and clamped to the u32 range first"
)]
fn to_extent(v: f64) -> u32 {
    if v.is_nan() {
        return 0;
    }
    libm::round(v).clamp(0.0, f64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    use super::*;
    use crate::error::AllocationError;
    use crate::time::HostTime;

    /// Minimal device: records flips, completes on demand.
    #[derive(Clone, Default)]
    struct Device(Rc<RefCell<DeviceLog>>);

    #[derive(Default)]
    struct DeviceLog {
        flips: Vec<usize>,
        presents: usize,
        applied: Vec<(i32, i32, u32, u32)>,
        pan: (i32, i32, u32, u32),
        completions: Vec<FlipCompletion>,
        in_flight: Option<usize>,
        abandoned: usize,
        released: bool,
        reject_flip: bool,
    }

    impl Device {
        fn signal(&self) {
            let mut log = self.0.borrow_mut();
            if let Some(index) = log.in_flight.take() {
                log.completions.push(FlipCompletion {
                    index,
                    presented_at: HostTime(0),
                });
            }
        }
    }

    impl PlaneDevice for Device {
        type Memory = Vec<u8>;

        fn caps(&self, _plane: PlaneId) -> PlaneCaps {
            let mut caps = PlaneCaps::permissive(PixelFormat::Rgb565);
            caps.max_width = 1024;
            caps.max_buffers = 3;
            caps.min_scale = 0.5;
            caps.max_scale = 2.0;
            caps
        }

        fn allocate(
            &mut self,
            _plane: PlaneId,
            _slot: usize,
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

        fn set_pan_size(&mut self, _: PlaneId, w: u32, h: u32) -> Result<(), DeviceError> {
            let mut log = self.0.borrow_mut();
            log.pan.2 = w;
            log.pan.3 = h;
            Ok(())
        }

        fn set_pan_position(&mut self, _: PlaneId, x: i32, y: i32) -> Result<(), DeviceError> {
            let mut log = self.0.borrow_mut();
            log.pan.0 = x;
            log.pan.1 = y;
            Ok(())
        }

        fn apply(&mut self, _: PlaneId) -> Result<(), DeviceError> {
            let mut log = self.0.borrow_mut();
            let pan = log.pan;
            log.applied.push(pan);
            Ok(())
        }

        fn hide(&mut self, _: PlaneId) {}

        fn present(&mut self, _: PlaneId, _: &Surface<Vec<u8>>) -> Result<(), DeviceError> {
            self.0.borrow_mut().presents += 1;
            Ok(())
        }

        fn flip(
            &mut self,
            _: PlaneId,
            index: usize,
            _: &Surface<Vec<u8>>,
        ) -> Result<(), DeviceError> {
            let mut log = self.0.borrow_mut();
            if log.reject_flip {
                return Err(DeviceError::Rejected {
                    op: "flip",
                    code: -16,
                });
            }
            log.flips.push(index);
            log.in_flight = Some(index);
            Ok(())
        }

        fn poll_completion(&mut self, _: PlaneId) -> Option<FlipCompletion> {
            let mut log = self.0.borrow_mut();
            (!log.completions.is_empty()).then(|| log.completions.remove(0))
        }

        fn wait_completion(&mut self, plane: PlaneId) -> Result<FlipCompletion, DeviceError> {
            self.signal();
            self.poll_completion(plane).ok_or(DeviceError::NoPendingFlip)
        }

        fn abandon_flip(&mut self, _: PlaneId) {
            let mut log = self.0.borrow_mut();
            log.in_flight = None;
            log.abandoned += 1;
        }

        fn release(&mut self, _: PlaneId) {
            self.0.borrow_mut().released = true;
        }
    }

    fn configured(buffers: usize) -> (Device, OverlayPlane<Device>) {
        let device = Device::default();
        let mut plane = OverlayPlane::new(device.clone(), PlaneId(1));
        plane
            .configure(PlaneGeometry::new(64, 32, buffers), PixelFormat::Rgb565)
            .unwrap();
        (device, plane)
    }

    #[test]
    fn show_before_configure_is_invalid() {
        let mut plane = OverlayPlane::new(Device::default(), PlaneId(0));
        assert_eq!(
            plane.show(),
            Err(PlaneError::InvalidState(InvalidStateError::NotConfigured {
                op: "show",
                state: PlaneLifecycle::Created
            }))
        );
        plane.hide();
        assert_eq!(plane.state(), PlaneLifecycle::Created);
    }

    #[test]
    fn lifecycle_round_trip() {
        let (_, mut plane) = configured(2);
        assert_eq!(plane.state(), PlaneLifecycle::Configured);
        plane.show().unwrap();
        assert_eq!(plane.state(), PlaneLifecycle::Visible);
        plane.hide();
        plane.hide();
        assert_eq!(plane.state(), PlaneLifecycle::Hidden);
        plane.show().unwrap();
        assert_eq!(plane.state(), PlaneLifecycle::Visible);
    }

    #[test]
    fn configure_validates_against_caps() {
        let mut plane = OverlayPlane::new(Device::default(), PlaneId(0));
        assert!(matches!(
            plane.configure(PlaneGeometry::new(2048, 32, 2), PixelFormat::Rgb565),
            Err(PlaneError::Device(DeviceError::UnsupportedGeometry { .. }))
        ));
        assert!(matches!(
            plane.configure(PlaneGeometry::new(64, 32, 4), PixelFormat::Rgb565),
            Err(PlaneError::Device(DeviceError::UnsupportedBufferCount {
                requested: 4,
                max: 3
            }))
        ));
        assert!(matches!(
            plane.configure(PlaneGeometry::new(64, 32, 2), PixelFormat::Xrgb8888),
            Err(PlaneError::Device(DeviceError::UnsupportedFormat { .. }))
        ));
        assert!(matches!(
            plane.configure(PlaneGeometry::new(0, 32, 2), PixelFormat::Rgb565),
            Err(PlaneError::Allocation(AllocationError::ZeroSize { .. }))
        ));
        assert_eq!(plane.state(), PlaneLifecycle::Created);
    }

    #[test]
    fn staged_values_latch_on_apply() {
        let (device, mut plane) = configured(2);
        plane.show().unwrap();
        plane.set_pan(Size::new(32.0, 16.0), Point::new(8.0, 4.0));
        assert_eq!(device.0.borrow().applied.len(), 1, "staging alone does nothing");
        plane.apply().unwrap();
        assert_eq!(device.0.borrow().applied.last(), Some(&(8, 4, 32, 16)));
        assert_eq!(plane.applied().unwrap().pan, Rect::new(8.0, 4.0, 40.0, 20.0));
    }

    #[test]
    fn invalid_staged_values_keep_applied_state() {
        let (_, mut plane) = configured(2);
        plane.show().unwrap();
        let before = plane.applied();

        plane.set_scale(4.0);
        assert!(matches!(
            plane.apply(),
            Err(PlaneError::Device(DeviceError::UnsupportedScale { .. }))
        ));
        plane.set_scale(1.0);
        plane.set_pan_position(Point::new(60.0, 0.0));
        assert!(matches!(
            plane.apply(),
            Err(PlaneError::Device(DeviceError::PanOutOfBounds { x: 60, .. }))
        ));
        assert_eq!(plane.applied(), before);
    }

    #[test]
    fn flips_rotate_index() {
        let (device, mut plane) = configured(3);
        for k in 1..=7 {
            plane.schedule_flip().unwrap();
            device.signal();
            assert_eq!(plane.index(), Some(k % 3));
        }
        assert_eq!(device.0.borrow().flips.len(), 7);
    }

    #[test]
    fn single_buffer_presents_in_place() {
        let (device, mut plane) = configured(1);
        for _ in 0..3 {
            assert_eq!(plane.schedule_flip().unwrap(), FlipAction::Direct);
            assert_eq!(plane.index(), Some(0));
            assert!(plane.is_current_writable());
        }
        assert_eq!(device.0.borrow().presents, 3);
        assert!(device.0.borrow().flips.is_empty());
    }

    #[test]
    fn rejected_flip_changes_nothing() {
        let (device, mut plane) = configured(2);
        device.0.borrow_mut().reject_flip = true;
        assert!(matches!(
            plane.schedule_flip(),
            Err(PlaneError::Device(DeviceError::Rejected { .. }))
        ));
        assert_eq!(plane.index(), Some(0));
        assert_eq!(plane.flip_stats(), FlipStats::default());
    }

    #[test]
    fn surface_mut_waits_for_busy_buffer() {
        let (device, mut plane) = configured(2);
        plane.schedule_flip().unwrap();
        plane.schedule_flip().unwrap();
        // Slot 0 is in flight and slot 1 waits behind it.
        assert!(!plane.is_current_writable());
        plane.surface_mut().unwrap();
        assert!(plane.is_current_writable());
        assert_eq!(device.0.borrow().flips, [0, 1]);
    }

    #[test]
    fn drop_abandons_in_flight_flip() {
        let (device, mut plane) = configured(2);
        plane.schedule_flip().unwrap();
        drop(plane);
        let log = device.0.borrow();
        assert_eq!(log.abandoned, 1);
        assert!(log.released);
    }

    #[test]
    fn failed_reconfigure_keeps_old_ring() {
        let (_, mut plane) = configured(2);
        plane.show().unwrap();
        assert!(
            plane
                .configure(PlaneGeometry::new(4096, 32, 2), PixelFormat::Rgb565)
                .is_err()
        );
        assert_eq!(plane.geometry(), Some(PlaneGeometry::new(64, 32, 2)));
        assert_eq!(plane.state(), PlaneLifecycle::Visible);
    }
}
