// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The software [`PlaneDevice`].

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use scanout_core::device::{FlipCompletion, PlaneCaps, PlaneDevice, PlaneId};
use scanout_core::error::{AllocationError, DeviceError};
use scanout_core::format::PixelFormat;
use scanout_core::ring::MAX_BUFFERS;
use scanout_core::surface::{PixelMemory, RawHandle, Surface, SurfaceDesc};
use scanout_core::time::HostTime;

use crate::compose::{self, Frame, Registers};
use crate::queue::CompletionQueue;
use crate::time;

/// Driver code for "device or resource busy".
const EBUSY: i32 = -16;

/// Configuration of a [`SoftwareDevice`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoftConfig {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// How long a blocking completion wait may take. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Limits reported for every plane.
    pub caps: PlaneCaps,
}

impl SoftConfig {
    /// An output of `width` by `height` with `Xrgb8888` planes and a 100 ms
    /// completion timeout.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            timeout: Some(Duration::from_millis(100)),
            caps: PlaneCaps::permissive(PixelFormat::Xrgb8888),
        }
    }

    /// Returns a copy whose planes scan out `format`.
    #[must_use]
    pub const fn with_format(mut self, format: PixelFormat) -> Self {
        self.caps.format = format;
        self
    }

    /// Returns a copy reporting `caps` for every plane.
    #[must_use]
    pub const fn with_caps(mut self, caps: PlaneCaps) -> Self {
        self.caps = caps;
        self
    }

    /// Returns a copy with a different completion timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Counters since the device was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoftStats {
    /// Vertical blanks driven.
    pub vblanks: u64,
    /// Flips latched at a vertical blank.
    pub latched: u64,
    /// Single-buffer presents.
    pub presents: u64,
    /// Completions discarded because a plane never collected them.
    pub dropped_completions: u64,
}

struct PlaneSlot {
    staged: Registers,
    latched: Option<Registers>,
    pending: Option<(usize, Frame)>,
    front: Option<Frame>,
    completions: CompletionQueue,
}

impl PlaneSlot {
    fn new() -> Self {
        Self {
            staged: Registers {
                scale: 1.0,
                ..Registers::default()
            },
            latched: None,
            pending: None,
            front: None,
            completions: CompletionQueue::with_capacity(MAX_BUFFERS),
        }
    }
}

struct SoftState {
    planes: BTreeMap<PlaneId, PlaneSlot>,
    output: Surface<Vec<u8>>,
    next_handle: u64,
    stats: SoftStats,
    released_drops: u64,
}

impl SoftState {
    fn plane(&mut self, plane: PlaneId) -> &mut PlaneSlot {
        self.planes.entry(plane).or_insert_with(PlaneSlot::new)
    }
}

struct Shared {
    config: SoftConfig,
    epoch: Instant,
    state: Mutex<SoftState>,
    completed: Condvar,
}

/// An in-memory display controller. Clones are handles onto the same
/// device and may be sent to other threads.
#[derive(Clone)]
pub struct SoftwareDevice {
    shared: Arc<Shared>,
}

impl fmt::Debug for SoftwareDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareDevice")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SoftwareDevice {
    /// Creates a device with a black output.
    ///
    /// # Errors
    ///
    /// [`AllocationError::ZeroSize`] for an empty output.
    pub fn new(config: SoftConfig) -> Result<Self, AllocationError> {
        let mut output =
            Surface::zeroed(SurfaceDesc::new(config.width, config.height, PixelFormat::Xrgb8888))?;
        compose::clear(&mut output);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                epoch: Instant::now(),
                state: Mutex::new(SoftState {
                    planes: BTreeMap::new(),
                    output,
                    next_handle: 1,
                    stats: SoftStats::default(),
                    released_drops: 0,
                }),
                completed: Condvar::new(),
            }),
        })
    }

    /// The configuration the device was created with.
    #[must_use]
    pub fn config(&self) -> &SoftConfig {
        &self.shared.config
    }

    fn lock(&self) -> MutexGuard<'_, SoftState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Drives one vertical blank.
    ///
    /// Every pending flip becomes the scanned-out buffer of its plane and its
    /// completion is signalled. The output is then recomposed from every
    /// enabled plane. Returns the number of flips latched.
    pub fn vblank(&self) -> usize {
        let now = time::since(self.shared.epoch);
        let mut guard = self.lock();
        let state = &mut *guard;

        let mut latched = 0;
        for (id, slot) in &mut state.planes {
            if let Some((index, frame)) = slot.pending.take() {
                slot.front = Some(frame);
                slot.completions.push(FlipCompletion {
                    index,
                    presented_at: now,
                });
                latched += 1;
                tracing::trace!(plane = id.0, index, "flip latched");
            }
        }

        compose::clear(&mut state.output);
        for slot in state.planes.values() {
            if let (Some(regs), Some(frame)) = (&slot.latched, &slot.front) {
                compose::blit(&mut state.output, frame, regs);
            }
        }
        state.stats.vblanks += 1;
        state.stats.latched += u64::try_from(latched).unwrap_or(u64::MAX);
        drop(guard);

        self.shared.completed.notify_all();
        latched
    }

    /// Calls [`vblank`](Self::vblank) every `period` on a background thread
    /// until the returned handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn_vblank(&self, period: Duration) -> io::Result<VblankThread> {
        let stop = Arc::new(AtomicBool::new(false));
        let device = self.clone();
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("scanout-vblank".into())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    thread::sleep(period);
                    device.vblank();
                }
            })?;
        tracing::debug!(?period, "vblank thread started");
        Ok(VblankThread {
            stop,
            handle: Some(handle),
        })
    }

    /// The output pixel at `x`, `y` as `0xffRRGGBB`.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        let state = self.lock();
        let row = state.output.row(y)?;
        let at = usize::try_from(x).ok()?.checked_mul(4)?;
        let px = row.get(at..at + 4)?;
        Some(u32::from_le_bytes([px[0], px[1], px[2], px[3]]))
    }

    /// A copy of the whole output framebuffer, `Xrgb8888`.
    #[must_use]
    pub fn output(&self) -> (SurfaceDesc, Vec<u8>) {
        let state = self.lock();
        (*state.output.desc(), state.output.pixels().to_vec())
    }

    /// Whether `plane` is enabled.
    #[must_use]
    pub fn is_visible(&self, plane: PlaneId) -> bool {
        self.lock()
            .planes
            .get(&plane)
            .is_some_and(|slot| slot.latched.is_some())
    }

    /// Counters since creation.
    #[must_use]
    pub fn stats(&self) -> SoftStats {
        let state = self.lock();
        let mut stats = state.stats;
        stats.dropped_completions = state.released_drops
            + state
                .planes
                .values()
                .map(|slot| slot.completions.dropped_count())
                .sum::<u64>();
        stats
    }
}

impl PlaneDevice for SoftwareDevice {
    type Memory = SoftMemory;

    fn caps(&self, _plane: PlaneId) -> PlaneCaps {
        self.shared.config.caps
    }

    fn now(&self) -> HostTime {
        time::since(self.shared.epoch)
    }

    fn allocate(
        &mut self,
        plane: PlaneId,
        slot: usize,
        desc: &SurfaceDesc,
    ) -> Result<SoftMemory, AllocationError> {
        let mut state = self.lock();
        let handle = RawHandle(state.next_handle);
        state.next_handle += 1;
        state.plane(plane);
        tracing::trace!(
            plane = plane.0,
            slot,
            bytes = desc.byte_len(),
            ?handle,
            "buffer allocated"
        );
        Ok(SoftMemory {
            bytes: vec![0; desc.byte_len()],
            handle,
        })
    }

    fn set_position(&mut self, plane: PlaneId, x: i32, y: i32) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let staged = &mut state.plane(plane).staged;
        staged.x = x;
        staged.y = y;
        Ok(())
    }

    fn set_scale(&mut self, plane: PlaneId, factor: f64) -> Result<(), DeviceError> {
        if !self.shared.config.caps.supports_scale(factor) {
            return Err(DeviceError::UnsupportedScale {
                factor,
                min: self.shared.config.caps.min_scale,
                max: self.shared.config.caps.max_scale,
            });
        }
        self.lock().plane(plane).staged.scale = factor;
        Ok(())
    }

    fn set_pan_size(&mut self, plane: PlaneId, width: u32, height: u32) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let staged = &mut state.plane(plane).staged;
        staged.pan_width = width;
        staged.pan_height = height;
        Ok(())
    }

    fn set_pan_position(&mut self, plane: PlaneId, x: i32, y: i32) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let staged = &mut state.plane(plane).staged;
        staged.pan_x = x;
        staged.pan_y = y;
        Ok(())
    }

    fn apply(&mut self, plane: PlaneId) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let slot = state.plane(plane);
        slot.latched = Some(slot.staged);
        Ok(())
    }

    fn hide(&mut self, plane: PlaneId) {
        if let Some(slot) = self.lock().planes.get_mut(&plane) {
            slot.latched = None;
        }
    }

    fn present(
        &mut self,
        plane: PlaneId,
        surface: &Surface<SoftMemory>,
    ) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let slot = state.plane(plane);
        slot.front = Some(Frame::capture(surface));
        slot.latched = Some(slot.staged);
        state.stats.presents += 1;
        Ok(())
    }

    fn flip(
        &mut self,
        plane: PlaneId,
        index: usize,
        surface: &Surface<SoftMemory>,
    ) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let slot = state.plane(plane);
        if slot.pending.is_some() {
            return Err(DeviceError::Rejected {
                op: "flip",
                code: EBUSY,
            });
        }
        slot.pending = Some((index, Frame::capture(surface)));
        Ok(())
    }

    fn poll_completion(&mut self, plane: PlaneId) -> Option<FlipCompletion> {
        self.lock().planes.get_mut(&plane)?.completions.pop()
    }

    fn wait_completion(&mut self, plane: PlaneId) -> Result<FlipCompletion, DeviceError> {
        let deadline = self
            .shared
            .config
            .timeout
            .map(|timeout| Instant::now() + timeout);
        let mut state = self.lock();
        loop {
            let slot = state
                .planes
                .get_mut(&plane)
                .ok_or(DeviceError::NoPendingFlip)?;
            if let Some(completion) = slot.completions.pop() {
                return Ok(completion);
            }
            if slot.pending.is_none() {
                return Err(DeviceError::NoPendingFlip);
            }
            state = match deadline {
                None => self
                    .shared
                    .completed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        tracing::warn!(plane = plane.0, "flip completion timed out");
                        return Err(DeviceError::Timeout);
                    }
                    self.shared
                        .completed
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn abandon_flip(&mut self, plane: PlaneId) {
        if let Some(slot) = self.lock().planes.get_mut(&plane) {
            slot.pending = None;
            slot.completions.clear();
        }
    }

    fn release(&mut self, plane: PlaneId) {
        let mut state = self.lock();
        if let Some(slot) = state.planes.remove(&plane) {
            state.released_drops += slot.completions.dropped_count();
        }
        tracing::trace!(plane = plane.0, "plane released");
    }
}

/// Heap memory behind one buffer of a [`SoftwareDevice`] plane.
pub struct SoftMemory {
    bytes: Vec<u8>,
    handle: RawHandle,
}

impl fmt::Debug for SoftMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftMemory")
            .field("len", &self.bytes.len())
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl PixelMemory for SoftMemory {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn raw_handle(&self) -> Option<RawHandle> {
        Some(self.handle)
    }
}

/// Background thread driving vertical blanks. Stops and joins on drop.
pub struct VblankThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for VblankThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VblankThread")
            .field("running", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl VblankThread {
    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("vblank thread panicked");
            }
        }
    }
}

impl Drop for VblankThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Point;
    use scanout_core::flip::FlipAction;
    use scanout_core::plane::{OverlayPlane, PlaneGeometry};

    use super::*;

    const RED: [u8; 4] = [0, 0, 0xff, 0];
    const BLUE: [u8; 4] = [0xff, 0, 0, 0];
    const BLACK: u32 = 0xff00_0000;

    fn device(timeout: Option<Duration>) -> SoftwareDevice {
        SoftwareDevice::new(SoftConfig::new(8, 8).with_timeout(timeout)).unwrap()
    }

    fn shown(device: &SoftwareDevice, buffers: usize) -> OverlayPlane<SoftwareDevice> {
        let mut plane = OverlayPlane::new(device.clone(), PlaneId(0));
        plane
            .configure(PlaneGeometry::new(4, 4, buffers), PixelFormat::Xrgb8888)
            .unwrap();
        plane.show().unwrap();
        plane
    }

    #[test]
    fn flip_appears_at_vblank() {
        let device = device(Some(Duration::from_millis(50)));
        let mut plane = shown(&device, 2);
        plane.surface_mut().unwrap().fill(&RED);
        assert_eq!(plane.schedule_flip().unwrap(), FlipAction::Submit(0));
        assert_eq!(device.pixel(0, 0), Some(BLACK), "not latched yet");

        assert_eq!(device.vblank(), 1);
        assert_eq!(device.pixel(0, 0), Some(0xffff_0000));
        assert_eq!(device.pixel(4, 4), Some(BLACK));
        assert_eq!(plane.poll().unwrap(), 1);
        assert_eq!(device.stats().latched, 1);
    }

    #[test]
    fn position_and_scale_place_the_plane() {
        let device = device(Some(Duration::from_millis(50)));
        let mut plane = shown(&device, 2);
        plane.set_position(Point::new(2.0, 2.0));
        plane.set_scale(0.5);
        plane.apply().unwrap();
        plane.surface_mut().unwrap().fill(&BLUE);
        plane.schedule_flip().unwrap();
        device.vblank();

        assert_eq!(device.pixel(1, 1), Some(BLACK));
        assert_eq!(device.pixel(2, 2), Some(0xff00_00ff));
        assert_eq!(device.pixel(3, 3), Some(0xff00_00ff));
        assert_eq!(device.pixel(4, 4), Some(BLACK));
    }

    #[test]
    fn hidden_plane_leaves_output_black() {
        let device = device(Some(Duration::from_millis(50)));
        let mut plane = shown(&device, 2);
        plane.surface_mut().unwrap().fill(&RED);
        plane.schedule_flip().unwrap();
        plane.hide();
        device.vblank();
        assert!(!device.is_visible(PlaneId(0)));
        assert_eq!(device.pixel(0, 0), Some(BLACK));
    }

    #[test]
    fn single_buffer_presents_immediately() {
        let device = device(Some(Duration::from_millis(50)));
        let mut plane = shown(&device, 1);
        plane.surface_mut().unwrap().fill(&RED);
        assert_eq!(plane.schedule_flip().unwrap(), FlipAction::Direct);
        device.vblank();
        assert_eq!(device.pixel(0, 0), Some(0xffff_0000));
        assert_eq!(device.stats().presents, 1);
        assert_eq!(device.stats().latched, 0);
    }

    #[test]
    fn wait_times_out_without_vblank() {
        let mut device = device(Some(Duration::from_millis(5)));
        let mut plane = shown(&device, 2);
        plane.schedule_flip().unwrap();
        assert_eq!(
            device.wait_completion(PlaneId(0)),
            Err(DeviceError::Timeout)
        );
    }

    #[test]
    fn wait_without_pending_flip() {
        let mut device = device(None);
        let _plane = shown(&device, 2);
        assert_eq!(
            device.wait_completion(PlaneId(0)),
            Err(DeviceError::NoPendingFlip)
        );
        assert_eq!(
            device.wait_completion(PlaneId(7)),
            Err(DeviceError::NoPendingFlip)
        );
    }

    #[test]
    fn second_flip_before_vblank_is_busy() {
        let mut device = device(None);
        let memory = device
            .allocate(PlaneId(3), 0, &SurfaceDesc::new(1, 1, PixelFormat::Xrgb8888))
            .unwrap();
        let surface = Surface::new(SurfaceDesc::new(1, 1, PixelFormat::Xrgb8888), memory).unwrap();
        device.flip(PlaneId(3), 0, &surface).unwrap();
        assert_eq!(
            device.flip(PlaneId(3), 0, &surface),
            Err(DeviceError::Rejected {
                op: "flip",
                code: EBUSY
            })
        );
        device.abandon_flip(PlaneId(3));
        assert_eq!(device.vblank(), 0);
        assert_eq!(device.poll_completion(PlaneId(3)), None);
    }

    #[test]
    fn vblank_thread_unblocks_drawing() {
        let device = device(Some(Duration::from_secs(2)));
        let mut plane = shown(&device, 2);
        let vblank = device.spawn_vblank(Duration::from_millis(1)).unwrap();
        for _ in 0..6 {
            plane.surface_mut().unwrap().fill(&BLUE);
            plane.schedule_flip().unwrap();
        }
        plane.surface_mut().unwrap();
        vblank.stop();
        assert!(device.stats().latched >= 2);
    }

    #[test]
    fn destroy_releases_plane() {
        let device = device(None);
        let mut plane = shown(&device, 2);
        plane.schedule_flip().unwrap();
        plane.destroy();
        assert!(!device.is_visible(PlaneId(0)));
        assert_eq!(device.vblank(), 0);
    }

    #[test]
    fn raw_handles_are_unique() {
        let device = device(None);
        let plane = shown(&device, 3);
        let handles: Vec<_> = (0..3).map(|i| plane.raw(i).unwrap().unwrap()).collect();
        assert_ne!(handles[0], handles[1]);
        assert_ne!(handles[1], handles[2]);
    }
}
