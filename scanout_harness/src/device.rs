// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording display device.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::rc::{Rc, Weak};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use scanout_core::device::{FlipCompletion, PlaneCaps, PlaneDevice, PlaneId};
use scanout_core::error::{AllocationError, DeviceError};
use scanout_core::format::PixelFormat;
use scanout_core::surface::{PixelMemory, RawHandle, Surface, SurfaceDesc};
use scanout_core::time::HostTime;

/// Nominal refresh period of the simulated display, 60 Hz.
const FRAME_NANOS: u64 = 16_666_667;

/// One call made on a [`MockDevice`].
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    /// [`PlaneDevice::allocate`].
    Allocate {
        /// Plane.
        plane: PlaneId,
        /// Ring slot.
        slot: usize,
        /// Size of the allocation.
        bytes: usize,
    },
    /// [`PlaneDevice::set_position`].
    SetPosition {
        /// Plane.
        plane: PlaneId,
        /// X in output pixels.
        x: i32,
        /// Y in output pixels.
        y: i32,
    },
    /// [`PlaneDevice::set_scale`].
    SetScale {
        /// Plane.
        plane: PlaneId,
        /// Scaler factor.
        factor: f64,
    },
    /// [`PlaneDevice::set_pan_size`].
    SetPanSize {
        /// Plane.
        plane: PlaneId,
        /// Pan width.
        width: u32,
        /// Pan height.
        height: u32,
    },
    /// [`PlaneDevice::set_pan_position`].
    SetPanPosition {
        /// Plane.
        plane: PlaneId,
        /// Pan origin x.
        x: i32,
        /// Pan origin y.
        y: i32,
    },
    /// [`PlaneDevice::apply`].
    Apply(PlaneId),
    /// [`PlaneDevice::hide`].
    Hide(PlaneId),
    /// [`PlaneDevice::present`].
    Present(PlaneId),
    /// [`PlaneDevice::flip`].
    Flip {
        /// Plane.
        plane: PlaneId,
        /// Ring slot.
        index: usize,
    },
    /// [`PlaneDevice::wait_completion`].
    Wait(PlaneId),
    /// [`PlaneDevice::abandon_flip`].
    AbandonFlip {
        /// Plane.
        plane: PlaneId,
        /// Slot that was in flight, if any.
        index: Option<usize>,
    },
    /// [`PlaneDevice::release`].
    Release(PlaneId),
}

/// When the mock signals flip completions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompletionMode {
    /// Every flip completes as soon as it is submitted.
    #[default]
    Immediate,
    /// Flips complete on [`MockDevice::complete_next`],
    /// [`MockDevice::vblank`], or a blocking wait.
    Manual,
}

/// A misuse of the device detected by the mock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    /// Buffer memory was dropped while its plane had a flip outstanding.
    BufferFreedDuringFlip {
        /// Plane.
        plane: PlaneId,
        /// Slot whose memory was dropped.
        slot: usize,
        /// Slot the device was flipping to.
        in_flight: usize,
    },
    /// A flip was submitted while another was still outstanding.
    FlipWhileBusy {
        /// Plane.
        plane: PlaneId,
        /// Slot already in flight.
        in_flight: usize,
    },
    /// The plane was released while buffer memory was still alive.
    ReleasedWithLiveBuffers {
        /// Plane.
        plane: PlaneId,
        /// Buffers still alive.
        live: usize,
    },
    /// A call arrived for a plane that had been released.
    UseAfterRelease(PlaneId),
}

#[derive(Debug, Default)]
struct PlaneRecord {
    in_flight: Option<usize>,
    completions: VecDeque<FlipCompletion>,
    live_buffers: usize,
    waits: usize,
    released: bool,
}

#[derive(Debug)]
struct MockState {
    default_caps: PlaneCaps,
    caps: BTreeMap<PlaneId, PlaneCaps>,
    planes: BTreeMap<PlaneId, PlaneRecord>,
    calls: Vec<DeviceCall>,
    mode: CompletionMode,
    clock: u64,
    fail_allocations: usize,
    fail_flips: usize,
    fail_applies: usize,
    violations: Vec<Violation>,
    next_handle: u64,
}

impl MockState {
    fn plane(&mut self, plane: PlaneId) -> &mut PlaneRecord {
        let record = self.planes.entry(plane).or_default();
        if record.released {
            self.violations.push(Violation::UseAfterRelease(plane));
        }
        record
    }

    /// A new owner binds the plane by allocating its first buffer.
    fn bind(&mut self, plane: PlaneId) -> &mut PlaneRecord {
        let record = self.planes.entry(plane).or_default();
        if record.released {
            *record = PlaneRecord::default();
        }
        record
    }

    fn signal(&mut self, plane: PlaneId) -> Option<usize> {
        self.clock += FRAME_NANOS;
        let presented_at = HostTime(self.clock);
        let record = self.planes.get_mut(&plane)?;
        let index = record.in_flight.take()?;
        record.completions.push_back(FlipCompletion {
            index,
            presented_at,
        });
        Some(index)
    }
}

/// A recording [`PlaneDevice`]. Clones share state.
#[derive(Clone)]
pub struct MockDevice {
    state: Rc<RefCell<MockState>>,
}

impl fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MockDevice")
            .field("mode", &state.mode)
            .field("calls", &state.calls.len())
            .field("violations", &state.violations)
            .finish_non_exhaustive()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new(PixelFormat::Rgb565)
    }
}

impl MockDevice {
    /// A device whose planes all scan out `format`, with permissive limits
    /// and immediate completions.
    #[must_use]
    pub fn new(format: PixelFormat) -> Self {
        Self::with_caps(PlaneCaps::permissive(format))
    }

    /// A device whose planes all report `caps`.
    #[must_use]
    pub fn with_caps(caps: PlaneCaps) -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                default_caps: caps,
                caps: BTreeMap::new(),
                planes: BTreeMap::new(),
                calls: Vec::new(),
                mode: CompletionMode::Immediate,
                clock: 0,
                fail_allocations: 0,
                fail_flips: 0,
                fail_applies: 0,
                violations: Vec::new(),
                next_handle: 1,
            })),
        }
    }

    /// Returns the device with `mode` set.
    #[must_use]
    pub fn with_mode(self, mode: CompletionMode) -> Self {
        self.set_mode(mode);
        self
    }

    // -- configuration -----------------------------------------------------

    /// Switches completion mode. Flips already in flight are unaffected.
    pub fn set_mode(&self, mode: CompletionMode) {
        self.state.borrow_mut().mode = mode;
    }

    /// Overrides the limits of one plane.
    pub fn set_caps(&self, plane: PlaneId, caps: PlaneCaps) {
        self.state.borrow_mut().caps.insert(plane, caps);
    }

    /// Makes the next `n` allocations fail.
    pub fn fail_allocations(&self, n: usize) {
        self.state.borrow_mut().fail_allocations = n;
    }

    /// Makes the next `n` flips fail.
    pub fn fail_flips(&self, n: usize) {
        self.state.borrow_mut().fail_flips = n;
    }

    /// Makes the next `n` applies fail.
    pub fn fail_applies(&self, n: usize) {
        self.state.borrow_mut().fail_applies = n;
    }

    // -- completion control ------------------------------------------------

    /// Signals the vertical blank for `plane`, completing its in-flight
    /// flip. Returns the completed slot.
    pub fn complete_next(&self, plane: PlaneId) -> Option<usize> {
        self.state.borrow_mut().signal(plane)
    }

    /// Signals the vertical blank for every plane.
    pub fn vblank(&self) {
        let mut state = self.state.borrow_mut();
        let planes: Vec<PlaneId> = state.planes.keys().copied().collect();
        for plane in planes {
            state.signal(plane);
        }
    }

    // -- inspection --------------------------------------------------------

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.borrow().calls.clone()
    }

    /// Forgets the call log.
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Slots flipped on `plane`, in submission order.
    #[must_use]
    pub fn flips(&self, plane: PlaneId) -> Vec<usize> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::Flip { plane: p, index } if *p == plane => Some(*index),
                _ => None,
            })
            .collect()
    }

    /// Number of blocking waits on `plane`.
    #[must_use]
    pub fn waits(&self, plane: PlaneId) -> usize {
        self.state.borrow().planes.get(&plane).map_or(0, |p| p.waits)
    }

    /// Slot the device is flipping to on `plane`.
    #[must_use]
    pub fn in_flight(&self, plane: PlaneId) -> Option<usize> {
        self.state.borrow().planes.get(&plane)?.in_flight
    }

    /// Buffers of `plane` whose memory is still alive.
    #[must_use]
    pub fn live_buffers(&self, plane: PlaneId) -> usize {
        self.state
            .borrow()
            .planes
            .get(&plane)
            .map_or(0, |p| p.live_buffers)
    }

    /// Whether `plane` has been released.
    #[must_use]
    pub fn is_released(&self, plane: PlaneId) -> bool {
        self.state
            .borrow()
            .planes
            .get(&plane)
            .is_some_and(|p| p.released)
    }

    /// Misuses detected so far.
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        self.state.borrow().violations.clone()
    }

    fn record(&self, call: DeviceCall) {
        tracing::trace!(?call, "mock device call");
        self.state.borrow_mut().calls.push(call);
    }

    fn fail(counter: &mut usize) -> bool {
        if *counter > 0 {
            *counter -= 1;
            true
        } else {
            false
        }
    }
}

impl PlaneDevice for MockDevice {
    type Memory = MockMemory;

    fn caps(&self, plane: PlaneId) -> PlaneCaps {
        let state = self.state.borrow();
        state.caps.get(&plane).copied().unwrap_or(state.default_caps)
    }

    fn now(&self) -> HostTime {
        HostTime(self.state.borrow().clock)
    }

    fn allocate(
        &mut self,
        plane: PlaneId,
        slot: usize,
        desc: &SurfaceDesc,
    ) -> Result<MockMemory, AllocationError> {
        let bytes = desc.byte_len();
        self.record(DeviceCall::Allocate { plane, slot, bytes });
        let mut state = self.state.borrow_mut();
        if Self::fail(&mut state.fail_allocations) {
            return Err(AllocationError::OutOfMemory { slot, bytes });
        }
        let handle = RawHandle(state.next_handle);
        state.next_handle += 1;
        state.bind(plane).live_buffers += 1;
        Ok(MockMemory {
            bytes: vec![0; bytes],
            plane,
            slot,
            handle,
            device: Rc::downgrade(&self.state),
        })
    }

    fn set_position(&mut self, plane: PlaneId, x: i32, y: i32) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetPosition { plane, x, y });
        Ok(())
    }

    fn set_scale(&mut self, plane: PlaneId, factor: f64) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetScale { plane, factor });
        Ok(())
    }

    fn set_pan_size(&mut self, plane: PlaneId, width: u32, height: u32) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetPanSize {
            plane,
            width,
            height,
        });
        Ok(())
    }

    fn set_pan_position(&mut self, plane: PlaneId, x: i32, y: i32) -> Result<(), DeviceError> {
        self.record(DeviceCall::SetPanPosition { plane, x, y });
        Ok(())
    }

    fn apply(&mut self, plane: PlaneId) -> Result<(), DeviceError> {
        self.record(DeviceCall::Apply(plane));
        let mut state = self.state.borrow_mut();
        state.plane(plane);
        if Self::fail(&mut state.fail_applies) {
            return Err(DeviceError::Rejected {
                op: "apply",
                code: -22,
            });
        }
        Ok(())
    }

    fn hide(&mut self, plane: PlaneId) {
        self.record(DeviceCall::Hide(plane));
    }

    fn present(&mut self, plane: PlaneId, _: &Surface<MockMemory>) -> Result<(), DeviceError> {
        self.record(DeviceCall::Present(plane));
        Ok(())
    }

    fn flip(
        &mut self,
        plane: PlaneId,
        index: usize,
        _: &Surface<MockMemory>,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.borrow_mut();
        if Self::fail(&mut state.fail_flips) {
            return Err(DeviceError::Rejected {
                op: "flip",
                code: -16,
            });
        }
        state.calls.push(DeviceCall::Flip { plane, index });
        let mode = state.mode;
        if let Some(in_flight) = state.plane(plane).in_flight {
            state
                .violations
                .push(Violation::FlipWhileBusy { plane, in_flight });
        }
        state.plane(plane).in_flight = Some(index);
        if mode == CompletionMode::Immediate {
            state.signal(plane);
        }
        Ok(())
    }

    fn poll_completion(&mut self, plane: PlaneId) -> Option<FlipCompletion> {
        self.state
            .borrow_mut()
            .planes
            .get_mut(&plane)?
            .completions
            .pop_front()
    }

    fn wait_completion(&mut self, plane: PlaneId) -> Result<FlipCompletion, DeviceError> {
        self.record(DeviceCall::Wait(plane));
        let mut state = self.state.borrow_mut();
        state.plane(plane).waits += 1;
        if state.plane(plane).completions.is_empty() && state.signal(plane).is_none() {
            return Err(DeviceError::NoPendingFlip);
        }
        state
            .plane(plane)
            .completions
            .pop_front()
            .ok_or(DeviceError::NoPendingFlip)
    }

    fn abandon_flip(&mut self, plane: PlaneId) {
        let mut state = self.state.borrow_mut();
        let record = state.plane(plane);
        let index = record.in_flight.take();
        record.completions.clear();
        state.calls.push(DeviceCall::AbandonFlip { plane, index });
    }

    fn release(&mut self, plane: PlaneId) {
        let mut state = self.state.borrow_mut();
        state.calls.push(DeviceCall::Release(plane));
        let live = state.plane(plane).live_buffers;
        if live > 0 {
            state
                .violations
                .push(Violation::ReleasedWithLiveBuffers { plane, live });
        }
        state.plane(plane).released = true;
    }
}

/// Buffer memory handed out by a [`MockDevice`].
///
/// Dropping it while its plane has a flip outstanding records
/// [`Violation::BufferFreedDuringFlip`].
pub struct MockMemory {
    bytes: Vec<u8>,
    plane: PlaneId,
    slot: usize,
    handle: RawHandle,
    device: Weak<RefCell<MockState>>,
}

impl MockMemory {
    /// Ring slot this memory was allocated for.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl fmt::Debug for MockMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockMemory")
            .field("plane", &self.plane)
            .field("slot", &self.slot)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl PixelMemory for MockMemory {
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

impl Drop for MockMemory {
    fn drop(&mut self) {
        let Some(state) = self.device.upgrade() else {
            return;
        };
        let Ok(mut state) = state.try_borrow_mut() else {
            return;
        };
        let Some(record) = state.planes.get_mut(&self.plane) else {
            return;
        };
        record.live_buffers = record.live_buffers.saturating_sub(1);
        if let Some(in_flight) = record.in_flight {
            state.violations.push(Violation::BufferFreedDuringFlip {
                plane: self.plane,
                slot: self.slot,
                in_flight,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> SurfaceDesc {
        SurfaceDesc::new(4, 4, PixelFormat::Rgb565)
    }

    fn surface(device: &mut MockDevice, plane: PlaneId) -> Surface<MockMemory> {
        let memory = device.allocate(plane, 0, &desc()).unwrap();
        Surface::new(desc(), memory).unwrap()
    }

    #[test]
    fn immediate_mode_queues_completion() {
        let mut device = MockDevice::default();
        let plane = PlaneId(0);
        let s = surface(&mut device, plane);
        device.flip(plane, 0, &s).unwrap();
        assert_eq!(device.in_flight(plane), None);
        let c = device.poll_completion(plane).unwrap();
        assert_eq!(c.index, 0);
        assert_eq!(c.presented_at, HostTime(FRAME_NANOS));
        assert_eq!(device.poll_completion(plane), None);
    }

    #[test]
    fn manual_mode_waits_complete_in_flight() {
        let mut device = MockDevice::default().with_mode(CompletionMode::Manual);
        let plane = PlaneId(1);
        let s = surface(&mut device, plane);
        assert_eq!(
            device.wait_completion(plane),
            Err(DeviceError::NoPendingFlip)
        );
        device.flip(plane, 0, &s).unwrap();
        assert_eq!(device.poll_completion(plane), None);
        assert_eq!(device.wait_completion(plane).unwrap().index, 0);
        assert_eq!(device.waits(plane), 2);
    }

    #[test]
    fn freeing_memory_during_flip_is_a_violation() {
        let mut device = MockDevice::default().with_mode(CompletionMode::Manual);
        let plane = PlaneId(0);
        let s = surface(&mut device, plane);
        device.flip(plane, 0, &s).unwrap();
        drop(s);
        assert_eq!(
            device.violations(),
            [Violation::BufferFreedDuringFlip {
                plane,
                slot: 0,
                in_flight: 0
            }]
        );
    }

    #[test]
    fn injected_failures_are_consumed() {
        let mut device = MockDevice::default();
        device.fail_allocations(1);
        assert!(device.allocate(PlaneId(0), 0, &desc()).is_err());
        assert!(device.allocate(PlaneId(0), 0, &desc()).is_ok());
    }

    #[test]
    fn release_with_live_buffers_is_a_violation() {
        let mut device = MockDevice::default();
        let plane = PlaneId(4);
        let _s = surface(&mut device, plane);
        device.release(plane);
        assert_eq!(
            device.violations(),
            [Violation::ReleasedWithLiveBuffers { plane, live: 1 }]
        );
        assert!(device.is_released(plane));
    }
}
