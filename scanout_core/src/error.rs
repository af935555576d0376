// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy.
//!
//! Each failure class has its own type so callers can react per class:
//!
//! - [`AllocationError`]: buffer memory could not be provided. Fatal to the
//!   requesting plane; retrying with smaller geometry or fewer buffers may
//!   succeed.
//! - [`DeviceError`]: the display device rejected an operation. The plane
//!   keeps its prior valid state.
//! - [`InvalidStateError`]: an operation was attempted out of sequence.
//!   A programming error; do not retry.
//! - [`DecodeError`]: an image source is missing or corrupt. Reported per
//!   call, never cached, safe to retry.
//!
//! [`PlaneError`] unifies the first three for plane operations.

use alloc::string::String;

use thiserror::Error;

use crate::device::PlaneId;
use crate::format::PixelFormat;
use crate::plane::PlaneLifecycle;

/// Buffer memory could not be allocated.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// A surface with zero width or height was requested.
    #[error("cannot allocate a zero-sized {width}x{height} surface")]
    ZeroSize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// The buffer count is outside the supported range.
    #[error("buffer count {count} outside 1..={max}")]
    InvalidCount {
        /// Requested buffer count.
        count: usize,
        /// Largest supported count.
        max: usize,
    },
    /// The device or allocator ran out of memory.
    #[error("out of buffer memory allocating slot {slot} ({bytes} bytes)")]
    OutOfMemory {
        /// Ring slot being allocated.
        slot: usize,
        /// Size of the failed allocation.
        bytes: usize,
    },
    /// The provided memory is smaller than the surface geometry requires.
    #[error("buffer memory holds {actual} bytes, surface needs {required}")]
    Undersized {
        /// Bytes required by the surface descriptor.
        required: usize,
        /// Bytes actually available.
        actual: usize,
    },
}

/// The display device rejected a configuration or command.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum DeviceError {
    /// Requested geometry exceeds the plane's limits.
    #[error("plane cannot scan out {width}x{height} (max {max_width}x{max_height})")]
    UnsupportedGeometry {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Plane width limit.
        max_width: u32,
        /// Plane height limit.
        max_height: u32,
    },
    /// Requested pixel format differs from the plane's native format.
    #[error("plane scans out {native:?}, not {requested:?}")]
    UnsupportedFormat {
        /// Requested format.
        requested: PixelFormat,
        /// The format fixed at plane creation.
        native: PixelFormat,
    },
    /// Requested buffer count exceeds what the plane supports.
    #[error("plane supports at most {max} buffers, {requested} requested")]
    UnsupportedBufferCount {
        /// Requested count.
        requested: usize,
        /// Largest supported count.
        max: usize,
    },
    /// Scale factor outside the hardware scaler range.
    #[error("scale {factor} outside scaler range {min}..={max}")]
    UnsupportedScale {
        /// Requested factor.
        factor: f64,
        /// Smallest supported factor.
        min: f64,
        /// Largest supported factor.
        max: f64,
    },
    /// The pan window does not lie inside the buffer.
    #[error("pan window {x},{y} {width}x{height} exceeds {buffer_width}x{buffer_height} buffer")]
    PanOutOfBounds {
        /// Pan origin x.
        x: i32,
        /// Pan origin y.
        y: i32,
        /// Pan width.
        width: u32,
        /// Pan height.
        height: u32,
        /// Buffer width.
        buffer_width: u32,
        /// Buffer height.
        buffer_height: u32,
    },
    /// The driver refused the command.
    #[error("device rejected {op} (code {code})")]
    Rejected {
        /// Which device primitive failed.
        op: &'static str,
        /// Driver error code.
        code: i32,
    },
    /// A completion was awaited but no flip is outstanding.
    #[error("no flip pending on this plane")]
    NoPendingFlip,
    /// The completion channel did not signal in time.
    #[error("timed out waiting for flip completion")]
    Timeout,
    /// The device went away.
    #[error("display device lost")]
    Lost,
}

/// An operation was attempted out of sequence.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvalidStateError {
    /// The operation needs a configured plane.
    #[error("{op} requires a configured plane, plane is {state:?}")]
    NotConfigured {
        /// The attempted operation.
        op: &'static str,
        /// State the plane was in.
        state: PlaneLifecycle,
    },
    /// A ring slot index outside the ring.
    #[error("buffer index {index} out of range for {count} buffers")]
    BufferIndex {
        /// Requested slot.
        index: usize,
        /// Ring length.
        count: usize,
    },
    /// The plane key does not name a live plane.
    #[error("unknown or destroyed plane")]
    UnknownPlane,
    /// Another live plane is already bound to this hardware plane.
    #[error("hardware plane {0:?} is already bound")]
    PlaneInUse(PlaneId),
}

/// An image source could not be decoded or scaled.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum DecodeError {
    /// No image exists under this identifier.
    #[error("image source `{0}` not found")]
    NotFound(String),
    /// The source exists but its contents are corrupt.
    #[error("image source `{id}` is malformed: {reason}")]
    Malformed {
        /// Source identifier.
        id: String,
        /// Decoder message.
        reason: String,
    },
    /// The source uses an encoding the decoder does not handle.
    #[error("image source `{0}` uses an unsupported encoding")]
    Unsupported(String),
    /// The requested scale is not a finite positive number.
    #[error("invalid scale {hscale}x{vscale}")]
    InvalidScale {
        /// Horizontal factor.
        hscale: f32,
        /// Vertical factor.
        vscale: f32,
    },
    /// Rescaling a decoded image failed.
    #[error("scaling `{id}` to {width}x{height} failed")]
    Scale {
        /// Source identifier.
        id: String,
        /// Target width.
        width: u32,
        /// Target height.
        height: u32,
    },
}

/// Any failure of an [`OverlayPlane`](crate::plane::OverlayPlane) operation.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum PlaneError {
    /// See [`AllocationError`].
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// See [`DeviceError`].
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// See [`InvalidStateError`].
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),
}
