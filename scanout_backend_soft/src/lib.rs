// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Software display device for scanout.
//!
//! [`SoftwareDevice`] implements [`PlaneDevice`] entirely in memory:
//!
//! - Buffer memory is heap allocated; each buffer gets a synthetic
//!   [`RawHandle`](scanout_core::surface::RawHandle).
//! - A flip copies the buffer and holds it until the next vertical blank.
//! - [`SoftwareDevice::vblank`] latches pending flips, signals their
//!   completions and composites every visible plane into an output
//!   framebuffer. It may be called from any thread; [`VblankThread`] calls it
//!   periodically.
//! - Blocking completion waits honor [`SoftConfig::timeout`].

mod compose;
mod device;
mod queue;
mod time;

pub use device::{SoftConfig, SoftMemory, SoftStats, SoftwareDevice, VblankThread};
pub use scanout_core::device::PlaneDevice;
