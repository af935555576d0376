// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test doubles for `scanout_core`.
//!
//! - [`MockDevice`] implements [`PlaneDevice`](scanout_core::device::PlaneDevice).
//!   It records every call, completes flips immediately or on demand, tracks
//!   outstanding flips and live buffers per plane, and injects failures. Any
//!   buffer freed while its plane still has a flip outstanding is recorded as
//!   a [`Violation`].
//! - [`MockSource`] implements [`ImageSource`](scanout_core::cache::ImageSource)
//!   with in-memory images, decode and scale counters, and failure injection.
//!
//! Both are single-threaded (`Rc<RefCell<_>>`) and `no_std` with `alloc`.

#![no_std]

extern crate alloc;

mod device;
mod source;

pub use device::{CompletionMode, DeviceCall, MockDevice, MockMemory, Violation};
pub use source::MockSource;
