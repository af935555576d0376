// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overlay-plane buffer rings, flip scheduling, and image surface caching.
//!
//! `scanout_core` owns the part of an embedded display stack that has real
//! invariants: which frame buffer the producer may draw into, when a buffer
//! handed to the display hardware may be reused, and how decoded images are
//! memoized so the same logical image is never decoded or rescaled twice.
//! It is `no_std` compatible (with `alloc`).
//!
//! # Architecture
//!
//! ```text
//!   painting layer
//!       │  current_surface_for / request_flip / cached_image
//!       ▼
//!   Screen ──► OverlayPlane ──► BufferRing (N surfaces, rotation index)
//!       │            │
//!       │            └──► FlipScheduler ──► PlaneDevice::flip()
//!       │                        ▲
//!       │                        └── PlaneDevice::poll_completion()
//!       ▼
//!   ImageCache ──► ImageSource::decode() / ImageSource::scale()
//! ```
//!
//! **[`ring`]**: A fixed ring of identically shaped [`Surface`]s with the
//! rotation index and per-slot damage.
//!
//! **[`plane`]**: [`OverlayPlane`] binds a ring to a hardware scanout plane,
//! stages position/pan/scale changes, and gates producer writes on flip
//! completion.
//!
//! **[`flip`]**: [`FlipScheduler`], the coalescing or strictly queued flip
//! discipline that keeps the producer one buffer ahead of the display.
//!
//! **[`device`]**: The [`PlaneDevice`] trait that display drivers (and test
//! doubles) implement.
//!
//! **[`cache`]**: [`ImageCache`], memoizing decoded and rescaled images by
//! source identifier and quantized scale.
//!
//! **[`screen`]**: [`Screen`], the facade the painting layer talks to.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! flip and cache instrumentation, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//!
//! [`Surface`]: surface::Surface
//! [`OverlayPlane`]: plane::OverlayPlane
//! [`FlipScheduler`]: flip::FlipScheduler
//! [`PlaneDevice`]: device::PlaneDevice
//! [`ImageCache`]: cache::ImageCache
//! [`Screen`]: screen::Screen

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod cache;
pub mod damage;
pub mod device;
pub mod error;
pub mod flip;
pub mod format;
pub mod plane;
pub mod ring;
pub mod screen;
pub mod surface;
pub mod time;
pub mod trace;
