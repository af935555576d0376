// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structured trace events for flips, plane state and the image cache.
//!
//! [`TraceSink`] has one method per event, each defaulting to a no-op, so a
//! sink implements only what it cares about. Instrumented entry points such
//! as [`OverlayPlane::schedule_flip_traced`] and [`ImageCache::get_traced`]
//! take a [`Tracer`], which wraps an optional `&mut dyn TraceSink`.
//!
//! With the `trace` feature off, every [`Tracer`] method compiles to
//! nothing. With it on, each call costs one `Option` branch.
//!
//! [`OverlayPlane::schedule_flip_traced`]: crate::plane::OverlayPlane::schedule_flip_traced
//! [`ImageCache::get_traced`]: crate::cache::ImageCache::get_traced

use kurbo::{Point, Rect};

use crate::device::PlaneId;
use crate::flip::FlipAction;
use crate::plane::PlaneLifecycle;
use crate::time::HostTime;

/// A flip request was accepted.
#[derive(Clone, Copy, Debug)]
pub struct FlipRequestEvent {
    /// Plane flipped.
    pub plane: PlaneId,
    /// What the scheduler did with it.
    pub action: FlipAction,
    /// Device time of the request.
    pub at: HostTime,
}

/// The device reported a flip as presented.
#[derive(Clone, Copy, Debug)]
pub struct FlipCompleteEvent {
    /// Plane flipped.
    pub plane: PlaneId,
    /// Slot now on screen.
    pub index: usize,
    /// When the flip latched.
    pub presented_at: HostTime,
    /// Waiting slot submitted in response, if any.
    pub next: Option<usize>,
}

/// Outstanding flips were cancelled.
#[derive(Clone, Copy, Debug)]
pub struct FlipAbandonEvent {
    /// Plane affected.
    pub plane: PlaneId,
    /// Slot whose flip was cancelled at the device.
    pub in_flight: Option<usize>,
    /// Waiting requests dropped.
    pub waiting: usize,
    /// Device time of the cancellation.
    pub at: HostTime,
}

/// A plane moved through its lifecycle.
#[derive(Clone, Copy, Debug)]
pub struct PlaneStateEvent {
    /// Plane affected.
    pub plane: PlaneId,
    /// Previous state.
    pub from: PlaneLifecycle,
    /// New state.
    pub to: PlaneLifecycle,
    /// Device time of the transition.
    pub at: HostTime,
}

/// Staged plane registers were latched.
#[derive(Clone, Copy, Debug)]
pub struct PlaneApplyEvent {
    /// Plane affected.
    pub plane: PlaneId,
    /// Output position.
    pub position: Point,
    /// Scaler factor.
    pub scale: f64,
    /// Pan window in buffer pixels.
    pub pan: Rect,
    /// Device time of the apply.
    pub at: HostTime,
}

/// How an [`ImageCache`](crate::cache::ImageCache) lookup was served.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheOutcome {
    /// Served from the cache.
    Hit,
    /// Decoded and inserted.
    Miss,
    /// Decoding or scaling failed; nothing cached.
    Failed,
}

/// An image cache lookup finished.
#[derive(Clone, Copy, Debug)]
pub struct CacheLookupEvent<'a> {
    /// Source identifier requested.
    pub source: &'a str,
    /// Horizontal factor after quantization.
    pub hscale: f32,
    /// Vertical factor after quantization.
    pub vscale: f32,
    /// Result of the lookup.
    pub outcome: CacheOutcome,
}

/// The image cache was emptied.
#[derive(Clone, Copy, Debug)]
pub struct CacheClearEvent {
    /// Entries dropped.
    pub entries: usize,
}

/// Receives trace events.
///
/// All methods default to no-ops.
pub trait TraceSink {
    /// Called when a flip request is accepted.
    fn on_flip_request(&mut self, e: &FlipRequestEvent) {
        _ = e;
    }

    /// Called when a flip completion is processed.
    fn on_flip_complete(&mut self, e: &FlipCompleteEvent) {
        _ = e;
    }

    /// Called when outstanding flips are cancelled.
    fn on_flip_abandon(&mut self, e: &FlipAbandonEvent) {
        _ = e;
    }

    /// Called on every lifecycle transition.
    fn on_plane_state(&mut self, e: &PlaneStateEvent) {
        _ = e;
    }

    /// Called after staged registers are latched.
    fn on_plane_apply(&mut self, e: &PlaneApplyEvent) {
        _ = e;
    }

    /// Called after every image cache lookup.
    fn on_cache_lookup(&mut self, e: &CacheLookupEvent<'_>) {
        _ = e;
    }

    /// Called when the image cache is cleared.
    fn on_cache_clear(&mut self, e: &CacheClearEvent) {
        _ = e;
    }
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

/// Thin wrapper around an optional [`TraceSink`].
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

/// Expands to a `Tracer` method that forwards one event to the sink.
macro_rules! forward {
    ($(#[$doc:meta])* $name:ident => $method:ident($ty:ty)) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(&mut self, e: &$ty) {
            #[cfg(feature = "trace")]
            if let Some(s) = &mut self.sink {
                s.$method(e);
            }
            #[cfg(not(feature = "trace"))]
            {
                _ = e;
            }
        }
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to `sink`.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    forward!(
        /// Emits a [`FlipRequestEvent`].
        flip_request => on_flip_request(FlipRequestEvent)
    );
    forward!(
        /// Emits a [`FlipCompleteEvent`].
        flip_complete => on_flip_complete(FlipCompleteEvent)
    );
    forward!(
        /// Emits a [`FlipAbandonEvent`].
        flip_abandon => on_flip_abandon(FlipAbandonEvent)
    );
    forward!(
        /// Emits a [`PlaneStateEvent`].
        plane_state => on_plane_state(PlaneStateEvent)
    );
    forward!(
        /// Emits a [`PlaneApplyEvent`].
        plane_apply => on_plane_apply(PlaneApplyEvent)
    );
    forward!(
        /// Emits a [`CacheLookupEvent`].
        cache_lookup => on_cache_lookup(CacheLookupEvent<'_>)
    );
    forward!(
        /// Emits a [`CacheClearEvent`].
        cache_clear => on_cache_clear(CacheClearEvent)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> FlipRequestEvent {
        FlipRequestEvent {
            plane: PlaneId(3),
            action: FlipAction::Submit(1),
            at: HostTime(16_000_000),
        }
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let mut sink = NoopSink;
        sink.on_flip_request(&sample_request());
        sink.on_cache_lookup(&CacheLookupEvent {
            source: "res:logo",
            hscale: 0.5,
            vscale: 0.5,
            outcome: CacheOutcome::Hit,
        });
        sink.on_cache_clear(&CacheClearEvent { entries: 0 });
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.flip_request(&sample_request());
        tracer.cache_clear(&CacheClearEvent { entries: 4 });
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        use alloc::vec::Vec;

        struct RecordingSink {
            flips: Vec<FlipAction>,
            lookups: Vec<CacheOutcome>,
        }
        impl TraceSink for RecordingSink {
            fn on_flip_request(&mut self, e: &FlipRequestEvent) {
                self.flips.push(e.action);
            }
            fn on_cache_lookup(&mut self, e: &CacheLookupEvent<'_>) {
                self.lookups.push(e.outcome);
            }
        }

        let mut sink = RecordingSink {
            flips: Vec::new(),
            lookups: Vec::new(),
        };
        let mut tracer = Tracer::new(&mut sink);
        tracer.flip_request(&sample_request());
        tracer.cache_lookup(&CacheLookupEvent {
            source: "a",
            hscale: 1.0,
            vscale: 1.0,
            outcome: CacheOutcome::Miss,
        });
        drop(tracer);
        assert_eq!(sink.flips, [FlipAction::Submit(1)]);
        assert_eq!(sink.lookups, [CacheOutcome::Miss]);
    }
}
