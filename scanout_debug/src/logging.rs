// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trace events as `tracing` records, and subscriber setup.
//!
//! [`LogSink`] forwards every [`TraceSink`] event to [`tracing`] under the
//! `scanout::trace` target: flip and cache traffic at `TRACE`, lifecycle and
//! cancellation at `DEBUG`. [`init`] installs a formatting subscriber
//! filtered by `RUST_LOG`.

use scanout_core::trace::{
    CacheClearEvent, CacheLookupEvent, CacheOutcome, FlipAbandonEvent, FlipCompleteEvent,
    FlipRequestEvent, PlaneApplyEvent, PlaneStateEvent, TraceSink,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,scanout=debug";

/// A [`TraceSink`] that emits each event as a [`tracing`] record.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn on_flip_request(&mut self, e: &FlipRequestEvent) {
        tracing::trace!(
            target: "scanout::trace",
            plane = e.plane.0,
            action = ?e.action,
            at = e.at.as_nanos(),
            "flip requested"
        );
    }

    fn on_flip_complete(&mut self, e: &FlipCompleteEvent) {
        tracing::trace!(
            target: "scanout::trace",
            plane = e.plane.0,
            index = e.index,
            next = ?e.next,
            at = e.presented_at.as_nanos(),
            "flip complete"
        );
    }

    fn on_flip_abandon(&mut self, e: &FlipAbandonEvent) {
        tracing::debug!(
            target: "scanout::trace",
            plane = e.plane.0,
            in_flight = ?e.in_flight,
            waiting = e.waiting,
            "flips abandoned"
        );
    }

    fn on_plane_state(&mut self, e: &PlaneStateEvent) {
        tracing::debug!(
            target: "scanout::trace",
            plane = e.plane.0,
            from = ?e.from,
            to = ?e.to,
            "plane state"
        );
    }

    fn on_plane_apply(&mut self, e: &PlaneApplyEvent) {
        tracing::debug!(
            target: "scanout::trace",
            plane = e.plane.0,
            x = e.position.x,
            y = e.position.y,
            scale = e.scale,
            pan = ?e.pan,
            "plane registers applied"
        );
    }

    fn on_cache_lookup(&mut self, e: &CacheLookupEvent<'_>) {
        if e.outcome == CacheOutcome::Failed {
            tracing::debug!(
                target: "scanout::trace",
                source = e.source,
                hscale = e.hscale,
                vscale = e.vscale,
                "image lookup failed"
            );
        } else {
            tracing::trace!(
                target: "scanout::trace",
                source = e.source,
                hscale = e.hscale,
                vscale = e.vscale,
                outcome = ?e.outcome,
                "image lookup"
            );
        }
    }

    fn on_cache_clear(&mut self, e: &CacheClearEvent) {
        tracing::debug!(target: "scanout::trace", entries = e.entries, "image cache cleared");
    }
}

/// Installs a global formatting subscriber filtered by `RUST_LOG`, or by
/// [`DEFAULT_FILTER`] when it is unset or invalid.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init() -> Result<(), TryInitError> {
    init_with(DEFAULT_FILTER)
}

/// Like [`init`] with a different fallback filter.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_with(default_filter: &str) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}
