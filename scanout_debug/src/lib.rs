// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording, pretty-printing, logging and Chrome trace export for scanout
//! diagnostics.
//!
//! This crate provides [`TraceSink`](scanout_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output.
//! - [`recorder::RecorderSink`]: compact binary recording with
//!   [`recorder::decode`] for playback.
//! - [`chrome::export`]: writes Chrome Trace Event Format JSON from recorded
//!   bytes.
//! - [`logging::LogSink`]: forwards events to [`tracing`], with
//!   [`logging::init`] to install a subscriber.
//!
//! [`Fanout`] sends each event to several sinks.

pub mod chrome;
pub mod logging;
pub mod pretty;
pub mod recorder;

use scanout_core::trace::{
    CacheClearEvent, CacheLookupEvent, FlipAbandonEvent, FlipCompleteEvent, FlipRequestEvent,
    PlaneApplyEvent, PlaneStateEvent, TraceSink,
};

/// A [`TraceSink`] that forwards every event to each of its sinks in order.
pub struct Fanout<'a> {
    sinks: Vec<&'a mut dyn TraceSink>,
}

impl std::fmt::Debug for Fanout<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl<'a> Fanout<'a> {
    /// Creates a fanout over `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<&'a mut dyn TraceSink>) -> Self {
        Self { sinks }
    }
}

impl TraceSink for Fanout<'_> {
    fn on_flip_request(&mut self, e: &FlipRequestEvent) {
        self.sinks.iter_mut().for_each(|s| s.on_flip_request(e));
    }

    fn on_flip_complete(&mut self, e: &FlipCompleteEvent) {
        self.sinks.iter_mut().for_each(|s| s.on_flip_complete(e));
    }

    fn on_flip_abandon(&mut self, e: &FlipAbandonEvent) {
        self.sinks.iter_mut().for_each(|s| s.on_flip_abandon(e));
    }

    fn on_plane_state(&mut self, e: &PlaneStateEvent) {
        self.sinks.iter_mut().for_each(|s| s.on_plane_state(e));
    }

    fn on_plane_apply(&mut self, e: &PlaneApplyEvent) {
        self.sinks.iter_mut().for_each(|s| s.on_plane_apply(e));
    }

    fn on_cache_lookup(&mut self, e: &CacheLookupEvent<'_>) {
        self.sinks.iter_mut().for_each(|s| s.on_cache_lookup(e));
    }

    fn on_cache_clear(&mut self, e: &CacheClearEvent) {
        self.sinks.iter_mut().for_each(|s| s.on_cache_clear(e));
    }
}
