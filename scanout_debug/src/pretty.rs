// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Device
//! timestamps are printed in microseconds.

use std::io::Write;

use scanout_core::flip::FlipAction;
use scanout_core::time::HostTime;
use scanout_core::trace::{
    CacheClearEvent, CacheLookupEvent, CacheOutcome, FlipAbandonEvent, FlipCompleteEvent,
    FlipRequestEvent, PlaneApplyEvent, PlaneStateEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn us(t: HostTime) -> f64 {
    t.as_nanos() as f64 / 1000.0
}

fn action(a: FlipAction) -> String {
    match a {
        FlipAction::Direct => "direct".into(),
        FlipAction::Submit(i) => format!("submit {i}"),
        FlipAction::Defer(i) => format!("defer {i}"),
        FlipAction::Replace { index, dropped } => format!("replace {dropped}->{index}"),
    }
}

fn slot(index: Option<usize>) -> String {
    index.map_or_else(|| "-".into(), |i| i.to_string())
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_flip_request(&mut self, e: &FlipRequestEvent) {
        let _ = writeln!(
            self.writer,
            "[flip] plane={} {} at {:.1}µs",
            e.plane.0,
            action(e.action),
            us(e.at),
        );
    }

    fn on_flip_complete(&mut self, e: &FlipCompleteEvent) {
        let _ = writeln!(
            self.writer,
            "[flip:done] plane={} index={} at {:.1}µs next={}",
            e.plane.0,
            e.index,
            us(e.presented_at),
            slot(e.next),
        );
    }

    fn on_flip_abandon(&mut self, e: &FlipAbandonEvent) {
        let _ = writeln!(
            self.writer,
            "[flip:abandon] plane={} in_flight={} waiting={} at {:.1}µs",
            e.plane.0,
            slot(e.in_flight),
            e.waiting,
            us(e.at),
        );
    }

    fn on_plane_state(&mut self, e: &PlaneStateEvent) {
        let _ = writeln!(
            self.writer,
            "[plane] plane={} {:?} -> {:?} at {:.1}µs",
            e.plane.0,
            e.from,
            e.to,
            us(e.at),
        );
    }

    fn on_plane_apply(&mut self, e: &PlaneApplyEvent) {
        let _ = writeln!(
            self.writer,
            "[apply] plane={} pos=({}, {}) scale={} pan=({}, {}) {}x{}",
            e.plane.0,
            e.position.x,
            e.position.y,
            e.scale,
            e.pan.x0,
            e.pan.y0,
            e.pan.width(),
            e.pan.height(),
        );
    }

    fn on_cache_lookup(&mut self, e: &CacheLookupEvent<'_>) {
        let outcome = match e.outcome {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Failed => "FAILED",
        };
        let _ = writeln!(
            self.writer,
            "[cache] {outcome} {} @ {}x{}",
            e.source, e.hscale, e.vscale,
        );
    }

    fn on_cache_clear(&mut self, e: &CacheClearEvent) {
        let _ = writeln!(self.writer, "[cache:clear] entries={}", e.entries);
    }
}

#[cfg(test)]
mod tests {
    use scanout_core::device::PlaneId;
    use scanout_core::plane::PlaneLifecycle;

    use super::*;

    #[test]
    fn flip_lines() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_flip_request(&FlipRequestEvent {
            plane: PlaneId(1),
            action: FlipAction::Replace {
                index: 2,
                dropped: 1,
            },
            at: HostTime(1_500),
        });
        sink.on_flip_abandon(&FlipAbandonEvent {
            plane: PlaneId(1),
            in_flight: None,
            waiting: 0,
            at: HostTime(3_000),
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("[flip] plane=1 replace 1->2 at 1.5µs"), "got: {output}");
        assert!(output.contains("in_flight=- waiting=0"), "got: {output}");
    }

    #[test]
    fn state_and_cache_lines() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_plane_state(&PlaneStateEvent {
            plane: PlaneId(0),
            from: PlaneLifecycle::Hidden,
            to: PlaneLifecycle::Visible,
            at: HostTime::ZERO,
        });
        sink.on_cache_lookup(&CacheLookupEvent {
            source: "res:logo",
            hscale: 0.5,
            vscale: 0.5,
            outcome: CacheOutcome::Failed,
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("Hidden -> Visible"), "got: {output}");
        assert!(output.contains("[cache] FAILED res:logo @ 0.5x0.5"), "got: {output}");
    }
}
