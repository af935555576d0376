// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records, one tag byte followed by the event
//! fields. [`decode`] reads them back as an iterator of [`RecordedEvent`].
//!
//! Cache lookups carry their source identifier as a length-prefixed UTF-8
//! string; every other record has a fixed size.

use kurbo::{Point, Rect};
use scanout_core::device::PlaneId;
use scanout_core::flip::FlipAction;
use scanout_core::plane::PlaneLifecycle;
use scanout_core::time::HostTime;
use scanout_core::trace::{
    CacheClearEvent, CacheLookupEvent, CacheOutcome, FlipAbandonEvent, FlipCompleteEvent,
    FlipRequestEvent, PlaneApplyEvent, PlaneStateEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FLIP_REQUEST: u8 = 1;
const TAG_FLIP_COMPLETE: u8 = 2;
const TAG_FLIP_ABANDON: u8 = 3;
const TAG_PLANE_STATE: u8 = 4;
const TAG_PLANE_APPLY: u8 = 5;
const TAG_CACHE_LOOKUP: u8 = 6;
const TAG_CACHE_CLEAR: u8 = 7;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_index(&mut self, v: usize) {
        self.write_u32(u32::try_from(v).unwrap_or(u32::MAX));
    }

    fn write_option_index(&mut self, v: Option<usize>) {
        match v {
            Some(index) => {
                self.write_u8(1);
                self.write_index(index);
            }
            None => {
                self.write_u8(0);
                self.write_u32(0);
            }
        }
    }

    fn write_action(&mut self, action: FlipAction) {
        let (kind, index, dropped) = match action {
            FlipAction::Direct => (0, 0, 0),
            FlipAction::Submit(index) => (1, index, 0),
            FlipAction::Defer(index) => (2, index, 0),
            FlipAction::Replace { index, dropped } => (3, index, dropped),
        };
        self.write_u8(kind);
        self.write_index(index);
        self.write_index(dropped);
    }

    fn write_lifecycle(&mut self, state: PlaneLifecycle) {
        self.write_u8(match state {
            PlaneLifecycle::Created => 0,
            PlaneLifecycle::Configured => 1,
            PlaneLifecycle::Visible => 2,
            PlaneLifecycle::Hidden => 3,
            PlaneLifecycle::Destroyed => 4,
        });
    }

    fn write_str(&mut self, s: &str) {
        let len = u32::try_from(s.len()).unwrap_or(u32::MAX);
        self.write_u32(len);
        self.buf.extend_from_slice(&s.as_bytes()[..len as usize]);
    }
}

impl TraceSink for RecorderSink {
    fn on_flip_request(&mut self, e: &FlipRequestEvent) {
        self.write_u8(TAG_FLIP_REQUEST);
        self.write_u32(e.plane.0);
        self.write_action(e.action);
        self.write_u64(e.at.as_nanos());
    }

    fn on_flip_complete(&mut self, e: &FlipCompleteEvent) {
        self.write_u8(TAG_FLIP_COMPLETE);
        self.write_u32(e.plane.0);
        self.write_index(e.index);
        self.write_u64(e.presented_at.as_nanos());
        self.write_option_index(e.next);
    }

    fn on_flip_abandon(&mut self, e: &FlipAbandonEvent) {
        self.write_u8(TAG_FLIP_ABANDON);
        self.write_u32(e.plane.0);
        self.write_option_index(e.in_flight);
        self.write_index(e.waiting);
        self.write_u64(e.at.as_nanos());
    }

    fn on_plane_state(&mut self, e: &PlaneStateEvent) {
        self.write_u8(TAG_PLANE_STATE);
        self.write_u32(e.plane.0);
        self.write_lifecycle(e.from);
        self.write_lifecycle(e.to);
        self.write_u64(e.at.as_nanos());
    }

    fn on_plane_apply(&mut self, e: &PlaneApplyEvent) {
        self.write_u8(TAG_PLANE_APPLY);
        self.write_u32(e.plane.0);
        self.write_f64(e.position.x);
        self.write_f64(e.position.y);
        self.write_f64(e.scale);
        self.write_f64(e.pan.x0);
        self.write_f64(e.pan.y0);
        self.write_f64(e.pan.x1);
        self.write_f64(e.pan.y1);
        self.write_u64(e.at.as_nanos());
    }

    fn on_cache_lookup(&mut self, e: &CacheLookupEvent<'_>) {
        self.write_u8(TAG_CACHE_LOOKUP);
        self.write_str(e.source);
        self.write_u32(e.hscale.to_bits());
        self.write_u32(e.vscale.to_bits());
        self.write_u8(match e.outcome {
            CacheOutcome::Hit => 0,
            CacheOutcome::Miss => 1,
            CacheOutcome::Failed => 2,
        });
    }

    fn on_cache_clear(&mut self, e: &CacheClearEvent) {
        self.write_u8(TAG_CACHE_CLEAR);
        self.write_index(e.entries);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`FlipRequestEvent`].
    FlipRequest(FlipRequestEvent),
    /// A [`FlipCompleteEvent`].
    FlipComplete(FlipCompleteEvent),
    /// A [`FlipAbandonEvent`].
    FlipAbandon(FlipAbandonEvent),
    /// A [`PlaneStateEvent`].
    PlaneState(PlaneStateEvent),
    /// A [`PlaneApplyEvent`].
    PlaneApply(PlaneApplyEvent),
    /// A [`CacheLookupEvent`] with an owned source identifier.
    CacheLookup {
        /// Source identifier requested.
        source: String,
        /// Horizontal factor after quantization.
        hscale: f32,
        /// Vertical factor after quantization.
        vscale: f32,
        /// Result of the lookup.
        outcome: CacheOutcome,
    },
    /// A [`CacheClearEvent`].
    CacheClear(CacheClearEvent),
}

impl RecordedEvent {
    /// Device time of the event. Cache events carry none.
    #[must_use]
    pub fn at(&self) -> Option<HostTime> {
        match self {
            Self::FlipRequest(e) => Some(e.at),
            Self::FlipComplete(e) => Some(e.presented_at),
            Self::FlipAbandon(e) => Some(e.at),
            Self::PlaneState(e) => Some(e.at),
            Self::PlaneApply(e) => Some(e.at),
            Self::CacheLookup { .. } | Self::CacheClear(_) => None,
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first unknown tag or truncated record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take(&mut self, n: usize) -> Option<&[u8]> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        Some(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn read_u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn read_f64(&mut self) -> Option<f64> {
        Some(f64::from_bits(self.read_u64()?))
    }

    fn read_index(&mut self) -> Option<usize> {
        usize::try_from(self.read_u32()?).ok()
    }

    fn read_option_index(&mut self) -> Option<Option<usize>> {
        let present = self.read_u8()?;
        let index = self.read_index()?;
        Some((present != 0).then_some(index))
    }

    fn read_time(&mut self) -> Option<HostTime> {
        Some(HostTime(self.read_u64()?))
    }

    fn read_action(&mut self) -> Option<FlipAction> {
        let kind = self.read_u8()?;
        let index = self.read_index()?;
        let dropped = self.read_index()?;
        Some(match kind {
            0 => FlipAction::Direct,
            1 => FlipAction::Submit(index),
            2 => FlipAction::Defer(index),
            _ => FlipAction::Replace { index, dropped },
        })
    }

    fn read_lifecycle(&mut self) -> Option<PlaneLifecycle> {
        Some(match self.read_u8()? {
            0 => PlaneLifecycle::Created,
            1 => PlaneLifecycle::Configured,
            2 => PlaneLifecycle::Visible,
            3 => PlaneLifecycle::Hidden,
            _ => PlaneLifecycle::Destroyed,
        })
    }

    fn read_string(&mut self) -> Option<String> {
        let len = usize::try_from(self.read_u32()?).ok()?;
        Some(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    fn decode_flip_request(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FlipRequest(FlipRequestEvent {
            plane: PlaneId(self.read_u32()?),
            action: self.read_action()?,
            at: self.read_time()?,
        }))
    }

    fn decode_flip_complete(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FlipComplete(FlipCompleteEvent {
            plane: PlaneId(self.read_u32()?),
            index: self.read_index()?,
            presented_at: self.read_time()?,
            next: self.read_option_index()?,
        }))
    }

    fn decode_flip_abandon(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FlipAbandon(FlipAbandonEvent {
            plane: PlaneId(self.read_u32()?),
            in_flight: self.read_option_index()?,
            waiting: self.read_index()?,
            at: self.read_time()?,
        }))
    }

    fn decode_plane_state(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PlaneState(PlaneStateEvent {
            plane: PlaneId(self.read_u32()?),
            from: self.read_lifecycle()?,
            to: self.read_lifecycle()?,
            at: self.read_time()?,
        }))
    }

    fn decode_plane_apply(&mut self) -> Option<RecordedEvent> {
        let plane = PlaneId(self.read_u32()?);
        let position = Point::new(self.read_f64()?, self.read_f64()?);
        let scale = self.read_f64()?;
        let pan = Rect::new(
            self.read_f64()?,
            self.read_f64()?,
            self.read_f64()?,
            self.read_f64()?,
        );
        Some(RecordedEvent::PlaneApply(PlaneApplyEvent {
            plane,
            position,
            scale,
            pan,
            at: self.read_time()?,
        }))
    }

    fn decode_cache_lookup(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::CacheLookup {
            source: self.read_string()?,
            hscale: f32::from_bits(self.read_u32()?),
            vscale: f32::from_bits(self.read_u32()?),
            outcome: match self.read_u8()? {
                0 => CacheOutcome::Hit,
                1 => CacheOutcome::Miss,
                _ => CacheOutcome::Failed,
            },
        })
    }

    fn decode_cache_clear(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::CacheClear(CacheClearEvent {
            entries: self.read_index()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_FLIP_REQUEST => self.decode_flip_request(),
            TAG_FLIP_COMPLETE => self.decode_flip_complete(),
            TAG_FLIP_ABANDON => self.decode_flip_abandon(),
            TAG_PLANE_STATE => self.decode_plane_state(),
            TAG_PLANE_APPLY => self.decode_plane_apply(),
            TAG_CACHE_LOOKUP => self.decode_cache_lookup(),
            TAG_CACHE_CLEAR => self.decode_cache_clear(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
