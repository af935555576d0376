// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Each plane is a thread (`tid` is the plane id) of one process. Plane
//! visibility is drawn as a `Visible` span; everything else is an instant.
//! Cache events carry no timestamp and are placed at the time of the
//! preceding event.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use scanout_core::plane::PlaneLifecycle;
use scanout_core::time::HostTime;
use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// # Errors
///
/// Returns any error from `writer`.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut last = 0.0;

    for recorded in decode(bytes) {
        if let Some(at) = recorded.at() {
            last = to_us(at);
        }
        match recorded {
            RecordedEvent::FlipRequest(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "FlipRequest",
                    "cat": "Flip",
                    "ts": last,
                    "pid": 0,
                    "tid": e.plane.0,
                    "s": "t",
                    "args": {
                        "action": format!("{:?}", e.action),
                    }
                }));
            }
            RecordedEvent::FlipComplete(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "FlipComplete",
                    "cat": "Flip",
                    "ts": last,
                    "pid": 0,
                    "tid": e.plane.0,
                    "s": "t",
                    "args": {
                        "index": e.index,
                        "next": e.next,
                    }
                }));
            }
            RecordedEvent::FlipAbandon(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "FlipAbandon",
                    "cat": "Flip",
                    "ts": last,
                    "pid": 0,
                    "tid": e.plane.0,
                    "s": "t",
                    "args": {
                        "in_flight": e.in_flight,
                        "waiting": e.waiting,
                    }
                }));
            }
            RecordedEvent::PlaneState(e) => {
                if e.from == PlaneLifecycle::Visible {
                    events.push(span("E", e.plane.0, last));
                }
                if e.to == PlaneLifecycle::Visible {
                    events.push(span("B", e.plane.0, last));
                }
                events.push(json!({
                    "ph": "i",
                    "name": format!("{:?}", e.to),
                    "cat": "Plane",
                    "ts": last,
                    "pid": 0,
                    "tid": e.plane.0,
                    "s": "t",
                    "args": {
                        "from": format!("{:?}", e.from),
                    }
                }));
            }
            RecordedEvent::PlaneApply(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Apply",
                    "cat": "Plane",
                    "ts": last,
                    "pid": 0,
                    "tid": e.plane.0,
                    "s": "t",
                    "args": {
                        "x": e.position.x,
                        "y": e.position.y,
                        "scale": e.scale,
                        "pan": [e.pan.x0, e.pan.y0, e.pan.width(), e.pan.height()],
                    }
                }));
            }
            RecordedEvent::CacheLookup {
                source,
                hscale,
                vscale,
                outcome,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": format!("Cache{outcome:?}"),
                    "cat": "Cache",
                    "ts": last,
                    "pid": 0,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "source": source,
                        "hscale": hscale,
                        "vscale": vscale,
                    }
                }));
            }
            RecordedEvent::CacheClear(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "CacheClear",
                    "cat": "Cache",
                    "ts": last,
                    "pid": 0,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "entries": e.entries,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn span(ph: &str, plane: u32, ts: f64) -> Value {
    json!({
        "ph": ph,
        "name": "Visible",
        "cat": "Plane",
        "ts": ts,
        "pid": 0,
        "tid": plane,
    })
}

fn to_us(t: HostTime) -> f64 {
    t.as_nanos() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use scanout_core::device::PlaneId;
    use scanout_core::flip::FlipAction;
    use scanout_core::trace::{
        CacheLookupEvent, CacheOutcome, FlipRequestEvent, PlaneStateEvent, TraceSink,
    };

    use super::*;
    use crate::recorder::RecorderSink;

    fn state(from: PlaneLifecycle, to: PlaneLifecycle, at: u64) -> PlaneStateEvent {
        PlaneStateEvent {
            plane: PlaneId(1),
            from,
            to,
            at: HostTime(at),
        }
    }

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_plane_state(&state(
            PlaneLifecycle::Configured,
            PlaneLifecycle::Visible,
            1_000,
        ));
        rec.on_flip_request(&FlipRequestEvent {
            plane: PlaneId(1),
            action: FlipAction::Submit(0),
            at: HostTime(2_000),
        });
        rec.on_cache_lookup(&CacheLookupEvent {
            source: "icon.png",
            hscale: 1.0,
            vscale: 1.0,
            outcome: CacheOutcome::Miss,
        });
        rec.on_plane_state(&state(
            PlaneLifecycle::Visible,
            PlaneLifecycle::Hidden,
            5_000,
        ));

        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        let phases: Vec<_> = parsed.iter().map(|e| e["ph"].as_str().unwrap()).collect();
        assert_eq!(phases, ["B", "i", "i", "i", "E", "i"]);

        assert_eq!(parsed[0]["name"], "Visible");
        assert_eq!(parsed[0]["ts"], 1.0);
        assert_eq!(parsed[2]["args"]["action"], "Submit(0)");
        assert_eq!(parsed[3]["name"], "CacheMiss");
        assert_eq!(parsed[3]["ts"], 2.0, "cache events inherit the last time");
        assert_eq!(parsed[4]["ts"], 5.0);
        assert_eq!(parsed[5]["name"], "Hidden");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert!(parsed.is_empty());
    }
}
