// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a
//! [`RecorderSink`](super::recorder::RecorderSink) and writes
//! [Chrome Trace Event Format][spec] JSON to the given writer, suitable
//! for `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
//!
//! Phases become duration (`B`/`E`) events; everything else becomes
//! instants with their payload in `args`.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use lamina_core::trace::PhaseKind;

use crate::recorder::{RecordedEvent, decode};

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Accumulate => "Accumulate",
        PhaseKind::Cull => "Cull",
        PhaseKind::Render => "Render",
    }
}

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// # Errors
///
/// Returns any error from `writer`.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for record in decode(bytes) {
        let ts = record.at_micros;
        match record.event {
            RecordedEvent::FrameBegin { frame_index } => {
                events.push(json!({
                    "ph": "i",
                    "name": "FrameBegin",
                    "cat": "Frame",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": { "frame_index": frame_index }
                }));
            }
            RecordedEvent::PhaseBegin { frame_index, phase } => {
                events.push(json!({
                    "ph": "B",
                    "name": phase_name(phase),
                    "cat": "Frame",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": { "frame_index": frame_index }
                }));
            }
            RecordedEvent::PhaseEnd { frame_index, phase } => {
                events.push(json!({
                    "ph": "E",
                    "name": phase_name(phase),
                    "cat": "Frame",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": { "frame_index": frame_index }
                }));
            }
            RecordedEvent::DirtyRegions { frame_index, rects } => {
                let rects: Vec<Value> = rects
                    .iter()
                    .map(|r| json!([r.x, r.y, r.width, r.height]))
                    .collect();
                events.push(json!({
                    "ph": "i",
                    "name": "DirtyRegions",
                    "cat": "Damage",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": { "frame_index": frame_index, "rects": rects }
                }));
            }
            RecordedEvent::RenderRoot {
                frame_index,
                region_index,
                outcome,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "RenderRoot",
                    "cat": "Culling",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "frame_index": frame_index,
                        "region_index": region_index,
                        "outcome": format!("{outcome:?}"),
                    }
                }));
            }
            RecordedEvent::FrameSummary {
                frame_index,
                regions,
                nodes_visited,
                nodes_rendered,
            } => {
                events.push(json!({
                    "ph": "C",
                    "name": "FrameCounters",
                    "cat": "Frame",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "frame_index": frame_index,
                        "regions": regions,
                        "nodes_visited": nodes_visited,
                        "nodes_rendered": nodes_rendered,
                    }
                }));
            }
        }
    }

    let doc = Value::Array(events);
    serde_json::to_writer(&mut *writer, &doc)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use lamina_core::trace::{
        FrameBeginEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, TraceSink,
    };

    #[test]
    fn export_produces_valid_json_with_phase_pairs() {
        let mut sink = RecorderSink::new();
        sink.on_frame_begin(&FrameBeginEvent { frame_index: 0 });
        sink.on_phase_begin(&PhaseBeginEvent {
            frame_index: 0,
            phase: PhaseKind::Render,
        });
        sink.on_phase_end(&PhaseEndEvent {
            frame_index: 0,
            phase: PhaseKind::Render,
        });
        sink.on_frame_summary(&FrameSummary {
            frame_index: 0,
            regions: 1,
            nodes_visited: 5,
            nodes_rendered: 3,
        });

        let mut out = Vec::new();
        export(sink.as_bytes(), &mut out).expect("write to vec");
        let doc: Value = serde_json::from_slice(&out).expect("valid json");
        let events = doc.as_array().expect("array of events");
        assert_eq!(events.len(), 4);
        assert_eq!(events[1]["ph"], "B");
        assert_eq!(events[2]["ph"], "E");
        assert_eq!(events[1]["name"], "Render");
        assert_eq!(events[3]["args"]["nodes_rendered"], 3);
    }
}
