// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as tagged fixed-size little-endian records, each stamped
//! with microseconds since the sink was created. [`decode`] reads them
//! back as an iterator of [`RecordedEvent`].

use std::time::Instant;

use lamina_core::trace::{
    DamageRect, FrameBeginEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    RenderRootEvent, RenderRootOutcome, TraceSink,
};

const TAG_FRAME_BEGIN: u8 = 1;
const TAG_PHASE_BEGIN: u8 = 2;
const TAG_PHASE_END: u8 = 3;
const TAG_DIRTY_REGIONS: u8 = 4;
const TAG_RENDER_ROOT: u8 = 5;
const TAG_FRAME_SUMMARY: u8 = 6;

fn phase_code(phase: PhaseKind) -> u8 {
    match phase {
        PhaseKind::Accumulate => 0,
        PhaseKind::Cull => 1,
        PhaseKind::Render => 2,
    }
}

fn phase_from(code: u8) -> Option<PhaseKind> {
    match code {
        0 => Some(PhaseKind::Accumulate),
        1 => Some(PhaseKind::Cull),
        2 => Some(PhaseKind::Render),
        _ => None,
    }
}

fn outcome_code(outcome: RenderRootOutcome) -> u8 {
    match outcome {
        RenderRootOutcome::FromRoot => 0,
        RenderRootOutcome::Occluder => 1,
        RenderRootOutcome::NothingToPaint => 2,
    }
}

fn outcome_from(code: u8) -> Option<RenderRootOutcome> {
    match code {
        0 => Some(RenderRootOutcome::FromRoot),
        1 => Some(RenderRootOutcome::Occluder),
        2 => Some(RenderRootOutcome::NothingToPaint),
        _ => None,
    }
}

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug)]
pub struct RecorderSink {
    buf: Vec<u8>,
    epoch: Instant,
}

impl Default for RecorderSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderSink {
    /// Creates an empty recorder; timestamps count from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            epoch: Instant::now(),
        }
    }

    /// A view of the recorded bytes.
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

    fn stamp(&mut self, tag: u8) {
        let micros = u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.buf.push(tag);
        self.write_u64(micros);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
    }
}

impl TraceSink for RecorderSink {
    fn on_frame_begin(&mut self, event: &FrameBeginEvent) {
        self.stamp(TAG_FRAME_BEGIN);
        self.write_u64(event.frame_index);
    }

    fn on_phase_begin(&mut self, event: &PhaseBeginEvent) {
        self.stamp(TAG_PHASE_BEGIN);
        self.write_u64(event.frame_index);
        self.buf.push(phase_code(event.phase));
    }

    fn on_phase_end(&mut self, event: &PhaseEndEvent) {
        self.stamp(TAG_PHASE_END);
        self.write_u64(event.frame_index);
        self.buf.push(phase_code(event.phase));
    }

    fn on_dirty_regions(&mut self, frame_index: u64, rects: &[DamageRect]) {
        self.stamp(TAG_DIRTY_REGIONS);
        self.write_u64(frame_index);
        self.write_u32(u32::try_from(rects.len()).unwrap_or(u32::MAX));
        for r in rects {
            self.write_f64(r.x);
            self.write_f64(r.y);
            self.write_f64(r.width);
            self.write_f64(r.height);
        }
    }

    fn on_render_root(&mut self, event: &RenderRootEvent) {
        self.stamp(TAG_RENDER_ROOT);
        self.write_u64(event.frame_index);
        self.write_u32(event.region_index);
        self.buf.push(outcome_code(event.outcome));
    }

    fn on_frame_summary(&mut self, summary: &FrameSummary) {
        self.stamp(TAG_FRAME_SUMMARY);
        self.write_u64(summary.frame_index);
        self.write_u32(summary.regions);
        self.write_u64(summary.nodes_visited);
        self.write_u64(summary.nodes_rendered);
    }
}

/// One decoded record: the microsecond timestamp and the event payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Microseconds since the recorder was created.
    pub at_micros: u64,
    /// The event payload.
    pub event: RecordedEvent,
}

/// Decoded event payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEvent {
    /// A frame walk began.
    FrameBegin {
        /// Frame counter.
        frame_index: u64,
    },
    /// A phase began.
    PhaseBegin {
        /// Frame counter.
        frame_index: u64,
        /// Which phase.
        phase: PhaseKind,
    },
    /// A phase ended.
    PhaseEnd {
        /// Frame counter.
        frame_index: u64,
        /// Which phase.
        phase: PhaseKind,
    },
    /// The frame's dirty regions.
    DirtyRegions {
        /// Frame counter.
        frame_index: u64,
        /// The accumulated rectangles.
        rects: Vec<DamageRect>,
    },
    /// A render-root search concluded.
    RenderRoot {
        /// Frame counter.
        frame_index: u64,
        /// Region index within the frame.
        region_index: u32,
        /// Search outcome.
        outcome: RenderRootOutcome,
    },
    /// A frame walk finished.
    FrameSummary {
        /// Frame counter.
        frame_index: u64,
        /// Regions processed.
        regions: u32,
        /// Nodes visited.
        nodes_visited: u64,
        /// Nodes rendered.
        nodes_rendered: u64,
    },
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u8(&mut self) -> Option<u8> {
        let v = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(v)
    }

    fn u32(&mut self) -> Option<u32> {
        let s = self.bytes.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes(s.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        let s = self.bytes.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        Some(u64::from_le_bytes(s.try_into().ok()?))
    }

    fn f64(&mut self) -> Option<f64> {
        Some(f64::from_bits(self.u64()?))
    }
}

/// Decodes recorded bytes into events. Decoding stops at the first
/// malformed record (a truncated buffer yields the complete prefix).
pub fn decode(bytes: &[u8]) -> impl Iterator<Item = Record> + '_ {
    let mut cursor = Cursor { bytes, pos: 0 };
    core::iter::from_fn(move || {
        let tag = cursor.u8()?;
        let at_micros = cursor.u64()?;
        let event = match tag {
            TAG_FRAME_BEGIN => RecordedEvent::FrameBegin {
                frame_index: cursor.u64()?,
            },
            TAG_PHASE_BEGIN => RecordedEvent::PhaseBegin {
                frame_index: cursor.u64()?,
                phase: phase_from(cursor.u8()?)?,
            },
            TAG_PHASE_END => RecordedEvent::PhaseEnd {
                frame_index: cursor.u64()?,
                phase: phase_from(cursor.u8()?)?,
            },
            TAG_DIRTY_REGIONS => {
                let frame_index = cursor.u64()?;
                let count = cursor.u32()?;
                let mut rects = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    rects.push(DamageRect {
                        x: cursor.f64()?,
                        y: cursor.f64()?,
                        width: cursor.f64()?,
                        height: cursor.f64()?,
                    });
                }
                RecordedEvent::DirtyRegions { frame_index, rects }
            }
            TAG_RENDER_ROOT => RecordedEvent::RenderRoot {
                frame_index: cursor.u64()?,
                region_index: cursor.u32()?,
                outcome: outcome_from(cursor.u8()?)?,
            },
            TAG_FRAME_SUMMARY => RecordedEvent::FrameSummary {
                frame_index: cursor.u64()?,
                regions: cursor.u32()?,
                nodes_visited: cursor.u64()?,
                nodes_rendered: cursor.u64()?,
            },
            _ => return None,
        };
        Some(Record { at_micros, event })
    })
}
