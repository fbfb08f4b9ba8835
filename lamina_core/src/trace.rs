// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the frame walk.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! the frame orchestration calls at each stage. All method bodies default
//! to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace`
//! feature is **off**, every `Tracer` method compiles to nothing (zero
//! overhead). When **on**, each method performs a single `Option` branch
//! before dispatching.

/// Which phase of the frame walk is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Dirty-region accumulation.
    Accumulate,
    /// Culling-bit computation.
    Cull,
    /// Render-root search plus rendering, per dirty region.
    Render,
}

/// How a render-root search for one dirty region concluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderRootOutcome {
    /// No occluder covered the region; rendering starts at the true root.
    FromRoot,
    /// An occluder was found; rendering starts at a deeper node.
    Occluder,
    /// Everything dirty in the region is occluded; nothing to paint.
    NothingToPaint,
}

/// A dirty rectangle in device space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DamageRect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

/// Emitted when a frame walk begins.
#[derive(Clone, Copy, Debug)]
pub struct FrameBeginEvent {
    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Emitted when a phase begins.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase.
    pub phase: PhaseKind,
}

/// Emitted when a phase ends.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase.
    pub phase: PhaseKind,
}

/// Emitted once per region after render-root search.
#[derive(Clone, Copy, Debug)]
pub struct RenderRootEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Index of the dirty region within this frame.
    pub region_index: u32,
    /// Search outcome.
    pub outcome: RenderRootOutcome,
}

/// Emitted at the end of a frame walk.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u64,
    /// Number of dirty regions processed.
    pub regions: u32,
    /// Nodes visited by the render walk.
    pub nodes_visited: u64,
    /// Nodes that actually rendered content.
    pub nodes_rendered: u64,
}

/// Receives frame-walk events. All methods default to no-ops.
pub trait TraceSink {
    /// A frame walk began.
    fn on_frame_begin(&mut self, event: &FrameBeginEvent) {
        let _ = event;
    }

    /// A phase began.
    fn on_phase_begin(&mut self, event: &PhaseBeginEvent) {
        let _ = event;
    }

    /// A phase ended.
    fn on_phase_end(&mut self, event: &PhaseEndEvent) {
        let _ = event;
    }

    /// The dirty regions accumulated for this frame.
    fn on_dirty_regions(&mut self, frame_index: u64, rects: &[DamageRect]) {
        let _ = (frame_index, rects);
    }

    /// A render-root search concluded.
    fn on_render_root(&mut self, event: &RenderRootEvent) {
        let _ = event;
    }

    /// A frame walk finished.
    fn on_frame_summary(&mut self, summary: &FrameSummary) {
        let _ = summary;
    }
}

/// Zero-overhead trace dispatch wrapper.
///
/// Without the `trace` feature all methods are empty and the wrapper
/// stores nothing.
#[derive(Debug, Default)]
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _sink: core::marker::PhantomData<&'a mut ()>,
}

#[cfg(feature = "trace")]
impl core::fmt::Debug for dyn TraceSink + '_ {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("TraceSink")
    }
}

impl<'a> Tracer<'a> {
    /// A tracer that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A tracer forwarding to `sink` (only effective with the `trace`
    /// feature enabled).
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            let _ = sink;
            Self::default()
        }
    }

    /// Forwards [`TraceSink::on_frame_begin`].
    #[inline]
    pub fn frame_begin(&mut self, event: &FrameBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_frame_begin(event);
        }
        #[cfg(not(feature = "trace"))]
        {
            let _ = event;
        }
    }

    /// Forwards [`TraceSink::on_phase_begin`].
    #[inline]
    pub fn phase_begin(&mut self, event: &PhaseBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_phase_begin(event);
        }
        #[cfg(not(feature = "trace"))]
        {
            let _ = event;
        }
    }

    /// Forwards [`TraceSink::on_phase_end`].
    #[inline]
    pub fn phase_end(&mut self, event: &PhaseEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_phase_end(event);
        }
        #[cfg(not(feature = "trace"))]
        {
            let _ = event;
        }
    }

    /// Forwards [`TraceSink::on_dirty_regions`].
    #[inline]
    pub fn dirty_regions(&mut self, frame_index: u64, rects: &[DamageRect]) {
        #[cfg(feature = "trace")]
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_dirty_regions(frame_index, rects);
        }
        #[cfg(not(feature = "trace"))]
        {
            let _ = (frame_index, rects);
        }
    }

    /// Forwards [`TraceSink::on_render_root`].
    #[inline]
    pub fn render_root(&mut self, event: &RenderRootEvent) {
        #[cfg(feature = "trace")]
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_render_root(event);
        }
        #[cfg(not(feature = "trace"))]
        {
            let _ = event;
        }
    }

    /// Forwards [`TraceSink::on_frame_summary`].
    #[inline]
    pub fn frame_summary(&mut self, summary: &FrameSummary) {
        #[cfg(feature = "trace")]
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.on_frame_summary(summary);
        }
        #[cfg(not(feature = "trace"))]
        {
            let _ = summary;
        }
    }
}
