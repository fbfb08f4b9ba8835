// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output and dirty-tree snapshots.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per
//! event to a [`Write`](std::io::Write) destination (default: stderr).
//!
//! [`dump_dirty_tree`] prints the structure of a graph annotated with
//! dirty flags, culling codes, filters, and opaque regions — the first
//! thing to reach for when a repaint is too big or too small.

use std::io::{self, Write};

use kurbo::Affine;

use lamina_core::node::{DirtyFlag, NodeId, SceneGraph};
use lamina_core::trace::{
    DamageRect, FrameBeginEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    RenderRootEvent, RenderRootOutcome, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write)
/// destination.
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
            writer: Box::new(io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Accumulate => "accumulate",
        PhaseKind::Cull => "cull",
        PhaseKind::Render => "render",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_begin(&mut self, event: &FrameBeginEvent) {
        let _ = writeln!(self.writer, "[frame] {}", event.frame_index);
    }

    fn on_phase_begin(&mut self, event: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] frame={} {}",
            event.frame_index,
            phase_name(event.phase),
        );
    }

    fn on_phase_end(&mut self, event: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] frame={} {}",
            event.frame_index,
            phase_name(event.phase),
        );
    }

    fn on_dirty_regions(&mut self, frame_index: u64, rects: &[DamageRect]) {
        let _ = write!(self.writer, "[dirty] frame={frame_index}");
        for r in rects {
            let _ = write!(
                self.writer,
                " ({:.1},{:.1} {:.1}x{:.1})",
                r.x, r.y, r.width, r.height
            );
        }
        let _ = writeln!(self.writer);
    }

    fn on_render_root(&mut self, event: &RenderRootEvent) {
        let outcome = match event.outcome {
            RenderRootOutcome::FromRoot => "from-root",
            RenderRootOutcome::Occluder => "occluder",
            RenderRootOutcome::NothingToPaint => "nothing-to-paint",
        };
        let _ = writeln!(
            self.writer,
            "[root] frame={} region={} {outcome}",
            event.frame_index, event.region_index,
        );
    }

    fn on_frame_summary(&mut self, summary: &FrameSummary) {
        let _ = writeln!(
            self.writer,
            "[summary] frame={} regions={} visited={} rendered={}",
            summary.frame_index, summary.regions, summary.nodes_visited, summary.nodes_rendered,
        );
    }
}

/// Prints the tree under `root` with dirty and culling annotations.
///
/// Key: `d` dirty, `dt` dirty by translation, `cd` has a dirty child,
/// `iN`/`cN` intersects/contained-by dirty region N, `cf` cache filter,
/// `ef` effect filter, `b` blend mode set, `cl` prefix marks a clip
/// node, `or=` the opaque region.
pub fn dump_dirty_tree(
    graph: &mut SceneGraph,
    root: NodeId,
    out: &mut dyn Write,
) -> io::Result<()> {
    writeln!(out, "d=dirty  dt=dirty-by-translation  cd=child-dirty")?;
    writeln!(out, "iN/cN=intersects/contained-by region N")?;
    writeln!(out, "cf=cache  ef=effect  b=blend  cl=clip node  or=opaque region")?;
    dump_node(graph, root, Affine::IDENTITY, "", out)
}

fn dump_node(
    graph: &mut SceneGraph,
    node: NodeId,
    tx: Affine,
    prefix: &str,
    out: &mut dyn Write,
) -> io::Result<()> {
    if !graph.visible(node) || graph.opacity(node) == 0.0 {
        return Ok(());
    }
    let tx = tx * graph.transform(node);

    let mut notes: Vec<String> = Vec::new();
    match graph.dirty_flag(node) {
        DirtyFlag::Dirty => notes.push("d".into()),
        DirtyFlag::DirtyByTranslation => notes.push("dt".into()),
        DirtyFlag::Clean => {}
    }
    if graph.child_dirty(node) {
        notes.push("cd".into());
    }
    let bits = graph.culling_bits(node);
    if bits != 0 {
        for i in 0..15 {
            match (bits >> (2 * i)) & 0x3 {
                0x1 => notes.push(format!("i{i}")),
                0x2 => notes.push(format!("c{i}")),
                _ => {}
            }
        }
    }
    if graph.cache_filter(node).is_some() {
        notes.push("cf".into());
    }
    if graph.has_effect(node) {
        notes.push("ef".into());
    }
    if graph.blend_mode(node).is_some() {
        notes.push("b".into());
    }
    if let Some(or) = graph.opaque_region(node) {
        let or = or.transformed(tx);
        notes.push(format!(
            "or={:.1},{:.1} {:.1}x{:.1}",
            or.min_x(),
            or.min_y(),
            or.width(),
            or.height()
        ));
    }

    let name = graph.name(node).unwrap_or("<node>").to_owned();
    if notes.is_empty() {
        writeln!(out, "{prefix}{name}")?;
    } else {
        writeln!(out, "{prefix}{name} [{}]", notes.join(" "))?;
    }

    if let Some(clip) = graph.clip_node(node) {
        dump_node(graph, clip, tx, &format!("{prefix}  cl "), out)?;
    }
    let children: Vec<NodeId> = graph.children(node).collect();
    for child in children {
        dump_node(graph, child, tx, &format!("{prefix}  "), out)?;
    }
    Ok(())
}
