// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame orchestration.
//!
//! [`Scene`] wires the per-frame entry points together in their required
//! order: accumulate dirty regions → compute culling bits → for each
//! region, find the render root and paint from it. The sync layer mutates
//! the graph between frames and calls [`render_frame`](Scene::render_frame)
//! exactly once per frame.
//!
//! # Threading
//!
//! Mutation and rendering follow a strict producer/consumer handoff: all
//! sync-layer mutations for frame *N* complete before the render pass for
//! frame *N* begins, and nothing here is called concurrently. `Scene` is
//! `Send` so the handoff may cross threads; the only structure in this
//! crate that is safe for concurrent use is the
//! [`BufferPool`](crate::buffer::BufferPool).

use kurbo::Affine;

use crate::accumulate::AccumulateStatus;
use crate::bounds::Bounds;
use crate::cull::NodePath;
use crate::node::{NodeId, SceneGraph};
use crate::region::{DirtyRegionContainer, DirtyRegionPool};
use crate::render::RenderContext;
use crate::target::RenderTarget;
use crate::trace::{
    DamageRect, FrameBeginEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    RenderRootEvent, RenderRootOutcome, Tracer,
};

/// A render tree plus the per-frame scratch state needed to drive it.
#[derive(Debug)]
pub struct Scene {
    graph: SceneGraph,
    root: NodeId,
    pool: DirtyRegionPool,
    regions: DirtyRegionContainer,
    path: NodePath,
    frame_index: u64,
}

impl Scene {
    /// Creates a scene rendering the tree rooted at `root`.
    ///
    /// # Panics
    ///
    /// Panics if `root` is stale in `graph`.
    #[must_use]
    pub fn new(graph: SceneGraph, root: NodeId) -> Self {
        let _ = graph.check(root);
        Self {
            graph,
            root,
            pool: DirtyRegionPool::default(),
            regions: DirtyRegionContainer::default(),
            path: NodePath::new(),
            frame_index: 0,
        }
    }

    /// The tree root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Read access to the graph.
    #[must_use]
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Mutable access to the graph, for the sync layer's setters.
    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// The dirty regions produced by the most recent frame (diagnostics).
    #[must_use]
    pub fn last_regions(&self) -> &DirtyRegionContainer {
        &self.regions
    }

    /// Runs one full frame against `g`, repainting at most the area
    /// inside `clip` (device space).
    ///
    /// Returns the number of dirty regions painted (zero means the frame
    /// was clean or fully occluded).
    pub fn render_frame(
        &mut self,
        g: &mut dyn RenderTarget,
        clip: Bounds,
        tracer: &mut Tracer<'_>,
    ) -> usize {
        let frame_index = self.frame_index;
        self.frame_index += 1;
        tracer.frame_begin(&FrameBeginEvent { frame_index });

        // Phase 1: one walk turns dirty flags into device rectangles.
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index,
            phase: PhaseKind::Accumulate,
        });
        self.regions.clear();
        let status = self.graph.accumulate_dirty_regions(
            self.root,
            clip,
            &mut self.pool,
            &mut self.regions,
            Affine::IDENTITY,
        );
        if status == AccumulateStatus::CoversClip {
            self.regions.reset_to(clip);
        }
        tracer.phase_end(&PhaseEndEvent {
            frame_index,
            phase: PhaseKind::Accumulate,
        });

        if self.regions.is_empty() {
            tracer.frame_summary(&FrameSummary {
                frame_index,
                ..FrameSummary::default()
            });
            return 0;
        }

        let rects: Vec<DamageRect> = self
            .regions
            .iter()
            .map(|r| DamageRect {
                x: r.min_x(),
                y: r.min_y(),
                width: r.width(),
                height: r.height(),
            })
            .collect();
        tracer.dirty_regions(frame_index, &rects);

        // Phase 2: classify every node against the regions. With a single
        // region the per-node codes cost more than they save.
        let use_bits = self.regions.size() > 1;
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index,
            phase: PhaseKind::Cull,
        });
        if use_bits {
            self.graph.pre_culling(self.root, &self.regions, Affine::IDENTITY);
        }
        tracer.phase_end(&PhaseEndEvent {
            frame_index,
            phase: PhaseKind::Cull,
        });

        // Phase 3: per region, search for an occluding render root, then
        // paint from it with the clip pinned to the region.
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index,
            phase: PhaseKind::Render,
        });
        // Roots for every region are found up front: rendering clears
        // dirty flags, and the clean-occluder answer depends on them.
        let mut paths: Vec<NodePath> = Vec::with_capacity(self.regions.size());
        for i in 0..self.regions.size() {
            let region = self.regions.region(i);
            let culling_index = use_bits.then_some(i);
            self.graph
                .get_render_root(&mut self.path, region, culling_index, self.root, Affine::IDENTITY);

            let outcome = if self.path.is_empty() {
                RenderRootOutcome::NothingToPaint
            } else if self.path.len() == 1 {
                RenderRootOutcome::FromRoot
            } else {
                RenderRootOutcome::Occluder
            };
            tracer.render_root(&RenderRootEvent {
                frame_index,
                region_index: u32::try_from(i).expect("region count fits in u32"),
                outcome,
            });
            paths.push(self.path.clone());
        }

        let mut nodes_visited = 0;
        let mut nodes_rendered = 0;
        let mut painted = 0;
        for (i, path) in paths.into_iter().enumerate() {
            if path.is_empty() {
                continue;
            }
            let region = self.regions.region(i);
            let saved_clip = g.clip_rect();
            g.set_clip_rect(Some(region.to_rect()));
            let mut ctx = RenderContext {
                clip_index: i,
                has_culling_bits: use_bits,
                path: Some(path),
                nodes_visited: 0,
                nodes_rendered: 0,
            };
            self.graph.render(self.root, g, &mut ctx);
            g.set_clip_rect(saved_clip);
            nodes_visited += ctx.nodes_visited;
            nodes_rendered += ctx.nodes_rendered;
            painted += 1;
        }
        tracer.phase_end(&PhaseEndEvent {
            frame_index,
            phase: PhaseKind::Render,
        });

        // Dirt can survive the passes (occluded nodes, culled branches
        // that were never walked); retire it so it cannot retry forever.
        if !self.graph.is_clean(self.root) {
            self.graph.clear_dirty_tree(self.root);
        }

        tracer.frame_summary(&FrameSummary {
            frame_index,
            regions: u32::try_from(self.regions.size()).expect("region count fits in u32"),
            nodes_visited,
            nodes_rendered,
        });
        painted
    }
}
