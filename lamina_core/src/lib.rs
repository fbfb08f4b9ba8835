// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Retained scene-graph render core: dirty regions, occlusion culling,
//! and layered compositing over a pluggable graphics backend.
//!
//! `lamina_core` owns the render-side mirror of an application scene
//! graph: a tree of nodes that tracks what changed since the last frame,
//! computes minimal redraw regions, and issues draw calls to a backend
//! [`RenderTarget`](target::RenderTarget). Shapes, text, images, and the
//! application-facing graph live elsewhere; they plug in through the
//! [`Content`](node::Content) and [`Effect`](render::effect::Effect)
//! contracts.
//!
//! # Frame flow
//!
//! ```text
//!   Sync layer (setters on SceneGraph)
//!       │  mark dirty / invalidate caches, propagating upward
//!       ▼
//!   accumulate_dirty_regions() ──► DirtyRegionContainer
//!       │
//!       ▼
//!   pre_culling()  ──► per-node 2-bit region codes
//!       │
//!       ▼  per region
//!   get_render_root() ──► NodePath (deepest opaque cover)
//!       │
//!       ▼
//!   render() ──► RenderTarget draw calls
//! ```
//!
//! [`Scene`](scene::Scene) packages that sequence as a one-call-per-frame
//! driver.
//!
//! **[`node`]** — the arena-backed tree, the sync-layer setter contracts,
//! and the tri-state dirty machine with its translation fast path.
//!
//! **[`bounds`]** / **[`region`]** — empty-capable rectangles and the
//! bounded dirty-region containers built from them.
//!
//! **[`accumulate`]** — the one-pass dirty-region walk.
//!
//! **[`cull`]** — culling bits and render-root (occlusion) search.
//!
//! **[`render`]** — the layered render walk plus the cache and effect
//! filter contracts.
//!
//! **[`target`]** — the backend contract (draw state, primitives,
//! offscreen surfaces, image blends).
//!
//! **[`buffer`]** — the growable primitive-value buffer and its
//! lock-protected pool.
//!
//! **[`trace`]** — frame instrumentation behind the `trace` feature.
//!
//! # Threading model
//!
//! Single-writer, frame-granular handoff: the sync layer applies all
//! mutations for a frame, then the render side runs the walks; nothing is
//! locked because nothing interleaves. The one exception is
//! [`buffer::BufferPool`], which is mutex-guarded and usable from any
//! thread.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): enables the
//!   [`Tracer`](trace::Tracer) method bodies (one branch per call site).

pub mod accumulate;
pub mod bounds;
pub mod buffer;
pub mod cull;
pub mod node;
pub mod region;
pub mod render;
pub mod scene;
pub mod target;
pub mod trace;
pub mod transform;
