// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-region containers and their scratch pool.
//!
//! A [`DirtyRegionContainer`] holds the device-space rectangles one frame
//! needs repainted. The list is bounded: past capacity, a new rectangle is
//! merged into whichever existing one its union grows least, so the region
//! count never explodes on pathological scenes while coverage stays
//! conservative.
//!
//! [`DirtyRegionPool`] recycles containers during the accumulation walk
//! (effect and clip groups accumulate into scratch containers before
//! merging upward). The pool is render-thread scratch state and is
//! deliberately unlocked; the cross-thread pool in this crate is
//! [`BufferPool`](crate::buffer::BufferPool).

use crate::bounds::Bounds;

/// Hard cap on simultaneously tracked dirty regions, matching the
/// capacity of the per-node culling word (2 bits per region in a `u32`,
/// with one spare pair).
pub const MAX_DIRTY_REGIONS: usize = 15;

/// Default working capacity of a container.
pub const DEFAULT_DIRTY_REGION_CAPACITY: usize = 6;

/// A bounded list of device-space dirty rectangles.
#[derive(Clone, Debug)]
pub struct DirtyRegionContainer {
    regions: Vec<Bounds>,
    capacity: usize,
}

impl Default for DirtyRegionContainer {
    fn default() -> Self {
        Self::new(DEFAULT_DIRTY_REGION_CAPACITY)
    }
}

impl DirtyRegionContainer {
    /// Creates an empty container holding at most `capacity` regions
    /// (clamped to [`MAX_DIRTY_REGIONS`]).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            regions: Vec::new(),
            capacity: capacity.clamp(1, MAX_DIRTY_REGIONS),
        }
    }

    /// Number of regions currently held.
    #[must_use]
    pub fn size(&self) -> usize {
        self.regions.len()
    }

    /// Whether no regions are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// The region at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn region(&self, index: usize) -> Bounds {
        self.regions[index]
    }

    /// Replaces the region at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn set_region(&mut self, index: usize, region: Bounds) {
        self.regions[index] = region;
    }

    /// Iterates over the regions.
    pub fn iter(&self) -> impl Iterator<Item = Bounds> + '_ {
        self.regions.iter().copied()
    }

    /// Adds a dirty rectangle. Empty rectangles are ignored. Past
    /// capacity, the rectangle is merged into the existing region whose
    /// union grows least.
    pub fn add_dirty_region(&mut self, region: Bounds) {
        if region.is_empty() {
            return;
        }
        if self.regions.len() < self.capacity {
            self.regions.push(region);
            return;
        }
        let mut best = 0;
        let mut best_growth = f64::INFINITY;
        for (i, existing) in self.regions.iter().enumerate() {
            let u = existing.union(region);
            let growth = u.width() * u.height() - existing.width() * existing.height();
            if growth < best_growth {
                best_growth = growth;
                best = i;
            }
        }
        let merged = self.regions[best].union(region);
        self.regions[best] = merged;
    }

    /// Merges every region of `other` into this container.
    pub fn merge(&mut self, other: &Self) {
        for r in &other.regions {
            self.add_dirty_region(*r);
        }
    }

    /// Replaces the contents with those of `other`.
    pub fn derive_from(&mut self, other: &Self) {
        self.regions.clear();
        self.regions.extend_from_slice(&other.regions);
    }

    /// Removes the region at `index` if it became empty, returning whether
    /// a removal happened (callers re-visit the same index).
    pub fn check_and_clear_region(&mut self, index: usize) -> bool {
        if self.regions[index].is_empty() {
            self.regions.remove(index);
            true
        } else {
            false
        }
    }

    /// Drops all regions.
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    /// Replaces all regions with the single rectangle `region`.
    pub fn reset_to(&mut self, region: Bounds) {
        self.regions.clear();
        if !region.is_empty() {
            self.regions.push(region);
        }
    }
}

/// Recycles [`DirtyRegionContainer`]s during the accumulation walk.
///
/// Render-thread scratch only; not synchronized.
#[derive(Debug)]
pub struct DirtyRegionPool {
    free: Vec<DirtyRegionContainer>,
    capacity: usize,
}

impl Default for DirtyRegionPool {
    fn default() -> Self {
        Self::new(DEFAULT_DIRTY_REGION_CAPACITY)
    }
}

impl DirtyRegionPool {
    /// Creates a pool producing containers of the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            capacity,
        }
    }

    /// Takes an empty container from the pool (allocating if needed).
    #[must_use]
    pub fn check_out(&mut self) -> DirtyRegionContainer {
        self.free
            .pop()
            .unwrap_or_else(|| DirtyRegionContainer::new(self.capacity))
    }

    /// Returns a container to the pool.
    pub fn check_in(&mut self, mut container: DirtyRegionContainer) {
        container.clear();
        self.free.push(container);
    }
}
