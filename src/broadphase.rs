// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Owns an active tree and a static tree plus their parallel collidable
//! arrays, and drives per-frame refit/refine/query over both.

use tracing::{debug, trace};

use crate::aabb::{Aabb, Vec3};
use crate::collidable::CollidableReference;
use crate::config::RefineConfig;
use crate::error::Result;
use crate::tree::query::OverlapHandler;
use crate::tree::Tree;

const DEFAULT_ACTIVE_CAPACITY: i32 = 4096;
const DEFAULT_STATIC_CAPACITY: i32 = 8192;

/// Broad-phase collision detector: a dynamic tree for active (dynamic or
/// kinematic) collidables and a separate tree for static ones, each paired
/// with a leaf-id-indexed array of opaque `CollidableReference`s.
pub struct BroadPhase {
    active_tree: Tree,
    static_tree: Tree,
    active_leaves: Vec<CollidableReference>,
    static_leaves: Vec<CollidableReference>,
    frame_index: i32,
    config: RefineConfig,
}

impl BroadPhase {
    pub fn new() -> BroadPhase {
        BroadPhase::with_capacity(DEFAULT_ACTIVE_CAPACITY, DEFAULT_STATIC_CAPACITY)
    }

    pub fn with_capacity(active_cap: i32, static_cap: i32) -> BroadPhase {
        BroadPhase {
            active_tree: Tree::new(active_cap),
            static_tree: Tree::new(static_cap),
            active_leaves: Vec::with_capacity(active_cap.max(0) as usize),
            static_leaves: Vec::with_capacity(static_cap.max(0) as usize),
            frame_index: 0,
            config: RefineConfig::default(),
        }
    }

    pub fn with_config(active_cap: i32, static_cap: i32, config: RefineConfig) -> BroadPhase {
        let mut phase = BroadPhase::with_capacity(active_cap, static_cap);
        phase.config = config;
        phase
    }

    fn add(tree: &mut Tree, leaves: &mut Vec<CollidableReference>, collidable: CollidableReference, bounds: Aabb) -> i32 {
        let leaf_id = tree.add(bounds);
        if (leaf_id as usize) >= leaves.len() {
            leaves.resize(leaf_id as usize + 1, collidable);
        }
        leaves[leaf_id as usize] = collidable;
        leaf_id
    }

    pub fn add_active(&mut self, collidable: CollidableReference, bounds: Aabb) -> i32 {
        let id = Self::add(&mut self.active_tree, &mut self.active_leaves, collidable, bounds);
        trace!(id, "added active collidable");
        id
    }

    pub fn add_static(&mut self, collidable: CollidableReference, bounds: Aabb) -> i32 {
        let id = Self::add(&mut self.static_tree, &mut self.static_leaves, collidable, bounds);
        trace!(id, "added static collidable");
        id
    }

    fn remove_at(tree: &mut Tree, leaves: &mut [CollidableReference], index: i32) -> Result<Option<CollidableReference>> {
        let moved_leaf_id = tree.remove_at(index)?;
        Ok(moved_leaf_id.map(|moved| {
            let moved_ref = leaves[moved as usize];
            leaves[index as usize] = moved_ref;
            moved_ref
        }))
    }

    /// Removes the active collidable at `index`. If another collidable's leaf
    /// moved into the hole, returns its reference so the caller can repoint
    /// that collidable's stored `broad_phase_index` at `index`.
    pub fn remove_active_at(&mut self, index: i32) -> Result<Option<CollidableReference>> {
        Self::remove_at(&mut self.active_tree, &mut self.active_leaves, index)
    }

    pub fn remove_static_at(&mut self, index: i32) -> Result<Option<CollidableReference>> {
        Self::remove_at(&mut self.static_tree, &mut self.static_leaves, index)
    }

    fn update_bounds(tree: &mut Tree, index: i32, min_bound: crate::aabb::Vec3, max_bound: crate::aabb::Vec3) {
        let leaf = tree.leaf(index);
        let slot = tree.node_mut(leaf.node).child_mut(leaf.slot as usize);
        slot.min = min_bound;
        slot.max = max_bound;
        tree.refit_for_node_bounds_change(leaf.node);
    }

    pub fn update_active_bounds(&mut self, index: i32, min: crate::aabb::Vec3, max: crate::aabb::Vec3) {
        Self::update_bounds(&mut self.active_tree, index, min, max);
    }

    pub fn update_static_bounds(&mut self, index: i32, min: crate::aabb::Vec3, max: crate::aabb::Vec3) {
        Self::update_bounds(&mut self.static_tree, index, min, max);
    }

    /// Advances the frame counter and refits/refines both trees. Wraps
    /// `frame_index` from `i32::MAX` back to 0 rather than overflowing.
    pub fn update(&mut self) -> Result<()> {
        if self.frame_index == i32::MAX {
            self.frame_index = 0;
        }
        self.active_tree.refit_and_refine(self.frame_index, self.config)?;
        self.static_tree.refit_and_refine(self.frame_index, self.config)?;
        debug!(frame = self.frame_index, "broad phase update complete");
        self.frame_index += 1;
        Ok(())
    }

    /// Resets both trees to a single empty root, leaving backing storage in
    /// place for reuse.
    pub fn clear(&mut self) {
        self.active_tree.clear();
        self.static_tree.clear();
        self.active_leaves.clear();
        self.static_leaves.clear();
    }

    pub fn active_leaf_count(&self) -> i32 {
        self.active_tree.leaf_count()
    }

    pub fn static_leaf_count(&self) -> i32 {
        self.static_tree.leaf_count()
    }

    pub fn frame_index(&self) -> i32 {
        self.frame_index
    }

    /// Runs the active tree's self-overlap query, translating leaf ids to
    /// `CollidableReference`s before handing them to `handler`.
    pub fn get_active_self_overlaps<H: CollidablePairHandler>(&self, handler: &mut H) {
        let active_leaves = &self.active_leaves;
        self.active_tree.get_self_overlaps(&mut |a: i32, b: i32| {
            handler.handle(active_leaves[a as usize], active_leaves[b as usize]);
        });
    }

    /// Runs the raw leaf-id self-overlap query over the active tree, as
    /// `Tree::get_self_overlaps` would.
    pub fn get_self_overlaps<H: OverlapHandler>(&self, handler: &mut H) {
        self.active_tree.get_self_overlaps(handler);
    }
}

impl Default for BroadPhase {
    fn default() -> BroadPhase {
        BroadPhase::new()
    }
}

/// Receives one call per overlapping pair of active collidables, already
/// translated from leaf ids to `CollidableReference`s.
pub trait CollidablePairHandler {
    fn handle(&mut self, a: CollidableReference, b: CollidableReference);
}

impl<F: FnMut(CollidableReference, CollidableReference)> CollidablePairHandler for F {
    fn handle(&mut self, a: CollidableReference, b: CollidableReference) {
        self(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aabb::Vec3;
    use crate::collidable::CollidableMobility;

    fn aabb(min: (f32, f32, f32), max: (f32, f32, f32)) -> Aabb {
        Aabb::new(Vec3::new(min.0, min.1, min.2), Vec3::new(max.0, max.1, max.2))
    }

    #[test]
    fn add_and_remove_active_tracks_moved_leaf() {
        let mut phase = BroadPhase::with_capacity(8, 8);
        let r0 = CollidableReference::new(CollidableMobility::Dynamic, 0);
        let r1 = CollidableReference::new(CollidableMobility::Dynamic, 1);
        let r2 = CollidableReference::new(CollidableMobility::Dynamic, 2);
        phase.add_active(r0, aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
        phase.add_active(r1, aabb((2.0, 2.0, 2.0), (3.0, 3.0, 3.0)));
        phase.add_active(r2, aabb((5.0, 5.0, 5.0), (6.0, 6.0, 6.0)));

        let moved = phase.remove_active_at(0).unwrap();
        assert_eq!(moved, Some(r2));
        assert_eq!(phase.active_leaf_count(), 2);
    }

    #[test]
    fn update_then_overlap_reports_active_pair() {
        let mut phase = BroadPhase::with_capacity(8, 8);
        let r0 = CollidableReference::new(CollidableMobility::Dynamic, 10);
        let r1 = CollidableReference::new(CollidableMobility::Dynamic, 11);
        phase.add_active(r0, aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
        phase.add_active(r1, aabb((0.5, 0.5, 0.5), (1.5, 1.5, 1.5)));
        phase.update().unwrap();

        let mut pairs = Vec::new();
        phase.get_active_self_overlaps(&mut |a: CollidableReference, b: CollidableReference| {
            pairs.push((a, b));
        });
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn update_bounds_then_overlap_reflects_new_position() {
        let mut phase = BroadPhase::with_capacity(8, 8);
        let r0 = CollidableReference::new(CollidableMobility::Dynamic, 0);
        let r1 = CollidableReference::new(CollidableMobility::Dynamic, 1);
        phase.add_active(r0, aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
        phase.add_active(r1, aabb((0.5, 0.5, 0.5), (1.5, 1.5, 1.5)));

        phase.update_active_bounds(0, Vec3::new(10.0, 10.0, 10.0), Vec3::new(11.0, 11.0, 11.0));

        let mut count = 0;
        phase.get_self_overlaps(&mut |_a: i32, _b: i32| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn clear_empties_both_trees() {
        let mut phase = BroadPhase::with_capacity(8, 8);
        let r0 = CollidableReference::new(CollidableMobility::Static, 0);
        phase.add_static(r0, aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
        phase.clear();
        assert_eq!(phase.static_leaf_count(), 0);
        assert_eq!(phase.active_leaf_count(), 0);
    }
}
