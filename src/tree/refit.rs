// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use tracing::{trace, warn};

use crate::aabb::Aabb;
use crate::config::RefineConfig;
use crate::error::{BroadPhaseError, Result};

use super::refine::BinnedResources;
use super::Tree;

/// Pseudo-random offset multiplier/increment, chosen to distribute
/// refinement targets roughly uniformly across frames. Not a general-purpose
/// PRNG; purely a cheap frame-index scrambler.
const OFFSET_MULTIPLIER: i64 = 236_887_691;
const OFFSET_INCREMENT: i64 = 104_395_303;

impl Tree {
    /// Walks from `node_id` to the root, recomputing each ancestor's merged
    /// bounds. Leaf counts are untouched; call this after externally editing
    /// a leaf's bounds in place.
    pub fn refit_for_node_bounds_change(&mut self, mut node_id: i32) {
        loop {
            let parent = self.metanode(node_id).parent;
            if parent < 0 {
                return;
            }
            let index_in_parent = self.metanode(node_id).index_in_parent as usize;
            let node = *self.node(node_id);
            let merged = Aabb::merge(node.a.bounds(), node.b.bounds());
            self.node_mut(parent).child_mut(index_in_parent).set_bounds(merged);
            node_id = parent;
        }
    }

    /// Refit-only recursive helper. Recomputes `child`'s bounds from its own
    /// children (if interior) and returns the SAH-metric delta this subtree
    /// contributed, summed with its descendants' deltas.
    fn refit_and_measure(&mut self, node_id: i32) -> f32 {
        let node = *self.node(node_id);
        let pre = Aabb::merge(node.a.bounds(), node.b.bounds()).metric();

        let mut child_change = 0.0f32;
        for slot in 0..2usize {
            let child = *self.node(node_id).child(slot);
            if !child.is_leaf() && child.leaf_count > 0 {
                child_change += self.refit_and_measure(child.index);
            }
        }

        let node = *self.node(node_id);
        let merged = Aabb::merge(node.a.bounds(), node.b.bounds());
        let post = merged.metric();

        let parent = self.metanode(node_id).parent;
        if parent >= 0 {
            let index_in_parent = self.metanode(node_id).index_in_parent as usize;
            self.node_mut(parent).child_mut(index_in_parent).set_bounds(merged);
        }

        post - pre + child_change
    }

    fn refit_and_mark_recursive(&mut self, node_id: i32, threshold: i32, candidates: &mut Vec<i32>) -> f32 {
        let mut child_change = 0.0f32;
        for slot in 0..2usize {
            let child = *self.node(node_id).child(slot);
            if child.is_leaf() || child.leaf_count == 0 {
                continue;
            }
            if child.leaf_count <= threshold {
                candidates.push(child.index);
                child_change += self.refit_and_measure(child.index);
            } else {
                child_change += self.refit_and_mark_recursive(child.index, threshold, candidates);
            }
        }
        child_change
    }

    /// Root-level refit-and-mark pass: single post-order traversal collecting
    /// refinement candidates (interior nodes with `leaf_count <= threshold`)
    /// and returning the tree's normalized cost change.
    pub(crate) fn refit_and_mark(&mut self, threshold: i32, candidates: &mut Vec<i32>) -> f32 {
        debug_assert!(self.leaf_count > 2);
        let child_change = self.refit_and_mark_recursive(0, threshold, candidates);
        let root = *self.node(0);
        let merged = Aabb::merge(root.a.bounds(), root.b.bounds());
        let post_metric = merged.metric();
        if post_metric >= 1e-10 {
            child_change / post_metric
        } else {
            0.0
        }
    }

    fn refit_and_mark_tuning(&self) -> (i32, i32) {
        let leaf_count = self.leaf_count;
        let max_subtrees = ((leaf_count as f32).sqrt() as i32) * 3;
        let max_subtrees = max_subtrees.max(1);
        let estimated_candidates = (leaf_count * 2) / max_subtrees;
        let threshold = leaf_count.min(max_subtrees);
        (max_subtrees, estimated_candidates.max(1))
    }

    fn refine_tuning(
        frame_index: i32,
        candidates_count: i32,
        node_count: i32,
        refine_aggressiveness_scale: f32,
        cost_change: f32,
    ) -> (i32, i32, i32) {
        let refine_aggressiveness = (cost_change * refine_aggressiveness_scale).max(0.0);
        let refine_portion = (0.25 * refine_aggressiveness).min(1.0);
        let target_scale = (node_count as f32).min(
            (2.0f32).max((0.03 * candidates_count as f32).ceil()) + candidates_count as f32 * refine_portion,
        );
        let period = (1i32).max((candidates_count as f32 / target_scale) as i32);
        let offset = ((frame_index as i64 * OFFSET_MULTIPLIER + OFFSET_INCREMENT)
            % (candidates_count as i64).max(1)) as i32;
        let target_count = (candidates_count as f32).min(target_scale) as i32;
        (target_count, period, offset)
    }

    fn cache_optimize_tuning(&self, max_subtrees: i32, cost_change: f32, cache_aggressiveness_scale: f32) -> i32 {
        let leaf_count = self.leaf_count.max(1) as f32;
        let cache_optimize_aggressiveness = (cost_change * cache_aggressiveness_scale).max(0.0);
        let cache_optimize_portion =
            (0.03 + 85.0 * (max_subtrees as f32 / leaf_count) * cache_optimize_aggressiveness).min(1.0);
        (cache_optimize_portion * self.node_count as f32).ceil() as i32
    }

    /// Per-frame maintenance: refits bounds, schedules and runs binned
    /// treelet refinement, and (when wired in) cache optimization. No-op
    /// when `leaf_count <= 2`.
    pub fn refit_and_refine(&mut self, frame_index: i32, config: RefineConfig) -> Result<()> {
        if self.leaf_count <= 2 {
            return Ok(());
        }

        let (max_subtrees, _estimated) = self.refit_and_mark_tuning();
        let threshold = self.leaf_count.min(max_subtrees);

        let mut candidates = Vec::new();
        let cost_change = self.refit_and_mark(threshold, &mut candidates);

        if cost_change.is_nan() || cost_change.is_infinite() {
            warn!(cost_change, "tree bounds corrupted during refit");
            return Err(BroadPhaseError::BoundsCorrupted(
                "refit_and_mark produced a NaN or infinite cost change; check for NaN AABBs",
            ));
        }

        let candidates_count = candidates.len() as i32;
        let (target_count, period, offset) = Self::refine_tuning(
            frame_index,
            candidates_count.max(1),
            self.node_count,
            config.refine_aggressiveness_scale,
            cost_change,
        );

        let mut refinement_targets = Vec::new();
        if candidates_count > 0 {
            // `index` advances by `period` before each use, so the position
            // at exactly `offset` is never itself a target -- only
            // offset+period, offset+2*period, ... are.
            let mut index = offset;
            for _ in 0..(target_count - 1).max(0) {
                index += period;
                if index >= candidates_count {
                    index -= candidates_count;
                }
                let candidate_index = candidates[index as usize];
                debug_assert_eq!(
                    self.metanode(candidate_index).refine_flag,
                    0,
                    "refinement target search shouldn't run into the same node twice"
                );
                self.metanode_mut(candidate_index).refine_flag = 1;
                refinement_targets.push(candidate_index);
            }
        }
        if self.metanode(0).refine_flag == 0 {
            refinement_targets.push(0);
        }

        let mut resources = BinnedResources::new(max_subtrees as usize);
        for &target in &refinement_targets {
            self.binned_refine(target, max_subtrees as usize, &mut resources);
            self.metanode_mut(target).refine_flag = 0;
        }

        trace!(refined = refinement_targets.len(), cost_change, "refit_and_refine pass");

        #[cfg(any(debug_assertions, feature = "debug_validation"))]
        self.validate_bounds();

        let cache_optimize_count = self.cache_optimize_tuning(
            max_subtrees,
            cost_change,
            config.cache_optimize_aggressiveness_scale,
        );
        let _start = if self.node_count > 0 {
            ((frame_index as i64 * cache_optimize_count as i64) % self.node_count as i64) as i32
        } else {
            0
        };
        // Cache optimization is implemented (see `tree::cache`) but left out
        // of the default path behind the `cache_optimize` feature.
        #[cfg(feature = "cache_optimize")]
        {
            let end = (self.node_count).min(_start + cache_optimize_count);
            let mut i = _start;
            while i < end {
                self.incremental_cache_optimize(i);
                i += 1;
            }
        }

        Ok(())
    }
}
