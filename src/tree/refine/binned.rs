// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Binned surface-area-heuristic treelet rebuilding.
//!
//! `BinnedRefine` collects a bounded treelet (`Tree::collect_subtrees`),
//! rebuilds it top-down into a scratch "staging" tree using a binned SAH
//! sweep, and unconditionally reifies the staged layout back into the real
//! arena -- even if the staged cost is worse than before. Accepting local
//! regressions avoids getting stuck in a suboptimal local minimum.

use crate::aabb::{Aabb, Vec3};

use super::super::node::{encode, NodeChild};
use super::super::Tree;

const MAXIMUM_BIN_COUNT: usize = 64;
const DEGENERATE_EPSILON: f32 = 1e-12;

/// Scratch buffers reused across `BinnedRefine` calls for one frame's worth
/// of refinement targets, sized to `maximum_subtrees`.
pub(crate) struct BinnedResources {
    bounds: Vec<Aabb>,
    centroids: Vec<Vec3>,
    leaf_counts: Vec<i32>,
    index_map: Vec<usize>,
}

impl BinnedResources {
    pub(crate) fn new(capacity: usize) -> BinnedResources {
        BinnedResources {
            bounds: Vec::with_capacity(capacity),
            centroids: Vec::with_capacity(capacity),
            leaf_counts: Vec::with_capacity(capacity),
            index_map: Vec::with_capacity(capacity),
        }
    }
}

/// A node in the scratch staging tree: children reference either another
/// staging node (by index into `staging_nodes`) or a collected subtree (by
/// sign-encoded index into the `subtrees` array).
#[derive(Debug, Clone, Copy)]
struct StagingChild {
    bounds: Aabb,
    leaf_count: i32,
    /// `>= 0`: index into `staging_nodes`. `< 0`: encoded subtree index.
    reference: i32,
}

impl StagingChild {
    fn empty() -> StagingChild {
        StagingChild {
            bounds: Aabb::empty(),
            leaf_count: 0,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StagingNode {
    a: StagingChild,
    b: StagingChild,
}

impl Tree {
    pub(crate) fn binned_refine(&mut self, root: i32, max_subtrees: usize, resources: &mut BinnedResources) {
        let mut subtrees = Vec::new();
        let mut internals = Vec::new();
        self.collect_subtrees(root, max_subtrees, &mut subtrees, &mut internals);

        resources.bounds.clear();
        resources.centroids.clear();
        resources.leaf_counts.clear();
        resources.index_map.clear();

        for &entry in &subtrees {
            let (bounds, leaf_count) = self.subtree_bounds_and_count(entry);
            resources.bounds.push(bounds);
            resources.centroids.push(bounds.centroid());
            resources.leaf_counts.push(leaf_count);
            resources.index_map.push(resources.index_map.len());
        }

        let mut staging_nodes: Vec<StagingNode> = Vec::new();
        create_staging_node_binned(resources, 0, subtrees.len(), &mut staging_nodes);

        // Unconditional commit: see module docs.
        let mut next_internal = 0usize;
        self.reify_staging_nodes(root, &staging_nodes, &subtrees, &internals, &mut next_internal);

        #[cfg(any(debug_assertions, feature = "debug_validation"))]
        self.validate_bounds();
    }

    /// Looks up a collected-subtree entry's current bounds/leaf_count from
    /// its owning parent's slot (for interior nodes, via its metanode; for
    /// leaves, via the leaf back-pointer).
    fn subtree_bounds_and_count(&self, entry: i32) -> (Aabb, i32) {
        if entry >= 0 {
            let meta = self.metanode(entry);
            let slot = self.node(meta.parent).child(meta.index_in_parent as usize);
            (slot.bounds(), slot.leaf_count)
        } else {
            let leaf_id = encode(entry);
            let leaf = self.leaf(leaf_id);
            let slot = self.node(leaf.node).child(leaf.slot as usize);
            (slot.bounds(), 1)
        }
    }

    fn reify_staging_nodes(
        &mut self,
        treelet_root: i32,
        staging_nodes: &[StagingNode],
        subtrees: &[i32],
        internals: &[i32],
        next_internal: &mut usize,
    ) {
        let staged_root = staging_nodes[0];
        {
            let node = self.node_mut(treelet_root);
            node.a = NodeChild {
                min: staged_root.a.bounds.min,
                max: staged_root.a.bounds.max,
                index: 0,
                leaf_count: staged_root.a.leaf_count,
            };
            node.b = NodeChild {
                min: staged_root.b.bounds.min,
                max: staged_root.b.bounds.max,
                index: 0,
                leaf_count: staged_root.b.leaf_count,
            };
        }
        self.reify_children(treelet_root, 0, staging_nodes, subtrees, internals, next_internal);
    }

    fn reify_children(
        &mut self,
        internal_node: i32,
        staging_index: usize,
        staging_nodes: &[StagingNode],
        subtrees: &[i32],
        internals: &[i32],
        next_internal: &mut usize,
    ) {
        let staged = staging_nodes[staging_index];
        for (slot, staged_child) in [(0usize, staged.a), (1usize, staged.b)] {
            if staged_child.leaf_count == 0 {
                continue;
            }
            if staged_child.reference >= 0 {
                let new_node = internals[*next_internal];
                *next_internal += 1;
                self.reify_staging_node(
                    internal_node,
                    slot,
                    new_node,
                    staged_child.reference as usize,
                    staging_nodes,
                    subtrees,
                    internals,
                    next_internal,
                );
                self.node_mut(internal_node).child_mut(slot).index = new_node;
            } else {
                let real = subtrees[encode(staged_child.reference) as usize];
                self.node_mut(internal_node).child_mut(slot).index = real;
                if real >= 0 {
                    let meta = self.metanode_mut(real);
                    meta.parent = internal_node;
                    meta.index_in_parent = slot as i32;
                } else {
                    let leaf_id = encode(real);
                    let leaf = &mut self.leaves[leaf_id as usize];
                    leaf.node = internal_node;
                    leaf.slot = slot as i32;
                }
            }
        }
    }

    fn reify_staging_node(
        &mut self,
        parent: i32,
        index_in_parent: usize,
        new_node: i32,
        staging_index: usize,
        staging_nodes: &[StagingNode],
        subtrees: &[i32],
        internals: &[i32],
        next_internal: &mut usize,
    ) {
        let staged = staging_nodes[staging_index];
        {
            let node = self.node_mut(new_node);
            node.a = NodeChild {
                min: staged.a.bounds.min,
                max: staged.a.bounds.max,
                index: 0,
                leaf_count: staged.a.leaf_count,
            };
            node.b = NodeChild {
                min: staged.b.bounds.min,
                max: staged.b.bounds.max,
                index: 0,
                leaf_count: staged.b.leaf_count,
            };
        }
        {
            let meta = self.metanode_mut(new_node);
            meta.parent = parent;
            meta.index_in_parent = index_in_parent as i32;
            meta.refine_flag = 0;
        }
        self.reify_children(new_node, staging_index, staging_nodes, subtrees, internals, next_internal);
    }
}

/// Top-down builder: writes one `StagingNode` for `[start, start+count)` and
/// returns its index in `staging_nodes`. For `count <= 2` the two subtree
/// entries become direct leaf-refs with zero additional cost.
fn create_staging_node_binned(
    resources: &mut BinnedResources,
    start: usize,
    count: usize,
    staging_nodes: &mut Vec<StagingNode>,
) -> usize {
    if count <= 2 {
        let a_local = resources.index_map[start];
        let b_local = resources.index_map[start + (count - 1).min(1)];
        let node = StagingNode {
            a: StagingChild {
                bounds: resources.bounds[a_local],
                leaf_count: resources.leaf_counts[a_local],
                reference: encode(a_local as i32),
            },
            b: if count == 2 {
                StagingChild {
                    bounds: resources.bounds[b_local],
                    leaf_count: resources.leaf_counts[b_local],
                    reference: encode(b_local as i32),
                }
            } else {
                StagingChild::empty()
            },
        };
        staging_nodes.push(node);
        return staging_nodes.len() - 1;
    }
    split_subtrees_into_children_binned(resources, start, count, staging_nodes)
}

fn split_subtrees_into_children_binned(
    resources: &mut BinnedResources,
    start: usize,
    count: usize,
    staging_nodes: &mut Vec<StagingNode>,
) -> usize {
    let (split, a_bounds, b_bounds, leaf_count_a, leaf_count_b) =
        find_partition_binned_mut(resources, start, count);

    let reserved = staging_nodes.len();
    staging_nodes.push(StagingNode {
        a: StagingChild::empty(),
        b: StagingChild::empty(),
    });

    let count_a = split - start;
    let count_b = count - count_a;

    let a = if count_a > 1 {
        let child_index = create_staging_node_binned(resources, start, count_a, staging_nodes);
        StagingChild {
            bounds: a_bounds,
            leaf_count: leaf_count_a,
            reference: child_index as i32,
        }
    } else {
        let local = resources.index_map[start];
        StagingChild {
            bounds: a_bounds,
            leaf_count: leaf_count_a,
            reference: encode(local as i32),
        }
    };

    let b = if count_b > 1 {
        let child_index = create_staging_node_binned(resources, split, count_b, staging_nodes);
        StagingChild {
            bounds: b_bounds,
            leaf_count: leaf_count_b,
            reference: child_index as i32,
        }
    } else {
        let local = resources.index_map[split];
        StagingChild {
            bounds: b_bounds,
            leaf_count: leaf_count_b,
            reference: encode(local as i32),
        }
    };

    staging_nodes[reserved] = StagingNode { a, b };
    reserved
}

/// The core binned-SAH sweep over `[start, start+count)`. Returns the object
/// index to split at (translated from bin index) plus each side's merged
/// bounds and leaf count. `resources.index_map[start..start+count)` is
/// reordered in place so objects left of the split precede those right.
fn find_partition_binned_mut(
    resources: &mut BinnedResources,
    start: usize,
    count: usize,
) -> (usize, Aabb, Aabb, i32, i32) {
    let items: Vec<usize> = resources.index_map[start..start + count].to_vec();

    let mut centroid_min = Vec3::splat(f32::INFINITY);
    let mut centroid_max = Vec3::splat(f32::NEG_INFINITY);
    for &i in &items {
        let c = resources.centroids[i];
        centroid_min = centroid_min.min(c);
        centroid_max = centroid_max.max(c);
    }
    let span = centroid_max.sub(centroid_min);

    if span.x.abs() < DEGENERATE_EPSILON && span.y.abs() < DEGENERATE_EPSILON && span.z.abs() < DEGENERATE_EPSILON {
        let mid = count / 2;
        let (a_bounds, leaf_count_a) = merge_range(resources, &items[..mid]);
        let (b_bounds, leaf_count_b) = merge_range(resources, &items[mid..]);
        return (start + mid, a_bounds, b_bounds, leaf_count_a, leaf_count_b);
    }

    let bin_count = (((count as f32) * 0.25).max(2.0) as usize).min(MAXIMUM_BIN_COUNT);

    let inv_bin_size = Vec3::new(
        if span.x > DEGENERATE_EPSILON { bin_count as f32 / span.x } else { 0.0 },
        if span.y > DEGENERATE_EPSILON { bin_count as f32 / span.y } else { 0.0 },
        if span.z > DEGENERATE_EPSILON { bin_count as f32 / span.z } else { 0.0 },
    );

    let bin_of = |c: Vec3, axis: usize| -> usize {
        let (v, min_v, inv) = match axis {
            0 => (c.x, centroid_min.x, inv_bin_size.x),
            1 => (c.y, centroid_min.y, inv_bin_size.y),
            _ => (c.z, centroid_min.z, inv_bin_size.z),
        };
        (((v - min_v) * inv) as usize).min(bin_count - 1)
    };

    // Bin each axis independently, then sweep every axis's boundary `i` in
    // lockstep so the three axes' candidate costs at the same boundary are
    // compared to each other before any of them is compared to the running
    // global best. The per-boundary winner is chosen via a non-associative
    // `X<Y && X<Z` / `else Y<Z` / `else Z` chain, not a three-way `min_by` --
    // on an exact tie this changes which axis wins, which in turn changes
    // which boundary can ever reach the global best.
    let mut bounds_bins: [Vec<Aabb>; 3] = [
        vec![Aabb::empty(); bin_count],
        vec![Aabb::empty(); bin_count],
        vec![Aabb::empty(); bin_count],
    ];
    let mut leaf_bins: [Vec<i32>; 3] = [vec![0; bin_count], vec![0; bin_count], vec![0; bin_count]];

    for axis in 0..3usize {
        for &i in &items {
            let bin = bin_of(resources.centroids[i], axis);
            bounds_bins[axis][bin] = Aabb::merge(bounds_bins[axis][bin], resources.bounds[i]);
            leaf_bins[axis][bin] += resources.leaf_counts[i];
        }
    }

    // Prefix sweep: a_merged[axis][i]/a_leaf[axis][i] is the merge of bins [0, i].
    let mut a_merged: [Vec<Aabb>; 3] = [
        vec![Aabb::empty(); bin_count],
        vec![Aabb::empty(); bin_count],
        vec![Aabb::empty(); bin_count],
    ];
    let mut a_leaf: [Vec<i32>; 3] = [vec![0; bin_count], vec![0; bin_count], vec![0; bin_count]];
    for axis in 0..3usize {
        a_merged[axis][0] = bounds_bins[axis][0];
        a_leaf[axis][0] = leaf_bins[axis][0];
        for (i, bounds, leaf) in itertools::izip!(1..bin_count, &bounds_bins[axis][1..], &leaf_bins[axis][1..]) {
            a_merged[axis][i] = Aabb::merge(a_merged[axis][i - 1], *bounds);
            a_leaf[axis][i] = a_leaf[axis][i - 1] + leaf;
        }
    }

    let mut b_merged = [Aabb::empty(); 3];
    let mut b_leaf = [0i32; 3];
    let mut best: Option<(usize, usize, f32)> = None; // (axis, bin_boundary, cost)

    for boundary in (1..bin_count).rev() {
        let a_index = boundary - 1;
        let mut cost = [f32::MAX; 3];
        for axis in 0..3usize {
            b_merged[axis] = Aabb::merge(b_merged[axis], bounds_bins[axis][boundary]);
            b_leaf[axis] += leaf_bins[axis][boundary];

            let leaf_a = a_leaf[axis][a_index];
            if leaf_a > 0 && b_leaf[axis] > 0 {
                cost[axis] = leaf_a as f32 * a_merged[axis][a_index].metric() + b_leaf[axis] as f32 * b_merged[axis].metric();
            }
        }

        let winning_axis = if cost[0] < cost[1] && cost[0] < cost[2] {
            0
        } else if cost[1] < cost[2] {
            1
        } else {
            2
        };
        let winning_cost = cost[winning_axis];

        let better = match best {
            None => true,
            Some((_, _, best_cost)) => winning_cost < best_cost,
        };
        if better {
            best = Some((winning_axis, boundary, winning_cost));
        }
    }

    let (best_axis, best_boundary, _) = best.unwrap_or((0, count / 2, 0.0));

    // Reorder index_map so items left of best_boundary precede items right,
    // per the chosen axis's bin assignment.
    let mut left: Vec<usize> = Vec::with_capacity(count);
    let mut right: Vec<usize> = Vec::with_capacity(count);
    for &i in &items {
        let bin = bin_of(resources.centroids[i], best_axis);
        if bin < best_boundary {
            left.push(i);
        } else {
            right.push(i);
        }
    }
    // Degenerate sweep can occasionally leave one side empty (e.g. every
    // item in the same bin); fall back to an even split rather than
    // producing a zero-size child.
    if left.is_empty() || right.is_empty() {
        let mid = count / 2;
        let mut combined = left;
        combined.extend(right);
        left = combined[..mid].to_vec();
        right = combined[mid..].to_vec();
    }

    let split = start + left.len();
    let (a_bounds, leaf_count_a) = merge_range(resources, &left);
    let (b_bounds, leaf_count_b) = merge_range(resources, &right);

    // Rebuild the real index map: objects assigned to the left side precede
    // those on the right.
    let mut new_order = Vec::with_capacity(count);
    new_order.extend(left);
    new_order.extend(right);
    resources.index_map[start..start + count].copy_from_slice(&new_order);

    (split, a_bounds, b_bounds, leaf_count_a, leaf_count_b)
}

fn merge_range(resources: &BinnedResources, items: &[usize]) -> (Aabb, i32) {
    let mut bounds = Aabb::empty();
    let mut leaf_count = 0i32;
    for &i in items {
        bounds = Aabb::merge(bounds, resources.bounds[i]);
        leaf_count += resources.leaf_counts[i];
    }
    (bounds, leaf_count)
}
