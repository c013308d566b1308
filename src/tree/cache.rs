// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Node swap machinery for breadth-first cache-layout optimization.
//!
//! `incremental_cache_optimize` is not called from `Tree::refit_and_refine`'s
//! default path; it remains gated behind the `cache_optimize` feature until
//! its effect on the current refinement heuristic has been measured.

use super::Tree;

impl Tree {
    /// Exchanges node records `a` and `b` (and their metanodes), then fixes
    /// the two nodes' parents' downward child pointers and both nodes'
    /// children's upward pointers. Handles the case where one of the two is
    /// the other's parent.
    pub(crate) fn swap_nodes(&mut self, index_a: i32, index_b: i32) {
        self.nodes.swap(index_a as usize, index_b as usize);
        self.metanodes.swap(index_a as usize, index_b as usize);

        // After the swap, metanode[index_a] holds what used to be node b's
        // parent bookkeeping (and vice versa). If that parent pointed at the
        // node that just moved into the other slot, it needs to follow.
        if self.metanode(index_a).parent == index_a {
            self.metanode_mut(index_a).parent = index_b;
        } else if self.metanode(index_b).parent == index_b {
            self.metanode_mut(index_b).parent = index_a;
        }

        let parent_a = self.metanode(index_a).parent;
        let slot_a = self.metanode(index_a).index_in_parent as usize;
        self.node_mut(parent_a).child_mut(slot_a).index = index_a;

        let parent_b = self.metanode(index_b).parent;
        let slot_b = self.metanode(index_b).index_in_parent as usize;
        self.node_mut(parent_b).child_mut(slot_b).index = index_b;

        self.reparent_children_after_swap(index_a);
        self.reparent_children_after_swap(index_b);
    }

    fn reparent_children_after_swap(&mut self, node_id: i32) {
        for slot in 0..2usize {
            let child = *self.node(node_id).child(slot);
            if child.leaf_count == 0 {
                continue;
            }
            if child.is_leaf() {
                let leaf = &mut self.leaves[child.leaf_id() as usize];
                leaf.node = node_id;
                leaf.slot = slot as i32;
            } else {
                let meta = self.metanode_mut(child.index);
                meta.parent = node_id;
            }
        }
    }

    /// Pulls `node_id`'s interior children up to sit immediately after it in
    /// the arena, improving traversal locality. A no-op when `leaf_count <=
    /// 2` (there is nothing to converge, and it lets callers skip per-node
    /// child-count checks).
    #[allow(dead_code)]
    pub(crate) fn incremental_cache_optimize(&mut self, node_id: i32) {
        if self.leaf_count <= 2 {
            return;
        }

        let mut target_index = node_id + 1;
        for slot in 0..2usize {
            if target_index >= self.node_count {
                break;
            }
            let child = *self.node(node_id).child(slot);
            if child.is_leaf() {
                continue;
            }
            if child.index != target_index {
                self.swap_nodes(child.index, target_index);
            }
            let leaf_count = self.node(node_id).child(slot).leaf_count;
            target_index += leaf_count - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aabb::{Aabb, Vec3};

    fn aabb(min: (f32, f32, f32), max: (f32, f32, f32)) -> Aabb {
        Aabb::new(Vec3::new(min.0, min.1, min.2), Vec3::new(max.0, max.1, max.2))
    }

    #[test]
    fn cache_optimize_preserves_invariants_on_a_balanced_tree() {
        let mut tree = Tree::new(32);
        for i in 0..16 {
            let f = i as f32;
            tree.add(aabb((f, 0.0, 0.0), (f + 1.0, 1.0, 1.0)));
        }
        for node_id in 0..tree.node_count() {
            tree.incremental_cache_optimize(node_id);
        }
        #[cfg(any(debug_assertions, feature = "debug_validation"))]
        tree.validate_bounds();
    }

    #[test]
    fn cache_optimize_is_noop_below_three_leaves() {
        let mut tree = Tree::new(8);
        tree.add(aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
        tree.add(aabb((2.0, 2.0, 2.0), (3.0, 3.0, 3.0)));
        tree.incremental_cache_optimize(0);
        assert_eq!(tree.node_count(), 1);
    }
}
