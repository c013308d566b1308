// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use tracing::trace;

use crate::aabb::Aabb;
use crate::error::{BroadPhaseError, Result};

use super::node::{encode, NodeChild};
use super::Tree;

impl Tree {
    /// Removes the leaf with the given id, collapsing its now-singleton
    /// parent. Returns `Some(moved_leaf_id)` if another leaf (previously the
    /// last one) was relocated into the removed leaf's slot, else `None`.
    pub fn remove_at(&mut self, leaf_id: i32) -> Result<Option<i32>> {
        if leaf_id < 0 || leaf_id >= self.leaf_count {
            return Err(BroadPhaseError::ContractViolation(
                "remove_at called with an id this tree does not own",
            ));
        }

        let leaf = self.leaf(leaf_id);
        self.leaf_count -= 1;
        let moved = if leaf_id < self.leaf_count {
            let last = self.leaf(self.leaf_count);
            self.leaves[leaf_id as usize] = last;
            let owner = self.node_mut(last.node).child_mut(last.slot as usize);
            owner.index = encode(leaf_id);
            Some(self.leaf_count)
        } else {
            None
        };

        let node_id = leaf.node;
        let sibling_slot = (leaf.slot ^ 1) as usize;
        let sibling = *self.node(node_id).child(sibling_slot);
        let parent = self.metanode(node_id).parent;

        if parent >= 0 {
            let index_in_parent = self.metanode(node_id).index_in_parent;
            self.overwrite_parent_slot(parent, index_in_parent as usize, sibling);
            self.refit_for_removal(parent);
            self.remove_node_at(node_id);
        } else {
            self.collapse_into_root(sibling, leaf.slot as usize);
        }

        trace!(leaf_id, ?moved, "removed leaf");
        Ok(moved)
    }

    fn overwrite_parent_slot(&mut self, parent: i32, index_in_parent: usize, sibling: NodeChild) {
        *self.node_mut(parent).child_mut(index_in_parent) = sibling;
        if sibling.is_leaf() {
            let leaf = &mut self.leaves[sibling.leaf_id() as usize];
            leaf.node = parent;
            leaf.slot = index_in_parent as i32;
        } else {
            let meta = self.metanode_mut(sibling.index);
            meta.parent = parent;
            meta.index_in_parent = index_in_parent as i32;
        }
    }

    /// Root's parent has no slot to collapse into: the surviving sibling is
    /// promoted directly into the root's remaining structure.
    fn collapse_into_root(&mut self, sibling: NodeChild, removed_slot: usize) {
        if self.leaf_count == 0 {
            // nothing survives; root stays an empty node 0.
            return;
        }
        if sibling.is_leaf() {
            if removed_slot == 0 {
                // sibling already sits in slot 1; move it down to slot 0.
                let b = self.node(0).b;
                self.node_mut(0).a = b;
                let leaf = &mut self.leaves[self.node(0).a.leaf_id() as usize];
                leaf.node = 0;
                leaf.slot = 0;
            }
            // sibling was already in slot 0 with the removed leaf in slot 1, or
            // just moved there above: slot 1 no longer holds live data.
            self.node_mut(0).b = NodeChild::empty();
        } else {
            let sibling_index = sibling.index;
            *self.node_mut(0) = *self.node(sibling_index);
            let meta = self.metanode_mut(0);
            *meta = super::node::MetaNode::root();
            self.reparent_children(0);
            self.remove_node_at(sibling_index);
        }
    }

    fn reparent_children(&mut self, node_id: i32) {
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
                meta.index_in_parent = slot as i32;
            }
        }
    }

    /// Walks from `node_id` to the root, recomputing merged bounds and
    /// decrementing `leaf_count` along the way. Does not touch structure.
    pub(crate) fn refit_for_removal(&mut self, mut node_id: i32) {
        loop {
            let parent = self.metanode(node_id).parent;
            if parent < 0 {
                return;
            }
            let index_in_parent = self.metanode(node_id).index_in_parent as usize;
            let node = *self.node(node_id);
            let merged = Aabb::merge(node.a.bounds(), node.b.bounds());
            let slot = self.node_mut(parent).child_mut(index_in_parent);
            slot.set_bounds(merged);
            slot.leaf_count -= 1;
            node_id = parent;
        }
    }

    /// Swap-last removal of a node record. Fixes the moved node's parent's
    /// downward pointer and the moved node's children's upward pointers.
    pub(crate) fn remove_node_at(&mut self, node_id: i32) {
        self.node_count -= 1;
        if node_id < self.node_count {
            let last = self.node_count;
            self.nodes[node_id as usize] = self.nodes[last as usize];
            self.metanodes[node_id as usize] = self.metanodes[last as usize];

            let parent = self.metanode(node_id).parent;
            if parent >= 0 {
                let index_in_parent = self.metanode(node_id).index_in_parent as usize;
                self.node_mut(parent).child_mut(index_in_parent).index = node_id;
            }
            self.reparent_children(node_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aabb::Vec3;

    fn aabb(min: (f32, f32, f32), max: (f32, f32, f32)) -> Aabb {
        Aabb::new(Vec3::new(min.0, min.1, min.2), Vec3::new(max.0, max.1, max.2))
    }

    #[test]
    fn add_then_remove_returns_to_empty() {
        let mut tree = Tree::new(8);
        let leaf = tree.add(aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
        assert_eq!(tree.leaf_count(), 1);
        let moved = tree.remove_at(leaf).unwrap();
        assert_eq!(moved, None);
        assert_eq!(tree.leaf_count(), 0);
    }

    #[test]
    fn removing_out_of_range_id_is_contract_violation() {
        let mut tree = Tree::new(8);
        tree.add(aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
        assert!(tree.remove_at(5).is_err());
    }

    #[test]
    fn remove_middle_leaf_moves_last_leaf_into_its_slot() {
        let mut tree = Tree::new(8);
        let l0 = tree.add(aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
        let _l1 = tree.add(aabb((2.0, 2.0, 2.0), (3.0, 3.0, 3.0)));
        let _l2 = tree.add(aabb((5.0, 5.0, 5.0), (6.0, 6.0, 6.0)));
        assert_eq!(tree.leaf_count(), 3);
        let moved = tree.remove_at(l0).unwrap();
        assert_eq!(moved, Some(2));
        assert_eq!(tree.leaf_count(), 2);
    }

    #[test]
    fn remove_down_to_one_leaf_keeps_root_consistent() {
        let mut tree = Tree::new(8);
        let l0 = tree.add(aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
        let l1 = tree.add(aabb((2.0, 2.0, 2.0), (3.0, 3.0, 3.0)));
        tree.remove_at(l1).unwrap();
        assert_eq!(tree.leaf_count(), 1);
        let l2 = tree.add(aabb((9.0, 9.0, 9.0), (10.0, 10.0, 10.0)));
        assert_eq!(l0, 0);
        assert_eq!(tree.leaf_count(), 2);
        let _ = l2;
    }
}
