// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::aabb::Aabb;
use tracing::trace;

use super::node::NodeChild;
use super::Tree;

enum InsertionChoice {
    Traverse,
    NewInternal,
}

struct BestInsertion {
    choice: InsertionChoice,
    merged: Aabb,
    cost_change: f32,
}

/// Bit-twiddling leading-zero-count helper used as a depth proxy in the
/// insertion cost heuristic: a node holding `x` leaves is treated as roughly
/// `31 - floor(log2(x))` levels from the bottom of a balanced binary tree of
/// that size. Decreasing in `x`, not increasing -- ported bit-for-bit rather
/// than expressed as a closed-form log2, since the two diverge exactly at
/// powers of two.
fn get_containing_power_of_2(x: i32) -> i32 {
    let mut n = 32i32;
    let mut x = x as u32;

    let mut y = x >> 16;
    if y != 0 {
        n -= 16;
        x = y;
    }
    y = x >> 8;
    if y != 0 {
        n -= 8;
        x = y;
    }
    y = x >> 4;
    if y != 0 {
        n -= 4;
        x = y;
    }
    y = x >> 2;
    if y != 0 {
        n -= 2;
        x = y;
    }
    y = x >> 1;
    if y != 0 {
        return n - 2;
    }
    n - x as i32
}

fn compute_best_insertion_choice(child: &NodeChild, new_bounds: Aabb, new_leaf_cost: f32) -> BestInsertion {
    let merged = Aabb::merge(child.bounds(), new_bounds);
    let new_metric = merged.metric();
    if child.is_leaf() {
        BestInsertion {
            choice: InsertionChoice::NewInternal,
            merged,
            cost_change: new_metric,
        }
    } else {
        let mut cost_change = new_metric - child.bounds().metric();
        cost_change += get_containing_power_of_2(child.leaf_count) as f32 * new_leaf_cost.max(cost_change);
        BestInsertion {
            choice: InsertionChoice::Traverse,
            merged,
            cost_change,
        }
    }
}

impl Tree {
    /// Insert a new AABB, returning its leaf id.
    pub fn add(&mut self, bounds: Aabb) -> i32 {
        if self.leaves.len() == self.leaf_count as usize {
            self.resize(self.leaf_count + 1);
        }

        if self.leaf_count < 2 {
            let slot = self.leaf_count;
            let leaf_id = self.add_leaf(0, slot);
            let root = self.node_mut(0);
            let child = root.child_mut(slot as usize);
            child.set_bounds(bounds);
            child.index = super::node::encode(leaf_id);
            child.leaf_count = 1;
            trace!(leaf_id, slot, "inserted into empty root slot");
            return leaf_id;
        }

        let new_leaf_cost = bounds.metric();
        let mut node_id = 0i32;
        loop {
            let node = self.node(node_id);
            let a = compute_best_insertion_choice(&node.a, bounds, new_leaf_cost);
            let b = compute_best_insertion_choice(&node.b, bounds, new_leaf_cost);

            let (slot, choice) = if a.cost_change <= b.cost_change {
                (0usize, a)
            } else {
                (1usize, b)
            };

            match choice.choice {
                InsertionChoice::Traverse => {
                    let target = self.node(node_id).child(slot).index;
                    let child = self.node_mut(node_id).child_mut(slot);
                    child.set_bounds(choice.merged);
                    child.leaf_count += 1;
                    node_id = target;
                }
                InsertionChoice::NewInternal => {
                    return self.merge_leaf_nodes(bounds, node_id, slot, choice.merged);
                }
            }
        }
    }

    /// Splits a leaf child into a new internal node holding the old leaf and
    /// the freshly inserted leaf, updating the parent's slot in place.
    fn merge_leaf_nodes(&mut self, new_bounds: Aabb, parent: i32, slot_in_parent: usize, merged: Aabb) -> i32 {
        let old_child = *self.node(parent).child(slot_in_parent);
        let new_node = self.allocate_node();

        {
            let node = self.node_mut(new_node);
            node.a = old_child;
        }
        if old_child.is_leaf() {
            let old_leaf_id = old_child.leaf_id();
            let leaf = self.leaves.get_mut(old_leaf_id as usize).unwrap();
            leaf.node = new_node;
            leaf.slot = 0;
        } else {
            let meta = self.metanode_mut(old_child.index);
            meta.parent = new_node;
            meta.index_in_parent = 0;
        }

        let new_leaf_id = self.add_leaf(new_node, 1);
        {
            let node = self.node_mut(new_node);
            let b = &mut node.b;
            b.set_bounds(new_bounds);
            b.index = super::node::encode(new_leaf_id);
            b.leaf_count = 1;
        }

        {
            let parent_child = self.node_mut(parent).child_mut(slot_in_parent);
            parent_child.set_bounds(merged);
            parent_child.index = new_node;
            parent_child.leaf_count = 2;
        }
        let meta = self.metanode_mut(new_node);
        meta.parent = parent;
        meta.index_in_parent = slot_in_parent as i32;

        trace!(new_leaf_id, new_node, parent, "merged leaf into new internal node");
        new_leaf_id
    }
}
