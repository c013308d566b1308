// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The dynamic binary bounding-volume tree.

pub mod cache;
pub mod insert;
pub mod node;
pub mod query;
pub mod refine;
pub mod refit;
pub mod remove;

use crate::aabb::Aabb;
use node::{Leaf, MetaNode, Node};

/// A single dynamic binary BVH over 3D AABBs.
///
/// Backed by three parallel arenas (`nodes`, `metanodes`, `leaves`). Node ids
/// and leaf ids are dense, non-negative `i32`s; node 0 is always the root,
/// even when the tree is empty.
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) metanodes: Vec<MetaNode>,
    pub(crate) leaves: Vec<Leaf>,
    pub(crate) node_count: i32,
    pub(crate) leaf_count: i32,
}

impl Tree {
    /// Allocate a tree with room for `initial_leaf_capacity` leaves (rounded
    /// up to a power of two), plus the matching interior-node capacity for a
    /// balanced binary tree of that many leaves.
    pub fn new(initial_leaf_capacity: i32) -> Tree {
        let leaf_cap = initial_leaf_capacity.max(1).next_power_of_two() as usize;
        let node_cap = leaf_cap.max(1);
        let mut tree = Tree {
            nodes: Vec::with_capacity(node_cap),
            metanodes: Vec::with_capacity(node_cap),
            leaves: Vec::with_capacity(leaf_cap),
            node_count: 0,
            leaf_count: 0,
        };
        tree.initialize_root();
        tree
    }

    fn initialize_root(&mut self) {
        self.nodes.clear();
        self.metanodes.clear();
        self.nodes.push(Node::empty());
        self.metanodes.push(MetaNode::root());
        self.node_count = 1;
    }

    pub fn leaf_count(&self) -> i32 {
        self.leaf_count
    }

    pub fn node_count(&self) -> i32 {
        self.node_count
    }

    /// Grow backing storage to at least `max(leaf_count, target_leaf_slots)`
    /// leaves worth of capacity. Never shrinks.
    pub fn resize(&mut self, target_leaf_slots: i32) {
        let target = target_leaf_slots.max(self.leaf_count).max(1) as usize;
        if self.leaves.capacity() < target {
            self.leaves.reserve(target - self.leaves.len());
        }
        let node_target = target.max(1);
        if self.nodes.capacity() < node_target {
            self.nodes.reserve(node_target - self.nodes.len());
            self.metanodes.reserve(node_target - self.metanodes.len());
        }
    }

    /// Reset to a single empty root, releasing no capacity.
    pub fn clear(&mut self) {
        self.leaves.clear();
        self.leaf_count = 0;
        self.initialize_root();
    }

    pub(crate) fn allocate_node(&mut self) -> i32 {
        let id = self.node_count;
        if (id as usize) >= self.nodes.len() {
            self.nodes.push(Node::empty());
            self.metanodes.push(MetaNode::empty());
        }
        self.node_count += 1;
        id
    }

    pub(crate) fn add_leaf(&mut self, node: i32, slot: i32) -> i32 {
        let id = self.leaf_count;
        if (id as usize) >= self.leaves.len() {
            self.leaves.push(Leaf::new(node, slot));
        } else {
            self.leaves[id as usize] = Leaf::new(node, slot);
        }
        self.leaf_count += 1;
        id
    }

    #[inline]
    pub(crate) fn node(&self, id: i32) -> &Node {
        &self.nodes[id as usize]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: i32) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    #[inline]
    pub(crate) fn metanode(&self, id: i32) -> &MetaNode {
        &self.metanodes[id as usize]
    }

    #[inline]
    pub(crate) fn metanode_mut(&mut self, id: i32) -> &mut MetaNode {
        &mut self.metanodes[id as usize]
    }

    #[inline]
    pub(crate) fn leaf(&self, id: i32) -> Leaf {
        self.leaves[id as usize]
    }

    pub(crate) fn compute_bounds_metric(bounds: Aabb) -> f32 {
        bounds.metric()
    }

    /// Validates every cross-invariant between nodes, metanodes, and leaves.
    /// Compiled in only under `debug_assertions` or the `debug_validation`
    /// feature; never runs in a default release build.
    #[cfg(any(debug_assertions, feature = "debug_validation"))]
    pub fn validate_bounds(&self) {
        if self.node_count == 0 {
            return;
        }
        assert_eq!(self.metanode(0).parent, -1);
        assert_eq!(self.metanode(0).index_in_parent, -1);
        for n in 0..self.node_count {
            let node = self.node(n);
            for slot in 0..2usize {
                let child = node.child(slot);
                if child.leaf_count == 0 {
                    continue;
                }
                if child.is_leaf() {
                    let leaf = self.leaf(child.leaf_id());
                    assert_eq!(leaf.node, n);
                    assert_eq!(leaf.slot, slot as i32);
                    assert_eq!(child.leaf_count, 1);
                } else {
                    let meta = self.metanode(child.index);
                    assert_eq!(meta.parent, n);
                    assert_eq!(meta.index_in_parent, slot as i32);
                }
            }
        }
    }
}
