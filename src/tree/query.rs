// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Self-overlap queries: walking the tree to find every pair of leaves whose
//! bounds intersect, each reported exactly once.

use crate::aabb::Aabb;

use super::node::{Node, NodeChild};
use super::Tree;

/// Receives one call per overlapping leaf pair found by `Tree::get_self_overlaps`.
/// Pairs are unordered and each is reported exactly once.
pub trait OverlapHandler {
    fn handle(&mut self, leaf_a: i32, leaf_b: i32);
}

impl<F: FnMut(i32, i32)> OverlapHandler for F {
    fn handle(&mut self, leaf_a: i32, leaf_b: i32) {
        self(leaf_a, leaf_b)
    }
}

impl Tree {
    /// Finds every overlapping pair of leaves and reports each once via `handler`.
    /// No-op when `leaf_count < 2` -- this also guarantees every internal node
    /// `get_overlaps_in_node` visits has both children populated.
    pub fn get_self_overlaps<H: OverlapHandler>(&self, handler: &mut H) {
        if self.leaf_count < 2 {
            return;
        }
        self.get_overlaps_in_node(self.node(0), handler);
    }

    fn get_overlaps_in_node<H: OverlapHandler>(&self, node: &Node, handler: &mut H) {
        let (a, b) = (node.a, node.b);
        let ab_intersects = Aabb::intersects(a.bounds(), b.bounds());

        if !a.is_leaf() {
            self.get_overlaps_in_node(self.node(a.index), handler);
        }
        if !b.is_leaf() {
            self.get_overlaps_in_node(self.node(b.index), handler);
        }

        if ab_intersects {
            self.dispatch_test_for_nodes(a, b, handler);
        }
    }

    fn dispatch_test_for_nodes<H: OverlapHandler>(&self, a: NodeChild, b: NodeChild, handler: &mut H) {
        match (a.is_leaf(), b.is_leaf()) {
            (false, false) => {
                self.get_overlaps_between_different_nodes(self.node(a.index), self.node(b.index), handler);
            }
            (false, true) => {
                self.test_leaf_against_node(b.leaf_id(), b.bounds(), a.index, handler);
            }
            (true, false) => {
                self.test_leaf_against_node(a.leaf_id(), a.bounds(), b.index, handler);
            }
            (true, true) => {
                handler.handle(a.leaf_id(), b.leaf_id());
            }
        }
    }

    /// Neither node shares a child with the other, so all four cross-pairs
    /// of (a's children) x (b's children) must be tested.
    fn get_overlaps_between_different_nodes<H: OverlapHandler>(&self, a: &Node, b: &Node, handler: &mut H) {
        let (aa, ab, ba, bb) = (a.a, a.b, b.a, b.b);
        if Aabb::intersects(aa.bounds(), ba.bounds()) {
            self.dispatch_test_for_nodes(aa, ba, handler);
        }
        if Aabb::intersects(aa.bounds(), bb.bounds()) {
            self.dispatch_test_for_nodes(aa, bb, handler);
        }
        if Aabb::intersects(ab.bounds(), ba.bounds()) {
            self.dispatch_test_for_nodes(ab, ba, handler);
        }
        if Aabb::intersects(ab.bounds(), bb.bounds()) {
            self.dispatch_test_for_nodes(ab, bb, handler);
        }
    }

    fn test_leaf_against_node<H: OverlapHandler>(&self, leaf_id: i32, leaf_bounds: Aabb, node_id: i32, handler: &mut H) {
        let node = *self.node(node_id);
        for slot in 0..2usize {
            let child = *node.child(slot);
            if child.leaf_count == 0 {
                continue;
            }
            if Aabb::intersects(leaf_bounds, child.bounds()) {
                self.dispatch_test_for_leaf(leaf_id, leaf_bounds, child, handler);
            }
        }
    }

    fn dispatch_test_for_leaf<H: OverlapHandler>(&self, leaf_id: i32, leaf_bounds: Aabb, child: NodeChild, handler: &mut H) {
        if child.is_leaf() {
            handler.handle(leaf_id, child.leaf_id());
        } else {
            self.test_leaf_against_node(leaf_id, leaf_bounds, child.index, handler);
        }
    }
}
