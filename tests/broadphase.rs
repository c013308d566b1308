// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use broadtree::{Aabb, BroadPhase, CollidableMobility, CollidableReference, Vec3};

fn aabb(min: (f32, f32, f32), max: (f32, f32, f32)) -> Aabb {
    Aabb::new(Vec3::new(min.0, min.1, min.2), Vec3::new(max.0, max.1, max.2))
}

/// Mirrors the body-store contract: a collidable carries its
/// `broad_phase_index`; on removal, if another leaf moved, the body store
/// looks up which collidable that was and repoints its own bookkeeping at
/// the hole. This test plays that contract out directly.
#[test]
fn remove_then_moved_leaf_reference_resolves_to_correct_collidable() {
    let mut phase = BroadPhase::with_capacity(8, 8);
    let handles: Vec<CollidableReference> = (0..5)
        .map(|h| CollidableReference::new(CollidableMobility::Dynamic, h))
        .collect();
    for (i, &h) in handles.iter().enumerate() {
        let f = i as f32;
        phase.add_active(h, aabb((f * 10.0, 0.0, 0.0), (f * 10.0 + 1.0, 1.0, 1.0)));
    }

    // Index 1 (handle 1) is removed; the last leaf (handle 4, at index 4)
    // should move into slot 1.
    let moved = phase.remove_active_at(1).unwrap();
    assert_eq!(moved, Some(handles[4]));
    assert_eq!(phase.active_leaf_count(), 4);
}

/// Active and static collidables live in independent trees; a body that only
/// ever touches the active tree must not affect static bookkeeping and vice
/// versa.
#[test]
fn active_and_static_trees_are_independent() {
    let mut phase = BroadPhase::with_capacity(8, 8);
    let dynamic_ref = CollidableReference::new(CollidableMobility::Dynamic, 1);
    let static_ref = CollidableReference::new(CollidableMobility::Static, 2);

    phase.add_active(dynamic_ref, aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
    phase.add_static(static_ref, aabb((5.0, 5.0, 5.0), (6.0, 6.0, 6.0)));

    assert_eq!(phase.active_leaf_count(), 1);
    assert_eq!(phase.static_leaf_count(), 1);

    phase.remove_static_at(0).unwrap();
    assert_eq!(phase.static_leaf_count(), 0);
    assert_eq!(phase.active_leaf_count(), 1);
}

/// The full per-frame cycle: an arbitrary sequence of Add/UpdateBounds, then
/// Update(frame_index), then GetSelfOverlaps. Add must precede any
/// UpdateBounds targeting its returned index, which this test respects by
/// updating bounds only after both adds have returned.
#[test]
fn full_frame_cycle_add_update_bounds_update_then_query() {
    let mut phase = BroadPhase::with_capacity(8, 8);
    let a = CollidableReference::new(CollidableMobility::Dynamic, 0);
    let b = CollidableReference::new(CollidableMobility::Dynamic, 1);

    let idx_a = phase.add_active(a, aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
    let idx_b = phase.add_active(b, aabb((50.0, 50.0, 50.0), (51.0, 51.0, 51.0)));

    // Move b so that it now overlaps a.
    phase.update_active_bounds(idx_b, Vec3::new(0.5, 0.5, 0.5), Vec3::new(1.5, 1.5, 1.5));
    let _ = idx_a;

    phase.update().unwrap();

    let mut pairs = Vec::new();
    phase.get_active_self_overlaps(&mut |x: CollidableReference, y: CollidableReference| {
        pairs.push((x, y));
    });
    assert_eq!(pairs.len(), 1);
}

/// Repeated Update calls across many frames must keep reporting the same
/// overlap set when no bounds change in between (idempotent refinement).
#[test]
fn repeated_updates_without_bounds_changes_keep_overlap_set_stable() {
    let mut phase = BroadPhase::with_capacity(64, 8);
    for i in 0..50 {
        let f = i as f32;
        let cref = CollidableReference::new(CollidableMobility::Dynamic, i);
        phase.add_active(cref, aabb((f, 0.0, 0.0), (f + 1.0, 1.0, 1.0)));
    }

    let mut first_count = None;
    for _ in 0..20 {
        phase.update().unwrap();
        let mut count = 0;
        phase.get_self_overlaps(&mut |_a: i32, _b: i32| count += 1);
        match first_count {
            None => first_count = Some(count),
            Some(expected) => assert_eq!(count, expected),
        }
    }
    assert_eq!(first_count, Some(49));
}

/// `Clear` must reset both trees to the documented empty state: zero leaves,
/// and a subsequent Add/overlap cycle must behave as if the phase were new.
#[test]
fn clear_resets_both_trees_and_broad_phase_is_reusable() {
    let mut phase = BroadPhase::with_capacity(8, 8);
    let r0 = CollidableReference::new(CollidableMobility::Dynamic, 0);
    let r1 = CollidableReference::new(CollidableMobility::Static, 1);
    phase.add_active(r0, aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
    phase.add_static(r1, aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
    phase.clear();

    assert_eq!(phase.active_leaf_count(), 0);
    assert_eq!(phase.static_leaf_count(), 0);

    let r2 = CollidableReference::new(CollidableMobility::Dynamic, 2);
    let idx = phase.add_active(r2, aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)));
    assert_eq!(idx, 0);
}
