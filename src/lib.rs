// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A dynamic binary bounding-volume tree broad phase for real-time collision
//! detection.
//!
//! [`Tree`] is a self-balancing BVH over 3D [`Aabb`]s: incremental SAH-guided
//! insertion, bottom-up bounds refitting, and periodic binned-SAH treelet
//! refinement. [`BroadPhase`] wraps one `Tree` for active (dynamic/kinematic)
//! collidables and a second for static ones, exposing the per-frame
//! add/remove/update-bounds/update/query cycle a simulation loop drives it
//! through.
//!
//! This crate has no I/O, no persistence, and no internal concurrency: every
//! operation is meant to be driven from a single executor, once per
//! simulation frame.

pub mod aabb;
pub mod broadphase;
pub mod collidable;
pub mod config;
pub mod error;
pub mod tree;

pub use aabb::{Aabb, Vec3};
pub use broadphase::{BroadPhase, CollidablePairHandler};
pub use collidable::{CollidableMobility, CollidableReference};
pub use config::RefineConfig;
pub use error::{BroadPhaseError, Result};
pub use tree::query::OverlapHandler;
pub use tree::Tree;
