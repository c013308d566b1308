// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use thiserror::Error;

/// Errors produced by tree and broad-phase operations.
///
/// Transient capacity shortfalls are never represented here: `Tree::add` and
/// friends grow their backing storage instead of failing.
#[derive(Debug, Error)]
pub enum BroadPhaseError {
    /// The caller passed an id/index this tree or broad phase does not own,
    /// or otherwise violated an API precondition (double remove, stale
    /// broad-phase index, and similar caller-side bugs).
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),

    /// `RefitAndRefine` observed a NaN or infinite cost change, meaning an
    /// upstream AABB fed into the tree is corrupt (commonly a NaN pose or
    /// velocity). The tree is left without applying further refinement for
    /// this call; callers cannot repair it and should clear and rebuild.
    #[error("tree bounds corrupted: {0}")]
    BoundsCorrupted(&'static str),
}

pub type Result<T> = std::result::Result<T, BroadPhaseError>;
