//! Stable seed identifiers.
//!
//! A [`SeedId`] doubles as the seed's index in the [`State`](crate::state::State)
//! storage. Non-negative ids address seeds registered during generation, in
//! registration order starting at 0. Negative ids address pre-existing seeds
//! supplied before generation began.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Seed identifier, assigned exactly once when the seed enters a `State`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeedId(pub i32);

impl SeedId {
    /// Id reported by seeds that have not been registered yet.
    pub const UNDEFINED: SeedId = SeedId(i32::MIN);

    /// Returns `true` if this id addresses a pre-existing seed.
    pub fn is_preexisting(self) -> bool {
        self.0 < 0
    }

    /// The id that follows this one in traversal order.
    pub fn next(self) -> SeedId {
        SeedId(self.0 + 1)
    }
}

impl fmt::Display for SeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == SeedId::UNDEFINED {
            return write!(f, "undefined");
        }
        write!(f, "{}", self.0)
    }
}

// Bridge to petgraph indices for the diagnostic dependency view. The view
// numbers nodes from the lowest id, so the offset is supplied by the caller.

pub(crate) fn node_index(id: SeedId, lower: i32) -> NodeIndex<u32> {
    NodeIndex::new((id.0 - lower) as usize)
}
