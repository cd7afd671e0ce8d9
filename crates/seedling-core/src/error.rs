//! Error types for the seed graph driver.
//!
//! Uses `thiserror` for structured, matchable variants. Every failure is
//! fatal to the operation that raised it: nothing is retried and
//! `generate_code` never returns a partial result.

use crate::id::SeedId;
use thiserror::Error;

/// Errors produced by [`State`](crate::state::State) and the seed types.
#[derive(Debug, Error)]
pub enum StateError {
    /// Settings were missing or failed validation at construction.
    #[error("invalid settings: {reason}")]
    Config { reason: String },

    /// Assigning an id to a seed that already carries one.
    #[error("cannot register seed {id}: it is already registered")]
    AlreadyRegistered { id: SeedId },

    /// A graph operation was attempted on a type-only placeholder seed.
    #[error("unsupported operation on typed seed: {operation}")]
    Unsupported { operation: &'static str },

    /// No seed is stored at the given index.
    #[error("seed not found: {index}")]
    SeedNotFound { index: i32 },

    /// Binding, reading, or continuing past a seed that has no result yet.
    #[error("no compilation result set for seed {id}")]
    MissingResult { id: SeedId },

    /// The compilation result was written a second time.
    #[error("compilation result of seed {id} is already set")]
    ResultAlreadySet { id: SeedId },

    /// The seed's result was already rewritten by a binding.
    #[error("seed {id} is already bound to '{name}'")]
    AlreadyBound { id: SeedId, name: String },

    /// A seed's compile hook asked for an input key it has no edge for.
    #[error("seed {id} has no dependency '{key}'")]
    MissingDependency { id: SeedId, key: String },

    /// Traversal reached a seed whose compilation is still in progress.
    #[error("seed {id} re-entered while its continuation is pending")]
    ReentrantCompile { id: SeedId },

    /// `compile` returned without invoking its continuation.
    #[error("continuation never invoked when compiling seed {id}")]
    ContinuationNotInvoked { id: SeedId },

    /// `compile` invoked its continuation more than once.
    #[error("continuation invoked more than once when compiling seed {id}")]
    ContinuationInvokedTwice { id: SeedId },

    /// A compilation result was itself a seed.
    #[error("the result of seed {id} is seed {leaked}")]
    MalformedResult { id: SeedId, leaked: SeedId },

    /// Referents were read before `finalize`.
    #[error("state is not finalized")]
    NotFinalized,

    /// The graph was mutated, or finalized again, after `finalize`.
    #[error("state is already finalized")]
    AlreadyFinalized,

    /// `end_scope` was called with no open scope.
    #[error("no open scope to end")]
    NoOpenScope,

    /// Code generation was requested while scopes were still open.
    #[error("{open} scope(s) still open")]
    UnbalancedScopes { open: usize },

    /// A dependency edge points at an id with no stored seed.
    #[error("seed {from} depends on missing seed {to}")]
    DanglingDependency { from: SeedId, to: SeedId },

    /// The dependency graph contains a cycle.
    #[error("cyclic dependency through seed {id}")]
    CyclicDependency { id: SeedId },

    /// Registration would exceed the configured seed limit.
    #[error("seed limit of {limit} reached")]
    SeedLimit { limit: usize },
}
