//! Effect modes, scope boundary markers, and the binding policy.
//!
//! [`Mode`] is a three-point lattice ordered `Pure < Ordered < SideEffectful`
//! and joined by maximum. The binding policy in [`should_bind`] decides from a
//! seed's mode, boundary marker, explicit override and referent count whether
//! its result is materialized as a named local.

use serde::{Deserialize, Serialize};

/// Effect classification of a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    /// No effects; may be duplicated or reordered freely.
    #[default]
    Pure,
    /// Evaluation order matters (e.g. reads external mutable state) even
    /// though the seed does not itself mutate anything.
    Ordered,
    /// Mutates state or performs I/O; must be evaluated exactly once.
    SideEffectful,
}

impl Mode {
    /// Lattice join: the worse of the two modes.
    pub fn join(self, other: Mode) -> Mode {
        self.max(other)
    }
}

/// Scope boundary marker carried by every seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Boundary {
    #[default]
    Ordinary,
    /// Opens a scope. Has no standalone value and is never bound.
    Begin,
    /// Closes a region. Traversal stops after compiling it.
    End,
}

/// Decides whether a compiled seed should be bound to a local variable.
///
/// In priority order: an explicit override wins; a scope-begin seed is never
/// bound; otherwise `Pure` binds at two or more referents, `Ordered` at one
/// or more, and `SideEffectful` always.
pub fn should_bind(
    binding_override: Option<bool>,
    boundary: Boundary,
    mode: Mode,
    referent_count: usize,
) -> bool {
    if let Some(bind) = binding_override {
        return bind;
    }
    if boundary == Boundary::Begin {
        return false;
    }
    match mode {
        Mode::Pure => referent_count >= 2,
        Mode::Ordered => referent_count >= 1,
        Mode::SideEffectful => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_are_totally_ordered() {
        assert!(Mode::Pure < Mode::Ordered);
        assert!(Mode::Ordered < Mode::SideEffectful);
    }

    #[test]
    fn join_takes_the_maximum() {
        assert_eq!(Mode::Pure.join(Mode::Pure), Mode::Pure);
        assert_eq!(Mode::Pure.join(Mode::Ordered), Mode::Ordered);
        assert_eq!(Mode::SideEffectful.join(Mode::Ordered), Mode::SideEffectful);
        assert_eq!(Mode::Ordered.join(Mode::Pure), Mode::Ordered);
    }

    #[test]
    fn pure_binds_at_two_referents() {
        assert!(!should_bind(None, Boundary::Ordinary, Mode::Pure, 0));
        assert!(!should_bind(None, Boundary::Ordinary, Mode::Pure, 1));
        assert!(should_bind(None, Boundary::Ordinary, Mode::Pure, 2));
    }

    #[test]
    fn ordered_binds_at_one_referent() {
        assert!(!should_bind(None, Boundary::Ordinary, Mode::Ordered, 0));
        assert!(should_bind(None, Boundary::Ordinary, Mode::Ordered, 1));
    }

    #[test]
    fn side_effectful_always_binds() {
        assert!(should_bind(None, Boundary::Ordinary, Mode::SideEffectful, 0));
        assert!(should_bind(None, Boundary::End, Mode::SideEffectful, 0));
    }

    #[test]
    fn override_wins() {
        assert!(!should_bind(Some(false), Boundary::Ordinary, Mode::SideEffectful, 5));
        assert!(should_bind(Some(true), Boundary::Ordinary, Mode::Pure, 0));
        assert!(should_bind(Some(true), Boundary::Begin, Mode::Pure, 0));
    }

    #[test]
    fn scope_begin_is_never_bound() {
        for mode in [Mode::Pure, Mode::Ordered, Mode::SideEffectful] {
            for refs in 0..4 {
                assert!(!should_bind(None, Boundary::Begin, mode, refs));
            }
        }
    }

    #[test]
    fn serde_roundtrip() {
        for mode in [Mode::Pure, Mode::Ordered, Mode::SideEffectful] {
            let json = serde_json::to_string(&mode).unwrap();
            let back: Mode = serde_json::from_str(&json).unwrap();
            assert_eq!(mode, back);
        }
    }
}
