//! Dependency edges and their computed inverse.
//!
//! Every seed owns a [`Dependencies`] map of forward edges. An edge is either
//! a data edge (the seed consumes the target's result) or a synthetic
//! ordering edge that only forces the target to be emitted first.
//!
//! [`Referents`] is the inverse relation. It is filled once per seed during
//! [`State::finalize`](crate::state::State::finalize) and is read-only
//! afterwards; its count is the only numeric input to the binding policy.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::SeedId;

/// Key of a forward edge within one seed's dependency map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepKey {
    /// Positional data input.
    Arg(u16),
    /// Named data input.
    Named(String),
    /// Synthetic ordering edge. The number is local to the owning seed.
    Ordering(u32),
}

impl DepKey {
    /// Returns the kind of edge this key denotes.
    pub fn kind(&self) -> EdgeKind {
        match self {
            DepKey::Arg(_) | DepKey::Named(_) => EdgeKind::Data,
            DepKey::Ordering(_) => EdgeKind::Ordering,
        }
    }

    /// Returns `true` for data edges.
    pub fn is_data(&self) -> bool {
        self.kind() == EdgeKind::Data
    }

    /// Returns `true` for synthetic ordering edges.
    pub fn is_ordering(&self) -> bool {
        self.kind() == EdgeKind::Ordering
    }
}

impl std::fmt::Display for DepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepKey::Arg(i) => write!(f, "#{i}"),
            DepKey::Named(name) => write!(f, "{name}"),
            DepKey::Ordering(n) => write!(f, "~{n}"),
        }
    }
}

/// Data flow versus ordering-only edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Data,
    Ordering,
}

/// Forward edges of one seed, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    edges: IndexMap<DepKey, SeedId>,
    next_ordering: u32,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a data or ordering edge under `key`. Returns the
    /// previous target if the key was already present.
    pub fn add(&mut self, key: DepKey, target: SeedId) -> Option<SeedId> {
        if let DepKey::Ordering(n) = &key {
            self.next_ordering = self.next_ordering.max(n.saturating_add(1));
        }
        self.edges.insert(key, target)
    }

    /// Adds a synthetic ordering edge to `target` under a fresh key.
    ///
    /// Adding a second ordering edge to the same target is a no-op and
    /// returns the existing key.
    pub fn add_ordering_edge(&mut self, target: SeedId) -> DepKey {
        if let Some(existing) = self
            .edges
            .iter()
            .find(|(key, t)| key.is_ordering() && **t == target)
            .map(|(key, _)| key.clone())
        {
            return existing;
        }
        let mut n = self.next_ordering;
        while self.edges.contains_key(&DepKey::Ordering(n)) {
            n = n.wrapping_add(1);
        }
        self.next_ordering = n.wrapping_add(1);
        let key = DepKey::Ordering(n);
        self.edges.insert(key.clone(), target);
        key
    }

    /// Looks up the target of the edge under `key`.
    pub fn get(&self, key: &DepKey) -> Option<SeedId> {
        self.edges.get(key).copied()
    }

    /// Iterates all edges in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&DepKey, SeedId)> + '_ {
        self.edges.iter().map(|(key, target)| (key, *target))
    }

    /// Iterates data edges only.
    pub fn data_edges(&self) -> impl Iterator<Item = (&DepKey, SeedId)> + '_ {
        self.iter().filter(|(key, _)| key.is_data())
    }

    /// Iterates synthetic ordering edges only.
    pub fn ordering_edges(&self) -> impl Iterator<Item = (&DepKey, SeedId)> + '_ {
        self.iter().filter(|(key, _)| key.is_ordering())
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Produces the referent entries that seed `from` contributes to each of
    /// its targets: one `(target, referent)` pair per forward edge.
    pub fn referent_entries(&self, from: SeedId) -> impl Iterator<Item = (SeedId, Referent)> + '_ {
        self.edges.iter().map(move |(key, target)| {
            (
                *target,
                Referent {
                    from,
                    key: key.clone(),
                },
            )
        })
    }
}

/// One incoming edge: seed `from` depends on the owner under `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referent {
    pub from: SeedId,
    pub key: DepKey,
}

/// Incoming edges of one seed. Filled during finalize only.
#[derive(Debug, Clone, Default)]
pub struct Referents {
    entries: SmallVec<[Referent; 2]>,
}

impl Referents {
    pub(crate) fn record(&mut self, referent: Referent) {
        self.entries.push(referent);
    }

    /// Fan-in of the owning seed, counting every incoming edge.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Referent> + '_ {
        self.entries.iter()
    }
}
