//! Local variable allocation for materialized seed results.
//!
//! [`LocalVars`] hands out strictly increasing, distinct names scoped to one
//! `State` and keeps the append-only list of [`Binding`]s in allocation
//! order, which is also the order their declarations must be emitted in.

use serde::{Deserialize, Serialize};

use crate::id::SeedId;
use crate::seed::Compiled;

/// A seed result materialized into a named local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub seed: SeedId,
    pub var_name: String,
    /// The value the local is initialized with.
    pub value: Compiled,
}

/// Name allocator and binding log of one `State`.
#[derive(Debug, Clone)]
pub struct LocalVars {
    prefix: String,
    counter: u32,
    bindings: Vec<Binding>,
}

impl LocalVars {
    /// Names are `{prefix}{n}` with `n` counting up from 0.
    pub fn new(prefix: impl Into<String>) -> Self {
        LocalVars {
            prefix: prefix.into(),
            counter: 0,
            bindings: Vec::new(),
        }
    }

    fn next_name(&mut self) -> String {
        let name = format!("{}{}", self.prefix, self.counter);
        self.counter += 1;
        name
    }

    /// Allocates a fresh name for `seed` and records the binding.
    pub fn add_binding(&mut self, seed: SeedId, value: Compiled) -> &Binding {
        let var_name = self.next_name();
        let index = self.bindings.len();
        self.bindings.push(Binding {
            seed,
            var_name,
            value,
        });
        &self.bindings[index]
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn binding_for(&self, seed: SeedId) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.seed == seed)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
