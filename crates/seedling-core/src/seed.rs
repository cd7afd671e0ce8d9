//! Seeds: the nodes of the code-generation graph.
//!
//! A [`SeedNode`] carries the attributes the driver needs (id, effect mode,
//! boundary marker, binding override, result slot, edges, payload) plus a
//! [`Compile`] implementation supplied by the concrete node kind.
//!
//! [`TypedSeed`] is a dataless placeholder that only carries a type tag for
//! static type propagation outside the graph. Every graph operation on it
//! fails with [`StateError::Unsupported`]. [`Seed`] is the closed variant of
//! the two, so callers never need to inspect a seed's runtime type.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deps::{DepKey, Dependencies, Referents};
use crate::error::StateError;
use crate::id::SeedId;
use crate::mode::{Boundary, Mode};
use crate::state::Compilation;

// ---------------------------------------------------------------------------
// Compilation results
// ---------------------------------------------------------------------------

/// The value a seed compiles to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compiled {
    /// Rendered target-language text (an expression or a statement).
    Code(String),
    /// A seed reference. Never valid as emitted code: the driver rejects it
    /// as a leak of the graph representation.
    Seed(SeedId),
}

impl Compiled {
    /// Shorthand for `Compiled::Code`.
    pub fn code(text: impl Into<String>) -> Self {
        Compiled::Code(text.into())
    }

    /// Returns the rendered text, or `None` for a leaked seed.
    pub fn as_code(&self) -> Option<&str> {
        match self {
            Compiled::Code(text) => Some(text),
            Compiled::Seed(_) => None,
        }
    }
}

impl fmt::Display for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compiled::Code(text) => write!(f, "{text}"),
            Compiled::Seed(id) => write!(f, "<seed {id}>"),
        }
    }
}

/// Per-seed result slot: `Unset -> Set -> Bound`.
///
/// `compile` writes the slot once; the binder may rewrite it once more to a
/// reference to the local that now holds the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResultSlot {
    #[default]
    Unset,
    Set(Compiled),
    Bound {
        /// Local variable name allocated by the binder.
        name: String,
        /// Platform-rendered reference to the local; what consumers see.
        reference: Compiled,
        /// The value as compiled, before binding.
        value: Compiled,
    },
}

impl ResultSlot {
    /// The result consumers observe, if any.
    pub fn current(&self) -> Option<&Compiled> {
        match self {
            ResultSlot::Unset => None,
            ResultSlot::Set(value) => Some(value),
            ResultSlot::Bound { reference, .. } => Some(reference),
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, ResultSlot::Unset)
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, ResultSlot::Bound { .. })
    }

    fn set(&mut self, id: SeedId, value: Compiled) -> Result<(), StateError> {
        match self {
            ResultSlot::Unset => {
                *self = ResultSlot::Set(value);
                Ok(())
            }
            _ => Err(StateError::ResultAlreadySet { id }),
        }
    }

    /// `Set -> Bound`. Returns the value as compiled.
    pub(crate) fn bind(
        &mut self,
        id: SeedId,
        name: String,
        reference: Compiled,
    ) -> Result<Compiled, StateError> {
        match self {
            ResultSlot::Unset => Err(StateError::MissingResult { id }),
            ResultSlot::Bound { name: existing, .. } => Err(StateError::AlreadyBound {
                id,
                name: existing.clone(),
            }),
            ResultSlot::Set(value) => {
                let value = value.clone();
                *self = ResultSlot::Bound {
                    name,
                    reference,
                    value: value.clone(),
                };
                Ok(value)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Compile capability
// ---------------------------------------------------------------------------

/// Per-kind compilation hook implemented by every concrete node kind.
///
/// `compile` is invoked at most once per seed. It must set the seed's result
/// through [`Compilation::set_result`] and then invoke the continuation
/// [`Compilation::proceed`] exactly once before returning.
pub trait Compile: fmt::Debug {
    fn compile(&self, cx: &mut Compilation<'_>) -> Result<(), StateError>;
}

// ---------------------------------------------------------------------------
// Graph seeds
// ---------------------------------------------------------------------------

/// A node of the code-generation graph.
#[derive(Debug, Clone)]
pub struct SeedNode {
    pub(crate) id: Option<SeedId>,
    mode: Mode,
    boundary: Boundary,
    binding_override: Option<bool>,
    pub(crate) result: ResultSlot,
    pub(crate) deps: Dependencies,
    pub(crate) referents: Referents,
    payload: Option<Value>,
    op: Rc<dyn Compile>,
}

impl SeedNode {
    /// Creates an unregistered, pure, ordinary seed compiled by `op`.
    pub fn new(op: impl Compile + 'static) -> Self {
        SeedNode {
            id: None,
            mode: Mode::Pure,
            boundary: Boundary::Ordinary,
            binding_override: None,
            result: ResultSlot::Unset,
            deps: Dependencies::new(),
            referents: Referents::default(),
            payload: None,
            op: Rc::new(op),
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Forces (`true`) or forbids (`false`) binding, bypassing the policy.
    pub fn with_binding(mut self, bind: bool) -> Self {
        self.binding_override = Some(bind);
        self
    }

    /// Adds a data edge to `target` under `key`.
    pub fn depends_on(mut self, key: DepKey, target: SeedId) -> Self {
        self.deps.add(key, target);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Presets the result, for pre-existing seeds whose value is known
    /// before generation begins.
    pub fn with_result(mut self, value: Compiled) -> Self {
        self.result = ResultSlot::Set(value);
        self
    }

    /// The assigned id, or `None` before registration.
    pub fn id(&self) -> Option<SeedId> {
        self.id
    }

    fn id_or_undefined(&self) -> SeedId {
        self.id.unwrap_or(SeedId::UNDEFINED)
    }

    /// Single-assignment id setter.
    pub fn assign_id(&mut self, id: SeedId) -> Result<(), StateError> {
        if let Some(existing) = self.id {
            return Err(StateError::AlreadyRegistered { id: existing });
        }
        self.id = Some(id);
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    pub fn binding_override(&self) -> Option<bool> {
        self.binding_override
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    pub fn dependencies_mut(&mut self) -> &mut Dependencies {
        &mut self.deps
    }

    /// Incoming edges; only meaningful after finalize.
    pub fn referents(&self) -> &Referents {
        &self.referents
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn set_payload(&mut self, payload: Value) {
        self.payload = Some(payload);
    }

    pub fn result_slot(&self) -> &ResultSlot {
        &self.result
    }

    pub fn has_compilation_result(&self) -> bool {
        self.result.is_set()
    }

    /// The result consumers observe. Fails if nothing was written yet.
    pub fn compilation_result(&self) -> Result<&Compiled, StateError> {
        self.result.current().ok_or(StateError::MissingResult {
            id: self.id_or_undefined(),
        })
    }

    /// Write-once result setter.
    pub fn set_compilation_result(&mut self, value: Compiled) -> Result<(), StateError> {
        let id = self.id_or_undefined();
        self.result.set(id, value)
    }

    pub(crate) fn op(&self) -> Rc<dyn Compile> {
        Rc::clone(&self.op)
    }
}

// ---------------------------------------------------------------------------
// Type-only placeholder
// ---------------------------------------------------------------------------

/// Placeholder seed that only carries a type tag.
///
/// It exists for static type propagation outside the graph: it has no id,
/// no dependencies and no result, and cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedSeed {
    type_tag: String,
}

impl TypedSeed {
    pub fn new(type_tag: impl Into<String>) -> Self {
        TypedSeed {
            type_tag: type_tag.into(),
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn unsupported<T>(operation: &'static str) -> Result<T, StateError> {
        Err(StateError::Unsupported { operation })
    }
}

// ---------------------------------------------------------------------------
// Closed seed variant
// ---------------------------------------------------------------------------

/// Either a graph seed or a type-only placeholder.
#[derive(Debug, Clone)]
pub enum Seed {
    Node(SeedNode),
    Typed(TypedSeed),
}

impl Seed {
    /// The type tag of a placeholder; `None` for graph seeds.
    pub fn type_tag(&self) -> Option<&str> {
        match self {
            Seed::Node(_) => None,
            Seed::Typed(typed) => Some(typed.type_tag()),
        }
    }

    pub fn id(&self) -> Result<Option<SeedId>, StateError> {
        match self {
            Seed::Node(node) => Ok(node.id()),
            Seed::Typed(_) => TypedSeed::unsupported("id"),
        }
    }

    pub fn assign_id(&mut self, id: SeedId) -> Result<(), StateError> {
        match self {
            Seed::Node(node) => node.assign_id(id),
            Seed::Typed(_) => TypedSeed::unsupported("assign_id"),
        }
    }

    pub fn dependencies(&self) -> Result<&Dependencies, StateError> {
        match self {
            Seed::Node(node) => Ok(node.dependencies()),
            Seed::Typed(_) => TypedSeed::unsupported("dependencies"),
        }
    }

    pub fn dependencies_mut(&mut self) -> Result<&mut Dependencies, StateError> {
        match self {
            Seed::Node(node) => Ok(node.dependencies_mut()),
            Seed::Typed(_) => TypedSeed::unsupported("dependencies"),
        }
    }

    pub fn mode(&self) -> Result<Mode, StateError> {
        match self {
            Seed::Node(node) => Ok(node.mode()),
            Seed::Typed(_) => TypedSeed::unsupported("mode"),
        }
    }

    pub fn boundary(&self) -> Result<Boundary, StateError> {
        match self {
            Seed::Node(node) => Ok(node.boundary()),
            Seed::Typed(_) => TypedSeed::unsupported("boundary"),
        }
    }

    pub fn binding_override(&self) -> Result<Option<bool>, StateError> {
        match self {
            Seed::Node(node) => Ok(node.binding_override()),
            Seed::Typed(_) => TypedSeed::unsupported("binding_override"),
        }
    }

    pub fn payload(&self) -> Result<Option<&Value>, StateError> {
        match self {
            Seed::Node(node) => Ok(node.payload()),
            Seed::Typed(_) => TypedSeed::unsupported("payload"),
        }
    }

    pub fn set_payload(&mut self, payload: Value) -> Result<(), StateError> {
        match self {
            Seed::Node(node) => {
                node.set_payload(payload);
                Ok(())
            }
            Seed::Typed(_) => TypedSeed::unsupported("set_payload"),
        }
    }

    pub fn compilation_result(&self) -> Result<&Compiled, StateError> {
        match self {
            Seed::Node(node) => node.compilation_result(),
            Seed::Typed(_) => TypedSeed::unsupported("compilation_result"),
        }
    }

    pub fn set_compilation_result(&mut self, value: Compiled) -> Result<(), StateError> {
        match self {
            Seed::Node(node) => node.set_compilation_result(value),
            Seed::Typed(_) => TypedSeed::unsupported("set_compilation_result"),
        }
    }

    /// Unwraps a graph seed for registration.
    pub fn into_node(self) -> Result<SeedNode, StateError> {
        match self {
            Seed::Node(node) => Ok(node),
            Seed::Typed(_) => TypedSeed::unsupported("compile"),
        }
    }
}

impl From<SeedNode> for Seed {
    fn from(node: SeedNode) -> Self {
        Seed::Node(node)
    }
}

impl From<TypedSeed> for Seed {
    fn from(typed: TypedSeed) -> Self {
        Seed::Typed(typed)
    }
}
