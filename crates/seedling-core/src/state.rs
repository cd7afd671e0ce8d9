//! State: the compilation driver.
//!
//! [`State`] owns every seed of one code-generation session and runs the
//! traversal that linearizes the seed graph into emitted code.
//!
//! # Storage
//!
//! Seeds live under one signed index space. Non-negative indices address
//! seeds registered during generation, in registration order from 0.
//! Negative indices address pre-existing seeds supplied at construction,
//! where `-1` is the most recently supplied one. The addressable range is
//! `[lower(), upper())`, and a seed's id is always its index.
//!
//! # Lifecycle
//!
//! 1. Register seeds, opening and closing scopes around nested regions.
//! 2. [`finalize`](State::finalize) computes referents (once).
//! 3. [`generate_code`](State::generate_code) walks seeds in id order. Each
//!    uncompiled seed's [`Compile`](crate::seed::Compile) hook runs with a
//!    [`Compilation`] handle; its continuation applies the binding policy,
//!    and the driver loop either stops at a scope-end seed or moves on to
//!    the next index, carrying the latest result forward.
//!
//! The traversal is an index-driven loop rather than nested callbacks, so
//! the call stack does not grow with the number of seeds.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::deps::DepKey;
use crate::error::StateError;
use crate::id::SeedId;
use crate::local_vars::{Binding, LocalVars};
use crate::mode::{self, Boundary, Mode};
use crate::seed::{Compiled, Seed, SeedNode};
use crate::settings::{PlatformFunctions, StateSettings};

/// Saved context of the enclosing scope, restored by [`State::end_scope`].
#[derive(Debug)]
struct ScopeFrame {
    anchor: SeedId,
    depending: bool,
    saved_cache: HashMap<String, SeedId>,
    saved_max_mode: Mode,
}

/// A statement emitted during traversal, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    /// Declaration of a materialized local.
    Let(Binding),
    /// Result of an unbound scope-begin seed, emitted where it was compiled.
    Scope { seed: SeedId, code: Compiled },
}

/// Statements and result of one nested region, see
/// [`State::generate_region`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub statements: Vec<Statement>,
    pub result: Option<Compiled>,
}

/// The code-generation driver.
#[derive(Debug)]
pub struct State {
    /// Pre-existing seeds in supply order; `lower[k]` has id `k - lower.len()`.
    lower: Vec<SeedNode>,
    /// Generated seeds; `upper[k]` has id `k`.
    upper: Vec<SeedNode>,
    /// Running maximum mode of seeds registered in the open scope.
    max_mode: Mode,
    /// Memoization cache of the open scope.
    cache: HashMap<String, SeedId>,
    scopes: Vec<ScopeFrame>,
    local_vars: LocalVars,
    settings: StateSettings,
    platform: Rc<dyn PlatformFunctions>,
    output: Option<Compiled>,
    finalized: bool,
    /// Seeds whose `compile` has been entered but not yet returned.
    compiling: Vec<SeedId>,
    /// Emitted statements tagged with the region depth they belong to.
    statements: Vec<(usize, Statement)>,
    region_depth: usize,
}

impl State {
    /// Creates an empty state. Fails if the settings do not validate.
    pub fn new(settings: StateSettings) -> Result<Self, StateError> {
        settings.check()?;
        let platform = settings.platform.clone().ok_or_else(|| StateError::Config {
            reason: "no platform functions provided".into(),
        })?;
        Ok(State {
            lower: Vec::new(),
            upper: Vec::new(),
            max_mode: Mode::Pure,
            cache: HashMap::new(),
            scopes: Vec::new(),
            local_vars: LocalVars::new(settings.local_var_prefix.clone()),
            settings,
            platform,
            output: None,
            finalized: false,
            compiling: Vec::new(),
            statements: Vec::new(),
            region_depth: 0,
        })
    }

    /// Creates a state holding `seeds` as pre-existing seeds.
    ///
    /// With `n` seeds, the first supplied gets id `-n` and the last gets
    /// `-1`. Seeds that already carry an id are rejected.
    pub fn with_preexisting(
        settings: StateSettings,
        seeds: impl IntoIterator<Item = Seed>,
    ) -> Result<Self, StateError> {
        let mut state = State::new(settings)?;
        let nodes = seeds
            .into_iter()
            .map(Seed::into_node)
            .collect::<Result<Vec<_>, _>>()?;
        let n = nodes.len() as i32;
        for (k, mut node) in nodes.into_iter().enumerate() {
            node.assign_id(SeedId(k as i32 - n))?;
            state.lower.push(node);
        }
        debug!("state created with {} pre-existing seed(s)", n);
        Ok(state)
    }

    // -----------------------------------------------------------------------
    // Storage
    // -----------------------------------------------------------------------

    /// Lowest addressable index: minus the number of pre-existing seeds.
    pub fn lower(&self) -> i32 {
        -(self.lower.len() as i32)
    }

    /// One past the highest addressable index: the number of generated seeds.
    pub fn upper(&self) -> i32 {
        self.upper.len() as i32
    }

    pub fn seed_count(&self) -> usize {
        self.lower.len() + self.upper.len()
    }

    /// Looks up the seed stored at `index`.
    pub fn seed(&self, index: SeedId) -> Result<&SeedNode, StateError> {
        let found = if index.0 >= 0 {
            self.upper.get(index.0 as usize)
        } else {
            let k = self.lower.len() as i64 + index.0 as i64;
            usize::try_from(k).ok().and_then(|k| self.lower.get(k))
        };
        found.ok_or(StateError::SeedNotFound { index: index.0 })
    }

    fn seed_mut(&mut self, index: SeedId) -> Result<&mut SeedNode, StateError> {
        let found = if index.0 >= 0 {
            self.upper.get_mut(index.0 as usize)
        } else {
            let k = self.lower.len() as i64 + index.0 as i64;
            match usize::try_from(k) {
                Ok(k) => self.lower.get_mut(k),
                Err(_) => None,
            }
        };
        found.ok_or(StateError::SeedNotFound { index: index.0 })
    }

    /// Iterates all seeds in index order, pre-existing ones first.
    pub fn seeds(&self) -> impl Iterator<Item = (SeedId, &SeedNode)> + '_ {
        let lower = self.lower();
        self.lower
            .iter()
            .chain(self.upper.iter())
            .enumerate()
            .map(move |(k, node)| (SeedId(lower + k as i32), node))
    }

    /// Registers a generated seed and returns its id.
    pub fn register(&mut self, seed: impl Into<Seed>) -> Result<SeedId, StateError> {
        if self.finalized {
            return Err(StateError::AlreadyFinalized);
        }
        let mut node = seed.into().into_node()?;
        if let Some(id) = node.id() {
            return Err(StateError::AlreadyRegistered { id });
        }
        if let Some(limit) = self.settings.max_seeds {
            if self.upper.len() >= limit {
                return Err(StateError::SeedLimit { limit });
            }
        }
        let id = SeedId(self.upper());
        node.assign_id(id)?;
        self.max_mode = self.max_mode.join(node.mode());
        trace!(
            "registered seed {} ({:?}, {:?}), scope max mode {:?}",
            id,
            node.mode(),
            node.boundary(),
            self.max_mode
        );
        self.upper.push(node);
        Ok(id)
    }

    /// Adds a data edge from `from` to `to` before finalize.
    pub fn add_dependency(
        &mut self,
        from: SeedId,
        key: DepKey,
        to: SeedId,
    ) -> Result<(), StateError> {
        if self.finalized {
            return Err(StateError::AlreadyFinalized);
        }
        self.seed_mut(from)?.dependencies_mut().add(key, to);
        Ok(())
    }

    /// Adds a synthetic ordering edge from `from` to `to` before finalize.
    pub fn add_ordering_edge(&mut self, from: SeedId, to: SeedId) -> Result<DepKey, StateError> {
        if self.finalized {
            return Err(StateError::AlreadyFinalized);
        }
        Ok(self.seed_mut(from)?.dependencies_mut().add_ordering_edge(to))
    }

    pub fn set_payload(&mut self, id: SeedId, payload: Value) -> Result<(), StateError> {
        self.seed_mut(id)?.set_payload(payload);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    /// Running maximum mode of the seeds registered in the open scope.
    pub fn max_mode(&self) -> Mode {
        self.max_mode
    }

    /// Number of open scopes.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Anchor of the innermost open scope.
    pub fn current_scope(&self) -> Option<SeedId> {
        self.scopes.last().map(|frame| frame.anchor)
    }

    /// Anchors of the open scopes marked as depending, outermost first.
    pub fn depending_scopes(&self) -> impl Iterator<Item = SeedId> + '_ {
        self.scopes
            .iter()
            .filter(|frame| frame.depending)
            .map(|frame| frame.anchor)
    }

    /// Opens a scope anchored at `anchor`.
    ///
    /// Saves the current memoization cache and max mode and starts fresh
    /// ones. A depending anchor takes part in
    /// [`propagate_ordering_from_depending_scopes`](Self::propagate_ordering_from_depending_scopes)
    /// until the scope ends.
    pub fn begin_scope(&mut self, anchor: SeedId, is_depending: bool) -> Result<(), StateError> {
        self.seed(anchor)?;
        let frame = ScopeFrame {
            anchor,
            depending: is_depending,
            saved_cache: std::mem::take(&mut self.cache),
            saved_max_mode: self.max_mode,
        };
        self.scopes.push(frame);
        self.max_mode = Mode::Pure;
        debug!(
            "begin scope at seed {} (depending: {}), depth {}",
            anchor,
            is_depending,
            self.scopes.len()
        );
        Ok(())
    }

    /// Closes the innermost scope, restoring the enclosing cache and max
    /// mode. Returns the anchor and the max mode the scope reached.
    pub fn end_scope(&mut self) -> Result<(SeedId, Mode), StateError> {
        let frame = self.scopes.pop().ok_or(StateError::NoOpenScope)?;
        let inner_mode = std::mem::replace(&mut self.max_mode, frame.saved_max_mode);
        self.cache = frame.saved_cache;
        debug!(
            "end scope at seed {} (inner max mode {:?}), depth {}",
            frame.anchor,
            inner_mode,
            self.scopes.len()
        );
        Ok((frame.anchor, inner_mode))
    }

    /// Looks up a memoized seed in the open scope's cache.
    pub fn cache_lookup(&self, key: &str) -> Option<SeedId> {
        self.cache.get(key).copied()
    }

    /// Memoizes `id` under `key` in the open scope's cache, returning the
    /// previously cached seed if any.
    pub fn cache_insert(&mut self, key: impl Into<String>, id: SeedId) -> Option<SeedId> {
        self.cache.insert(key.into(), id)
    }

    /// Back-patch rule: every open depending anchor whose id is greater than
    /// `new_seed`'s gets a synthetic ordering edge to `new_seed`.
    pub fn propagate_ordering_from_depending_scopes(
        &mut self,
        new_seed: SeedId,
    ) -> Result<(), StateError> {
        if self.finalized {
            return Err(StateError::AlreadyFinalized);
        }
        self.seed(new_seed)?;
        let anchors: Vec<SeedId> = self
            .depending_scopes()
            .filter(|anchor| anchor.0 > new_seed.0)
            .collect();
        for anchor in anchors {
            let key = self.seed_mut(anchor)?.dependencies_mut().add_ordering_edge(new_seed);
            trace!("ordering edge {} from scope {} to seed {}", key, anchor, new_seed);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Finalize
    // -----------------------------------------------------------------------

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Computes referents for every seed, once, after the whole region has
    /// been registered. The graph is read-only afterwards.
    pub fn finalize(&mut self) -> Result<(), StateError> {
        if self.finalized {
            return Err(StateError::AlreadyFinalized);
        }

        for (id, node) in self.seeds() {
            for (_, target) in node.dependencies().iter() {
                if self.seed(target).is_err() {
                    return Err(StateError::DanglingDependency { from: id, to: target });
                }
            }
        }

        if self.settings.check_cycles {
            let graph = self.dependency_graph();
            if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
                return Err(StateError::CyclicDependency {
                    id: graph[cycle.node_id()],
                });
            }
        }

        let entries: Vec<_> = self
            .seeds()
            .flat_map(|(id, node)| node.dependencies().referent_entries(id))
            .collect();
        for (target, referent) in entries {
            self.seed_mut(target)?.referents.record(referent);
        }

        self.finalized = true;
        debug!(
            "finalized state: {} seed(s) in [{}, {})",
            self.seed_count(),
            self.lower(),
            self.upper()
        );
        Ok(())
    }

    /// Fan-in of a seed. Only available after finalize.
    pub fn referent_count(&self, id: SeedId) -> Result<usize, StateError> {
        if !self.finalized {
            return Err(StateError::NotFinalized);
        }
        Ok(self.seed(id)?.referents().count())
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    /// Applies the binding policy to a seed.
    pub fn should_bind(&self, id: SeedId) -> Result<bool, StateError> {
        let count = self.referent_count(id)?;
        let node = self.seed(id)?;
        Ok(mode::should_bind(
            node.binding_override(),
            node.boundary(),
            node.mode(),
            count,
        ))
    }

    /// Materializes a seed's result into a fresh local and rewrites the
    /// result to a reference to that local.
    pub fn bind(&mut self, id: SeedId) -> Result<(), StateError> {
        let value = self.seed(id)?.compilation_result()?.clone();
        if self.seed(id)?.result_slot().is_bound() {
            return Err(StateError::AlreadyBound {
                id,
                name: value.to_string(),
            });
        }
        let binding = self.local_vars.add_binding(id, value).clone();
        let name = binding.var_name.clone();
        let reference = Compiled::Code(self.platform.render_local_var_name(&name));
        debug!("bound seed {} to {}", id, name);
        self.statements.push((self.region_depth, Statement::Let(binding)));
        self.seed_mut(id)?.result.bind(id, name, reference)?;
        Ok(())
    }

    fn maybe_bind(&mut self, id: SeedId) -> Result<(), StateError> {
        if self.should_bind(id)? {
            self.bind(id)?;
        }
        Ok(())
    }

    pub fn local_vars(&self) -> &LocalVars {
        &self.local_vars
    }

    pub fn platform(&self) -> &dyn PlatformFunctions {
        self.platform.as_ref()
    }

    pub fn settings(&self) -> &StateSettings {
        &self.settings
    }

    pub fn set_output(&mut self, output: Compiled) {
        self.output = Some(output);
    }

    pub fn output(&self) -> Option<&Compiled> {
        self.output.as_ref()
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Generates code for the whole graph, starting at the lowest index.
    ///
    /// Returns the result of the last seed traversed, or of the first
    /// scope-end seed compiled, whichever comes first. `None` if the state
    /// holds no seeds.
    pub fn generate_code(&mut self) -> Result<Option<Compiled>, StateError> {
        if !self.scopes.is_empty() {
            return Err(StateError::UnbalancedScopes {
                open: self.scopes.len(),
            });
        }
        let start = SeedId(self.lower());
        self.generate_code_from(None, start)
    }

    /// Traverses seeds from `start` with `acc` as the accumulated result.
    ///
    /// A seed's compile hook may call this to generate a nested region that
    /// ends at a scope-end seed; the enclosing traversal later skips the
    /// seeds compiled here.
    pub fn generate_code_from(
        &mut self,
        mut acc: Option<Compiled>,
        start: SeedId,
    ) -> Result<Option<Compiled>, StateError> {
        if !self.finalized {
            return Err(StateError::NotFinalized);
        }
        let mut index = start;
        loop {
            let Some(id) = self.advance_to_next_seed(index) else {
                return Ok(acc);
            };
            let node = self.seed(id)?;
            if let Some(result) = node.result_slot().current() {
                trace!("seed {} already compiled, skipping", id);
                acc = Some(result.clone());
                index = id.next();
                continue;
            }
            if self.compiling.contains(&id) {
                return Err(StateError::ReentrantCompile { id });
            }

            let op = node.op();
            self.compiling.push(id);
            let mut cx = Compilation::new(self, id);
            let outcome = op.compile(&mut cx);
            let invocations = cx.invocations;
            self.compiling.retain(|c| *c != id);
            outcome?;
            match invocations {
                0 => return Err(StateError::ContinuationNotInvoked { id }),
                1 => {}
                _ => return Err(StateError::ContinuationInvokedTwice { id }),
            }

            let result = self.checked_result(id)?.clone();
            trace!("seed {} compiled to {}", id, result);
            if self.seed(id)?.boundary() == Boundary::End {
                return Ok(Some(result));
            }
            acc = Some(result);
            index = id.next();
        }
    }

    /// Result of `id`, rejecting one that still names a seed.
    fn checked_result(&self, id: SeedId) -> Result<&Compiled, StateError> {
        match self.seed(id)?.compilation_result()? {
            Compiled::Seed(leaked) => Err(StateError::MalformedResult {
                id,
                leaked: *leaked,
            }),
            result => Ok(result),
        }
    }

    /// Generates the nested region starting at `start`, as
    /// [`generate_code_from`](Self::generate_code_from) does, and collects
    /// the statements emitted directly inside it.
    ///
    /// Those statements belong to the region: [`render`](Self::render) of
    /// the enclosing program leaves them out, and the scope-begin seed that
    /// generated the region is expected to emit them inside its own code.
    pub fn generate_region(&mut self, start: SeedId) -> Result<Region, StateError> {
        let mark = self.statements.len();
        self.region_depth += 1;
        let outcome = self.generate_code_from(None, start);
        self.region_depth -= 1;
        let result = outcome?;
        let depth = self.region_depth + 1;
        let statements = self.statements[mark..]
            .iter()
            .filter(|(d, _)| *d == depth)
            .map(|(_, statement)| statement.clone())
            .collect();
        Ok(Region { statements, result })
    }

    /// The next stored seed at or after `index`, if any.
    fn advance_to_next_seed(&self, index: SeedId) -> Option<SeedId> {
        let index = index.0.max(self.lower());
        (index < self.upper()).then_some(SeedId(index))
    }

    /// Renders the generated program: the outermost region's statements in
    /// emission order, followed by `result` if given. Statements emitted
    /// inside nested regions are left to the seeds that generated them.
    pub fn render(&self, result: Option<&Compiled>) -> Vec<String> {
        let statements: Vec<&Statement> = self
            .statements
            .iter()
            .filter(|(depth, _)| *depth == 0)
            .map(|(_, statement)| statement)
            .collect();
        self.render_statements(&statements, result)
    }

    /// Renders a nested region the same way [`render`](Self::render) renders
    /// the whole program.
    pub fn render_region(&self, region: &Region) -> Vec<String> {
        let statements: Vec<&Statement> = region.statements.iter().collect();
        self.render_statements(&statements, region.result.as_ref())
    }

    fn render_statements(
        &self,
        statements: &[&Statement],
        result: Option<&Compiled>,
    ) -> Vec<String> {
        let mut lines: Vec<String> = statements
            .iter()
            .map(|statement| match statement {
                Statement::Let(b) => {
                    self.platform
                        .render_binding(&b.var_name, &b.value.to_string())
                }
                Statement::Scope { code, .. } => code.to_string(),
            })
            .collect();
        // A trailing block that is itself the result is not repeated.
        let repeated = matches!(
            statements.last(),
            Some(Statement::Scope { code, .. }) if Some(code) == result
        );
        if let Some(result) = result.filter(|_| !repeated) {
            lines.push(result.to_string());
        }
        lines
    }
}

// ---------------------------------------------------------------------------
// Compilation handle
// ---------------------------------------------------------------------------

/// Handle passed to a seed's compile hook.
///
/// Gives access to the seed's inputs and the driver, lets the hook set its
/// result, and carries the continuation [`proceed`](Compilation::proceed),
/// which must be invoked exactly once.
pub struct Compilation<'s> {
    state: &'s mut State,
    seed: SeedId,
    invocations: u32,
}

impl<'s> Compilation<'s> {
    fn new(state: &'s mut State, seed: SeedId) -> Self {
        Compilation {
            state,
            seed,
            invocations: 0,
        }
    }

    /// Id of the seed being compiled.
    pub fn id(&self) -> SeedId {
        self.seed
    }

    /// The seed being compiled.
    pub fn seed(&self) -> Result<&SeedNode, StateError> {
        self.state.seed(self.seed)
    }

    pub fn state(&self) -> &State {
        &*self.state
    }

    /// Mutable driver access, e.g. to generate a nested region.
    pub fn state_mut(&mut self) -> &mut State {
        &mut *self.state
    }

    pub fn payload(&self) -> Result<Option<&Value>, StateError> {
        Ok(self.seed()?.payload())
    }

    /// Target of the dependency edge under `key`.
    pub fn dependency(&self, key: &DepKey) -> Result<SeedId, StateError> {
        self.seed()?
            .dependencies()
            .get(key)
            .ok_or_else(|| StateError::MissingDependency {
                id: self.seed,
                key: key.to_string(),
            })
    }

    /// Result of the dependency under `key`, as its consumers observe it.
    pub fn input(&self, key: &DepKey) -> Result<&Compiled, StateError> {
        let target = self.dependency(key)?;
        self.state.seed(target)?.compilation_result()
    }

    /// Rendered text of the dependency under `key`.
    pub fn input_code(&self, key: &DepKey) -> Result<&str, StateError> {
        let target = self.dependency(key)?;
        let input = self.input(key)?;
        match input {
            Compiled::Code(text) => Ok(text.as_str()),
            Compiled::Seed(leaked) => Err(StateError::MalformedResult {
                id: target,
                leaked: *leaked,
            }),
        }
    }

    /// Sets the seed's result (write-once).
    pub fn set_result(&mut self, value: Compiled) -> Result<(), StateError> {
        self.state.seed_mut(self.seed)?.set_compilation_result(value)
    }

    /// The continuation. Verifies a well-formed result was produced and
    /// applies the binding policy, possibly rewriting the result to a local
    /// reference. Must be invoked exactly once per compile.
    pub fn proceed(&mut self) -> Result<(), StateError> {
        let id = self.seed;
        self.invocations += 1;
        if self.invocations > 1 {
            return Err(StateError::ContinuationInvokedTwice { id });
        }
        self.state.checked_result(id)?;
        self.state.maybe_bind(id)?;
        let node = self.state.seed(id)?;
        if node.boundary() == Boundary::Begin && !node.result_slot().is_bound() {
            let code = node.compilation_result()?.clone();
            let depth = self.state.region_depth;
            self.state
                .statements
                .push((depth, Statement::Scope { seed: id, code }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RustPlatform;

    #[derive(Debug)]
    struct Lit(&'static str);

    impl crate::seed::Compile for Lit {
        fn compile(&self, cx: &mut Compilation<'_>) -> Result<(), StateError> {
            cx.set_result(Compiled::code(self.0))?;
            cx.proceed()
        }
    }

    fn new_state() -> State {
        State::new(StateSettings::with_platform(RustPlatform)).unwrap()
    }

    #[test]
    fn missing_platform_fails_construction() {
        let err = State::new(StateSettings::default()).unwrap_err();
        assert!(matches!(err, StateError::Config { .. }));
    }

    #[test]
    fn register_assigns_sequential_ids() {
        let mut state = new_state();
        for expected in 0..5 {
            let id = state.register(SeedNode::new(Lit("x"))).unwrap();
            assert_eq!(id, SeedId(expected));
        }
        assert_eq!(state.lower(), 0);
        assert_eq!(state.upper(), 5);
    }

    #[test]
    fn register_rejects_assigned_seed() {
        let mut state = new_state();
        let mut node = SeedNode::new(Lit("x"));
        node.assign_id(SeedId(9)).unwrap();
        let err = state.register(node).unwrap_err();
        assert!(matches!(err, StateError::AlreadyRegistered { id } if id == SeedId(9)));
        assert_eq!(state.upper(), 0);
    }

    #[test]
    fn register_rejects_typed_seed() {
        let mut state = new_state();
        let err = state
            .register(crate::seed::TypedSeed::new("f64"))
            .unwrap_err();
        assert!(matches!(err, StateError::Unsupported { .. }));
    }

    #[test]
    fn register_folds_mode_into_scope_maximum() {
        let mut state = new_state();
        state.register(SeedNode::new(Lit("a"))).unwrap();
        assert_eq!(state.max_mode(), Mode::Pure);
        state
            .register(SeedNode::new(Lit("b")).with_mode(Mode::Ordered))
            .unwrap();
        state.register(SeedNode::new(Lit("c"))).unwrap();
        assert_eq!(state.max_mode(), Mode::Ordered);
    }

    #[test]
    fn seed_limit_enforced() {
        let settings = StateSettings {
            max_seeds: Some(2),
            ..StateSettings::with_platform(RustPlatform)
        };
        let mut state = State::new(settings).unwrap();
        state.register(SeedNode::new(Lit("a"))).unwrap();
        state.register(SeedNode::new(Lit("b"))).unwrap();
        let err = state.register(SeedNode::new(Lit("c"))).unwrap_err();
        assert!(matches!(err, StateError::SeedLimit { limit: 2 }));
    }

    #[test]
    fn preexisting_seeds_take_negative_ids() {
        let seeds = vec![
            Seed::from(SeedNode::new(Lit("p")).with_result(Compiled::code("p"))),
            Seed::from(SeedNode::new(Lit("q")).with_result(Compiled::code("q"))),
        ];
        let mut state =
            State::with_preexisting(StateSettings::with_platform(RustPlatform), seeds).unwrap();
        state.register(SeedNode::new(Lit("r"))).unwrap();

        assert_eq!(state.lower(), -2);
        assert_eq!(state.upper(), 1);
        assert_eq!(
            state.seed(SeedId(-1)).unwrap().compilation_result().unwrap(),
            &Compiled::code("q")
        );
        assert_eq!(
            state.seed(SeedId(-2)).unwrap().compilation_result().unwrap(),
            &Compiled::code("p")
        );
        assert!(matches!(
            state.seed(SeedId(-3)),
            Err(StateError::SeedNotFound { index: -3 })
        ));
        assert!(matches!(
            state.seed(SeedId(1)),
            Err(StateError::SeedNotFound { index: 1 })
        ));
    }

    #[test]
    fn scope_restores_mode_and_cache() {
        let mut state = new_state();
        let a = state
            .register(SeedNode::new(Lit("a")).with_mode(Mode::Ordered))
            .unwrap();
        state.cache_insert("a", a);

        let anchor = state
            .register(SeedNode::new(Lit("{")).with_boundary(Boundary::Begin))
            .unwrap();
        state.begin_scope(anchor, false).unwrap();
        assert_eq!(state.max_mode(), Mode::Pure);
        assert_eq!(state.cache_lookup("a"), None);
        assert_eq!(state.current_scope(), Some(anchor));

        let inner = state
            .register(SeedNode::new(Lit("fx")).with_mode(Mode::SideEffectful))
            .unwrap();
        state.cache_insert("fx", inner);
        assert_eq!(state.max_mode(), Mode::SideEffectful);

        let (ended, inner_mode) = state.end_scope().unwrap();
        assert_eq!(ended, anchor);
        assert_eq!(inner_mode, Mode::SideEffectful);
        assert_eq!(state.max_mode(), Mode::Ordered);
        assert_eq!(state.cache_lookup("a"), Some(a));
        assert_eq!(state.cache_lookup("fx"), None);
        assert_eq!(state.scope_depth(), 0);
    }

    #[test]
    fn end_scope_without_open_scope_fails() {
        let mut state = new_state();
        assert!(matches!(state.end_scope(), Err(StateError::NoOpenScope)));
    }

    #[test]
    fn begin_scope_requires_stored_anchor() {
        let mut state = new_state();
        assert!(matches!(
            state.begin_scope(SeedId(0), true),
            Err(StateError::SeedNotFound { index: 0 })
        ));
    }

    #[test]
    fn back_patch_fires_only_for_greater_anchor_ids() {
        let mut state = new_state();
        let early = state.register(SeedNode::new(Lit("e"))).unwrap();
        let anchor = state
            .register(SeedNode::new(Lit("{")).with_boundary(Boundary::Begin))
            .unwrap();
        state.begin_scope(anchor, true).unwrap();
        let late = state.register(SeedNode::new(Lit("l"))).unwrap();

        state.propagate_ordering_from_depending_scopes(early).unwrap();
        state.propagate_ordering_from_depending_scopes(late).unwrap();

        let targets: Vec<_> = state
            .seed(anchor)
            .unwrap()
            .dependencies()
            .ordering_edges()
            .map(|(_, t)| t)
            .collect();
        assert_eq!(targets, vec![early]);
    }

    #[test]
    fn back_patch_ignores_closed_and_non_depending_scopes() {
        let mut state = new_state();
        let early = state.register(SeedNode::new(Lit("e"))).unwrap();
        let closed = state.register(SeedNode::new(Lit("{"))).unwrap();
        state.begin_scope(closed, true).unwrap();
        state.end_scope().unwrap();
        let plain = state.register(SeedNode::new(Lit("{"))).unwrap();
        state.begin_scope(plain, false).unwrap();

        state.propagate_ordering_from_depending_scopes(early).unwrap();
        assert!(state.seed(closed).unwrap().dependencies().is_empty());
        assert!(state.seed(plain).unwrap().dependencies().is_empty());
    }

    #[test]
    fn referents_require_finalize() {
        let mut state = new_state();
        let a = state.register(SeedNode::new(Lit("a"))).unwrap();
        state
            .register(SeedNode::new(Lit("b")).depends_on(DepKey::Arg(0), a))
            .unwrap();
        assert!(matches!(state.referent_count(a), Err(StateError::NotFinalized)));
        state.finalize().unwrap();
        assert_eq!(state.referent_count(a).unwrap(), 1);
        assert!(matches!(state.finalize(), Err(StateError::AlreadyFinalized)));
    }

    #[test]
    fn graph_is_frozen_after_finalize() {
        let mut state = new_state();
        let a = state.register(SeedNode::new(Lit("a"))).unwrap();
        let b = state.register(SeedNode::new(Lit("b"))).unwrap();
        state.finalize().unwrap();
        assert!(matches!(
            state.register(SeedNode::new(Lit("c"))),
            Err(StateError::AlreadyFinalized)
        ));
        assert!(matches!(
            state.add_ordering_edge(b, a),
            Err(StateError::AlreadyFinalized)
        ));
        assert!(matches!(
            state.add_dependency(b, DepKey::Arg(0), a),
            Err(StateError::AlreadyFinalized)
        ));
    }

    #[test]
    fn finalize_rejects_dangling_dependency() {
        let mut state = new_state();
        state
            .register(SeedNode::new(Lit("a")).depends_on(DepKey::Arg(0), SeedId(7)))
            .unwrap();
        assert!(matches!(
            state.finalize(),
            Err(StateError::DanglingDependency { to, .. }) if to == SeedId(7)
        ));
    }

    #[test]
    fn finalize_rejects_cycles_unless_disabled() {
        let build = |check_cycles| {
            let settings = StateSettings {
                check_cycles,
                ..StateSettings::with_platform(RustPlatform)
            };
            let mut state = State::new(settings).unwrap();
            let a = state.register(SeedNode::new(Lit("a"))).unwrap();
            let b = state
                .register(SeedNode::new(Lit("b")).depends_on(DepKey::Arg(0), a))
                .unwrap();
            state.add_ordering_edge(a, b).unwrap();
            state
        };
        assert!(matches!(
            build(true).finalize(),
            Err(StateError::CyclicDependency { .. })
        ));
        assert!(build(false).finalize().is_ok());
    }

    #[test]
    fn bind_requires_result() {
        let mut state = new_state();
        let a = state.register(SeedNode::new(Lit("a"))).unwrap();
        state.finalize().unwrap();
        assert!(matches!(state.bind(a), Err(StateError::MissingResult { .. })));
        assert!(state.local_vars().is_empty());
    }

    #[test]
    fn generate_requires_finalize_and_closed_scopes() {
        let mut state = new_state();
        let a = state.register(SeedNode::new(Lit("a"))).unwrap();
        assert!(matches!(state.generate_code(), Err(StateError::NotFinalized)));
        state.begin_scope(a, false).unwrap();
        assert!(matches!(
            state.generate_code(),
            Err(StateError::UnbalancedScopes { open: 1 })
        ));
    }

    #[test]
    fn empty_state_generates_nothing() {
        let mut state = new_state();
        state.finalize().unwrap();
        assert_eq!(state.generate_code().unwrap(), None);
    }

    #[test]
    fn output_slot() {
        let mut state = new_state();
        assert!(state.output().is_none());
        state.set_output(Compiled::code("ret"));
        assert_eq!(state.output(), Some(&Compiled::code("ret")));
    }
}
