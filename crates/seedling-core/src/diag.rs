//! Diagnostics for a [`State`]: a text dump of the node table, a
//! serializable report, and a petgraph view of the dependency edges.
//!
//! None of these formats is stable; they exist for debugging node kinds.

use std::fmt::Write;

use petgraph::dot::{Config, Dot};
use petgraph::stable_graph::StableGraph;
use petgraph::Directed;
use serde::{Deserialize, Serialize};

use crate::deps::EdgeKind;
use crate::id::{node_index, SeedId};
use crate::local_vars::Binding;
use crate::mode::{Boundary, Mode};
use crate::seed::{ResultSlot, SeedNode};
use crate::state::State;

/// Serializable snapshot of a whole state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateReport {
    pub lower: i32,
    pub upper: i32,
    pub finalized: bool,
    pub seeds: Vec<SeedReport>,
    pub bindings: Vec<Binding>,
}

/// One row of the node table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedReport {
    pub id: SeedId,
    pub kind: String,
    pub mode: Mode,
    pub boundary: Boundary,
    pub result: Option<String>,
    pub bound_to: Option<String>,
    pub dependencies: Vec<EdgeReport>,
    pub referents: Vec<EdgeReport>,
}

/// An edge as seen from one end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeReport {
    pub key: String,
    pub kind: EdgeKind,
    pub seed: SeedId,
}

fn seed_report(id: SeedId, node: &SeedNode) -> SeedReport {
    let (result, bound_to) = match node.result_slot() {
        ResultSlot::Unset => (None, None),
        ResultSlot::Set(value) => (Some(value.to_string()), None),
        ResultSlot::Bound { name, value, .. } => (Some(value.to_string()), Some(name.clone())),
    };
    SeedReport {
        id,
        kind: format!("{:?}", node.op()),
        mode: node.mode(),
        boundary: node.boundary(),
        result,
        bound_to,
        dependencies: node
            .dependencies()
            .iter()
            .map(|(key, seed)| EdgeReport {
                key: key.to_string(),
                kind: key.kind(),
                seed,
            })
            .collect(),
        referents: node
            .referents()
            .iter()
            .map(|r| EdgeReport {
                key: r.key.to_string(),
                kind: r.key.kind(),
                seed: r.from,
            })
            .collect(),
    }
}

impl State {
    /// Builds a serializable snapshot of the node table and bindings.
    pub fn report(&self) -> StateReport {
        StateReport {
            lower: self.lower(),
            upper: self.upper(),
            finalized: self.is_finalized(),
            seeds: self
                .seeds()
                .map(|(id, node)| seed_report(id, node))
                .collect(),
            bindings: self.local_vars().bindings().to_vec(),
        }
    }

    /// Human-readable dump of every seed with its edges and referents.
    pub fn dump(&self) -> String {
        let mut buf = String::new();
        writeln!(
            buf,
            "=== State [{}, {}){} ===",
            self.lower(),
            self.upper(),
            if self.is_finalized() { " finalized" } else { "" }
        )
        .unwrap();
        for row in self.report().seeds {
            let result = match (&row.result, &row.bound_to) {
                (None, _) => "unset".to_string(),
                (Some(value), None) => format!("= {value}"),
                (Some(value), Some(name)) => format!("= {name} <- {value}"),
            };
            writeln!(
                buf,
                " - {:>4} {} {:?}/{:?} {}",
                row.id.0, row.kind, row.mode, row.boundary, result
            )
            .unwrap();
            writeln!(buf, "        deps: {}", edge_list(&row.dependencies)).unwrap();
            writeln!(buf, "        refs: {}", edge_list(&row.referents)).unwrap();
        }
        buf
    }

    /// Dependency edges as a graph: each edge runs from the seed that is
    /// depended on to the seed that depends on it. Node weights are ids.
    /// Edges to missing seeds are left out.
    pub fn dependency_graph(&self) -> StableGraph<SeedId, EdgeKind, Directed, u32> {
        let lower = self.lower();
        let mut graph = StableGraph::with_capacity(self.seed_count(), 0);
        for (id, _) in self.seeds() {
            graph.add_node(id);
        }
        for (id, node) in self.seeds() {
            for (key, target) in node.dependencies().iter() {
                if self.seed(target).is_ok() {
                    graph.add_edge(node_index(target, lower), node_index(id, lower), key.kind());
                }
            }
        }
        graph
    }

    /// Graphviz rendering of [`dependency_graph`](Self::dependency_graph).
    pub fn to_dot(&self) -> String {
        let graph = self.dependency_graph();
        format!("{:?}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }
}

fn edge_list(edges: &[EdgeReport]) -> String {
    if edges.is_empty() {
        return "none".to_string();
    }
    edges
        .iter()
        .map(|e| format!("{} {}", e.key, e.seed))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::DepKey;
    use crate::error::StateError;
    use crate::seed::{Compile, Compiled};
    use crate::settings::{RustPlatform, StateSettings};
    use crate::state::Compilation;

    #[derive(Debug)]
    struct Lit(&'static str);

    impl Compile for Lit {
        fn compile(&self, cx: &mut Compilation<'_>) -> Result<(), StateError> {
            cx.set_result(Compiled::code(self.0))?;
            cx.proceed()
        }
    }

    fn sample() -> State {
        let mut state = State::new(StateSettings::with_platform(RustPlatform)).unwrap();
        let a = state.register(SeedNode::new(Lit("1"))).unwrap();
        let b = state
            .register(SeedNode::new(Lit("2")).depends_on(DepKey::Arg(0), a))
            .unwrap();
        state
            .register(
                SeedNode::new(Lit("3"))
                    .with_mode(Mode::SideEffectful)
                    .depends_on(DepKey::Arg(0), a),
            )
            .unwrap();
        state.add_ordering_edge(b, a).unwrap();
        state
    }

    #[test]
    fn dependency_graph_mirrors_edges() {
        let state = sample();
        let graph = state.dependency_graph();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        let ordering = graph
            .edge_weights()
            .filter(|k| **k == EdgeKind::Ordering)
            .count();
        assert_eq!(ordering, 1);
    }

    #[test]
    fn dependency_graph_skips_dangling_edges() {
        let mut state = State::new(StateSettings::with_platform(RustPlatform)).unwrap();
        state
            .register(SeedNode::new(Lit("x")).depends_on(DepKey::Arg(0), SeedId(3)))
            .unwrap();
        assert_eq!(state.dependency_graph().edge_count(), 0);
    }

    #[test]
    fn report_includes_referents_after_finalize() {
        let mut state = sample();
        state.finalize().unwrap();
        let report = state.report();
        assert!(report.finalized);
        assert_eq!(report.seeds.len(), 3);
        assert_eq!(report.seeds[0].referents.len(), 3);
        assert_eq!(report.seeds[1].dependencies[1].kind, EdgeKind::Ordering);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["upper"], 3);
        assert_eq!(json["seeds"][2]["mode"], "SideEffectful");
    }

    #[test]
    fn dump_lists_every_seed() {
        let mut state = sample();
        state.finalize().unwrap();
        state.generate_code().unwrap();
        insta::assert_snapshot!(state.dump(), @r###"
        === State [0, 3) finalized ===
         -    0 Lit("1") Pure/Ordinary = s0 <- 1
                deps: none
                refs: #0 1, ~0 1, #0 2
         -    1 Lit("2") Pure/Ordinary = 2
                deps: #0 0, ~0 0
                refs: none
         -    2 Lit("3") SideEffectful/Ordinary = s1 <- 3
                deps: #0 0
                refs: none
        "###);
    }

    #[test]
    fn dot_output_names_every_node() {
        let dot = sample().to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("SeedId(0)"));
        assert!(dot.contains("SeedId(2)"));
    }
}
