//! Release dependency graph
//!
//! Built from the plan before any phase runs. Building fails on duplicate
//! ids, required dependencies that are not in the plan, and cycles, so
//! [`ReleaseGraph::order`] is infallible.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::error::Result;
use crate::id::ReleaseId;
use crate::plan::{Plan, ResolvedDependency};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("release {release} depends on {dependency}, which is not in the plan")]
    MissingDependency {
        release: ReleaseId,
        dependency: ReleaseId,
    },

    #[error("release {0} is declared more than once")]
    Duplicate(ReleaseId),

    #[error("dependency cycle: {}", join_path(.path))]
    Cycle { path: Vec<ReleaseId> },
}

fn join_path(path: &[ReleaseId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Directed acyclic graph of releases, edges pointing at dependencies
#[derive(Debug, Clone, Default)]
pub struct ReleaseGraph {
    /// Declaration order
    nodes: Vec<ReleaseId>,
    index: HashMap<ReleaseId, usize>,
    /// `deps[i]` are the nodes `i` depends on
    deps: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

impl ReleaseGraph {
    /// Build the graph for every release of a plan
    pub fn from_plan(plan: &Plan) -> Result<Self> {
        let mut entries = Vec::with_capacity(plan.releases.len());
        for release in &plan.releases {
            entries.push((release.id()?, release.resolved_depends_on()?));
        }
        Ok(Self::build(entries)?)
    }

    /// Build from `(id, dependencies)` pairs in declaration order
    pub fn build<I>(entries: I) -> std::result::Result<Self, GraphError>
    where
        I: IntoIterator<Item = (ReleaseId, Vec<ResolvedDependency>)>,
    {
        let entries: Vec<_> = entries.into_iter().collect();

        let mut graph = Self::default();
        for (id, _) in &entries {
            if graph.index.contains_key(id) {
                return Err(GraphError::Duplicate(id.clone()));
            }
            graph.index.insert(id.clone(), graph.nodes.len());
            graph.nodes.push(id.clone());
        }

        for (id, deps) in &entries {
            let mut edges = Vec::with_capacity(deps.len());
            for dep in deps {
                match graph.index.get(&dep.id) {
                    Some(&target) => {
                        if !edges.contains(&target) {
                            edges.push(target);
                        }
                    }
                    None if dep.optional => {
                        tracing::warn!(
                            release = %id,
                            dependency = %dep.id,
                            "optional dependency is not in the plan, ignoring"
                        );
                    }
                    None => {
                        return Err(GraphError::MissingDependency {
                            release: id.clone(),
                            dependency: dep.id.clone(),
                        });
                    }
                }
            }
            graph.deps.push(edges);
        }

        graph.check_cycles()?;
        Ok(graph)
    }

    fn check_cycles(&self) -> std::result::Result<(), GraphError> {
        let mut marks = vec![Mark::White; self.nodes.len()];
        let mut stack = Vec::new();

        for start in 0..self.nodes.len() {
            if marks[start] == Mark::White {
                self.visit(start, &mut marks, &mut stack)?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> std::result::Result<(), GraphError> {
        marks[node] = Mark::Grey;
        stack.push(node);

        for &dep in &self.deps[node] {
            match marks[dep] {
                Mark::White => self.visit(dep, marks, stack)?,
                Mark::Grey => {
                    let start = stack.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut path: Vec<ReleaseId> =
                        stack[start..].iter().map(|&n| self.nodes[n].clone()).collect();
                    path.push(self.nodes[dep].clone());
                    return Err(GraphError::Cycle { path });
                }
                Mark::Black => {}
            }
        }

        stack.pop();
        marks[node] = Mark::Black;
        Ok(())
    }

    /// Topological order, dependencies first
    ///
    /// Among releases whose dependencies are all placed, the one declared
    /// first goes first.
    pub fn order(&self) -> Vec<ReleaseId> {
        let mut remaining: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut dependents = vec![Vec::new(); self.nodes.len()];
        for (node, deps) in self.deps.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BTreeSet<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(idx, _)| idx)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            order.push(self.nodes[node].clone());
            for &dependent in &dependents[node] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }
        order
    }

    /// Direct dependencies of a release
    pub fn dependencies(&self, id: &ReleaseId) -> Vec<&ReleaseId> {
        self.index
            .get(id)
            .map(|&idx| self.deps[idx].iter().map(|&d| &self.nodes[d]).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: &ReleaseId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render the graph as a tree, one root per release nothing depends on
    pub fn render_tree(&self) -> String {
        let mut depended_on = vec![false; self.nodes.len()];
        for deps in &self.deps {
            for &d in deps {
                depended_on[d] = true;
            }
        }

        let roots: Vec<usize> = (0..self.nodes.len()).filter(|&n| !depended_on[n]).collect();
        let mut lines = Vec::new();
        for (i, &root) in roots.iter().enumerate() {
            self.render_node(root, &mut lines, "", i == roots.len() - 1);
        }
        lines.join("\n")
    }

    fn render_node(&self, node: usize, lines: &mut Vec<String>, prefix: &str, is_last: bool) {
        let connector = if is_last { "└── " } else { "├── " };
        lines.push(format!("{}{}{}", prefix, connector, self.nodes[node]));

        let new_prefix = format!("{}{}   ", prefix, if is_last { " " } else { "│" });
        let count = self.deps[node].len();
        for (i, &dep) in self.deps[node].iter().enumerate() {
            self.render_node(dep, lines, &new_prefix, i == count - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ReleaseId {
        ReleaseId::parse(s).unwrap()
    }

    fn dep(s: &str) -> ResolvedDependency {
        ResolvedDependency {
            id: id(s),
            optional: false,
        }
    }

    fn names(order: &[ReleaseId]) -> Vec<String> {
        order.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_order_dependencies_first() {
        let graph = ReleaseGraph::build(vec![
            (id("app@ns"), vec![dep("db@ns"), dep("cache@ns")]),
            (id("db@ns"), vec![]),
            (id("cache@ns"), vec![dep("db@ns")]),
        ])
        .unwrap();

        assert_eq!(names(&graph.order()), vec!["db@ns", "cache@ns", "app@ns"]);
    }

    #[test]
    fn test_order_keeps_declaration_order_for_independent_releases() {
        let graph = ReleaseGraph::build(vec![
            (id("c"), vec![]),
            (id("a"), vec![]),
            (id("b"), vec![]),
        ])
        .unwrap();
        assert_eq!(names(&graph.order()), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_missing_dependency() {
        let err = ReleaseGraph::build(vec![(id("app"), vec![dep("db")])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingDependency {
                release: id("app"),
                dependency: id("db"),
            }
        );
    }

    #[test]
    fn test_optional_missing_dependency_is_dropped() {
        let graph = ReleaseGraph::build(vec![(
            id("app"),
            vec![ResolvedDependency {
                id: id("db"),
                optional: true,
            }],
        )])
        .unwrap();
        assert!(graph.dependencies(&id("app")).is_empty());
    }

    #[test]
    fn test_duplicate() {
        let err = ReleaseGraph::build(vec![(id("a@x"), vec![]), (id("a@x"), vec![])]).unwrap_err();
        assert_eq!(err, GraphError::Duplicate(id("a@x")));
    }

    #[test]
    fn test_cycle_reports_path() {
        let err = ReleaseGraph::build(vec![
            (id("a"), vec![dep("b")]),
            (id("b"), vec![dep("c")]),
            (id("c"), vec![dep("a")]),
        ])
        .unwrap_err();

        match &err {
            GraphError::Cycle { path } => {
                assert_eq!(names(path), vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> c -> a");
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = ReleaseGraph::build(vec![(id("a"), vec![dep("a")])]).unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
    }

    #[test]
    fn test_from_plan_inherits_namespace() {
        let plan = Plan::from_yaml(
            r#"
releases:
  - name: app
    namespace: ns
    chart: { name: ./app }
    dependsOn: [db]
  - name: db
    namespace: ns
    chart: { name: ./db }
"#,
        )
        .unwrap();
        let graph = ReleaseGraph::from_plan(&plan).unwrap();
        assert_eq!(names(&graph.order()), vec!["db@ns", "app@ns"]);
    }

    #[test]
    fn test_render_tree() {
        let graph = ReleaseGraph::build(vec![
            (id("app"), vec![dep("db"), dep("cache")]),
            (id("db"), vec![]),
            (id("cache"), vec![]),
        ])
        .unwrap();
        assert_eq!(
            graph.render_tree(),
            "└── app\n    ├── db\n    └── cache"
        );
    }
}
