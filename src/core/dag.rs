//! Pipeline DAG (Directed Acyclic Graph) of task nodes.
//!
//! This module provides the PipelineGraph structure that assembles task nodes
//! into a dependency graph and answers the queries a task-execution engine
//! needs: lookup, topological order and execution plans.

use crate::core::task::{TaskKind, TaskNode, UpstreamRole};
use crate::error::{Error, Issue, Result};
use crate::render::{DependencyFigure, FigureEdge, FigureNode};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Names that stand for external inputs rather than tasks.
pub const DEFAULT_ROOT_SENTINELS: &[&str] = &["ImagesFilesetExists", "ModelFileset", "root"];

/// Lifecycle of a pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    /// Tasks may be added; edges are not resolved yet.
    Building,
    /// Edges are resolved and the graph is immutable.
    Validated,
}

/// The pipeline dependency graph.
///
/// Nodes are tasks in declaration order; an edge runs from an upstream task to
/// the task that reads from it and carries the role of the reference.
pub struct PipelineGraph {
    /// The underlying directed graph.
    graph: DiGraph<TaskNode, UpstreamRole>,
    /// Index mapping from task name to NodeIndex for fast lookups.
    index: HashMap<String, NodeIndex>,
    root_sentinels: HashSet<String>,
    state: GraphState,
}

impl PipelineGraph {
    /// Create an empty graph recognizing the default root sentinels.
    pub fn new() -> Self {
        Self::with_root_sentinels(DEFAULT_ROOT_SENTINELS.iter().map(|s| s.to_string()))
    }

    /// Create an empty graph recognizing exactly the given root sentinels.
    pub fn with_root_sentinels(sentinels: impl IntoIterator<Item = String>) -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            root_sentinels: sentinels.into_iter().collect(),
            state: GraphState::Building,
        }
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn is_validated(&self) -> bool {
        self.state == GraphState::Validated
    }

    /// Add a task to the graph.
    ///
    /// # Errors
    /// - `GraphFrozen` once the graph is validated
    /// - `DuplicateName` if a task with the same name exists
    pub fn add_node(&mut self, node: TaskNode) -> Result<NodeIndex> {
        if self.is_validated() {
            return Err(Error::GraphFrozen);
        }
        if self.index.contains_key(&node.name) {
            return Err(Error::DuplicateName(node.name));
        }

        let name = node.name.clone();
        let index = self.graph.add_node(node);
        self.index.insert(name, index);
        Ok(index)
    }

    /// Whether `name` is a root sentinel. A task of the same name wins.
    pub fn is_root_sentinel(&self, name: &str) -> bool {
        !self.index.contains_key(name) && self.root_sentinels.contains(name)
    }

    /// Resolve upstream references into edges and validate the graph.
    ///
    /// Reports every dangling reference and the first cycle found. On success
    /// the graph moves to `Validated`; on failure it stays `Building` with no
    /// edges. Calling it on a validated graph is a no-op.
    pub fn resolve_edges(&mut self) -> std::result::Result<(), Vec<Issue>> {
        if self.is_validated() {
            return Ok(());
        }

        let mut issues = Vec::new();
        let mut edges = Vec::new();

        for index in self.graph.node_indices() {
            let node = &self.graph[index];
            for reference in &node.upstream {
                if let Some(&upstream) = self.index.get(&reference.target) {
                    edges.push((upstream, index, reference.role.clone()));
                } else if !self.root_sentinels.contains(&reference.target) {
                    issues.push(Issue::new(
                        node.name.clone(),
                        Error::UnknownUpstream {
                            node: node.name.clone(),
                            missing: reference.target.clone(),
                        },
                    ));
                }
            }
        }

        if let Some(path) = self.find_cycle() {
            issues.push(Issue::new(path[0].clone(), Error::CycleDetected { path }));
        }

        if !issues.is_empty() {
            return Err(issues);
        }

        for (from, to, role) in edges {
            self.graph.add_edge(from, to, role);
        }
        self.state = GraphState::Validated;
        Ok(())
    }

    /// Depth-first search over upstream references keeping an explicit stack.
    ///
    /// Returns the first closed cycle in "depends on" direction, e.g. `[A, B, A]`
    /// when A reads from B and B reads from A. The stack lives on the heap, so
    /// long chains declared downstream-first cannot exhaust the thread stack.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        // Each frame is a node and the position of its next upstream reference.
        let mut stack: Vec<(NodeIndex, usize)> = Vec::new();

        for root in self.graph.node_indices() {
            if marks[root.index()] != Mark::Unvisited {
                continue;
            }
            marks[root.index()] = Mark::OnStack;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let (index, cursor) = *frame;
                let upstream = &self.graph[index].upstream;
                if cursor == upstream.len() {
                    stack.pop();
                    marks[index.index()] = Mark::Done;
                    continue;
                }
                frame.1 += 1;

                let Some(&next) = self.index.get(&upstream[cursor].target) else {
                    continue;
                };
                match marks[next.index()] {
                    Mark::OnStack => {
                        let start = stack.iter().position(|&(n, _)| n == next)?;
                        let mut path: Vec<String> = stack[start..]
                            .iter()
                            .map(|&(n, _)| self.graph[n].name.clone())
                            .collect();
                        path.push(self.graph[next].name.clone());
                        return Some(path);
                    }
                    Mark::Unvisited => {
                        marks[next.index()] = Mark::OnStack;
                        stack.push((next, 0));
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }

    fn require_validated(&self) -> Result<()> {
        if self.is_validated() {
            Ok(())
        } else {
            Err(Error::NotValidated)
        }
    }

    /// Get a task by name.
    pub fn get(&self, name: &str) -> Option<&TaskNode> {
        self.index.get(name).map(|&index| &self.graph[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All tasks in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.graph.node_indices().map(move |index| &self.graph[index])
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Resolved edges as `(upstream, downstream, role)`.
    pub fn edges(&self) -> Vec<(&str, &str, &UpstreamRole)> {
        self.graph
            .edge_references()
            .map(|edge| {
                (
                    self.graph[edge.source()].name.as_str(),
                    self.graph[edge.target()].name.as_str(),
                    edge.weight(),
                )
            })
            .collect()
    }

    /// Tasks that `name` reads from directly, in declaration order.
    pub fn upstream_of(&self, name: &str) -> Vec<&TaskNode> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Tasks that read from `name` directly, in declaration order.
    pub fn downstream_of(&self, name: &str) -> Vec<&TaskNode> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&TaskNode> {
        let Some(&index) = self.index.get(name) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(index, direction).collect();
        found.sort();
        found.dedup();
        found.into_iter().map(|n| &self.graph[n]).collect()
    }

    /// Tasks without upstream tasks: they only read from root sentinels, or
    /// declare no upstream at all.
    pub fn roots(&self) -> Vec<&TaskNode> {
        self.graph
            .node_indices()
            .filter(|&index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|index| &self.graph[index])
            .collect()
    }

    /// Tasks nothing else reads from.
    pub fn leaves(&self) -> Vec<&TaskNode> {
        self.graph
            .node_indices()
            .filter(|&index| {
                self.graph
                    .neighbors_directed(index, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .map(|index| &self.graph[index])
            .collect()
    }

    /// Root sentinels referenced by at least one task, in order of first use.
    pub fn referenced_sentinels(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for node in self.nodes() {
            for target in node.upstream_names() {
                if self.is_root_sentinel(target) && !seen.contains(&target) {
                    seen.push(target);
                }
            }
        }
        seen
    }

    /// The task run by default: the last leaf in declaration order.
    pub fn default_target(&self) -> Option<&TaskNode> {
        self.leaves().pop()
    }

    /// Tasks in topological order.
    ///
    /// Every task comes after all of its upstream tasks; ties are broken by
    /// declaration order so the result is deterministic.
    ///
    /// # Errors
    /// `NotValidated` while the graph is still being built.
    pub fn topological_order(&self) -> Result<Vec<&TaskNode>> {
        self.require_validated()?;

        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|index| self.graph.edges_directed(index, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|index| in_degree[index.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(&self.graph[index]);
            for edge in self.graph.edges_directed(index, Direction::Outgoing) {
                let target = edge.target();
                in_degree[target.index()] -= 1;
                if in_degree[target.index()] == 0 {
                    ready.push(Reverse(target));
                }
            }
        }

        Ok(order)
    }

    /// Everything the executor must run to produce `target`, in order.
    ///
    /// # Errors
    /// - `NotValidated` while the graph is still being built
    /// - `TaskNotFound` for an unknown target
    pub fn execution_plan(&self, target: &str) -> Result<Vec<&TaskNode>> {
        self.require_validated()?;
        let &start = self
            .index
            .get(target)
            .ok_or_else(|| Error::TaskNotFound(target.to_string()))?;

        let mut needed = HashSet::from([start]);
        let mut pending = vec![start];
        while let Some(index) = pending.pop() {
            for upstream in self.graph.neighbors_directed(index, Direction::Incoming) {
                if needed.insert(upstream) {
                    pending.push(upstream);
                }
            }
        }

        Ok(self
            .topological_order()?
            .into_iter()
            .filter(|node| {
                self.index
                    .get(&node.name)
                    .is_some_and(|index| needed.contains(index))
            })
            .collect())
    }

    /// Map the graph to the description handed to a graph-drawing tool.
    ///
    /// # Errors
    /// `NotValidated` while the graph is still being built.
    pub fn render_dependency_figure(&self) -> Result<DependencyFigure> {
        self.require_validated()?;

        let nodes = self
            .graph
            .node_indices()
            .map(|index| {
                let mut successors: Vec<_> = self
                    .graph
                    .edges_directed(index, Direction::Outgoing)
                    .map(|edge| (edge.target(), edge.id()))
                    .collect();
                successors.sort();
                let node = &self.graph[index];
                FigureNode {
                    name: node.name.clone(),
                    kind: node.kind,
                    successors: successors
                        .into_iter()
                        .map(|(target, edge)| FigureEdge {
                            target: self.graph[target].name.clone(),
                            role: self.graph[edge].clone(),
                        })
                        .collect(),
                }
            })
            .collect();

        let external_inputs = self
            .referenced_sentinels()
            .into_iter()
            .map(|sentinel| FigureNode {
                name: sentinel.to_string(),
                kind: TaskKind::External,
                successors: self
                    .nodes()
                    .flat_map(move |node| {
                        node.upstream
                            .iter()
                            .filter(move |r| r.target == sentinel)
                            .map(move |r| FigureEdge {
                                target: node.name.clone(),
                                role: r.role.clone(),
                            })
                    })
                    .collect(),
            })
            .collect();

        Ok(DependencyFigure {
            nodes,
            external_inputs,
        })
    }

    /// Serialize the tasks back into a pipeline document.
    ///
    /// Each task becomes a section holding its upstream keys, its parameters
    /// and its bounding box. Comments and layout are not preserved.
    pub fn to_toml_string(&self) -> Result<String> {
        let mut document = toml::Table::new();
        for node in self.nodes() {
            let mut section = toml::Table::new();
            for reference in &node.upstream {
                section.insert(
                    reference.key.clone(),
                    toml::Value::String(reference.target.clone()),
                );
            }
            for (key, value) in node.parameters.to_toml_table() {
                section.insert(key, value);
            }
            if let Some(bbox) = &node.bounding_box {
                let mut axes = toml::Table::new();
                for (axis, range) in bbox.axes() {
                    if let Some(range) = range {
                        axes.insert(
                            axis.to_string(),
                            toml::Value::Array(vec![
                                toml::Value::Float(range.min),
                                toml::Value::Float(range.max),
                            ]),
                        );
                    }
                }
                section.insert("bounding_box".to_string(), toml::Value::Table(axes));
            }
            document.insert(node.name.clone(), toml::Value::Table(section));
        }
        Ok(toml::to_string(&document)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl Default for PipelineGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("state", &self.state)
            .field("tasks", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
