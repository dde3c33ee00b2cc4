//! Dependency figure handed to an external graph-drawing tool.
//!
//! The figure is plain data: nodes with their kind and outgoing, role-labelled
//! edges. [`DependencyFigure::to_dot`] turns it into a Graphviz description laid
//! out left to right; turning that into an image is the drawing tool's job.

use crate::core::task::{TaskKind, UpstreamRole};
use serde::Serialize;
use std::fmt::Write;

/// An edge from a figure node to a task that reads from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FigureEdge {
    pub target: String,
    pub role: UpstreamRole,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FigureNode {
    pub name: String,
    pub kind: TaskKind,
    pub successors: Vec<FigureEdge>,
}

/// Snapshot of a validated pipeline graph for visual layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyFigure {
    /// Tasks in declaration order.
    pub nodes: Vec<FigureNode>,
    /// Root sentinels referenced by the tasks, in order of first use.
    pub external_inputs: Vec<FigureNode>,
}

impl DependencyFigure {
    /// Render as a Graphviz digraph.
    ///
    /// External inputs are left out unless `include_external` is set, which
    /// keeps the picture focused on the tasks themselves.
    pub fn to_dot(&self, include_external: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph pipeline {{");
        let _ = writeln!(out, "    rankdir=LR;");
        let _ = writeln!(out, "    node [shape=box];");

        if include_external {
            for node in &self.external_inputs {
                let _ = writeln!(
                    out,
                    "    {} [label={}, shape=ellipse];",
                    quote(&node.name),
                    quote(&node.name)
                );
            }
        }
        for node in &self.nodes {
            let _ = writeln!(
                out,
                "    {} [label={}];",
                quote(&node.name),
                quote(&format!("{}\n({})", node.name, node.kind))
            );
        }

        let external = self.external_inputs.iter().filter(|_| include_external);
        for node in external.chain(&self.nodes) {
            for edge in &node.successors {
                let _ = writeln!(
                    out,
                    "    {} -> {} [label={}];",
                    quote(&node.name),
                    quote(&edge.target),
                    quote(&edge.role.to_string())
                );
            }
        }

        out.push_str("}\n");
        out
    }
}

/// Quote a DOT identifier, escaping quotes, backslashes and newlines.
fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
