//! Graph visualization of a merged knowledge graph.
//!
//! Supports DOT, Mermaid, and JSON output formats.

use kgfed_core::{KnowledgeGraph, MergedResult};
use serde_json::Value;

/// A node in the rendered graph.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub types: Vec<String>,
    pub reasoners: Vec<String>,
}

/// An edge in the rendered graph.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub rel: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ResultGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Builds renderable graphs from merged results.
pub struct GraphBuilder;

impl GraphBuilder {
    #[must_use]
    pub fn from_result(result: &MergedResult) -> ResultGraph {
        Self::from_knowledge_graph(&result.knowledge_graph)
    }

    /// Node labels prefer `name`; edge labels join the `type` list.
    #[must_use]
    pub fn from_knowledge_graph(kg: &KnowledgeGraph) -> ResultGraph {
        let nodes = kg
            .nodes
            .iter()
            .map(|node| GraphNode {
                id: node.id.clone(),
                label: node.name().unwrap_or(&node.id).to_string(),
                types: strings(node.attributes.get("type")),
                reasoners: strings(node.attributes.get("reasoner")),
            })
            .collect();
        let edges = kg
            .edges
            .iter()
            .map(|edge| GraphEdge {
                source: edge.source_id.clone(),
                target: edge.target_id.clone(),
                rel: strings(edge.attributes.get("type")).join(","),
            })
            .collect();
        ResultGraph { nodes, edges }
    }

    /// Format a graph as DOT (Graphviz) output.
    #[must_use]
    pub fn format_dot(graph: &ResultGraph) -> String {
        let mut out = String::from("digraph kgfed {\n  rankdir=LR;\n  node [shape=box];\n\n");

        for node in &graph.nodes {
            let label = node.label.replace('"', "\\\"");
            out.push_str(&format!(
                "  \"{}\" [label=\"{}\\n({})\" tooltip=\"{}\"];\n",
                node.id,
                label,
                node.types.join(", "),
                node.reasoners.join(", ")
            ));
        }

        out.push('\n');

        for edge in &graph.edges {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                edge.source, edge.target, edge.rel
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Format a graph as Mermaid diagram.
    #[must_use]
    pub fn format_mermaid(graph: &ResultGraph) -> String {
        let mut out = String::from("graph LR\n");

        for node in &graph.nodes {
            let label = node.label.replace('"', "'");
            out.push_str(&format!("  {}[\"{}\"]\n", mermaid_id(&node.id), label));
        }

        out.push('\n');

        for edge in &graph.edges {
            if edge.rel.is_empty() {
                out.push_str(&format!(
                    "  {} --> {}\n",
                    mermaid_id(&edge.source),
                    mermaid_id(&edge.target)
                ));
            } else {
                out.push_str(&format!(
                    "  {} -->|{}| {}\n",
                    mermaid_id(&edge.source),
                    edge.rel,
                    mermaid_id(&edge.target)
                ));
            }
        }

        out
    }

    /// Format a graph as JSON.
    #[must_use]
    pub fn format_json(graph: &ResultGraph) -> String {
        serde_json::to_string_pretty(graph).unwrap_or_else(|_| "{}".to_string())
    }
}

/// CURIEs carry `:` and `.`, which Mermaid ids cannot.
fn mermaid_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
