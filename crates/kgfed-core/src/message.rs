//! Backend-facing wire types: question graphs, responses, merged results.
//!
//! Knowledge-graph elements keep every attribute a backend sends; only the
//! fields the engine reasons about (`id`, endpoints) are typed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One identifier or a list of alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Curies {
    One(String),
    Many(Vec<String>),
}

impl Curies {
    /// Build from a list: a single entry collapses to [`Curies::One`].
    #[must_use]
    pub fn from_ids(mut ids: Vec<String>) -> Option<Self> {
        match ids.len() {
            0 => None,
            1 => ids.pop().map(Self::One),
            _ => Some(Self::Many(ids)),
        }
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::One(id) => vec![id.as_str()],
            Self::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    /// Apply `f` to every identifier, keeping the shape.
    #[must_use]
    pub fn map(&self, f: impl Fn(&str) -> String) -> Self {
        match self {
            Self::One(id) => Self::One(f(id)),
            Self::Many(ids) => Self::Many(ids.iter().map(|id| f(id)).collect()),
        }
    }
}

/// A knowledge-graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Node {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.attributes.get("name").and_then(Value::as_str)
    }

    /// Identifiers the backend declared equivalent to `id`.
    #[must_use]
    pub fn equivalent_identifiers(&self) -> Vec<&str> {
        match self.attributes.get("equivalent_identifiers") {
            Some(Value::Array(ids)) => ids.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(id)) => vec![id.as_str()],
            _ => Vec::new(),
        }
    }
}

/// A knowledge-graph edge. `id` is optional on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source_id: String,
    pub target_id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Edge {
    #[must_use]
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            id: None,
            source_id: source_id.into(),
            target_id: target_id.into(),
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// One answer: variable-to-identifier bindings for nodes and edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(default)]
    pub node_bindings: BTreeMap<String, Curies>,
    #[serde(default)]
    pub edge_bindings: BTreeMap<String, Curies>,
}

impl Answer {
    /// Convenience constructor from single-id node bindings.
    #[must_use]
    pub fn from_nodes<'a>(bindings: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            node_bindings: bindings
                .into_iter()
                .map(|(k, v)| (k.to_string(), Curies::One(v.to_string())))
                .collect(),
            edge_bindings: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_edge(mut self, label: &str, id: &str) -> Self {
        self.edge_bindings
            .insert(label.to_string(), Curies::One(id.to_string()));
        self
    }
}

/// What a backend returns for one question graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub knowledge_graph: KnowledgeGraph,
    #[serde(default)]
    pub knowledge_map: Vec<Answer>,
    /// Concept names this response covers, in path order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_order: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionNode {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curie: Option<Curies>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEdge {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    pub source_id: String,
    pub target_id: String,
}

/// Backend-neutral request graph derived from a planned sub-query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionGraph {
    pub nodes: Vec<QuestionNode>,
    pub edges: Vec<QuestionEdge>,
}

impl QuestionGraph {
    /// Node ids in question order.
    #[must_use]
    pub fn order(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }
}

/// A plan segment that failed under best-effort execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentFailure {
    pub segment: usize,
    pub backend: String,
    pub message: String,
}

/// Unified graph and complete answers for one SELECT statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub knowledge_graph: KnowledgeGraph,
    pub knowledge_map: Vec<Answer>,
    pub question_graph: QuestionGraph,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SegmentFailure>,
}
