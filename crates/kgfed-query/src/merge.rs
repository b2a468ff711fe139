//! Graph merge: folds per-backend knowledge graphs into one.
//!
//! Nodes merge by identifier equivalence (and by name when no side carries
//! equivalent identifiers). The first node of a group fixes its canonical id.
//! Edges merge when their endpoints, remapped to canonical ids, coincide.
//!
//! Attribute rules, shared by nodes and edges: lists union in first-seen
//! order, `type` is always a list, scalars keep the first non-null value and
//! a scalar meeting a list is treated as a one-element list.

use std::collections::{BTreeSet, HashMap};

use kgfed_core::{Answer, Edge, KnowledgeGraph, MergedResult, Node, QuestionGraph, Response};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::join::join_answers;

const TYPE: &str = "type";
const EQUIVALENT_IDENTIFIERS: &str = "equivalent_identifiers";

/// A merged knowledge graph plus the id mappings needed to rewrite answers.
#[derive(Debug, Clone, Default)]
pub struct MergedGraph {
    pub knowledge_graph: KnowledgeGraph,
    node_ids: HashMap<String, String>,
    edge_ids: HashMap<(usize, String), String>,
}

impl MergedGraph {
    /// Canonical id for a raw node id. Unknown ids map to themselves.
    #[must_use]
    pub fn canonical_node<'a>(&'a self, raw: &'a str) -> &'a str {
        self.node_ids.get(raw).map_or(raw, String::as_str)
    }

    /// Retained id for edge `raw` as sent in response `response`.
    #[must_use]
    pub fn retained_edge<'a>(&'a self, response: usize, raw: &'a str) -> &'a str {
        self.edge_ids
            .get(&(response, raw.to_string()))
            .map_or(raw, String::as_str)
    }

    /// Rewrite an answer from response `response` onto merged ids.
    #[must_use]
    pub fn canonicalize(&self, response: usize, answer: &Answer) -> Answer {
        Answer {
            node_bindings: answer
                .node_bindings
                .iter()
                .map(|(k, v)| (k.clone(), v.map(|id| self.canonical_node(id).to_string())))
                .collect(),
            edge_bindings: answer
                .edge_bindings
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        v.map(|id| self.retained_edge(response, id).to_string()),
                    )
                })
                .collect(),
        }
    }
}

/// Merge responses (already in plan order) into one result.
///
/// `root_order` is the concept order of the full query path; without it the
/// answers are concatenated instead of joined.
#[must_use]
pub fn merge_responses(
    responses: &[Response],
    root_order: Option<&[String]>,
    question_graph: QuestionGraph,
) -> MergedResult {
    let graph = merge_graphs(responses);
    let knowledge_map = join_answers(responses, root_order, &graph);
    MergedResult {
        knowledge_graph: graph.knowledge_graph,
        knowledge_map,
        question_graph,
        failures: Vec::new(),
    }
}

/// Merge the knowledge graphs of `responses`, nodes first.
#[must_use]
pub fn merge_graphs(responses: &[Response]) -> MergedGraph {
    let (nodes, node_ids) = merge_nodes(responses);
    let mut graph = MergedGraph {
        knowledge_graph: KnowledgeGraph::default(),
        node_ids,
        edge_ids: HashMap::new(),
    };
    let (edges, edge_ids) = merge_edges(responses, &graph);
    debug!(
        nodes = nodes.len(),
        edges = edges.len(),
        responses = responses.len(),
        "knowledge graphs merged"
    );
    graph.knowledge_graph = KnowledgeGraph { nodes, edges };
    graph.edge_ids = edge_ids;
    graph
}

// ── Nodes ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct NodeGroup {
    alive: bool,
    canonical: String,
    /// Raw ids plus any declared equivalents; used for matching.
    keys: BTreeSet<String>,
    /// Raw ids of the nodes that joined.
    raw_ids: BTreeSet<String>,
    name: Option<String>,
    has_equivalents: bool,
    attributes: Map<String, Value>,
}

impl NodeGroup {
    fn new(node: &Node, keys: BTreeSet<String>, has_equivalents: bool) -> Self {
        let mut group = Self {
            alive: true,
            canonical: node.id.clone(),
            ..Self::default()
        };
        group.add(node, keys, has_equivalents);
        group
    }

    fn matches(
        &self,
        id: &str,
        keys: &BTreeSet<String>,
        name: Option<&str>,
        has_equivalents: bool,
    ) -> bool {
        self.canonical == id
            || !self.keys.is_disjoint(keys)
            || (!has_equivalents
                && !self.has_equivalents
                && name.is_some()
                && self.name.as_deref() == name)
    }

    fn add(&mut self, node: &Node, keys: BTreeSet<String>, has_equivalents: bool) {
        self.keys.extend(keys);
        self.raw_ids.insert(node.id.clone());
        self.has_equivalents |= has_equivalents;
        if self.name.is_none() {
            self.name = node.name().map(str::to_string);
        }
        for (key, value) in &node.attributes {
            if key != EQUIVALENT_IDENTIFIERS {
                merge_attribute(&mut self.attributes, key, value);
            }
        }
    }

    fn absorb(&mut self, other: Self) {
        self.keys.extend(other.keys);
        self.raw_ids.extend(other.raw_ids);
        self.has_equivalents |= other.has_equivalents;
        if self.name.is_none() {
            self.name = other.name;
        }
        for (key, value) in &other.attributes {
            merge_attribute(&mut self.attributes, key, value);
        }
    }

    fn into_node(self) -> Node {
        let mut attributes = self.attributes;
        attributes
            .entry(TYPE)
            .or_insert_with(|| Value::Array(Vec::new()));
        attributes.insert(
            EQUIVALENT_IDENTIFIERS.to_string(),
            Value::Array(self.raw_ids.into_iter().map(Value::String).collect()),
        );
        Node {
            id: self.canonical,
            attributes,
        }
    }
}

fn merge_nodes(responses: &[Response]) -> (Vec<Node>, HashMap<String, String>) {
    let mut groups: Vec<NodeGroup> = Vec::new();

    for node in responses.iter().flat_map(|r| &r.knowledge_graph.nodes) {
        let declared = node.equivalent_identifiers();
        let has_equivalents = !declared.is_empty();
        let mut keys: BTreeSet<String> = declared.into_iter().map(str::to_string).collect();
        keys.insert(node.id.clone());

        let matching: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.alive && g.matches(&node.id, &keys, node.name(), has_equivalents))
            .map(|(i, _)| i)
            .collect();

        let Some((&target, rest)) = matching.split_first() else {
            groups.push(NodeGroup::new(node, keys, has_equivalents));
            continue;
        };
        for &other in rest {
            let folded = std::mem::take(&mut groups[other]);
            groups[target].absorb(folded);
        }
        groups[target].add(node, keys, has_equivalents);
    }

    let mut ids = HashMap::new();
    for group in groups.iter().filter(|g| g.alive) {
        for raw in &group.raw_ids {
            ids.insert(raw.clone(), group.canonical.clone());
        }
    }
    for group in groups.iter().filter(|g| g.alive) {
        for key in &group.keys {
            ids.entry(key.clone())
                .or_insert_with(|| group.canonical.clone());
        }
    }

    let nodes = groups
        .into_iter()
        .filter(|g| g.alive)
        .map(NodeGroup::into_node)
        .collect();
    (nodes, ids)
}

// ── Edges ─────────────────────────────────────────────────

struct EdgeGroup {
    source_id: String,
    target_id: String,
    id: Option<String>,
    attributes: Map<String, Value>,
}

fn merge_edges(
    responses: &[Response],
    graph: &MergedGraph,
) -> (Vec<Edge>, HashMap<(usize, String), String>) {
    let mut groups: Vec<EdgeGroup> = Vec::new();
    let mut by_pair: HashMap<(String, String), usize> = HashMap::new();
    let mut raw_edges: Vec<((usize, String), usize)> = Vec::new();

    for (r, response) in responses.iter().enumerate() {
        for edge in &response.knowledge_graph.edges {
            let source_id = graph.canonical_node(&edge.source_id).to_string();
            let target_id = graph.canonical_node(&edge.target_id).to_string();
            let index = *by_pair
                .entry((source_id.clone(), target_id.clone()))
                .or_insert_with(|| {
                    groups.push(EdgeGroup {
                        source_id,
                        target_id,
                        id: None,
                        attributes: Map::new(),
                    });
                    groups.len() - 1
                });

            let group = &mut groups[index];
            if group.id.is_none() {
                group.id.clone_from(&edge.id);
            }
            for (key, value) in &edge.attributes {
                merge_attribute(&mut group.attributes, key, value);
            }
            if let Some(raw) = &edge.id {
                raw_edges.push(((r, raw.clone()), index));
            }
        }
    }

    let edges: Vec<Edge> = groups
        .into_iter()
        .map(|group| {
            let mut attributes = group.attributes;
            attributes
                .entry(TYPE)
                .or_insert_with(|| Value::Array(Vec::new()));
            let id = group.id.unwrap_or_else(|| {
                generated_edge_id(&group.source_id, &group.target_id, &attributes[TYPE])
            });
            Edge {
                id: Some(id),
                source_id: group.source_id,
                target_id: group.target_id,
                attributes,
            }
        })
        .collect();

    let mut ids = HashMap::new();
    for (key, index) in raw_edges {
        if let Some(retained) = edges[index].id.clone() {
            ids.entry(key).or_insert(retained);
        }
    }
    (edges, ids)
}

/// Deterministic id for an edge no backend named.
fn generated_edge_id(source_id: &str, target_id: &str, types: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0]);
    hasher.update(target_id.as_bytes());
    hasher.update([0]);
    hasher.update(types.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("kgfed:{}", &digest[..32])
}

// ── Attributes ────────────────────────────────────────────

fn merge_attribute(target: &mut Map<String, Value>, key: &str, value: &Value) {
    let incoming = if key == TYPE {
        Value::Array(as_list(value))
    } else {
        value.clone()
    };
    if !target.contains_key(key) {
        target.insert(key.to_string(), incoming);
        return;
    }
    let Some(existing) = target.get_mut(key) else {
        return;
    };
    if existing.is_null() {
        *existing = incoming;
    } else if let Value::Array(items) = existing {
        union_into(items, &incoming);
    } else if incoming.is_array() {
        let mut items = vec![existing.take()];
        union_into(&mut items, &incoming);
        *existing = Value::Array(items);
    }
}

/// `[a, b] ∪ [a, c] = [a, b, c]`; a scalar counts as a one-element list.
fn union_into(items: &mut Vec<Value>, incoming: &Value) {
    for value in as_list(incoming) {
        if !items.contains(&value) {
            items.push(value);
        }
    }
}

fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        scalar => vec![scalar.clone()],
    }
}
