//! Backend abstraction and the in-process implementations.
//!
//! The transport used to reach a knowledge source lives behind [`Backend`].
//! [`InMemoryBackend`] serves canned responses by question-graph type
//! signature; [`ImplicitConversionBackend`] answers the reserved
//! `implicit_conversion` arcs by echoing bound identifiers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kgfed_core::{
    Answer, Curies, KgfedError, KnowledgeGraph, Node, QuestionGraph, Response, Result,
    IMPLICIT_CONVERSION,
};
use kgfed_parser::Constraint;
use serde::Serialize;
use serde_json::json;

use crate::compiler::CompiledStatement;

/// What a backend receives for one plan segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendRequest {
    pub service: String,
    pub question_graph: QuestionGraph,
    /// Constraints already formatted for this backend.
    pub constraints: Vec<Constraint>,
}

impl From<&CompiledStatement> for BackendRequest {
    fn from(statement: &CompiledStatement) -> Self {
        Self {
            service: statement.service.clone(),
            question_graph: statement.question_graph(),
            constraints: statement.where_clause.clone(),
        }
    }
}

/// A knowledge source that answers question graphs.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Schema id of this backend.
    fn id(&self) -> &str;

    /// Answer one question graph.
    ///
    /// # Errors
    ///
    /// Transport failures and malformed replies should surface as
    /// [`KgfedError::BackendExecution`].
    async fn query(&self, request: &BackendRequest) -> Result<Response>;
}

/// Backends by schema id.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// A registry that already serves `implicit_conversion`.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register(ImplicitConversionBackend);
        registry
    }

    /// Register `backend` under its id, replacing any previous entry.
    pub fn register(&mut self, backend: impl Backend + 'static) -> &mut Self {
        self.backends
            .insert(backend.id().to_string(), Arc::new(backend));
        self
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.backends.keys()).finish()
    }
}

// ── In-memory backend ─────────────────────────────────────

/// Canned responses keyed by the node types of the question graph.
///
/// Canned answers label edges by their position within the segment (`e0` is
/// the segment's first transition). They are renamed to the request's own
/// question-edge ids before being returned.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    id: String,
    responses: HashMap<Vec<String>, Response>,
    failure: Option<String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<BackendRequest>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Serve `response` for question graphs whose node types are `types`, in order.
    #[must_use]
    pub fn with_response(mut self, types: &[&str], response: Response) -> Self {
        self.responses
            .insert(types.iter().map(|t| t.to_string()).collect(), response);
        self
    }

    /// Fail every request with `message`.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Wait `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Drop answers contradicting a bound question node.
    fn filter_bound(request: &BackendRequest, mut response: Response) -> Response {
        let bound: Vec<(&str, Vec<&str>)> = request
            .question_graph
            .nodes
            .iter()
            .filter_map(|n| n.curie.as_ref().map(|c| (n.id.as_str(), c.ids())))
            .collect();
        response.knowledge_map.retain(|answer| {
            bound.iter().all(|(name, ids)| {
                answer
                    .node_bindings
                    .get(*name)
                    .map_or(true, |b| b.ids().iter().any(|id| ids.contains(id)))
            })
        });
        response
    }

    /// Rename positional edge labels `e{k}` to the id of the request's `k`-th edge.
    fn relabel_edges(request: &BackendRequest, mut response: Response) -> Response {
        let labels: Vec<&str> = request
            .question_graph
            .edges
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        for answer in &mut response.knowledge_map {
            answer.edge_bindings = std::mem::take(&mut answer.edge_bindings)
                .into_iter()
                .map(|(label, ids)| {
                    let position = label
                        .strip_prefix('e')
                        .and_then(|k| k.parse::<usize>().ok())
                        .and_then(|k| labels.get(k));
                    match position {
                        Some(renamed) => ((*renamed).to_string(), ids),
                        None => (label, ids),
                    }
                })
                .collect();
        }
        response
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn query(&self, request: &BackendRequest) -> Result<Response> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(KgfedError::BackendExecution {
                backend: self.id.clone(),
                message: message.clone(),
            });
        }

        let signature: Vec<String> = request
            .question_graph
            .nodes
            .iter()
            .map(|n| n.type_name.clone())
            .collect();
        let response = self.responses.get(&signature).cloned().unwrap_or_default();
        Ok(Self::filter_bound(
            request,
            Self::relabel_edges(request, response),
        ))
    }
}

// ── Implicit conversion ───────────────────────────────────

/// Serves type-coercion arcs: every concept of the segment is bound to the
/// identifiers of the first bound concept.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplicitConversionBackend;

#[async_trait]
impl Backend for ImplicitConversionBackend {
    fn id(&self) -> &str {
        IMPLICIT_CONVERSION
    }

    async fn query(&self, request: &BackendRequest) -> Result<Response> {
        let qg = &request.question_graph;
        let Some(ids) = qg.nodes.iter().find_map(|n| n.curie.as_ref()) else {
            return Ok(Response {
                question_order: Some(qg.order()),
                ..Response::default()
            });
        };

        let nodes = ids
            .ids()
            .into_iter()
            .map(|id| {
                let types: Vec<&str> = qg.nodes.iter().map(|n| n.type_name.as_str()).collect();
                Node::new(id).with("type", json!(types))
            })
            .collect();
        let knowledge_map = ids
            .ids()
            .into_iter()
            .map(|id| Answer {
                node_bindings: qg
                    .nodes
                    .iter()
                    .map(|n| (n.id.clone(), Curies::One(id.to_string())))
                    .collect(),
                edge_bindings: BTreeMap::new(),
            })
            .collect();

        Ok(Response {
            knowledge_graph: KnowledgeGraph {
                nodes,
                edges: Vec::new(),
            },
            knowledge_map,
            question_order: Some(qg.order()),
        })
    }
}

// ── Name resolution ───────────────────────────────────────

/// Maps free-text names to identifiers, most significant first.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// # Errors
    ///
    /// Implementations report lookup failures as [`KgfedError`].
    async fn resolve_name(&self, text: &str, type_name: &str) -> Result<Vec<String>>;
}

/// Fixed, case-insensitive name table.
#[derive(Debug, Clone, Default)]
pub struct StaticNameResolver {
    names: HashMap<String, Vec<String>>,
}

impl StaticNameResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, ids: &[&str]) -> Self {
        self.insert(name, ids.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn insert(&mut self, name: &str, ids: Vec<String>) {
        self.names.insert(name.to_lowercase(), ids);
    }
}

#[async_trait]
impl NameResolver for StaticNameResolver {
    async fn resolve_name(&self, text: &str, _type_name: &str) -> Result<Vec<String>> {
        Ok(self
            .names
            .get(&text.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgfed_core::QuestionNode;

    fn request(nodes: &[(&str, &str, Option<&str>)]) -> BackendRequest {
        BackendRequest {
            service: "/test".to_string(),
            question_graph: QuestionGraph {
                nodes: nodes
                    .iter()
                    .map(|(id, t, curie)| QuestionNode {
                        id: id.to_string(),
                        type_name: t.to_string(),
                        curie: curie.map(|c| Curies::One(c.to_string())),
                    })
                    .collect(),
                edges: Vec::new(),
            },
            constraints: Vec::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_backend_matches_type_signature() {
        let response = Response {
            knowledge_map: vec![
                Answer::from_nodes([("chemical_substance", "CHEBI:1"), ("disease", "MONDO:1")]),
                Answer::from_nodes([("chemical_substance", "CHEBI:2"), ("disease", "MONDO:2")]),
            ],
            ..Response::default()
        };
        let backend = InMemoryBackend::new("robokop")
            .with_response(&["chemical_substance", "disease"], response);

        let hit = backend
            .query(&request(&[
                ("chemical_substance", "chemical_substance", Some("CHEBI:2")),
                ("disease", "disease", None),
            ]))
            .await
            .unwrap();
        assert_eq!(hit.knowledge_map.len(), 1);
        assert_eq!(hit.knowledge_map[0].node_bindings["disease"].ids(), vec!["MONDO:2"]);

        let miss = backend
            .query(&request(&[("gene", "gene", None), ("disease", "disease", None)]))
            .await
            .unwrap();
        assert!(miss.knowledge_map.is_empty());
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn in_memory_backend_renames_positional_edge_labels() {
        let response = Response {
            knowledge_map: vec![Answer::from_nodes([("disease", "MONDO:1"), ("gene", "HGNC:1")])
                .with_edge("e0", "assoc-1")
                .with_edge("custom", "x-1")],
            ..Response::default()
        };
        let backend = InMemoryBackend::new("robokop").with_response(&["disease", "gene"], response);

        let mut req = request(&[("disease", "disease", None), ("gene", "gene", None)]);
        req.question_graph.edges.push(kgfed_core::QuestionEdge {
            id: "e1".to_string(),
            predicate: None,
            source_id: "disease".to_string(),
            target_id: "gene".to_string(),
        });

        let answer = &backend.query(&req).await.unwrap().knowledge_map[0];
        let labels: Vec<&str> = answer.edge_bindings.keys().map(String::as_str).collect();
        assert_eq!(labels, vec!["custom", "e1"]);
        assert_eq!(answer.edge_bindings["e1"].ids(), vec!["assoc-1"]);
    }

    #[tokio::test]
    async fn failing_backend_reports_its_id() {
        let backend = InMemoryBackend::new("rtx").failing("connection refused");
        let err = backend.query(&request(&[("a", "a", None)])).await.unwrap_err();
        assert_eq!(err.backend(), Some("rtx"));
    }

    #[tokio::test]
    async fn implicit_conversion_echoes_bound_ids() {
        let response = ImplicitConversionBackend
            .query(&request(&[
                ("drug_exposure", "drug_exposure", Some("CHEBI:5855")),
                ("chemical_substance", "chemical_substance", None),
            ]))
            .await
            .unwrap();
        assert_eq!(response.knowledge_map.len(), 1);
        let answer = &response.knowledge_map[0];
        assert_eq!(answer.node_bindings["chemical_substance"].ids(), vec!["CHEBI:5855"]);
        assert_eq!(answer.node_bindings["drug_exposure"].ids(), vec!["CHEBI:5855"]);
        assert_eq!(
            response.question_order,
            Some(vec!["drug_exposure".to_string(), "chemical_substance".to_string()])
        );
    }

    #[tokio::test]
    async fn registry_serves_implicit_conversion_by_default() {
        let mut registry = BackendRegistry::new();
        registry.register(InMemoryBackend::new("robokop"));
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec![IMPLICIT_CONVERSION, "robokop"]);
        assert!(registry.get("rtx").is_none());
    }

    #[tokio::test]
    async fn static_resolver_ignores_case() {
        let resolver = StaticNameResolver::new().with("Asthma", &["MONDO:0004979"]);
        let ids = resolver.resolve_name("asthma", "disease").await.unwrap();
        assert_eq!(ids, vec!["MONDO:0004979"]);
        assert!(resolver
            .resolve_name("unknown", "disease")
            .await
            .unwrap()
            .is_empty());
    }
}
