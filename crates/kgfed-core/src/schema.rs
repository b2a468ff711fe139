//! Schema graph: which backend can traverse which concept-to-concept arc.
//!
//! The graph is loaded once (usually from YAML) and never mutated afterwards;
//! callers share it behind an `Arc`. Vertices are concept types, arcs are
//! `(source_type, target_type)` pairs annotated with the backends that support
//! them and the predicates each backend accepts on that arc.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{KgfedError, Result};

/// Backend id reserved for implicit type-coercion arcs.
pub const IMPLICIT_CONVERSION: &str = "implicit_conversion";

/// Serialized schema document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub backends: BTreeMap<String, BackendDefinition>,
    /// `specific_type -> [more general types]`.
    #[serde(default)]
    pub implicit_conversions: BTreeMap<String, Vec<String>>,
}

/// One backend's entry in a [`SchemaDefinition`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendDefinition {
    /// Endpoint the backend is reached at; defaults to `/<id>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `source_type -> target_type -> [predicates]`. An empty list accepts any predicate.
    #[serde(default)]
    pub transitions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// A registered backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendInfo {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
struct SchemaArc {
    backend: String,
    /// Empty means any predicate.
    predicates: BTreeSet<String>,
}

impl SchemaArc {
    fn accepts(&self, predicate: Option<&str>) -> bool {
        match predicate {
            None => true,
            Some(p) => self.predicates.is_empty() || self.predicates.contains(p),
        }
    }
}

/// Immutable, queryable type-transition graph.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    backends: BTreeMap<String, BackendInfo>,
    arcs: HashMap<(String, String), Vec<SchemaArc>>,
    conversions: BTreeMap<String, BTreeSet<String>>,
    types: BTreeSet<String>,
    predicates: BTreeSet<String>,
    wildcard_predicates: bool,
}

impl SchemaGraph {
    /// Load a schema graph from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`KgfedError::SchemaLoad`] if the YAML is malformed.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let definition: SchemaDefinition = serde_yaml::from_str(text)?;
        Ok(Self::from_definition(definition))
    }

    #[must_use]
    pub fn from_definition(definition: SchemaDefinition) -> Self {
        let mut builder = SchemaBuilder::default();
        for (id, backend) in definition.backends {
            let url = backend.url.unwrap_or_else(|| format!("/{id}"));
            builder = builder.backend(&id, &url);
            for (source, targets) in backend.transitions {
                for (target, predicates) in targets {
                    let predicates: Vec<&str> = predicates.iter().map(String::as_str).collect();
                    builder = builder.arc(&id, &source, &target, &predicates);
                }
            }
        }
        for (specific, generals) in definition.implicit_conversions {
            for general in generals {
                builder = builder.conversion(&specific, &general);
            }
        }
        builder.build()
    }

    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Registered backend ids, in lexicographic order.
    pub fn backend_ids(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    #[must_use]
    pub fn backend(&self, id: &str) -> Option<&BackendInfo> {
        self.backends.get(id)
    }

    /// Find a backend by id or by its endpoint URL.
    #[must_use]
    pub fn backend_for_source(&self, source: &str) -> Option<&BackendInfo> {
        self.backends
            .get(source)
            .or_else(|| self.backends.values().find(|b| b.url == source))
    }

    #[must_use]
    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains(type_name)
    }

    #[must_use]
    pub fn has_predicate(&self, predicate: &str) -> bool {
        self.wildcard_predicates || self.predicates.contains(predicate)
    }

    /// Backends with a direct arc `source_type -> target_type` accepting `predicate`.
    #[must_use]
    pub fn direct_backends(
        &self,
        source_type: &str,
        predicate: Option<&str>,
        target_type: &str,
    ) -> BTreeSet<String> {
        self.arcs
            .get(&(source_type.to_string(), target_type.to_string()))
            .map(|arcs| {
                arcs.iter()
                    .filter(|arc| arc.accepts(predicate))
                    .map(|arc| arc.backend.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `type_name` plus every type it can be implicitly converted to.
    #[must_use]
    pub fn coercions(&self, type_name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([type_name.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(generals) = self.conversions.get(&current) {
                queue.extend(generals.iter().cloned());
            }
        }
        seen
    }

    /// Backends able to answer the backend-facing arc `source_type -> target_type`.
    ///
    /// Direct arcs win. Without one, a source type that coerces to a
    /// different target type is served by [`IMPLICIT_CONVERSION`]; failing
    /// that, arcs between the coercion closures of both types are used.
    ///
    /// # Errors
    ///
    /// Returns [`KgfedError::SchemaType`] for an unknown type or predicate and
    /// [`KgfedError::UnsupportedTransition`] when no backend supports the arc.
    pub fn backends_for(
        &self,
        source_type: &str,
        predicate: Option<&str>,
        target_type: &str,
    ) -> Result<BTreeSet<String>> {
        for type_name in [source_type, target_type] {
            if !self.has_type(type_name) {
                return Err(KgfedError::SchemaType(format!(
                    "unknown concept type '{type_name}'"
                )));
            }
        }
        if let Some(p) = predicate {
            if !self.has_predicate(p) {
                return Err(KgfedError::SchemaType(format!("unknown predicate '{p}'")));
            }
        }

        let direct = self.direct_backends(source_type, predicate, target_type);
        if !direct.is_empty() {
            return Ok(direct);
        }

        let source_closure = self.coercions(source_type);
        if predicate.is_none()
            && source_type != target_type
            && source_closure.contains(target_type)
        {
            return Ok(BTreeSet::from([IMPLICIT_CONVERSION.to_string()]));
        }

        let target_closure = self.coercions(target_type);
        let mut coerced = BTreeSet::new();
        for source in &source_closure {
            for target in &target_closure {
                coerced.extend(self.direct_backends(source, predicate, target));
            }
        }
        if coerced.is_empty() {
            return Err(KgfedError::UnsupportedTransition {
                source_type: source_type.to_string(),
                predicate: predicate.map(str::to_string),
                target_type: target_type.to_string(),
            });
        }
        Ok(coerced)
    }
}

/// Incremental constructor for a [`SchemaGraph`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    graph: SchemaGraph,
}

impl SchemaBuilder {
    #[must_use]
    pub fn backend(mut self, id: &str, url: &str) -> Self {
        self.graph.backends.insert(
            id.to_string(),
            BackendInfo {
                id: id.to_string(),
                url: url.to_string(),
            },
        );
        self
    }

    /// Declare that `backend` can traverse `source -> target` with the given
    /// predicates (none = any). Registers the backend if it is unknown.
    #[must_use]
    pub fn arc(mut self, backend: &str, source: &str, target: &str, predicates: &[&str]) -> Self {
        if !self.graph.backends.contains_key(backend) {
            self = self.backend(backend, &format!("/{backend}"));
        }
        let graph = &mut self.graph;
        graph.types.insert(source.to_string());
        graph.types.insert(target.to_string());
        graph.predicates.extend(predicates.iter().map(|p| p.to_string()));
        graph.wildcard_predicates |= predicates.is_empty();
        let arcs = graph
            .arcs
            .entry((source.to_string(), target.to_string()))
            .or_default();
        match arcs.iter_mut().find(|arc| arc.backend == backend) {
            Some(arc) if arc.predicates.is_empty() || predicates.is_empty() => {
                arc.predicates.clear();
            }
            Some(arc) => arc.predicates.extend(predicates.iter().map(|p| p.to_string())),
            None => arcs.push(SchemaArc {
                backend: backend.to_string(),
                predicates: predicates.iter().map(|p| p.to_string()).collect(),
            }),
        }
        self
    }

    /// Declare that `specific` can be implicitly converted to `general`.
    #[must_use]
    pub fn conversion(mut self, specific: &str, general: &str) -> Self {
        if !self.graph.backends.contains_key(IMPLICIT_CONVERSION) {
            self = self.backend(IMPLICIT_CONVERSION, &format!("/{IMPLICIT_CONVERSION}"));
        }
        self.graph.types.insert(specific.to_string());
        self.graph.types.insert(general.to_string());
        self.graph
            .conversions
            .entry(specific.to_string())
            .or_default()
            .insert(general.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> SchemaGraph {
        self.graph
    }
}
