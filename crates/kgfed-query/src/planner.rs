//! Query planner: splits a concept path into backend-specific segments.
//!
//! Transitions are walked left to right while a segment stays open. A
//! transition extends the open segment only when every backend of that
//! segment also supports it; otherwise the segment closes, one copy per
//! supporting backend, and a new one opens at the transition.

use std::collections::BTreeSet;

use kgfed_core::{KgfedError, Query, Result, SchemaGraph};
use serde::Serialize;
use tracing::{debug, info};

/// The `FROM` source that asks for schema-driven planning.
pub const SCHEMA_SOURCE: &str = "/schema";

/// A contiguous run of the path assigned to one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSegment {
    pub backend: String,
    /// Index of the first concept covered.
    pub start: usize,
    /// Index of the last concept covered (inclusive).
    pub end: usize,
    pub query: Query,
}

/// Ordered segments covering a whole query path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub segments: Vec<PlanSegment>,
}

impl Plan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Distinct backends in first-use order.
    #[must_use]
    pub fn backends(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for segment in &self.segments {
            if !seen.contains(&segment.backend.as_str()) {
                seen.push(segment.backend.as_str());
            }
        }
        seen
    }
}

/// Plan `query` for the given `FROM` source.
///
/// `/schema` runs the schema-driven planner. Any other source must name a
/// registered backend (by id or endpoint) and yields a single segment for it.
///
/// # Errors
///
/// Returns [`KgfedError::UnknownBackend`] for an unregistered source, and the
/// errors of [`plan`] otherwise.
pub fn plan_source(query: &Query, source: &str, schema: &SchemaGraph) -> Result<Plan> {
    if source == SCHEMA_SOURCE {
        return plan(query, schema);
    }
    let backend = schema
        .backend_for_source(source)
        .ok_or_else(|| KgfedError::UnknownBackend(source.to_string()))?;
    debug!(backend = %backend.id, source, "direct source, single segment");
    Ok(Plan {
        segments: vec![PlanSegment {
            backend: backend.id.clone(),
            start: 0,
            end: query.concepts().len() - 1,
            query: query.clone(),
        }],
    })
}

/// Plan `query` against the schema graph.
///
/// # Errors
///
/// Returns [`KgfedError::SchemaType`] for unknown concept types or predicates
/// and [`KgfedError::UnsupportedTransition`] when a transition has no backend.
pub fn plan(query: &Query, schema: &SchemaGraph) -> Result<Plan> {
    let mut segments = Vec::new();
    let mut open: Option<(usize, BTreeSet<String>)> = None;

    for index in 0..query.transitions().len() {
        let Some((left, transition, right)) = query.hop(index) else {
            break;
        };
        let (source, target) = transition.orient(left, right);
        let supported = schema.backends_for(
            &source.type_name,
            transition.predicate.as_deref(),
            &target.type_name,
        )?;
        debug!(
            hop = index,
            source = %source.type_name,
            target = %target.type_name,
            backends = ?supported,
            "transition lookup"
        );

        open = match open.take() {
            None => Some((index, supported)),
            Some((start, current)) => {
                let shared: BTreeSet<String> =
                    current.intersection(&supported).cloned().collect();
                if !shared.is_empty() && shared.len() == current.len() {
                    Some((start, shared))
                } else {
                    close(query, start, index, &current, &mut segments);
                    Some((index, supported))
                }
            }
        };
    }

    match open {
        Some((start, backends)) => {
            close(query, start, query.transitions().len(), &backends, &mut segments);
        }
        None => {
            let only = &query.concepts()[0];
            if !schema.has_type(&only.type_name) {
                return Err(KgfedError::SchemaType(format!(
                    "unknown concept type '{}'",
                    only.type_name
                )));
            }
        }
    }

    info!(
        concepts = query.concepts().len(),
        segments = segments.len(),
        "query planned"
    );
    Ok(Plan { segments })
}

/// Emit one segment per backend, in lexicographic backend order.
fn close(
    query: &Query,
    start: usize,
    end: usize,
    backends: &BTreeSet<String>,
    segments: &mut Vec<PlanSegment>,
) {
    let Some(sub) = query.segment(start, end) else {
        return;
    };
    for backend in backends {
        debug!(%backend, start, end, "segment closed");
        segments.push(PlanSegment {
            backend: backend.clone(),
            start,
            end,
            query: sub.clone(),
        });
    }
}
