//! Plan segment → backend-facing request compiler.
//!
//! Each [`PlanSegment`] becomes a [`CompiledStatement`]: the sub-path, the
//! WHERE constraints formatted for that backend, and the endpoint to call.

use kgfed_core::{Curies, Query, QuestionEdge, QuestionGraph, QuestionNode, SchemaGraph};
use kgfed_parser::{Constraint, SetClause};
use serde::Serialize;

use crate::planner::{Plan, PlanSegment};

/// One backend-specific sub-query, ready to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStatement {
    pub backend: String,
    /// Endpoint of `backend`.
    pub service: String,
    pub query: Query,
    /// Index of the segment's first transition in the full path; its edges
    /// are labeled from `e{first_edge}` on.
    pub first_edge: usize,
    pub where_clause: Vec<Constraint>,
    /// SET clauses applied to this sub-query's own result. Planned segments
    /// carry none; the statement's clause applies to the merged result.
    pub set_statements: Vec<SetClause>,
}

impl CompiledStatement {
    /// The request graph sent to the backend.
    #[must_use]
    pub fn question_graph(&self) -> QuestionGraph {
        question_graph_from(&self.query, self.first_edge)
    }
}

/// Compile every segment of `plan`.
#[must_use]
pub fn compile(plan: &Plan, constraints: &[Constraint], schema: &SchemaGraph) -> Vec<CompiledStatement> {
    plan.segments
        .iter()
        .map(|segment| compile_segment(segment, constraints, schema))
        .collect()
}

fn compile_segment(
    segment: &PlanSegment,
    constraints: &[Constraint],
    schema: &SchemaGraph,
) -> CompiledStatement {
    let service = schema
        .backend(&segment.backend)
        .map_or_else(|| format!("/{}", segment.backend), |b| b.url.clone());
    CompiledStatement {
        backend: segment.backend.clone(),
        service,
        query: segment.query.clone(),
        first_edge: segment.start,
        where_clause: format_constraints(constraints, &segment.backend),
        set_statements: Vec::new(),
    }
}

/// Format WHERE constraints for `backend`.
///
/// `backend.name` loses its qualifier when it names this backend; fields
/// qualified for any other backend, and unqualified fields, pass through.
/// The result holds no duplicates; the first occurrence wins.
#[must_use]
pub fn format_constraints(constraints: &[Constraint], backend: &str) -> Vec<Constraint> {
    let mut formatted: Vec<Constraint> = Vec::with_capacity(constraints.len());
    for constraint in constraints {
        let field = match constraint.qualifier() {
            Some((qualifier, name)) if qualifier == backend => name.to_string(),
            _ => constraint.field.clone(),
        };
        let candidate = Constraint::new(field, constraint.op, constraint.value.clone());
        if !formatted.contains(&candidate) {
            formatted.push(candidate);
        }
    }
    formatted
}

/// Build the question graph for a whole path.
///
/// Nodes are keyed by concept name and carry `curie` when bound. Edges are
/// named `e0`, `e1`, ... in path order and point in the backend-facing
/// direction, so a written `a <- b` becomes an edge from `b` to `a`.
#[must_use]
pub fn question_graph(query: &Query) -> QuestionGraph {
    question_graph_from(query, 0)
}

/// Question graph for a sub-path whose first transition is transition
/// `first_edge` of the full path. Edge labels stay path-global, so the
/// bindings of every segment line up with the full question graph.
#[must_use]
pub fn question_graph_from(query: &Query, first_edge: usize) -> QuestionGraph {
    let nodes = query
        .concepts()
        .iter()
        .map(|concept| QuestionNode {
            id: concept.name.clone(),
            type_name: concept.type_name.clone(),
            curie: Curies::from_ids(concept.bound_ids.clone()),
        })
        .collect();

    let edges = (0..query.transitions().len())
        .filter_map(|index| query.hop(index).map(|hop| (index, hop)))
        .map(|(index, (left, transition, right))| {
            let (source, target) = transition.orient(left, right);
            QuestionEdge {
                id: format!("e{}", first_edge + index),
                predicate: transition.predicate.clone(),
                source_id: source.name.clone(),
                target_id: target.name.clone(),
            }
        })
        .collect();

    QuestionGraph { nodes, edges }
}
