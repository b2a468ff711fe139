//! Executes compiled statements against their backends.
//!
//! Dispatch is sequential or concurrent; either way outcomes come back in
//! plan order, so the merge sees identical input in both modes.

use std::time::Duration;

use futures_util::future::join_all;
use kgfed_core::{KgfedError, Response, Result, SegmentFailure};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::backend::{BackendRegistry, BackendRequest};
use crate::compiler::CompiledStatement;

/// How segments of one plan are dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    #[default]
    Concurrent,
}

/// What a failed segment does to its statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failed segment fails the statement.
    #[default]
    FailFast,
    /// Merge the segments that succeeded and report the rest.
    BestEffort,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub mode: ExecutionMode,
    /// Per-segment limit. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub policy: FailurePolicy,
    /// Send literal WHERE values through the name resolver.
    pub resolve_names: bool,
}

/// Decorated responses in plan order, plus the segments that failed.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub responses: Vec<Response>,
    pub failures: Vec<SegmentFailure>,
}

/// Run every statement and collect the outcomes in plan order.
///
/// # Errors
///
/// Under [`FailurePolicy::FailFast`] the first failed segment (in plan
/// order) is returned as [`KgfedError::BackendExecution`]. Under
/// [`FailurePolicy::BestEffort`] an error is returned only when every
/// segment failed.
pub async fn execute(
    statements: &[CompiledStatement],
    registry: &BackendRegistry,
    options: &ExecutionOptions,
) -> Result<ExecutionReport> {
    let outcomes = match options.mode {
        ExecutionMode::Sequential => {
            let mut outcomes = Vec::with_capacity(statements.len());
            for statement in statements {
                outcomes.push(run_segment(statement, registry, options.timeout).await);
            }
            outcomes
        }
        ExecutionMode::Concurrent => {
            join_all(
                statements
                    .iter()
                    .map(|statement| run_segment(statement, registry, options.timeout)),
            )
            .await
        }
    };

    let mut report = ExecutionReport::default();
    let mut first_error = None;
    for (segment, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(response) => report.responses.push(response),
            Err(e) => {
                let backend = statements[segment].backend.clone();
                warn!(segment, %backend, error = %e, "segment failed");
                report.failures.push(SegmentFailure {
                    segment,
                    backend,
                    message: e.to_string(),
                });
                first_error.get_or_insert(e);
            }
        }
    }

    match (options.policy, first_error) {
        (_, None) => Ok(report),
        (FailurePolicy::FailFast, Some(e)) => Err(e),
        (FailurePolicy::BestEffort, Some(e)) if report.responses.is_empty() => Err(e),
        (FailurePolicy::BestEffort, Some(_)) => Ok(report),
    }
}

async fn run_segment(
    statement: &CompiledStatement,
    registry: &BackendRegistry,
    timeout: Option<Duration>,
) -> Result<Response> {
    let backend_id = statement.backend.as_str();
    let failed = |message: String| KgfedError::BackendExecution {
        backend: backend_id.to_string(),
        message,
    };
    let backend = registry
        .get(backend_id)
        .ok_or_else(|| failed("no backend registered".to_string()))?;

    let request = BackendRequest::from(statement);
    info!(backend = backend_id, service = %statement.service, "dispatching segment");
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, backend.query(&request))
            .await
            .map_err(|_| failed(format!("timed out after {}ms", limit.as_millis())))?,
        None => backend.query(&request).await,
    };
    let mut response = outcome.map_err(|e| match e {
        KgfedError::BackendExecution { .. } => e,
        other => failed(other.to_string()),
    })?;

    if response.question_order.is_none() {
        response.question_order = Some(statement.query.order());
    }
    decorate(&mut response, backend_id);
    Ok(response)
}

/// Tag every element with the backend it came from.
///
/// Nodes and edges gain `reasoner: [backend]`; edges without a
/// `source_database` gain `source_database: ["unknown"]`.
pub fn decorate(response: &mut Response, backend: &str) {
    let reasoner = json!([backend]);
    for node in &mut response.knowledge_graph.nodes {
        node.attributes.insert("reasoner".to_string(), reasoner.clone());
    }
    for edge in &mut response.knowledge_graph.edges {
        edge.attributes
            .insert("reasoner".to_string(), reasoner.clone());
        edge.attributes
            .entry("source_database")
            .or_insert_with(|| Value::Array(vec![json!("unknown")]));
    }
}
