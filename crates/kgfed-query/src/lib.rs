//! # kgfed-query
//!
//! Federated query engine for kgfed. Splits a concept path into
//! per-backend segments, dispatches them, and merges the responses.
//!
//! Includes:
//! - Planner over the schema graph
//! - Sub-query compiler producing backend question graphs
//! - Sequential or concurrent executor with failure policies
//! - Knowledge graph merge and answer join
//! - Result formatter (JSON, Table, Markdown) and graph export (DOT, Mermaid)

pub mod backend;
pub mod compiler;
pub mod context;
pub mod engine;
pub mod executor;
pub mod formatter;
pub mod graph;
pub mod join;
pub mod merge;
pub mod planner;

pub use backend::{
    Backend, BackendRegistry, BackendRequest, ImplicitConversionBackend, InMemoryBackend,
    NameResolver, StaticNameResolver,
};
pub use compiler::{compile, question_graph, question_graph_from, CompiledStatement};
pub use context::{json_path, VariableContext};
pub use engine::Engine;
pub use executor::{ExecutionMode, ExecutionOptions, ExecutionReport, FailurePolicy};
pub use formatter::{format_result, OutputFormat};
pub use graph::{GraphBuilder, ResultGraph};
pub use merge::{merge_graphs, merge_responses, MergedGraph};
pub use planner::{plan, plan_source, Plan, PlanSegment, SCHEMA_SOURCE};
