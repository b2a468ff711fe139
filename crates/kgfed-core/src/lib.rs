//! # kgfed-core
//!
//! Core types shared by every kgfed crate:
//! - [`Query`], [`ConceptNode`], [`Transition`]: the typed concept path
//! - [`SchemaGraph`]: the read-only type-transition graph consulted by the planner
//! - Wire types ([`QuestionGraph`], [`Response`], [`MergedResult`])
//! - Error hierarchy ([`KgfedError`])

pub mod error;
pub mod message;
pub mod path;
pub mod schema;

pub use error::{KgfedError, Result};
pub use message::{
    Answer, Curies, Edge, KnowledgeGraph, MergedResult, Node, QuestionEdge, QuestionGraph,
    QuestionNode, Response, SegmentFailure,
};
pub use path::{ConceptNode, Direction, PathElement, Query, Transition};
pub use schema::{BackendInfo, SchemaDefinition, SchemaGraph, IMPLICIT_CONVERSION};
