//! AST types for KGQL programs.
//!
//! The AST is produced by the parser and consumed by the planner and the
//! program interpreter in `kgfed-query`.

use kgfed_core::Query;
use serde::{Deserialize, Serialize};

/// A complete KGQL program: statements in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// A single statement. Closed set; the interpreter dispatches on [`Statement::kind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Statement {
    Select(SelectStatement),
    Set(SetStatement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Set,
}

impl Statement {
    #[must_use]
    pub fn kind(&self) -> StatementKind {
        match self {
            Self::Select(_) => StatementKind::Select,
            Self::Set(_) => StatementKind::Set,
        }
    }
}

/// `SELECT <path> FROM <source> [WHERE ...] [SET ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    pub query: Query,
    /// `/schema` to plan across backends, otherwise a backend id or endpoint.
    pub source: String,
    #[serde(default)]
    pub where_clause: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_clause: Option<SetClause>,
}

/// `SET <name> = <value>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStatement {
    pub variable: String,
    pub value: Value,
}

/// Where a SELECT stores its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetClause {
    /// `SET name`: the whole merged result.
    Whole { name: String },
    /// `SET '<json-path>' AS name`: the matches of a path query over the result.
    PathQuery { query: String, name: String },
}

impl SetClause {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Whole { name } | Self::PathQuery { name, .. } => name,
        }
    }
}

/// `field op value`. `field` may be backend-qualified as `backend.field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub field: String,
    pub op: CompOp,
    pub value: Value,
}

impl Constraint {
    #[must_use]
    pub fn new(field: impl Into<String>, op: CompOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Split `backend.field` into `(backend, field)`.
    #[must_use]
    pub fn qualifier(&self) -> Option<(&str, &str)> {
        self.field.split_once('.')
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// `=~`, pattern match.
    Match,
}

impl CompOp {
    /// Parse an operator token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "=" => Self::Eq,
            "!=" => Self::Neq,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "=~" => Self::Match,
            _ => return None,
        })
    }
}

/// Literal values and variable references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    /// `$name` or `$name.path`, without the `$`.
    Variable(String),
}

impl Value {
    /// JSON form of a literal. Variables render as their `$reference`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::from(s.as_str()),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Variable(v) => serde_json::Value::from(format!("${v}")),
        }
    }
}

impl std::fmt::Display for CompOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Neq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::Lte => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Gte => write!(f, ">="),
            Self::Match => write!(f, "=~"),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{s}'"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Variable(v) => write!(f, "${v}"),
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}
