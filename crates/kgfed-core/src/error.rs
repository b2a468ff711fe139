//! Error types for kgfed.

use thiserror::Error;

/// Top-level result type for kgfed operations.
pub type Result<T> = std::result::Result<T, KgfedError>;

/// Top-level error type for kgfed.
#[derive(Debug, Error)]
pub enum KgfedError {
    /// Malformed program text. Parsing never yields a partial tree.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("schema type error: {0}")]
    SchemaType(String),

    #[error("no backend supports {source_type} -{}-> {target_type}", .predicate.as_deref().unwrap_or(""))]
    UnsupportedTransition {
        source_type: String,
        predicate: Option<String>,
        target_type: String,
    },

    #[error("unresolved variable: {0}")]
    UnresolvedVariable(String),

    #[error("backend '{backend}' failed: {message}")]
    BackendExecution { backend: String, message: String },

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("schema load error: {0}")]
    SchemaLoad(String),

    #[error("invalid path query '{query}': {message}")]
    PathQuery { query: String, message: String },

    /// A fatal error raised while executing the statement at `index`.
    #[error("statement {index} failed: {source}")]
    Statement {
        index: usize,
        #[source]
        source: Box<KgfedError>,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KgfedError {
    /// Wrap this error with the index of the statement that raised it.
    #[must_use]
    pub fn in_statement(self, index: usize) -> Self {
        Self::Statement {
            index,
            source: Box::new(self),
        }
    }

    /// The backend id carried by this error, looking through statement wrappers.
    #[must_use]
    pub fn backend(&self) -> Option<&str> {
        match self {
            Self::BackendExecution { backend, .. } => Some(backend),
            Self::Statement { source, .. } => source.backend(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for KgfedError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KgfedError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::SchemaLoad(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_human_readable_messages() {
        let err = KgfedError::Syntax {
            line: 3,
            column: 7,
            message: "expected arrow".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 3"));
        assert!(msg.contains("expected arrow"));

        let err = KgfedError::UnsupportedTransition {
            source_type: "gene".to_string(),
            predicate: Some("treats".to_string()),
            target_type: "disease".to_string(),
        };
        assert_eq!(err.to_string(), "no backend supports gene -treats-> disease");
    }

    #[test]
    fn statement_wrapper_exposes_backend() {
        let err = KgfedError::BackendExecution {
            backend: "rtx".to_string(),
            message: "timed out".to_string(),
        }
        .in_statement(2);
        assert_eq!(err.backend(), Some("rtx"));
        assert!(err.to_string().starts_with("statement 2 failed"));
    }
}
