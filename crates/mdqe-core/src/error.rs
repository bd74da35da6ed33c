//! Error types for the quality-check engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, resolving, or running checks.
///
/// Structural variants (`XmlParse`, `MissingElement`, `EmptyElement`,
/// `NoSelectors`, `NoCode`, `InvalidQuery`) are fatal to a single check and
/// propagate out of the executor. Resolution variants (`EndpointNotFound`,
/// `Resolution`) propagate too, but the suite orchestrator downgrades them to
/// ERROR outcomes per worker. Execution failures inside check routines never
/// surface here; the executor converts them to ERROR outcomes directly.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A required file was not found on disk
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// An XML document could not be parsed
    #[error("Error parsing XML {path}: {message}")]
    XmlParse { path: String, message: String },

    /// A required element is absent from a document
    #[error("Required element <{element}> not found")]
    MissingElement { element: String },

    /// A required element is present but has no text
    #[error("Required element <{element}> is empty")]
    EmptyElement { element: String },

    /// A check declares no selectors
    #[error("No selectors are defined for check {check_id}")]
    NoSelectors { check_id: String },

    /// A check declares no code element
    #[error("No code is defined for check {check_id}")]
    NoCode { check_id: String },

    /// A selector or dialect path-query expression could not be parsed
    #[error("Invalid path query {expression:?}: {message}")]
    InvalidQuery { expression: String, message: String },

    /// A symbolic catalog node name has no registered endpoint
    #[error("No catalog endpoint registered for node {node_id}")]
    EndpointNotFound { node_id: String },

    /// A network or decoding failure while resolving associated identifiers
    #[error("Catalog resolution failed: {0}")]
    Resolution(String),

    /// Object bytes not found in the store
    #[error("Object not found in store: {pid}")]
    ObjectNotFound { pid: String },

    /// System metadata not found in the store
    #[error("System metadata not found in store: {pid}")]
    MetadataNotFound { pid: String },

    /// The store configuration is missing keys or names an unknown store type
    #[error("Invalid store configuration: {0}")]
    StoreConfig(String),

    /// The suite resolved no runnable checks
    #[error("No checks to run. Details: {}", comments.join("; "))]
    NoRunnableChecks { comments: Vec<String> },

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Resolution(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_empty_are_distinct() {
        let missing = EngineError::MissingElement {
            element: "identifier".into(),
        };
        let empty = EngineError::EmptyElement {
            element: "identifier".into(),
        };
        assert!(missing.to_string().contains("not found"));
        assert!(empty.to_string().contains("empty"));
    }

    #[test]
    fn test_no_runnable_checks_joins_comments() {
        let err = EngineError::NoRunnableChecks {
            comments: vec!["a".into(), "b".into()],
        };
        assert!(err.to_string().contains("a; b"));
    }
}
