//! Error types for fmlgraph-core

use thiserror::Error;

/// Result type alias for fmlgraph-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fmlgraph-core
#[derive(Error, Debug)]
pub enum Error {
    /// Schema identifier matched no URL, alias, or type name
    #[error("schema not found: {identifier}")]
    SchemaNotFound {
        /// Identifier that was looked up
        identifier: String,
    },

    /// A node or element referenced by name does not exist
    #[error("unresolved {kind} reference '{name}'")]
    UnresolvedReference {
        /// What was being looked up (object, rule, node, element)
        kind: &'static str,
        /// The name that could not be found
        name: String,
    },

    /// A node with this name already exists in the group
    #[error("duplicate node '{name}' in group '{group}'")]
    DuplicateNode {
        /// Group name
        group: String,
        /// Offending node name
        name: String,
    },

    /// Field index or name out of range for an object
    #[error("object '{object}' has no field {field}")]
    InvalidField {
        /// Object name
        object: String,
        /// Field name or index
        field: String,
    },

    /// Connections form a cycle, so no evaluation order exists
    #[error("cyclic connections between: {}", nodes.join(", "))]
    CyclicGraph {
        /// Nodes participating in the cycle, in discovery order
        nodes: Vec<String>,
    },

    /// Round-trip payload could not be read or upgraded
    #[error("graph snapshot error: {message}")]
    Snapshot {
        /// Description of the problem
        message: String,
    },

    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an [`Error::UnresolvedReference`]
    pub fn unresolved(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            kind,
            name: name.into(),
        }
    }
}
