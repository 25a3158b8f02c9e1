//! Error types for translation

use thiserror::Error;

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing or composing a map
#[derive(Error, Debug)]
pub enum Error {
    /// Graph or catalog operation failed
    #[error(transparent)]
    Graph(#[from] fmlgraph_core::Error),

    /// Variable used before any source, target, or input bound it
    #[error("unresolved variable '{name}'")]
    UnresolvedReference {
        /// Variable name
        name: String,
    },

    /// A transform was used with a shape it cannot represent
    #[error("unsupported shape in rule '{rule}': {message}")]
    UnsupportedShape {
        /// Rule name
        rule: String,
        /// Error description
        message: String,
    },

    /// Transform action with no dedicated handler
    #[error("unknown transform '{action}', using the default handler")]
    UnknownTransform {
        /// Action name
        action: String,
    },

    /// Several targets of one rule declare the same variable
    #[error("rule '{rule}' declares variable '{variable}' in more than one target")]
    MultiTargetRule {
        /// Rule name
        rule: String,
        /// Repeated variable
        variable: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an [`Error::UnresolvedReference`]
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::UnresolvedReference { name: name.into() }
    }

    /// Shorthand for an [`Error::UnsupportedShape`]
    pub fn unsupported(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedShape {
            rule: rule.into(),
            message: message.into(),
        }
    }
}
