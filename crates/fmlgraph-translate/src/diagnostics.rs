//! Recoverable problems found while parsing
//!
//! A rule that cannot be translated is skipped, and the reason is kept as a
//! [`Diagnostic`] next to the graph instead of aborting the whole document.

use serde::Serialize;
use std::fmt;

use crate::error::Error;

/// Category of a recovered problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// Variable, object, or schema that could not be found
    UnresolvedReference,
    /// Transform shape the graph cannot hold
    UnsupportedShape,
    /// Transform handled by the default handler
    UnknownTransform,
    /// Rule skipped because targets share a variable
    MultiTargetRule,
    /// Any other graph violation
    InvalidGraph,
}

impl DiagnosticKind {
    /// Category of an error
    pub fn of(error: &Error) -> Self {
        use fmlgraph_core::Error as CoreError;

        match error {
            Error::UnresolvedReference { .. }
            | Error::Graph(CoreError::UnresolvedReference { .. })
            | Error::Graph(CoreError::SchemaNotFound { .. })
            | Error::Graph(CoreError::InvalidField { .. }) => Self::UnresolvedReference,
            Error::UnsupportedShape { .. } => Self::UnsupportedShape,
            Error::UnknownTransform { .. } => Self::UnknownTransform,
            Error::MultiTargetRule { .. } => Self::MultiTargetRule,
            _ => Self::InvalidGraph,
        }
    }
}

/// One recovered problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Group being parsed
    pub group: String,
    /// Rule being parsed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Category
    pub kind: DiagnosticKind,
    /// Human readable description
    pub message: String,
}

impl Diagnostic {
    /// Diagnostic for an error raised inside `group` (and `rule`)
    pub fn from_error(group: &str, rule: Option<&str>, error: &Error) -> Self {
        Self {
            group: group.to_string(),
            rule: rule.map(str::to_string),
            kind: DiagnosticKind::of(error),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule {
            Some(rule) => write!(f, "[{}/{}] {}", self.group, rule, self.message),
            None => write!(f, "[{}] {}", self.group, self.message),
        }
    }
}
