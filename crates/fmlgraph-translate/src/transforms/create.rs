//! `create`: a new object instance
//!
//! Parsing yields an `object`-mode schema object rather than a rule; the
//! composer hoists such objects back into `create` targets.

use fmlgraph_core::document::{RuleTarget, TargetParameter};
use fmlgraph_core::graph::{sanitize_name, type_name_of};
use fmlgraph_core::{Connection, ObjectMode, SchemaObject};

use super::{ParseScope, TargetInput, TargetOutcome};
use crate::context::Binding;
use crate::error::{Error, Result};

/// Parse `create('Type')` into a fresh object
pub fn parse(scope: &mut ParseScope<'_>, input: &TargetInput<'_>) -> Result<TargetOutcome> {
    let target = input.target()?;
    let hint = target
        .parameter
        .iter()
        .find_map(|p| p.value_string.clone())
        .or_else(|| target.variable.clone())
        .ok_or_else(|| Error::unsupported(input.rule_name, "create without type or variable"))?;

    let base = sanitize_name(target.variable.as_deref().unwrap_or(type_name_of(&hint)));
    let name = scope.group.unique_node_name(&base);
    let object = scope.schema_object(&hint, &name, ObjectMode::Object);
    tracing::debug!("Creating object '{}' of {}", name, object.resource);

    let mut outcome = TargetOutcome {
        object: Some(object),
        ..Default::default()
    };
    if target.element.is_some() {
        if let Some(ep) = scope.target_endpoint(target)? {
            outcome
                .connections
                .push(Connection::new(&name, None, &ep.node, ep.field));
        }
    }
    if let Some(variable) = &target.variable {
        outcome
            .bindings
            .push((variable.clone(), Binding::Object(name.clone())));
    }
    Ok(outcome)
}

/// The target declaring `object`, without context or variable
pub fn compose_object(object: &SchemaObject) -> RuleTarget {
    RuleTarget {
        transform: Some("create".to_string()),
        parameter: vec![TargetParameter::string(object.type_name())],
        ..Default::default()
    }
}
