//! Generic transforms
//!
//! `evaluate`, `cc`, `truncate`, and any action without a dedicated handler:
//! parameters are kept in order, bound variables become incoming
//! connections, and the result is connected to the target.

use fmlgraph_core::document::RuleTarget;

use super::{ComposeInput, Composed, ParseScope, TargetInput, TargetOutcome, build_rule};
use crate::error::Result;

/// Parse a target into a rule named after its action
pub fn parse(scope: &mut ParseScope<'_>, input: &TargetInput<'_>) -> Result<TargetOutcome> {
    let target = input.target()?;
    let action = target.transform.as_deref().unwrap_or("copy");
    build_rule(scope, input, action, input.source)
}

/// Compose a rule back into a target with the same action and parameters
pub fn compose(input: &ComposeInput<'_>) -> Result<Composed> {
    let parameter = input
        .rule
        .parameters
        .iter()
        .map(|p| input.parameter(p))
        .collect();

    Ok(Composed {
        target: Some(RuleTarget {
            transform: Some(input.rule.action.clone()),
            parameter,
            ..Default::default()
        }),
        dependent: None,
    })
}
