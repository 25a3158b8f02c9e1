//! `append`: concatenation of every parameter
//!
//! The rule reads from its parameters only; the first variable parameter
//! takes the place of the rule source.

use super::{ParseScope, SourceBinding, TargetInput, TargetOutcome, build_rule};
use crate::error::Result;

/// Parse an `append(...)` target
pub fn parse(scope: &mut ParseScope<'_>, input: &TargetInput<'_>) -> Result<TargetOutcome> {
    let target = input.target()?;
    let source = leading_source(scope, target).or_else(|| input.source.cloned());
    build_rule(scope, input, "append", source.as_ref())
}

/// Source binding taken from the first bound variable parameter
pub(crate) fn leading_source(
    scope: &ParseScope<'_>,
    target: &fmlgraph_core::document::RuleTarget,
) -> Option<SourceBinding> {
    target
        .parameter
        .iter()
        .filter_map(|p| p.value_id.as_ref())
        .find_map(|id| {
            scope.context.get(id).map(|binding| SourceBinding {
                variable: Some(id.clone()),
                binding: binding.clone(),
            })
        })
}
