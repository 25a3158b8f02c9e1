//! `translate`: ConceptMap lookup
//!
//! The map is the second parameter. `#id` references to contained
//! ConceptMaps are stored as the bare id and get their `#` back when composed.

use serde_json::Value;

use fmlgraph_core::RuleParameter;

use super::append::leading_source;
use super::{ComposeInput, Composed, ParseScope, TargetInput, TargetOutcome, build_rule, default};
use crate::error::Result;

/// Position of the ConceptMap reference in `translate(source, map, output)`
const MAP_PARAMETER: usize = 1;

/// Parse `translate(source, map, output)`
pub fn parse(scope: &mut ParseScope<'_>, input: &TargetInput<'_>) -> Result<TargetOutcome> {
    let target = input.target()?;
    let source = leading_source(scope, target).or_else(|| input.source.cloned());
    let mut outcome = build_rule(scope, input, "translate", source.as_ref())?;

    let map_param = outcome
        .rule
        .as_mut()
        .and_then(|rule| rule.parameters.get_mut(MAP_PARAMETER));
    if let Some(param) = map_param {
        let internal = param
            .as_str()
            .and_then(|s| s.strip_prefix('#'))
            .filter(|id| scope.concept_maps.contains(*id))
            .map(str::to_string);
        if let Some(id) = internal {
            *param = RuleParameter::Const(Value::String(id));
        }
    }
    Ok(outcome)
}

/// Compose a translate, restoring `#` on internal map references
pub fn compose(input: &ComposeInput<'_>) -> Result<Composed> {
    let mut composed = default::compose(input)?;
    let map_param = composed
        .target
        .as_mut()
        .and_then(|target| target.parameter.get_mut(MAP_PARAMETER));
    let internal = input
        .rule
        .parameters
        .get(MAP_PARAMETER)
        .and_then(RuleParameter::as_str)
        .filter(|id| input.graph.has_concept_map(id));
    if let (Some(param), Some(id)) = (map_param, internal) {
        param.value_string = Some(format!("#{id}"));
    }
    Ok(composed)
}
