//! Group invocations
//!
//! A `dependent` clause becomes a rule whose first parameter names the
//! invoked group. Arguments are matched positionally with that group's
//! inputs: arguments passed to a `target` input are written by the call,
//! so they connect rule → argument; the rest connect argument → rule.

use serde_json::Value;

use fmlgraph_core::document::{Dependent, InputMode, TargetParameter};
use fmlgraph_core::{Connection, Rule, RuleParameter};

use super::{ComposeInput, Composed, Invocation, ParseScope, RULE_GROUP_ACTION, TargetInput, TargetOutcome};
use crate::error::{Error, Result};

/// Parse a `dependent` clause
pub fn parse(scope: &mut ParseScope<'_>, input: &TargetInput<'_>) -> Result<TargetOutcome> {
    let Invocation::Dependent(dependent) = input.invocation else {
        return Err(Error::unsupported(input.rule_name, "rule-group needs a dependent clause"));
    };

    let name = scope.rule_name(input.rule_name);
    let mut rule = Rule::new(&name, RULE_GROUP_ACTION);
    rule.condition = input.condition.map(str::to_string);
    rule.parameters
        .push(RuleParameter::Const(Value::String(dependent.name.clone())));

    let modes = scope.group_inputs.get(&dependent.name).cloned();
    if modes.is_none() {
        tracing::debug!(
            "Group '{}' is not in this document, inferring argument directions",
            dependent.name
        );
    }

    let mut outcome = TargetOutcome::default();
    for (position, param) in dependent.parameter.iter().enumerate() {
        let resolved = scope.parameter(param)?;
        if let Some(ep) = &resolved.endpoint {
            let writes = match modes.as_ref().and_then(|m| m.get(position)) {
                Some(mode) => *mode == InputMode::Target,
                None => scope.group.is_target_side(&ep.node),
            };
            let connection = if writes {
                Connection::new(&name, None, &ep.node, ep.field)
            } else {
                Connection::new(&ep.node, ep.field, &name, None)
            };
            outcome.connections.push(connection);
        }
        rule.parameters.push(resolved.param);
    }

    outcome.rule = Some(rule);
    Ok(outcome)
}

/// Compose a rule-group rule back into a `dependent` clause
pub fn compose(input: &ComposeInput<'_>) -> Result<Composed> {
    let mut params = input.rule.parameters.iter();
    let name = params
        .next()
        .and_then(RuleParameter::as_str)
        .ok_or_else(|| Error::unsupported(&input.rule.name, "rule-group without a group name"))?;

    let parameter: Vec<TargetParameter> = params.map(|p| input.parameter(p)).collect();
    Ok(Composed {
        target: None,
        dependent: Some(Dependent {
            name: name.to_string(),
            parameter,
        }),
    })
}
