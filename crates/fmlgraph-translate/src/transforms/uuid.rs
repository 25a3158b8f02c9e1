//! `uuid`: a value with no inputs

use super::{ParseScope, TargetInput, TargetOutcome, build_rule};
use crate::error::Result;

/// Parse a `uuid()` target; the rule source is not an input
pub fn parse(scope: &mut ParseScope<'_>, input: &TargetInput<'_>) -> Result<TargetOutcome> {
    build_rule(scope, input, "uuid", None)
}
