//! Choice rule evaluation.
//!
//! Rules are evaluated in declaration order; the first match wins, and
//! `Default` (mandatory at construction) takes over when none do. The
//! JSONPath form compares `Variable` against a comparator operand
//! (`…Path`-suffixed comparators resolve their operand as a path first);
//! `And`/`Or`/`Not` combine nested rules. The JSONata form evaluates
//! `Condition` and requires a boolean.

use chrono::DateTime;
use serde_json::Value;

use crate::asl::{ChoiceRule, ChoiceState};
use crate::errors::StatesError;
use crate::paths::{PathValue, evaluate_jsonata};
use crate::pipeline::{DataScope, resolve_jsonpath};

/// Pick the next state for a Choice.
pub(crate) fn choose_next(
    state: &ChoiceState,
    input: &Value,
    scope: &DataScope,
) -> Result<String, StatesError> {
    for rule in &state.choices {
        if rule_matches(rule, input, scope)? {
            return Ok(rule
                .next
                .clone()
                .expect("top-level rules carry Next after construction"));
        }
    }
    Ok(state.default.clone())
}

fn rule_matches(rule: &ChoiceRule, input: &Value, scope: &DataScope) -> Result<bool, StatesError> {
    if let Some(condition) = &rule.condition {
        let value = evaluate_jsonata(condition, &scope.jsonata())?;
        return match value {
            Value::Bool(b) => Ok(b),
            other => Err(StatesError::runtime(format!(
                "Choice condition must evaluate to a boolean, found {other}"
            ))),
        };
    }
    if let Some(nested) = &rule.and {
        for inner in nested {
            if !rule_matches(inner, input, scope)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    if let Some(nested) = &rule.or {
        for inner in nested {
            if rule_matches(inner, input, scope)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }
    if let Some(nested) = &rule.not {
        return Ok(!rule_matches(nested, input, scope)?);
    }

    let variable = rule
        .variable
        .as_ref()
        .expect("comparator rules carry Variable after construction");
    let actual = resolve_jsonpath(variable, input, scope)?;
    let (name, operand) = rule
        .comparators
        .iter()
        .next()
        .expect("comparator rules carry one comparator after construction");

    // `…Path` operands resolve against the input before comparing.
    let resolved_operand;
    let (comparator, operand) = match name.strip_suffix("Path") {
        Some(base) if !base.starts_with("Is") => {
            let Value::String(path_text) = operand else {
                return Err(StatesError::runtime(format!(
                    "comparator '{name}' needs a string path operand"
                )));
            };
            match resolve_jsonpath(path_text, input, scope)? {
                PathValue::Present(value) => {
                    resolved_operand = value;
                    (base, &resolved_operand)
                }
                PathValue::Missing => return Ok(false),
            }
        }
        _ => (name.as_str(), operand),
    };

    apply_comparator(comparator, &actual, operand)
}

fn apply_comparator(
    name: &str,
    actual: &PathValue,
    operand: &Value,
) -> Result<bool, StatesError> {
    // Presence tests observe Missing directly; every other comparator
    // treats a missing variable as "no match".
    if name == "IsPresent" {
        let expected = operand.as_bool().ok_or_else(|| {
            StatesError::runtime("IsPresent needs a boolean operand")
        })?;
        return Ok(actual.is_present() == expected);
    }
    let PathValue::Present(actual) = actual else {
        return Ok(false);
    };

    let result = match name {
        "IsNull" => check_is(operand, actual.is_null())?,
        "IsNumeric" => check_is(operand, actual.is_number())?,
        "IsString" => check_is(operand, actual.is_string())?,
        "IsBoolean" => check_is(operand, actual.is_boolean())?,
        "IsTimestamp" => check_is(
            operand,
            actual
                .as_str()
                .is_some_and(|text| DateTime::parse_from_rfc3339(text).is_ok()),
        )?,
        "StringEquals" => string_pair(actual, operand).is_some_and(|(a, b)| a == b),
        "StringLessThan" => string_pair(actual, operand).is_some_and(|(a, b)| a < b),
        "StringGreaterThan" => string_pair(actual, operand).is_some_and(|(a, b)| a > b),
        "StringLessThanEquals" => string_pair(actual, operand).is_some_and(|(a, b)| a <= b),
        "StringGreaterThanEquals" => string_pair(actual, operand).is_some_and(|(a, b)| a >= b),
        "StringMatches" => string_pair(actual, operand)
            .is_some_and(|(a, pattern)| wildcard_match(pattern, a)),
        "NumericEquals" => numeric_pair(actual, operand).is_some_and(|(a, b)| a == b),
        "NumericLessThan" => numeric_pair(actual, operand).is_some_and(|(a, b)| a < b),
        "NumericGreaterThan" => numeric_pair(actual, operand).is_some_and(|(a, b)| a > b),
        "NumericLessThanEquals" => numeric_pair(actual, operand).is_some_and(|(a, b)| a <= b),
        "NumericGreaterThanEquals" => {
            numeric_pair(actual, operand).is_some_and(|(a, b)| a >= b)
        }
        "BooleanEquals" => match (actual.as_bool(), operand.as_bool()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        "TimestampEquals" => timestamp_pair(actual, operand).is_some_and(|(a, b)| a == b),
        "TimestampLessThan" => timestamp_pair(actual, operand).is_some_and(|(a, b)| a < b),
        "TimestampGreaterThan" => timestamp_pair(actual, operand).is_some_and(|(a, b)| a > b),
        "TimestampLessThanEquals" => {
            timestamp_pair(actual, operand).is_some_and(|(a, b)| a <= b)
        }
        "TimestampGreaterThanEquals" => {
            timestamp_pair(actual, operand).is_some_and(|(a, b)| a >= b)
        }
        other => {
            return Err(StatesError::runtime(format!(
                "unsupported comparator '{other}'"
            )));
        }
    };
    Ok(result)
}

fn check_is(operand: &Value, holds: bool) -> Result<bool, StatesError> {
    let expected = operand
        .as_bool()
        .ok_or_else(|| StatesError::runtime("Is* comparators need a boolean operand"))?;
    Ok(holds == expected)
}

fn string_pair<'a>(actual: &'a Value, operand: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((actual.as_str()?, operand.as_str()?))
}

fn numeric_pair(actual: &Value, operand: &Value) -> Option<(f64, f64)> {
    Some((actual.as_f64()?, operand.as_f64()?))
}

fn timestamp_pair(
    actual: &Value,
    operand: &Value,
) -> Option<(DateTime<chrono::FixedOffset>, DateTime<chrono::FixedOffset>)> {
    let a = DateTime::parse_from_rfc3339(actual.as_str()?).ok()?;
    let b = DateTime::parse_from_rfc3339(operand.as_str()?).ok()?;
    Some((a, b))
}

/// `StringMatches` glob: `*` matches any run of characters, `\*` a literal
/// asterisk.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    enum Token {
        Literal(String),
        Star,
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'*') => {
                chars.next();
                current.push('*');
            }
            '*' => {
                if !current.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut current)));
                }
                tokens.push(Token::Star);
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        tokens.push(Token::Literal(current));
    }

    fn match_from(tokens: &[Token], text: &str) -> bool {
        match tokens.split_first() {
            None => text.is_empty(),
            Some((Token::Star, rest)) => text
                .char_indices()
                .map(|(offset, _)| offset)
                .chain(std::iter::once(text.len()))
                .any(|offset| match_from(rest, &text[offset..])),
            Some((Token::Literal(literal), rest)) => text
                .strip_prefix(literal.as_str())
                .is_some_and(|remaining| match_from(rest, remaining)),
        }
    }

    match_from(&tokens, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("foo*.log", "foo23.log"));
        assert!(wildcard_match("foo*", "foobar"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("exact", "exact"));
        assert!(!wildcard_match("exact", "exactly"));
        assert!(!wildcard_match("foo*.log", "foo23.txt"));
        assert!(wildcard_match("a*b*c", "a-x-b-y-c"));
        assert!(wildcard_match("literal\\*star", "literal*star"));
    }

    #[test]
    fn comparator_type_mismatch_is_no_match() {
        let actual = PathValue::Present(json!("text"));
        assert!(!apply_comparator("NumericEquals", &actual, &json!(5)).unwrap());
        let actual = PathValue::Present(json!(5));
        assert!(!apply_comparator("StringEquals", &actual, &json!("5")).unwrap());
    }

    #[test]
    fn presence_observes_missing() {
        assert!(apply_comparator("IsPresent", &PathValue::Missing, &json!(false)).unwrap());
        assert!(
            apply_comparator("IsPresent", &PathValue::Present(json!(null)), &json!(true))
                .unwrap()
        );
    }

    #[test]
    fn null_and_type_tests() {
        let null = PathValue::Present(json!(null));
        assert!(apply_comparator("IsNull", &null, &json!(true)).unwrap());
        let number = PathValue::Present(json!(2.5));
        assert!(apply_comparator("IsNumeric", &number, &json!(true)).unwrap());
        assert!(apply_comparator("IsString", &number, &json!(false)).unwrap());
        let stamp = PathValue::Present(json!("2026-03-01T10:00:00Z"));
        assert!(apply_comparator("IsTimestamp", &stamp, &json!(true)).unwrap());
    }

    #[test]
    fn timestamp_ordering() {
        let earlier = PathValue::Present(json!("2026-01-01T00:00:00Z"));
        assert!(
            apply_comparator(
                "TimestampLessThan",
                &earlier,
                &json!("2026-06-01T00:00:00Z")
            )
            .unwrap()
        );
    }
}
