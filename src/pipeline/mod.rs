//! The ASL data-flow pipeline.
//!
//! For JSONPath-mode states the contract is exactly:
//!
//! ```text
//! raw_input
//!   → InputPath(raw_input)         (default $; null discards → {})
//!   → Parameters(filtered_input)   ("k.$" keys evaluate paths)
//!   → [task invocation]
//!   → ResultSelector(result)       (same template rules, over the result)
//!   → ResultPath(input, selected)  (merges into the post-InputPath input)
//!   → OutputPath(merged)           (default $; null discards → {})
//! ```
//!
//! JSONata mode replaces Parameters with `Arguments` and the three
//! post-stages with `Output`. `Assign` runs after the result is known but
//! before ResultPath, with parallel-assignment semantics: every right-hand
//! side is evaluated against the same pre-commit snapshot of
//! `(input, result, variables)`, and only then are the new bindings
//! committed.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value, json};

use crate::asl::OptionalPath;
use crate::asl::QueryLanguage;
use crate::errors::StatesError;
use crate::paths::{
    JsonPath, JsonataScope, PathRoot, PathValue, evaluate_jsonata, is_jsonata_expression,
};

/// The data visible to one evaluation site.
///
/// `input` is the state's effective (post-InputPath) input; `result` the
/// task result once it exists; `error_output` the fault payload during
/// Catch processing; `context` the `$$` object; `variables` the workflow
/// variable bindings.
#[derive(Debug, Clone, Copy)]
pub struct DataScope<'a> {
    pub input: &'a Value,
    pub result: Option<&'a Value>,
    pub error_output: Option<&'a Value>,
    pub context: &'a Value,
    pub variables: &'a FxHashMap<String, Value>,
}

impl<'a> DataScope<'a> {
    pub fn jsonata(&self) -> JsonataScope<'a> {
        JsonataScope {
            input: self.input,
            result: self.result,
            error_output: self.error_output,
            context: self.context,
            variables: self.variables,
        }
    }
}

/// Evaluate a JSONPath expression against `source`, resolving `$$` and
/// `$variable` roots through the scope. Missing locations come back as
/// [`PathValue::Missing`]; only malformed paths error here.
pub fn resolve_jsonpath(
    path_text: &str,
    source: &Value,
    scope: &DataScope,
) -> Result<PathValue, StatesError> {
    let path = JsonPath::parse(path_text)
        .map_err(|err| StatesError::runtime(err.to_string()))?;
    Ok(match &path.root {
        PathRoot::Input => path.read(source),
        PathRoot::Context => path.read(scope.context),
        PathRoot::Variable(name) => match scope.variables.get(name) {
            Some(value) => path.read(value),
            None => PathValue::Missing,
        },
    })
}

/// Like [`resolve_jsonpath`], but a missing location is a
/// `States.Runtime` fault naming the path.
pub fn resolve_jsonpath_strict(
    path_text: &str,
    source: &Value,
    scope: &DataScope,
) -> Result<Value, StatesError> {
    match resolve_jsonpath(path_text, source, scope)? {
        PathValue::Present(value) => Ok(value),
        PathValue::Missing => Err(StatesError::runtime(format!(
            "path '{path_text}' references a value that is not present"
        ))),
    }
}

/// Apply `InputPath` to the raw state input.
pub fn apply_input_path(
    raw_input: &Value,
    input_path: &OptionalPath,
    scope: &DataScope,
) -> Result<Value, StatesError> {
    match input_path {
        OptionalPath::Unset => Ok(raw_input.clone()),
        OptionalPath::Discard => Ok(json!({})),
        OptionalPath::Path(path) => resolve_jsonpath_strict(path, raw_input, scope),
    }
}

/// Apply a `Parameters`/`ResultSelector` template: object keys ending in
/// `.$` evaluate their (string) value as a path against `source`; plain
/// keys recurse; arrays map; everything else passes through.
pub fn apply_path_template(
    template: &Value,
    source: &Value,
    scope: &DataScope,
) -> Result<Value, StatesError> {
    match template {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if let Some(stripped) = key.strip_suffix(".$") {
                    let Value::String(path_text) = value else {
                        return Err(StatesError::runtime(format!(
                            "template key '{key}' must have a string path value"
                        )));
                    };
                    let resolved = resolve_jsonpath_strict(path_text, source, scope)?;
                    out.insert(stripped.to_string(), resolved);
                } else {
                    out.insert(key.clone(), apply_path_template(value, source, scope)?);
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| apply_path_template(item, source, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Apply `ResultPath`: merge the (selected) result into the post-InputPath
/// input. Default replaces; `null` discards the result and keeps the input.
pub fn apply_result_path(
    input: Value,
    result: Value,
    result_path: &OptionalPath,
) -> Result<Value, StatesError> {
    match result_path {
        OptionalPath::Unset => Ok(result),
        OptionalPath::Discard => Ok(input),
        OptionalPath::Path(path_text) => {
            let path = JsonPath::parse(path_text)
                .map_err(|err| StatesError::runtime(err.to_string()))?;
            path.write(input, result)
                .map_err(|err| StatesError::runtime(err.to_string()))
        }
    }
}

/// Apply `OutputPath` to the merged value.
pub fn apply_output_path(
    value: Value,
    output_path: &OptionalPath,
    scope: &DataScope,
) -> Result<Value, StatesError> {
    match output_path {
        OptionalPath::Unset => Ok(value),
        OptionalPath::Discard => Ok(json!({})),
        OptionalPath::Path(path) => resolve_jsonpath_strict(path, &value, scope),
    }
}

/// Evaluate a JSONata template: `{% … %}` string leaves evaluate, objects
/// and arrays recurse, everything else passes through. A bare `{% … %}`
/// string template evaluates to the expression's value directly, so
/// `Arguments`/`Output` may be a whole expression or an object of them.
pub fn apply_jsonata_template(
    template: &Value,
    scope: &JsonataScope,
) -> Result<Value, StatesError> {
    match template {
        Value::String(text) if is_jsonata_expression(text) => evaluate_jsonata(text, scope),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                out.insert(key.clone(), apply_jsonata_template(value, scope)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| apply_jsonata_template(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Evaluate an `Assign` block without committing it.
///
/// Every right-hand side sees the same snapshot; the returned bindings are
/// committed by the caller only after all of them resolved. In JSONPath
/// mode, input-rooted paths read from `source` (the state's result when one
/// exists, otherwise its effective input), matching how `$` behaves inside
/// `Assign` on the service.
pub fn evaluate_assign(
    assign: &Value,
    language: QueryLanguage,
    source: &Value,
    scope: &DataScope,
) -> Result<Vec<(String, Value)>, StatesError> {
    let Value::Object(entries) = assign else {
        return Err(StatesError::runtime("Assign must be an object"));
    };

    let mut bindings = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        match language {
            QueryLanguage::JsonPath => {
                if let Some(stripped) = key.strip_suffix(".$") {
                    let Value::String(path_text) = value else {
                        return Err(StatesError::runtime(format!(
                            "Assign key '{key}' must have a string path value"
                        )));
                    };
                    let resolved = resolve_jsonpath_strict(path_text, source, scope)?;
                    bindings.push((stripped.to_string(), resolved));
                } else {
                    bindings.push((key.clone(), apply_path_template(value, source, scope)?));
                }
            }
            QueryLanguage::Jsonata => {
                bindings.push((
                    key.clone(),
                    apply_jsonata_template(value, &scope.jsonata())?,
                ));
            }
        }
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_vars() -> FxHashMap<String, Value> {
        FxHashMap::default()
    }

    fn scope<'a>(
        input: &'a Value,
        variables: &'a FxHashMap<String, Value>,
        context: &'a Value,
    ) -> DataScope<'a> {
        DataScope {
            input,
            result: None,
            error_output: None,
            context,
            variables,
        }
    }

    #[test]
    fn input_path_defaults_and_discards() {
        let vars = empty_vars();
        let ctx = json!({});
        let raw = json!({"a": {"b": 2}});
        let s = scope(&raw, &vars, &ctx);

        assert_eq!(
            apply_input_path(&raw, &OptionalPath::Unset, &s).unwrap(),
            raw
        );
        assert_eq!(
            apply_input_path(&raw, &OptionalPath::Discard, &s).unwrap(),
            json!({})
        );
        assert_eq!(
            apply_input_path(&raw, &OptionalPath::Path("$.a".into()), &s).unwrap(),
            json!({"b": 2})
        );
        assert!(apply_input_path(&raw, &OptionalPath::Path("$.zzz".into()), &s).is_err());
    }

    #[test]
    fn path_template_evaluates_dollar_keys() {
        let vars = empty_vars();
        let ctx = json!({});
        let source = json!({"order": {"id": "o-1", "total": 50}});
        let s = scope(&source, &vars, &ctx);

        let template = json!({
            "static": "kept",
            "orderId.$": "$.order.id",
            "nested": {"total.$": "$.order.total"},
            "list": [{"id.$": "$.order.id"}]
        });
        let out = apply_path_template(&template, &source, &s).unwrap();
        assert_eq!(
            out,
            json!({
                "static": "kept",
                "orderId": "o-1",
                "nested": {"total": 50},
                "list": [{"id": "o-1"}]
            })
        );
    }

    #[test]
    fn path_template_resolves_variables_and_context() {
        let mut vars = empty_vars();
        vars.insert("region".to_string(), json!("eu-west-1"));
        let ctx = json!({"Execution": {"Input": {"seed": 9}}});
        let source = json!({});
        let s = scope(&source, &vars, &ctx);

        let template = json!({
            "region.$": "$region",
            "seed.$": "$$.Execution.Input.seed"
        });
        let out = apply_path_template(&template, &source, &s).unwrap();
        assert_eq!(out, json!({"region": "eu-west-1", "seed": 9}));
    }

    #[test]
    fn result_path_merges_replaces_discards() {
        let input = json!({"kept": true});
        let result = json!({"value": 1});

        assert_eq!(
            apply_result_path(input.clone(), result.clone(), &OptionalPath::Unset).unwrap(),
            result
        );
        assert_eq!(
            apply_result_path(input.clone(), result.clone(), &OptionalPath::Discard).unwrap(),
            input
        );
        assert_eq!(
            apply_result_path(
                input.clone(),
                result.clone(),
                &OptionalPath::Path("$.r".into())
            )
            .unwrap(),
            json!({"kept": true, "r": {"value": 1}})
        );
    }

    #[test]
    fn assign_sees_precommit_snapshot() {
        let mut vars = empty_vars();
        vars.insert("x".to_string(), json!(3));
        vars.insert("a".to_string(), json!(6));
        let ctx = json!({});
        let input = json!({});
        let s = scope(&input, &vars, &ctx);

        let assign = json!({"x.$": "$a", "nextX.$": "$x"});
        let bindings =
            evaluate_assign(&assign, QueryLanguage::JsonPath, &input, &s).unwrap();
        assert_eq!(
            bindings,
            vec![
                ("x".to_string(), json!(6)),
                ("nextX".to_string(), json!(3)),
            ]
        );
    }

    #[test]
    fn jsonata_template_walks_structures() {
        let vars = empty_vars();
        let ctx = json!({});
        let input = json!({"n": 4});
        let s = scope(&input, &vars, &ctx);

        let template = json!({
            "doubled": "{% $states.input.n * 2 %}",
            "plain": "text",
            "list": ["{% $states.input.n %}", 7]
        });
        let out = apply_jsonata_template(&template, &s.jsonata()).unwrap();
        assert_eq!(out, json!({"doubled": 8, "plain": "text", "list": [4, 7]}));
    }
}
