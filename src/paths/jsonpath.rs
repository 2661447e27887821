//! JSONPath subset reader/writer over `serde_json::Value`.
//!
//! ASL uses a restricted JSONPath dialect: `$` is the root, `.field`
//! navigates objects, `[i]` indexes arrays, `[*]` fans out over array
//! elements. Reading a missing location yields [`PathValue::Missing`], a
//! sentinel distinct from JSON `null` — `Choice` relies on the distinction
//! for `IsPresent`.
//!
//! Three roots exist:
//!
//! - `$…` — the state's effective input (or whatever value the caller reads
//!   against),
//! - `$$…` — the context object (`$$.Map.Item.Value`,
//!   `$$.Execution.Input`),
//! - `$name…` — a workflow variable bound by `Assign`.
//!
//! The writer supports `$` (replace root) and `$.a.b.c` (creating
//! intermediate objects as needed); a JSON `null` path is handled by the
//! data-flow layer before the writer is involved.

use miette::Diagnostic;
use serde_json::{Map, Value};
use thiserror::Error;

/// Result of reading a path: either a value or "nothing there".
#[derive(Debug, Clone, PartialEq)]
pub enum PathValue {
    Present(Value),
    Missing,
}

impl PathValue {
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, PathValue::Present(_))
    }

    /// The value, with `Missing` collapsed to `None`.
    #[must_use]
    pub fn into_option(self) -> Option<Value> {
        match self {
            PathValue::Present(value) => Some(value),
            PathValue::Missing => None,
        }
    }
}

/// Which object a parsed path navigates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRoot {
    /// `$` — the value under evaluation.
    Input,
    /// `$$` — the context object.
    Context,
    /// `$name` — a workflow variable.
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
}

/// Errors raised while parsing or applying a path expression.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum PathError {
    #[error("invalid path '{path}': {reason}")]
    #[diagnostic(
        code(stepsim::paths::invalid),
        help("Paths must start with '$' and use '.field', '[index]', or '[*]' segments.")
    )]
    Invalid { path: String, reason: String },

    #[error("path '{path}' cannot be used as a write target: {reason}")]
    #[diagnostic(code(stepsim::paths::unwritable))]
    Unwritable { path: String, reason: String },
}

impl PathError {
    fn invalid(path: &str, reason: impl Into<String>) -> Self {
        PathError::Invalid {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// A parsed path expression.
///
/// # Examples
///
/// ```
/// use stepsim::paths::{JsonPath, PathValue};
/// use serde_json::json;
///
/// let path = JsonPath::parse("$.order.items[0].sku").unwrap();
/// let data = json!({"order": {"items": [{"sku": "A-1"}]}});
/// assert_eq!(path.read(&data), PathValue::Present(json!("A-1")));
///
/// let absent = JsonPath::parse("$.order.discount").unwrap();
/// assert_eq!(absent.read(&data), PathValue::Missing);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    pub root: PathRoot,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Parse a path expression.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let mut chars = path.chars().peekable();
        if chars.next() != Some('$') {
            return Err(PathError::invalid(path, "must start with '$'"));
        }

        let root = if chars.peek() == Some(&'$') {
            chars.next();
            PathRoot::Context
        } else if chars
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            let mut name = String::new();
            while let Some(c) = chars.peek() {
                if c.is_ascii_alphanumeric() || *c == '_' {
                    name.push(*c);
                    chars.next();
                } else {
                    break;
                }
            }
            PathRoot::Variable(name)
        } else {
            PathRoot::Input
        };

        let mut segments = Vec::new();
        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    let mut name = String::new();
                    while let Some(c) = chars.peek() {
                        if *c == '.' || *c == '[' {
                            break;
                        }
                        name.push(*c);
                        chars.next();
                    }
                    if name.is_empty() {
                        return Err(PathError::invalid(path, "empty field segment"));
                    }
                    segments.push(Segment::Field(name));
                }
                '[' => {
                    let mut body = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(c) => body.push(c),
                            None => {
                                return Err(PathError::invalid(path, "unterminated '['"));
                            }
                        }
                    }
                    let body = body.trim();
                    if body == "*" {
                        segments.push(Segment::Wildcard);
                    } else if let Some(quoted) = body
                        .strip_prefix('\'')
                        .and_then(|rest| rest.strip_suffix('\''))
                    {
                        segments.push(Segment::Field(quoted.to_string()));
                    } else {
                        let index = body.parse::<usize>().map_err(|_| {
                            PathError::invalid(path, format!("bad index '{body}'"))
                        })?;
                        segments.push(Segment::Index(index));
                    }
                }
                other => {
                    return Err(PathError::invalid(
                        path,
                        format!("unexpected character '{other}'"),
                    ));
                }
            }
        }

        Ok(JsonPath { root, segments })
    }

    /// True when the path is exactly the root `$`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.root == PathRoot::Input && self.segments.is_empty()
    }

    /// Read this path against `value`, which the caller has already picked
    /// according to [`Self::root`].
    #[must_use]
    pub fn read(&self, value: &Value) -> PathValue {
        read_segments(value, &self.segments)
    }

    /// Write `new_value` at this path inside `target`, creating intermediate
    /// objects as needed. `$` replaces the root. Index and wildcard segments
    /// are not writable targets.
    pub fn write(&self, target: Value, new_value: Value) -> Result<Value, PathError> {
        if self.root != PathRoot::Input {
            return Err(PathError::Unwritable {
                path: format!("{:?}", self.root),
                reason: "only '$' paths can be written".into(),
            });
        }
        if self.segments.is_empty() {
            return Ok(new_value);
        }

        let mut fields = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => fields.push(name.clone()),
                Segment::Index(_) | Segment::Wildcard => {
                    return Err(PathError::Unwritable {
                        path: render_segments(&self.segments),
                        reason: "index and wildcard segments cannot be written".into(),
                    });
                }
            }
        }

        // Non-object roots are replaced by an object so the write always
        // lands, mirroring how the service materializes ResultPath targets.
        let mut root = match target {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Map::new()),
        };
        let mut current = &mut root;
        for name in &fields[..fields.len() - 1] {
            let map = current.as_object_mut().expect("intermediate is object");
            let slot = map
                .entry(name.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = slot;
        }
        let map = current.as_object_mut().expect("parent is object");
        map.insert(fields[fields.len() - 1].clone(), new_value);
        Ok(root)
    }
}

fn read_segments(value: &Value, segments: &[Segment]) -> PathValue {
    let Some((head, rest)) = segments.split_first() else {
        return PathValue::Present(value.clone());
    };
    match head {
        Segment::Field(name) => match value.get(name.as_str()) {
            Some(inner) => read_segments(inner, rest),
            None => PathValue::Missing,
        },
        Segment::Index(index) => match value.get(*index) {
            Some(inner) => read_segments(inner, rest),
            None => PathValue::Missing,
        },
        Segment::Wildcard => match value {
            Value::Array(items) => {
                let mut collected = Vec::with_capacity(items.len());
                for item in items {
                    if let PathValue::Present(inner) = read_segments(item, rest) {
                        collected.push(inner);
                    }
                }
                PathValue::Present(Value::Array(collected))
            }
            _ => PathValue::Missing,
        },
    }
}

fn render_segments(segments: &[Segment]) -> String {
    let mut out = String::from("$");
    for segment in segments {
        match segment {
            Segment::Field(name) => {
                out.push('.');
                out.push_str(name);
            }
            Segment::Index(index) => out.push_str(&format!("[{index}]")),
            Segment::Wildcard => out.push_str("[*]"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_reads_whole_value() {
        let path = JsonPath::parse("$").unwrap();
        assert!(path.is_root());
        assert_eq!(
            path.read(&json!({"a": 1})),
            PathValue::Present(json!({"a": 1}))
        );
    }

    #[test]
    fn missing_is_not_null() {
        let data = json!({"a": null});
        let present = JsonPath::parse("$.a").unwrap().read(&data);
        let absent = JsonPath::parse("$.b").unwrap().read(&data);
        assert_eq!(present, PathValue::Present(Value::Null));
        assert_eq!(absent, PathValue::Missing);
    }

    #[test]
    fn wildcard_fans_out() {
        let data = json!({"items": [{"v": 1}, {"v": 2}, {"other": 3}]});
        let path = JsonPath::parse("$.items[*].v").unwrap();
        assert_eq!(path.read(&data), PathValue::Present(json!([1, 2])));
    }

    #[test]
    fn context_and_variable_roots() {
        let ctx = JsonPath::parse("$$.Map.Item.Value").unwrap();
        assert_eq!(ctx.root, PathRoot::Context);
        let var = JsonPath::parse("$orderTotal").unwrap();
        assert_eq!(var.root, PathRoot::Variable("orderTotal".into()));
    }

    #[test]
    fn write_creates_intermediates() {
        let path = JsonPath::parse("$.a.b.c").unwrap();
        let out = path.write(json!({"x": 1}), json!(2)).unwrap();
        assert_eq!(out, json!({"x": 1, "a": {"b": {"c": 2}}}));
    }

    #[test]
    fn write_root_replaces() {
        let path = JsonPath::parse("$").unwrap();
        let out = path.write(json!({"x": 1}), json!([1, 2])).unwrap();
        assert_eq!(out, json!([1, 2]));
    }

    #[test]
    fn write_rejects_indexes() {
        let path = JsonPath::parse("$.a[0]").unwrap();
        assert!(path.write(json!({}), json!(1)).is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(JsonPath::parse("order.total").is_err());
        assert!(JsonPath::parse("$.").is_err());
        assert!(JsonPath::parse("$.a[").is_err());
        assert!(JsonPath::parse("$.a[x]").is_err());
    }
}
