//! Retry, Catch, and Choice rule types.

use serde::Deserialize;
use serde_json::Value;

use super::state::OptionalPath;

fn default_interval_seconds() -> f64 {
    1.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_rate() -> f64 {
    2.0
}

/// How retry back-off delays are randomized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum JitterStrategy {
    #[default]
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "FULL")]
    Full,
}

/// One entry of a state's `Retry` array.
///
/// Defaults follow the service: one-second initial interval, three
/// attempts, doubling back-off.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetryRule {
    pub error_equals: Vec<String>,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f64,
    #[serde(default)]
    pub max_delay_seconds: Option<f64>,
    #[serde(default)]
    pub jitter_strategy: JitterStrategy,
}

/// One entry of a state's `Catch` array.
///
/// When the rule matches, execution routes to `next` with the fault payload
/// written at `result_path` (default: replace the whole input).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatchRule {
    pub error_equals: Vec<String>,
    pub next: String,
    #[serde(default)]
    pub result_path: OptionalPath,
}

/// One entry of a Choice state's `Choices` array, or a nested boolean
/// combinator inside one.
///
/// The JSONPath form carries `Variable` plus exactly one comparator
/// (captured in `comparators` by name, so `Path`-suffixed variants come
/// along for free), or one of `And`/`Or`/`Not`. The JSONata form carries a
/// `Condition` expression. Only top-level rules have `Next`; construction
/// enforces the distinction.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ChoiceRule {
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub and: Option<Vec<ChoiceRule>>,
    #[serde(default)]
    pub or: Option<Vec<ChoiceRule>>,
    #[serde(default)]
    pub not: Option<Box<ChoiceRule>>,
    #[serde(flatten)]
    pub comparators: serde_json::Map<String, Value>,
}

/// Comparator names legal in a JSONPath-form choice rule.
pub(crate) const COMPARATOR_NAMES: &[&str] = &[
    "StringEquals",
    "StringLessThan",
    "StringGreaterThan",
    "StringLessThanEquals",
    "StringGreaterThanEquals",
    "StringMatches",
    "NumericEquals",
    "NumericLessThan",
    "NumericGreaterThan",
    "NumericLessThanEquals",
    "NumericGreaterThanEquals",
    "BooleanEquals",
    "TimestampEquals",
    "TimestampLessThan",
    "TimestampGreaterThan",
    "TimestampLessThanEquals",
    "TimestampGreaterThanEquals",
    "IsNull",
    "IsPresent",
    "IsNumeric",
    "IsString",
    "IsBoolean",
    "IsTimestamp",
];

impl ChoiceRule {
    /// True when any comparator key is a `…Path` variant or a base name.
    pub(crate) fn comparator_is_known(name: &str) -> bool {
        COMPARATOR_NAMES.contains(&name)
            || name
                .strip_suffix("Path")
                .is_some_and(|base| COMPARATOR_NAMES.contains(&base) && !base.starts_with("Is"))
    }

    /// True when the rule uses any JSONPath-form field.
    pub(crate) fn uses_jsonpath_form(&self) -> bool {
        self.variable.is_some()
            || !self.comparators.is_empty()
            || self.and.is_some()
            || self.or.is_some()
            || self.not.is_some()
    }
}
