//! Property tests for the path algebra.

use proptest::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::json;
use stepsim::paths::{JsonPath, JsonataScope, PathValue, evaluate_jsonata};

proptest! {
    #[test]
    fn write_then_read_roundtrips(
        fields in prop::collection::vec("[a-z]{1,8}", 1..5),
        value in any::<i64>(),
    ) {
        let path_text = format!("$.{}", fields.join("."));
        let path = JsonPath::parse(&path_text).unwrap();
        let written = path.write(json!({}), json!(value)).unwrap();
        prop_assert_eq!(path.read(&written), PathValue::Present(json!(value)));
    }

    #[test]
    fn writes_preserve_unrelated_keys(
        field in "[a-z]{1,8}",
        value in any::<i32>(),
    ) {
        let target = format!("$.nested.{field}");
        let path = JsonPath::parse(&target).unwrap();
        let written = path.write(json!({"keep": "me"}), json!(value)).unwrap();
        prop_assert_eq!(written.get("keep"), Some(&json!("me")));
        prop_assert_eq!(
            path.read(&written),
            PathValue::Present(json!(value))
        );
    }

    #[test]
    fn reading_an_absent_sibling_is_missing(field in "[a-z]{1,8}") {
        let data = json!({field.clone(): 1});
        let path = JsonPath::parse(&format!("$.{field}x")).unwrap();
        prop_assert_eq!(path.read(&data), PathValue::Missing);
    }

    #[test]
    fn jsonata_addition_is_exact_for_integers(
        a in -1_000_000i64..1_000_000,
        b in -1_000_000i64..1_000_000,
    ) {
        let input = json!({"a": a, "b": b});
        let ctx = json!({});
        let vars = FxHashMap::default();
        let scope = JsonataScope {
            input: &input,
            result: None,
            error_output: None,
            context: &ctx,
            variables: &vars,
        };
        let out = evaluate_jsonata("{% a + b %}", &scope).unwrap();
        prop_assert_eq!(out, json!(a + b));
    }

    #[test]
    fn jsonata_concat_renders_integers_bare(n in 0i64..1_000_000) {
        let input = json!({"n": n});
        let ctx = json!({});
        let vars = FxHashMap::default();
        let scope = JsonataScope {
            input: &input,
            result: None,
            error_output: None,
            context: &ctx,
            variables: &vars,
        };
        let out = evaluate_jsonata("{% \"id-\" & n %}", &scope).unwrap();
        prop_assert_eq!(out, json!(format!("id-{n}")));
    }
}
