// crates/formvault-core/tests/paths.rs
// ============================================================================
// Module: Attribute Path Tests
// Description: Parsing, display, lookup, and set behavior of attribute paths.
// Purpose: Validate path grammar and tree addressing edge cases.
// ============================================================================

//! Tests for attribute path parsing and tree addressing.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use formvault_core::AttributePath;
use formvault_core::PathError;
use serde_json::Value;
use serde_json::json;

fn tree() -> Value {
    json!({
        "org_boundary": "Operational control",
        "reporting_year": 2023,
        "scope1": [
            {
                "ghg_name": "Carbon dioxide",
                "emissions": 1000.0,
                "breakdown": [
                    { "site": "Plant A", "emissions": 600.0 },
                    { "site": "Plant B", "emissions": 400.0 }
                ]
            },
            { "ghg_name": "Methane", "emissions": 25.0 },
            { "ghg_name": "Methane", "emissions": 30.0 }
        ]
    })
}

#[test]
fn parses_attribute_only_path() {
    let path = AttributePath::parse("org_boundary").expect("parse");
    assert!(path.segments.is_empty());
    assert_eq!(path.attribute, "org_boundary");
    assert_eq!(path.to_string(), "org_boundary");
}

#[test]
fn parses_selector_path_and_round_trips_display() {
    let text = "scope1.{ghg_name:Carbon dioxide:0}.emissions";
    let path = AttributePath::parse(text).expect("parse");
    assert_eq!(path.segments.len(), 1);
    assert_eq!(path.segments[0].form, "scope1");
    assert_eq!(path.to_string(), text);

    let reparsed: AttributePath = path.to_string().parse().expect("reparse");
    assert_eq!(reparsed, path);
}

#[test]
fn parses_index_only_selector() {
    let path = AttributePath::parse("scope1.{::1}.emissions").expect("parse");
    let selector = &path.segments[0].selector;
    assert_eq!(selector.choice_field, None);
    assert_eq!(selector.choice_value, None);
    assert_eq!(selector.index, 1);
}

#[test]
fn rejects_malformed_selectors() {
    let cases = [
        "scope1.{ghg_name}.emissions",
        "scope1.{ghg_name:}.emissions",
        "scope1.{:Methane:0}.emissions",
        "scope1.{ghg_name:Methane:x}.emissions",
        "scope1.emissions",
        "",
        "scope1.{ghg_name:Methane:0}.",
    ];
    for case in cases {
        let result = AttributePath::parse(case);
        assert!(
            matches!(result, Err(PathError::Malformed { .. })),
            "expected malformed for {case:?}, got {result:?}"
        );
    }
}

#[test]
fn rejects_paths_deeper_than_three_segments() {
    let text = "a.{::0}.b.{::0}.c.{::0}.d.{::0}.leaf";
    assert!(matches!(
        AttributePath::parse(text),
        Err(PathError::DepthExceeded { .. })
    ));
}

#[test]
fn lookup_selects_by_choice_field_and_index() {
    let tree = tree();
    let first = AttributePath::parse("scope1.{ghg_name:Methane:0}.emissions").expect("parse");
    assert_eq!(first.lookup(&tree), Some(&json!(25.0)));

    let second = AttributePath::parse("scope1.{ghg_name:Methane:1}.emissions").expect("parse");
    assert_eq!(second.lookup(&tree), Some(&json!(30.0)));
}

#[test]
fn lookup_descends_nested_segments() {
    let tree = tree();
    let path =
        AttributePath::parse("scope1.{ghg_name:Carbon dioxide:0}.breakdown.{site:Plant B:0}.emissions")
            .expect("parse");
    assert_eq!(path.lookup(&tree), Some(&json!(400.0)));
}

#[test]
fn lookup_misses_return_none() {
    let tree = tree();
    let missing_row = AttributePath::parse("scope1.{ghg_name:Nitrous oxide:0}.emissions")
        .expect("parse");
    assert_eq!(missing_row.lookup(&tree), None);

    let missing_index =
        AttributePath::parse("scope1.{ghg_name:Methane:5}.emissions").expect("parse");
    assert_eq!(missing_index.lookup(&tree), None);

    let missing_attribute =
        AttributePath::parse("scope1.{ghg_name:Methane:0}.reductions").expect("parse");
    assert_eq!(missing_attribute.lookup(&tree), None);
}

#[test]
fn set_replaces_and_returns_previous_value() {
    let mut tree = tree();
    let path = AttributePath::parse("scope1.{ghg_name:Methane:0}.emissions").expect("parse");
    let previous = path.set(&mut tree, json!(26.5)).expect("set");
    assert_eq!(previous, Some(json!(25.0)));
    assert_eq!(path.lookup(&tree), Some(&json!(26.5)));
}

#[test]
fn set_inserts_missing_attribute() {
    let mut tree = tree();
    let path = AttributePath::parse("scope1.{ghg_name:Methane:0}.reductions").expect("parse");
    let previous = path.set(&mut tree, json!(5.0)).expect("set");
    assert_eq!(previous, None);
    assert_eq!(path.lookup(&tree), Some(&json!(5.0)));
}

#[test]
fn set_fails_when_row_is_unresolved() {
    let mut tree = tree();
    let path = AttributePath::parse("scope1.{ghg_name:Nitrous oxide:0}.emissions")
        .expect("parse");
    assert!(matches!(
        path.set(&mut tree, json!(1.0)),
        Err(PathError::Unresolved { .. })
    ));
}

#[test]
fn serde_uses_path_text_form() {
    let path = AttributePath::parse("scope1.{ghg_name:Methane:0}.emissions").expect("parse");
    let encoded = serde_json::to_value(&path).expect("serialize");
    assert_eq!(encoded, json!("scope1.{ghg_name:Methane:0}.emissions"));
    let decoded: AttributePath = serde_json::from_value(encoded).expect("deserialize");
    assert_eq!(decoded, path);
}
