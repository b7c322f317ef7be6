// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

fn parsed(output: &str) -> Verdict {
    match parse_verdict(output) {
        VerdictOutcome::Parsed(v) => v,
        VerdictOutcome::Unparseable => panic!("expected a verdict in: {output}"),
    }
}

#[test]
fn bare_json_object() {
    let v = parsed(r#"{"pass": true, "criteria": ["tests pass"], "gaps": [], "testResults": "ok"}"#);
    assert!(v.pass);
    assert_eq!(v.criteria, vec!["tests pass"]);
    assert_eq!(v.test_results, "ok");
}

#[test]
fn verdict_wrapped_in_prose_and_fences() {
    let output = r#"
I reviewed the change carefully.

```json
{"pass": false, "gaps": ["missing tests"]}
```

Let me know if you need details."#;
    let v = parsed(output);
    assert!(!v.pass);
    assert_eq!(v.gaps, vec!["missing tests"]);
}

#[test]
fn last_fragment_wins() {
    let output = r#"
First draft: {"pass": true, "criteria": []}
On reflection: {"pass": false, "gaps": ["regression in cache layer"]}
"#;
    let v = parsed(output);
    assert!(!v.pass);
}

#[test]
fn braces_inside_strings_do_not_break_matching() {
    let output = r#"{"pass": true, "criteria": ["handles {braces} in text"], "gaps": []}"#;
    let v = parsed(output);
    assert_eq!(v.criteria, vec!["handles {braces} in text"]);
}

#[test]
fn verdict_nested_in_wrapper_object_is_found() {
    let output = r#"{"result": {"pass": true, "criteria": ["builds"]}}"#;
    let v = parsed(output);
    assert!(v.pass);
}

#[test]
fn objects_without_boolean_pass_are_skipped() {
    let output = r#"{"pass": "yes"} {"status": "done"} {"pass": true}"#;
    let v = parsed(output);
    assert!(v.pass);
}

#[test]
fn unbalanced_prefix_does_not_hide_later_verdict() {
    let output = r#"{ oops no close ... {"pass": false, "gaps": ["x"]}"#;
    let v = parsed(output);
    assert!(!v.pass);
}

#[test]
fn no_verdict_is_unparseable() {
    assert_eq!(parse_verdict("all good, ship it"), VerdictOutcome::Unparseable);
    assert_eq!(parse_verdict(""), VerdictOutcome::Unparseable);
    assert_eq!(parse_verdict("{\"status\": 1}"), VerdictOutcome::Unparseable);
}

#[test]
fn inconclusive_carries_one_gap_and_fails() {
    let v = Verdict::inconclusive("audit output was not parseable");
    assert!(!v.pass);
    assert_eq!(v.gaps.len(), 1);
}

proptest! {
    // Round-trip law: rendering a verdict and scanning it back is lossless.
    #[test]
    fn parse_render_roundtrip(
        pass in any::<bool>(),
        criteria in proptest::collection::vec("[a-z ]{0,20}", 0..4),
        gaps in proptest::collection::vec("[a-z ]{0,20}", 0..4),
        test_results in "[a-z0-9 ]{0,20}",
    ) {
        let verdict = Verdict { pass, criteria, gaps, test_results };
        let rendered = serde_json::to_string(&verdict).unwrap();
        let surrounded = format!("audit follows\n{rendered}\nthanks");
        prop_assert_eq!(parse_verdict(&surrounded), VerdictOutcome::Parsed(verdict));
    }
}
