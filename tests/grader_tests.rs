// Grading tests through the public API

use exampro_shim::config::EqualityMode;
use exampro_shim::grader::{Evaluator, GradingRequest, GradingResult, GradingWorker};
use proptest::prelude::*;
use serde_json::json;

fn request(value: serde_json::Value) -> GradingRequest {
    serde_json::from_value(value).unwrap()
}

fn grade(value: serde_json::Value) -> GradingResult {
    Evaluator::new(EqualityMode::Structural).grade(&request(value))
}

#[test]
fn test_blank_code_grades_the_starter() {
    let result = grade(json!({
        "functionName": "add",
        "starter": "function add(a,b){return a+b}",
        "code": "",
        "tests": [
            { "args": [1, 2], "expected": 3 },
            { "args": [2, 2], "expected": 5 }
        ]
    }));

    assert_eq!(result, GradingResult { passed: 1, total: 2 });
}

#[test]
fn test_syntax_error_scores_zero() {
    let result = grade(json!({
        "functionName": "add",
        "starter": "function add(a,b){return a+b}",
        "code": "function add(a,b){return a+b",
        "tests": [
            { "args": [1, 2], "expected": 3 },
            { "args": [2, 2], "expected": 5 }
        ]
    }));

    assert_eq!(result, GradingResult { passed: 0, total: 2 });
}

#[test]
fn test_empty_tests() {
    let result = grade(json!({
        "functionName": "add",
        "code": "function add(a,b){return a+b}",
        "tests": []
    }));

    assert_eq!(result, GradingResult { passed: 0, total: 0 });
}

#[test]
fn test_reordered_keys_under_each_mode() {
    let body = json!({
        "functionName": "point",
        "code": "function point(x, y) { return { y: y, x: x }; }",
        "tests": [{ "args": [1, 2], "expected": { "x": 1, "y": 2 } }]
    });

    let structural = Evaluator::new(EqualityMode::Structural).grade(&request(body.clone()));
    let canonical = Evaluator::new(EqualityMode::Canonical).grade(&request(body));

    assert_eq!(structural, GradingResult { passed: 1, total: 1 });
    assert_eq!(canonical, GradingResult { passed: 0, total: 1 });
}

#[test]
fn test_missing_entry_scores_zero() {
    let result = grade(json!({
        "functionName": "solve",
        "code": "function solveIt() { return 1; }",
        "tests": [{ "args": [], "expected": 1 }]
    }));

    assert_eq!(result, GradingResult { passed: 0, total: 1 });
}

#[test]
fn test_typical_exercise() {
    let result = grade(json!({
        "functionName": "wordCount",
        "code": r#"
            function wordCount(text) {
                const counts = {};
                for (const word of text.toLowerCase().split(' ')) {
                    if (word === '') continue;
                    counts[word] = (counts[word] || 0) + 1;
                }
                return counts;
            }
        "#,
        "tests": [
            { "args": ["the cat the hat"], "expected": { "the": 2, "cat": 1, "hat": 1 } },
            { "args": [""], "expected": {} }
        ]
    }));

    assert_eq!(result, GradingResult { passed: 2, total: 2 });
}

#[test]
fn test_helpers_and_builtins() {
    let result = grade(json!({
        "functionName": "topTwo",
        "code": r#"
            const byDesc = (a, b) => b - a;
            function topTwo(xs) {
                return [...xs].sort(byDesc).slice(0, 2);
            }
        "#,
        "tests": [
            { "args": [[3, 9, 1, 7]], "expected": [9, 7] },
            { "args": [[5]], "expected": [5] },
            { "args": [[]], "expected": [] }
        ]
    }));

    assert_eq!(result, GradingResult { passed: 3, total: 3 });
}

#[test]
fn test_exception_in_one_case_only() {
    let result = grade(json!({
        "functionName": "first",
        "code": "function first(xs) { return xs[0].name; }",
        "tests": [
            { "args": [[]], "expected": null },
            { "args": [[{ "name": "a" }]], "expected": "a" }
        ]
    }));

    assert_eq!(result, GradingResult { passed: 1, total: 2 });
}

#[tokio::test]
async fn test_worker_grades_concurrently() {
    let worker = GradingWorker::default();
    let body = json!({
        "functionName": "fib",
        "code": "function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }",
        "tests": [{ "args": [10], "expected": 55 }, { "args": [15], "expected": 610 }]
    });

    let (a, b) = tokio::join!(
        worker.grade(request(body.clone())),
        worker.grade(request(body))
    );

    assert_eq!(a.unwrap(), GradingResult { passed: 2, total: 2 });
    assert_eq!(b.unwrap(), GradingResult { passed: 2, total: 2 });
}

#[test]
fn test_oversized_allocations_fail_only_their_case() {
    let worker = GradingWorker::default();
    let result = worker
        .grade_blocking(request(json!({
            "functionName": "grow",
            "code": r#"
                function grow(kind) {
                    if (kind === 'pad') return 'a'.padStart(2 ** 40).length;
                    if (kind === 'index') { const a = []; a[4e9] = 1; return a.length; }
                    if (kind === 'repeat') return 'ab'.repeat(2 ** 30).length;
                    return 'ok';
                }
            "#,
            "tests": [
                { "args": ["pad"], "expected": 1099511627776i64 },
                { "args": ["index"], "expected": 4000000001i64 },
                { "args": ["repeat"], "expected": 2147483648i64 },
                { "args": ["small"], "expected": "ok" }
            ]
        })))
        .unwrap();

    assert_eq!(result, GradingResult { passed: 1, total: 4 });
}

#[test]
fn test_deeply_nested_result_is_graded_and_freed() {
    let worker = GradingWorker::default();
    let result = worker
        .grade_blocking(request(json!({
            "functionName": "nest",
            "code": r#"
                function nest(depth) {
                    let a = [];
                    for (let i = 0; i < depth; i++) a = [a];
                    return a;
                }
            "#,
            "tests": [
                { "args": [1500000], "expected": [] },
                { "args": [1], "expected": [[]] }
            ]
        })))
        .unwrap();

    assert_eq!(result, GradingResult { passed: 1, total: 2 });
}

#[test]
fn test_cyclic_result_never_matches() {
    let result = grade(json!({
        "functionName": "loop",
        "code": "function loop() { const a = []; a.push(a); return a; }",
        "tests": [{ "args": [], "expected": [[]] }, { "args": [], "expected": null }]
    }));

    assert_eq!(result, GradingResult { passed: 0, total: 2 });
}

fn arb_json() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        (-1000i64..1000).prop_map(serde_json::Value::from),
        "[a-z]{0,6}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-z]{1,3}", inner, 0..4)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

fn reversed_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .rev()
                .map(|(k, v)| (k.clone(), reversed_keys(v)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(reversed_keys).collect())
        }
        other => other.clone(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_passed_never_exceeds_total(
        expected in prop::collection::vec(-5i64..5, 0..6),
        broken in any::<bool>(),
    ) {
        let code = if broken { "function sign(n) { return" } else { "function sign(n) { return n > 0 ? 1 : n < 0 ? -1 : 0; }" };
        let tests: Vec<_> = expected
            .iter()
            .map(|n| json!({ "args": [n], "expected": n.signum() }))
            .collect();
        let result = grade(json!({ "functionName": "sign", "code": code, "tests": tests }));

        prop_assert_eq!(result.total, expected.len());
        prop_assert!(result.passed <= result.total);
        if broken {
            prop_assert_eq!(result.passed, 0);
        } else {
            prop_assert_eq!(result.passed, result.total);
        }
    }

    #[test]
    fn prop_identity_matches_any_json(value in arb_json()) {
        let body = json!({
            "functionName": "id",
            "code": "const id = x => x;",
            "tests": [{ "args": [value.clone()], "expected": value }]
        });
        let structural = Evaluator::new(EqualityMode::Structural).grade(&request(body.clone()));
        let canonical = Evaluator::new(EqualityMode::Canonical).grade(&request(body));

        prop_assert_eq!(structural.passed, 1);
        prop_assert_eq!(canonical.passed, 1);
    }

    #[test]
    fn prop_structural_ignores_key_order(value in arb_json()) {
        let result = grade(json!({
            "functionName": "id",
            "code": "function id(x) { return x; }",
            "tests": [{ "args": [value.clone()], "expected": reversed_keys(&value) }]
        }));
        prop_assert_eq!(result.passed, 1);
    }

    #[test]
    fn prop_whitespace_code_uses_starter(padding in "[ \t\n]{0,8}") {
        let result = grade(json!({
            "functionName": "one",
            "starter": "function one() { return 1; }",
            "code": padding,
            "tests": [{ "args": [], "expected": 1 }]
        }));
        prop_assert_eq!(result, GradingResult { passed: 1, total: 1 });
    }

    #[test]
    fn prop_case_order_does_not_change_the_score(
        cases in prop::collection::vec((-5i64..5, -1i64..=1), 0..8)
            .prop_flat_map(|cases| (Just(cases.clone()), Just(cases).prop_shuffle())),
    ) {
        let body = |cases: &[(i64, i64)]| json!({
            "functionName": "sign",
            "code": "function sign(n) { return n > 0 ? 1 : n < 0 ? -1 : 0; }",
            "tests": cases
                .iter()
                .map(|(n, expected)| json!({ "args": [n], "expected": expected }))
                .collect::<Vec<_>>()
        });
        let (original, shuffled) = cases;
        let mut reversed = original.clone();
        reversed.reverse();

        let expected = original.iter().filter(|(n, e)| n.signum() == *e).count();
        let first = grade(body(&original));
        prop_assert_eq!(first.passed, expected);
        prop_assert_eq!(grade(body(&shuffled)), first);
        prop_assert_eq!(grade(body(&reversed)), first);
    }

    #[test]
    fn prop_regrading_gives_the_same_result(
        value in arb_json(),
        expected in arb_json(),
    ) {
        let body = json!({
            "functionName": "wrap",
            "code": "function wrap(x) { return { value: x, seen: [x] }; }",
            "tests": [
                { "args": [value.clone()], "expected": { "value": value.clone(), "seen": [value] } },
                { "args": [expected.clone()], "expected": expected }
            ]
        });
        let evaluator = Evaluator::new(EqualityMode::Structural);
        let first = evaluator.grade(&request(body.clone()));
        let second = evaluator.grade(&request(body));

        prop_assert_eq!(first.passed, second.passed);
        prop_assert_eq!(first, second);
        prop_assert!(first.passed >= 1);
    }
}
