//! Comparison of a returned value with a test case's expected value.
//!
//! Both modes agree on what a value "is": its JSON form. `undefined` and
//! functions are omitted from objects and read as `null` inside arrays;
//! non-finite numbers read as `null`. They differ only in that
//! `Canonical` compares serialized text, so object key order matters,
//! while `Structural` compares key sets. Values nested deeper than
//! [`MAX_NESTING_DEPTH`] never match.

use crate::config::EqualityMode;
use crate::script::json;
use crate::script::value::{PropertyMap, Value, MAX_NESTING_DEPTH};
use std::cell::RefCell;
use std::rc::Rc;

/// Whether `actual` matches `expected` under `mode`.
pub fn values_equal(actual: &Value, expected: &Value, mode: EqualityMode) -> bool {
    match mode {
        EqualityMode::Structural => {
            let mut path = Path::default();
            structural_equal(actual, expected, &mut path)
        }
        EqualityMode::Canonical => canonical_equal(actual, expected),
    }
}

/// Serialized texts equal; a value that cannot be serialized never matches.
fn canonical_equal(a: &Value, b: &Value) -> bool {
    match (json::stringify(a), json::stringify(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Value as the JSON form sees it.
enum View<'a> {
    Omitted,
    Null,
    Bool(bool),
    Number(f64),
    Str(&'a str),
    Array(&'a Rc<RefCell<Vec<Value>>>),
    Object(&'a Rc<RefCell<PropertyMap>>),
}

fn view(value: &Value) -> View<'_> {
    match value {
        Value::Undefined | Value::Function(_) => View::Omitted,
        Value::Null => View::Null,
        Value::Bool(b) => View::Bool(*b),
        Value::Number(n) if n.is_finite() => View::Number(*n),
        Value::Number(_) => View::Null,
        Value::String(s) => View::Str(s),
        Value::Array(items) => View::Array(items),
        Value::Object(map) => View::Object(map),
    }
}

/// Containers on the current descent, per side; revisiting one is a cycle.
/// The descent also stops at the nesting limit.
#[derive(Default)]
struct Path {
    left: Vec<usize>,
    right: Vec<usize>,
}

impl Path {
    fn enter(&mut self, left: usize, right: usize) -> bool {
        if self.left.len() >= MAX_NESTING_DEPTH
            || self.left.contains(&left)
            || self.right.contains(&right)
        {
            return false;
        }
        self.left.push(left);
        self.right.push(right);
        true
    }

    fn leave(&mut self) {
        self.left.pop();
        self.right.pop();
    }
}

fn structural_equal(a: &Value, b: &Value, path: &mut Path) -> bool {
    match (view(a), view(b)) {
        (View::Omitted, View::Omitted) | (View::Null, View::Null) => true,
        (View::Bool(x), View::Bool(y)) => x == y,
        (View::Number(x), View::Number(y)) => x == y,
        (View::Str(x), View::Str(y)) => x == y,
        (View::Array(x), View::Array(y)) => {
            if !path.enter(Rc::as_ptr(x) as *const () as usize, Rc::as_ptr(y) as *const () as usize) {
                return false;
            }
            let (xs, ys) = (x.borrow(), y.borrow());
            let equal = xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(p, q)| element_equal(p, q, path));
            path.leave();
            equal
        }
        (View::Object(x), View::Object(y)) => {
            if !path.enter(Rc::as_ptr(x) as *const () as usize, Rc::as_ptr(y) as *const () as usize) {
                return false;
            }
            let (xs, ys) = (x.borrow(), y.borrow());
            let present = |map: &PropertyMap| {
                map.iter()
                    .filter(|(_, v)| !matches!(view(v), View::Omitted))
                    .count()
            };
            let equal = present(&*xs) == present(&*ys)
                && xs
                    .iter()
                    .filter(|(_, v)| !matches!(view(v), View::Omitted))
                    .all(|(key, p)| match ys.get(key) {
                        Some(q) => structural_equal(p, q, path),
                        None => false,
                    });
            path.leave();
            equal
        }
        _ => false,
    }
}

/// Inside arrays an omitted value serializes as `null`.
fn element_equal(a: &Value, b: &Value, path: &mut Path) -> bool {
    let as_null = |v: &Value| matches!(view(v), View::Omitted | View::Null);
    if as_null(a) || as_null(b) {
        return as_null(a) && as_null(b);
    }
    structural_equal(a, b, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn js(value: serde_json::Value) -> Value {
        Value::from(&value)
    }

    fn both(a: &Value, b: &Value) -> (bool, bool) {
        (
            values_equal(a, b, EqualityMode::Structural),
            values_equal(a, b, EqualityMode::Canonical),
        )
    }

    #[test]
    fn test_key_order() {
        let a = js(json!({"a": 1, "b": 2}));
        let b = js(json!({"b": 2, "a": 1}));
        assert_eq!(both(&a, &b), (true, false));
    }

    #[test]
    fn test_nested_structures() {
        let a = js(json!({"list": [1, {"x": "y"}], "n": null}));
        let b = js(json!({"n": null, "list": [1, {"x": "y"}]}));
        assert!(values_equal(&a, &b, EqualityMode::Structural));
        assert!(!values_equal(&a, &js(json!({"list": [1], "n": null})), EqualityMode::Structural));
    }

    #[test]
    fn test_undefined_follows_json_rules() {
        let with_undefined = Value::object_from([("a", Value::Number(1.0)), ("b", Value::Undefined)]);
        assert_eq!(both(&with_undefined, &js(json!({"a": 1}))), (true, true));

        let array = Value::array(vec![Value::Undefined, Value::Number(1.0)]);
        assert_eq!(both(&array, &js(json!([null, 1]))), (true, true));

        assert_eq!(both(&Value::Undefined, &Value::Undefined), (true, true));
        assert_eq!(both(&Value::Undefined, &Value::Null), (false, false));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(both(&Value::Number(f64::NAN), &Value::Number(f64::NAN)), (true, true));
        assert_eq!(both(&Value::Number(f64::INFINITY), &Value::Null), (true, true));
        assert_eq!(both(&Value::Number(-0.0), &Value::Number(0.0)), (true, true));
        assert_eq!(both(&Value::Number(1.0), &Value::from("1")), (false, false));
    }

    #[test]
    fn test_cycles_never_match() {
        let cyclic = Value::array(vec![]);
        if let Value::Array(items) = &cyclic {
            items.borrow_mut().push(cyclic.clone());
        }
        let other = js(json!([[]]));
        assert_eq!(both(&cyclic, &other), (false, false));
        assert_eq!(both(&cyclic, &cyclic), (false, false));

        if let Value::Array(items) = &cyclic {
            items.borrow_mut().clear();
        }
    }

    fn nested(depth: usize) -> Value {
        let mut value = Value::array(vec![Value::Number(1.0)]);
        for _ in 0..depth {
            value = Value::array(vec![value]);
        }
        value
    }

    #[test]
    fn test_nesting_limit() {
        assert_eq!(both(&nested(100), &nested(100)), (true, true));

        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| both(&nested(MAX_NESTING_DEPTH), &nested(MAX_NESTING_DEPTH)))
            .unwrap();
        assert_eq!(handle.join().unwrap(), (false, false));
    }
}
