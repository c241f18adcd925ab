//! `JSON.stringify`/`JSON.parse` over interpreter values.

use super::error::ScriptError;
use super::value::{check_string_length, number_to_string, Value, MAX_NESTING_DEPTH};
use std::rc::Rc;

/// Serialize compactly. `Ok(None)` means the value has no JSON form
/// (`undefined` or a function at the top level).
pub fn stringify(value: &Value) -> Result<Option<String>, ScriptError> {
    stringify_with_gap(value, "")
}

/// Serialize with `gap` as the per-level indentation.
pub fn stringify_with_gap(value: &Value, gap: &str) -> Result<Option<String>, ScriptError> {
    let mut serializer = Serializer {
        gap,
        stack: Vec::new(),
    };
    let mut out = String::new();
    if serializer.write(value, &mut out)? {
        Ok(Some(out))
    } else {
        Ok(None)
    }
}

/// Parse JSON text into a fresh value tree.
pub fn parse(text: &str) -> Result<Value, ScriptError> {
    let json: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        ScriptError::syntax(format!("Unexpected token in JSON: {}", e), e.line(), e.column())
    })?;
    Ok(Value::from(&json))
}

fn quote(text: &str) -> String {
    // Serializing a &str cannot fail.
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

struct Serializer<'a> {
    gap: &'a str,
    /// Containers currently being written, by identity.
    stack: Vec<usize>,
}

impl Serializer<'_> {
    fn enter(&mut self, id: usize) -> Result<(), ScriptError> {
        if self.stack.len() >= MAX_NESTING_DEPTH {
            return Err(ScriptError::range("Maximum call stack size exceeded"));
        }
        if self.stack.contains(&id) {
            return Err(ScriptError::type_error("Converting circular structure to JSON"));
        }
        self.stack.push(id);
        Ok(())
    }

    /// Returns `false` when the value is omitted.
    fn write(&mut self, value: &Value, out: &mut String) -> Result<bool, ScriptError> {
        check_string_length(out.len())?;
        match value {
            Value::Undefined | Value::Function(_) => return Ok(false),
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) if n.is_finite() => out.push_str(&number_to_string(*n)),
            Value::Number(_) => out.push_str("null"),
            Value::String(s) => out.push_str(&quote(s)),
            Value::Array(items) => {
                self.enter(Rc::as_ptr(items) as *const () as usize)?;
                let items = items.borrow().clone();
                out.push('[');
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    self.newline(out, self.stack.len());
                    if !self.write(item, out)? {
                        out.push_str("null");
                    }
                }
                self.stack.pop();
                if !items.is_empty() {
                    self.newline(out, self.stack.len());
                }
                out.push(']');
            }
            Value::Object(map) => {
                self.enter(Rc::as_ptr(map) as *const () as usize)?;
                let entries: Vec<(Rc<str>, Value)> = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let separator = if self.gap.is_empty() { ":" } else { ": " };
                out.push('{');
                let mut written = 0;
                for (key, item) in &entries {
                    let mut field = String::new();
                    if !self.write(item, &mut field)? {
                        continue;
                    }
                    if written > 0 {
                        out.push(',');
                    }
                    self.newline(out, self.stack.len());
                    out.push_str(&quote(key));
                    out.push_str(separator);
                    out.push_str(&field);
                    check_string_length(out.len())?;
                    written += 1;
                }
                self.stack.pop();
                if written > 0 {
                    self.newline(out, self.stack.len());
                }
                out.push('}');
            }
        }
        Ok(true)
    }

    fn newline(&self, out: &mut String, level: usize) {
        if !self.gap.is_empty() {
            out.push('\n');
            for _ in 0..level {
                out.push_str(self.gap);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(text: &str) -> Value {
        parse(text).unwrap()
    }

    #[test]
    fn test_compact_output_keeps_key_order() {
        let value = json(r#"{"b":[1,2.5,"x"],"a":{"c":null}}"#);
        assert_eq!(
            stringify(&value).unwrap().as_deref(),
            Some(r#"{"b":[1,2.5,"x"],"a":{"c":null}}"#)
        );
    }

    #[test]
    fn test_undefined_and_non_finite() {
        let value = Value::array(vec![Value::Undefined, Value::Number(f64::NAN)]);
        assert_eq!(stringify(&value).unwrap().as_deref(), Some("[null,null]"));

        let object = Value::object_from([("skip", Value::Undefined), ("keep", Value::Number(1.0))]);
        assert_eq!(stringify(&object).unwrap().as_deref(), Some(r#"{"keep":1}"#));

        assert_eq!(stringify(&Value::Undefined).unwrap(), None);
    }

    #[test]
    fn test_indentation() {
        let value = json(r#"{"a":[1],"b":{}}"#);
        assert_eq!(
            stringify_with_gap(&value, "  ").unwrap().unwrap(),
            "{\n  \"a\": [\n    1\n  ],\n  \"b\": {}\n}"
        );
    }

    #[test]
    fn test_cycle_is_type_error() {
        let object = Value::object_from([("n", Value::Number(1.0))]);
        if let Value::Object(map) = &object {
            map.borrow_mut().insert("self", object.clone());
        }
        assert!(matches!(stringify(&object), Err(ScriptError::Type(_))));
        // Break the cycle so the test does not leak.
        if let Value::Object(map) = &object {
            map.borrow_mut().insert("self", Value::Null);
        }
    }

    #[test]
    fn test_shared_reference_is_not_a_cycle() {
        let shared = Value::array(vec![]);
        let value = Value::array(vec![shared.clone(), shared]);
        assert_eq!(stringify(&value).unwrap().as_deref(), Some("[[],[]]"));
    }

    #[test]
    fn test_parse_error_is_syntax_error() {
        assert!(matches!(parse("{oops"), Err(ScriptError::Syntax { .. })));
    }

    #[test]
    fn test_excessive_nesting_is_range_error() {
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let mut value = Value::array(vec![]);
                for _ in 0..MAX_NESTING_DEPTH {
                    value = Value::array(vec![value]);
                }
                matches!(stringify(&value), Err(ScriptError::Range(_)))
            })
            .unwrap();
        assert!(handle.join().unwrap());
    }
}
