// Sandboxed compilation of candidate source into a callable entry point

use crate::script::{parse, CompileError, Interpreter, ScriptError, Value};
use tracing::trace;

/// Turns source text into a callable function.
pub trait ScriptCompiler {
    /// Compile `source` as a strict-mode script and resolve `entry` in its
    /// global scope. Any lexing, parsing, top-level or resolution failure
    /// is a [`CompileError`].
    ///
    /// `entry` is looked up as a global binding name. It is never evaluated,
    /// so an expression such as `obj.method` or `(f)` does not resolve.
    fn compile(&self, source: &str, entry: &str) -> Result<Callable, CompileError>;
}

/// A resolved entry point together with the environment it lives in.
///
/// Calls share that environment, so global state the script sets up
/// persists from one call to the next.
pub struct Callable {
    interpreter: Interpreter,
    function: Value,
}

impl Callable {
    /// Invoke with positional arguments and `this = undefined`.
    pub fn call(&mut self, args: Vec<Value>) -> Result<Value, ScriptError> {
        self.interpreter.invoke(&self.function, Value::Undefined, args)
    }
}

/// Compiler backed by the crate's own interpreter; no host evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxCompiler;

impl ScriptCompiler for SandboxCompiler {
    fn compile(&self, source: &str, entry: &str) -> Result<Callable, CompileError> {
        let program = parse(source).map_err(CompileError::Syntax)?;
        trace!("Parsed {} top-level statements", program.body.len());

        let mut interpreter = Interpreter::new();
        interpreter
            .run(&program)
            .map_err(CompileError::Instantiation)?;

        let function = interpreter
            .global_value(entry)
            .ok_or_else(|| CompileError::MissingEntry(entry.to_string()))?;
        if !function.is_callable() {
            return Err(CompileError::NotCallable(entry.to_string()));
        }

        Ok(Callable {
            interpreter,
            function,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::value::PropertyMap;
    use std::rc::Rc;

    fn compile(source: &str, entry: &str) -> Result<Callable, CompileError> {
        SandboxCompiler.compile(source, entry)
    }

    #[test]
    fn test_compile_and_call() {
        let mut add = compile("function add(a, b) { return a + b; }", "add").unwrap();
        let result = add.call(vec![Value::Number(2.0), Value::Number(3.0)]).unwrap();
        assert!(result.strict_equals(&Value::Number(5.0)));
    }

    #[test]
    fn test_arrow_bound_with_const() {
        let mut double = compile("const double = x => x * 2;", "double").unwrap();
        let result = double.call(vec![Value::Number(4.0)]).unwrap();
        assert!(result.strict_equals(&Value::Number(8.0)));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(compile("function f( {", "f"), Err(CompileError::Syntax(_))));
    }

    #[test]
    fn test_top_level_throw() {
        let err = compile("throw new Error('boom'); function f() {}", "f").err().unwrap();
        assert!(matches!(err, CompileError::Instantiation(_)));
    }

    #[test]
    fn test_missing_and_non_callable_entry() {
        assert!(matches!(compile("function g() {}", "f"), Err(CompileError::MissingEntry(_))));
        assert!(matches!(compile("const f = 3;", "f"), Err(CompileError::NotCallable(_))));
    }

    #[test]
    fn test_global_state_persists_between_calls() {
        let mut counter = compile("let n = 0; function next() { n += 1; return n; }", "next").unwrap();
        counter.call(vec![]).unwrap();
        let second = counter.call(vec![]).unwrap();
        assert!(second.strict_equals(&Value::Number(2.0)));
    }

    #[test]
    fn test_entry_is_a_name_not_an_expression() {
        let source = "const tools = { f: function () { return 1; } }; function f() { return 2; }";
        assert!(matches!(compile(source, "tools.f"), Err(CompileError::MissingEntry(_))));
        assert!(matches!(compile(source, "(f)"), Err(CompileError::MissingEntry(_))));
        assert!(compile(source, "f").is_ok());
    }

    #[test]
    fn test_cyclic_result_is_freed_with_the_callable() {
        let mut f = compile("function f() { const a = { v: 1 }; a.self = a; return a; }", "f").unwrap();
        let result = f.call(vec![]).unwrap();
        let Value::Object(map) = &result else {
            panic!("expected an object");
        };
        let weak = Rc::downgrade(map);

        drop(result);
        assert!(weak.upgrade().is_some());
        drop(f);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_cycle_through_an_argument_is_freed() {
        let mut link = compile("function link(node) { node.next = node; return 0; }", "link").unwrap();
        let node = Value::object(PropertyMap::new());
        let Value::Object(map) = &node else {
            panic!("expected an object");
        };
        let weak = Rc::downgrade(map);

        link.call(vec![node]).unwrap();
        drop(link);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_returned_cycle_outlives_the_callable() {
        let mut pair = compile("function pair() { const a = {}; a.b = { a: a }; return a; }", "pair").unwrap();
        let a = pair.call(vec![]).unwrap();
        drop(pair);

        let Value::Object(map) = &a else {
            panic!("expected an object");
        };
        let b = map.borrow().get("b").cloned().unwrap();
        let Value::Object(b) = &b else {
            panic!("expected an object");
        };
        let back = b.borrow().get("a").cloned().unwrap();
        assert!(back.strict_equals(&a));
    }

    #[test]
    fn test_deeply_nested_arrays_drop_without_recursing() {
        let mut nest = compile(
            "function nest(n) { let a = []; for (let i = 0; i < n; i++) a = [a]; return 0; }",
            "nest",
        )
        .unwrap();
        let result = nest.call(vec![Value::Number(100_000.0)]).unwrap();
        assert!(result.strict_equals(&Value::Number(0.0)));
    }
}
