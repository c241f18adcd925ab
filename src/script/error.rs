// Script errors raised while compiling or running candidate code

use super::value::Value;
use thiserror::Error;

/// Everything that can go wrong inside the sandboxed interpreter.
///
/// The first four variants mirror the error classes a script can observe
/// (`e.name` inside a `catch`); `Thrown` carries an arbitrary value raised
/// by a `throw` statement.
#[derive(Error, Debug, Clone)]
pub enum ScriptError {
    #[error("SyntaxError: {message} ({line}:{column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("ReferenceError: {0}")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    #[error("Uncaught {}", .0.display_string())]
    Thrown(Value),
}

impl ScriptError {
    pub fn syntax(message: impl Into<String>, line: usize, column: usize) -> Self {
        ScriptError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    pub fn reference(message: impl Into<String>) -> Self {
        ScriptError::Reference(message.into())
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        ScriptError::Type(message.into())
    }

    pub fn range(message: impl Into<String>) -> Self {
        ScriptError::Range(message.into())
    }

    /// The value a `catch (e)` clause binds for this error.
    pub fn into_value(self) -> Value {
        let (name, message) = match self {
            ScriptError::Thrown(value) => return value,
            ScriptError::Syntax { message, .. } => ("SyntaxError", message),
            ScriptError::Reference(message) => ("ReferenceError", message),
            ScriptError::Type(message) => ("TypeError", message),
            ScriptError::Range(message) => ("RangeError", message),
        };
        Value::object_from([
            ("name", Value::from(name)),
            ("message", Value::from(message.as_str())),
        ])
    }
}

/// Failure to turn source text into a callable entry point.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    /// The source did not lex or parse.
    #[error("{0}")]
    Syntax(ScriptError),

    /// Top-level statements threw while the script was being instantiated.
    #[error("instantiation failed: {0}")]
    Instantiation(ScriptError),

    /// The entry name is not bound in the script's global scope.
    #[error("{0} is not defined")]
    MissingEntry(String),

    /// The entry name is bound but not to a function.
    #[error("{0} is not a function")]
    NotCallable(String),
}
