//! Restricted script engine used to run candidate submissions.
//!
//! Source goes through [`lexer`] and [`parser`] into an [`ast::Program`],
//! which the [`interpreter`] executes in a fresh global scope. Values are
//! single-threaded (`Rc`); callers keep an [`Interpreter`] on one thread.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod interpreter;
pub mod json;
pub mod lexer;
pub mod parser;
pub mod value;

pub use error::{CompileError, ScriptError};
pub use interpreter::Interpreter;
pub use parser::parse;
pub use value::Value;
