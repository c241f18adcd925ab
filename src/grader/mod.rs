//! Grading of candidate submissions.
//!
//! A [`GradingRequest`] is compiled by a [`ScriptCompiler`], each test case
//! is called and compared under an [`EqualityMode`](crate::config::EqualityMode),
//! and the matches are counted into a [`GradingResult`]. The
//! [`GradingWorker`] runs all of it on a dedicated thread.

pub mod compiler;
pub mod equality;
pub mod evaluator;
pub mod models;
pub mod worker;

pub use compiler::{Callable, SandboxCompiler, ScriptCompiler};
pub use equality::values_equal;
pub use evaluator::Evaluator;
pub use models::{GradingRequest, GradingResult, TestCase};
pub use worker::{GradingWorker, GRADING_STACK_SIZE};
