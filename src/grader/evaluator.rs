// Runs a submission's test cases and counts the matches

use super::compiler::{SandboxCompiler, ScriptCompiler};
use super::equality::values_equal;
use super::models::{GradingRequest, GradingResult, TestCase};
use crate::config::EqualityMode;
use crate::metrics;
use crate::script::Value;
use std::time::Instant;
use tracing::debug;

/// Compiles a submission once and runs every case against it.
///
/// Grading never fails: a compile error scores `0/total` and a case that
/// throws is a non-match. Values are `Rc`-based, so an evaluator and
/// everything it produces stay on the calling thread.
pub struct Evaluator<C = SandboxCompiler> {
    compiler: C,
    equality: EqualityMode,
}

impl Evaluator<SandboxCompiler> {
    pub fn new(equality: EqualityMode) -> Self {
        Self::with_compiler(SandboxCompiler, equality)
    }
}

impl<C: ScriptCompiler> Evaluator<C> {
    pub fn with_compiler(compiler: C, equality: EqualityMode) -> Self {
        Self { compiler, equality }
    }

    pub fn grade(&self, request: &GradingRequest) -> GradingResult {
        let start = Instant::now();
        let total = request.total();

        let Some(source) = request.source() else {
            debug!("Submission for '{}' has no source text", request.function_name);
            metrics::record_grading(false, 0, total, start.elapsed().as_secs_f64());
            return GradingResult::failed(total);
        };
        let mut callable = match self.compiler.compile(source, &request.function_name) {
            Ok(callable) => callable,
            Err(e) => {
                debug!("Submission for '{}' did not compile: {}", request.function_name, e);
                metrics::record_grading(false, 0, total, start.elapsed().as_secs_f64());
                return GradingResult::failed(total);
            }
        };

        let cases: &[TestCase] = request.tests.as_deref().unwrap_or_default();
        let mut passed = 0;
        for (index, case) in cases.iter().enumerate() {
            let Some(args) = &case.args else {
                debug!("Case {} of '{}' has no argument list", index, request.function_name);
                continue;
            };
            // Fresh argument values per case so one call cannot mutate the next's input.
            let args = args.iter().map(Value::from).collect();
            let expected = case.expected.as_ref().map_or(Value::Undefined, Value::from);

            match callable.call(args) {
                Ok(actual) if values_equal(&actual, &expected, self.equality) => passed += 1,
                Ok(actual) => debug!(
                    "Case {} of '{}' returned {} (mismatch)",
                    index,
                    request.function_name,
                    actual.display_string()
                ),
                Err(e) => debug!("Case {} of '{}' threw: {}", index, request.function_name, e),
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        debug!(
            "Graded '{}': {}/{} in {:.3}s",
            request.function_name, passed, total, elapsed
        );
        metrics::record_grading(true, passed, total, elapsed);

        GradingResult { passed, total }
    }
}
