// Runs grading off the async runtime on a dedicated thread

use super::evaluator::Evaluator;
use super::models::{GradingRequest, GradingResult};
use crate::config::EqualityMode;
use crate::error::{Result, ShimError};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Stack reserved for each grading thread; deep enough for the
/// interpreter's full call depth.
pub const GRADING_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Hands each submission to its own thread.
///
/// Interpreter values are not `Send`, so only the request and the result
/// cross the thread boundary. A panic inside the evaluator ends that
/// thread alone and surfaces as [`ShimError::Grading`].
#[derive(Debug, Clone, Copy)]
pub struct GradingWorker {
    equality: EqualityMode,
}

impl GradingWorker {
    pub fn new(equality: EqualityMode) -> Self {
        Self { equality }
    }

    pub fn equality(&self) -> EqualityMode {
        self.equality
    }

    /// Grade without blocking the calling task.
    pub async fn grade(&self, request: GradingRequest) -> Result<GradingResult> {
        let (tx, rx) = oneshot::channel();
        let equality = self.equality;

        self.spawn(move || {
            let result = Evaluator::new(equality).grade(&request);
            if tx.send(result).is_err() {
                debug!("Grading result dropped: caller went away");
            }
        })?;

        rx.await.map_err(|_| {
            error!("Grading thread exited without a result");
            ShimError::Grading("grading thread exited without a result".to_string())
        })
    }

    /// Grade from synchronous code, waiting for the thread to finish.
    pub fn grade_blocking(&self, request: GradingRequest) -> Result<GradingResult> {
        let equality = self.equality;
        let handle = self.spawn(move || Evaluator::new(equality).grade(&request))?;

        handle.join().map_err(|_| {
            error!("Grading thread panicked");
            ShimError::Grading("grading thread exited without a result".to_string())
        })
    }

    fn spawn<F, T>(&self, work: F) -> Result<thread::JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        thread::Builder::new()
            .name("grader".to_string())
            .stack_size(GRADING_STACK_SIZE)
            .spawn(work)
            .map_err(|e| ShimError::Grading(format!("failed to start grading thread: {}", e)))
    }
}

impl Default for GradingWorker {
    fn default() -> Self {
        Self::new(EqualityMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> GradingRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_grade_on_worker_thread() {
        let worker = GradingWorker::default();
        let result = worker
            .grade(request(json!({
                "functionName": "square",
                "code": "const square = n => n * n;",
                "tests": [{ "args": [3], "expected": 9 }, { "args": [4], "expected": 15 }]
            })))
            .await
            .unwrap();

        assert_eq!(result, GradingResult { passed: 1, total: 2 });
    }

    #[tokio::test]
    async fn test_runaway_recursion_counts_as_failure() {
        let worker = GradingWorker::default();
        let result = worker
            .grade(request(json!({
                "functionName": "f",
                "code": "function f(n) { return f(n + 1); }",
                "tests": [{ "args": [0], "expected": 0 }]
            })))
            .await
            .unwrap();

        assert_eq!(result, GradingResult { passed: 0, total: 1 });
    }

    #[test]
    fn test_grade_blocking() {
        let worker = GradingWorker::new(EqualityMode::Canonical);
        let result = worker
            .grade_blocking(request(json!({
                "functionName": "id",
                "code": "",
                "starter": "function id(x) { return x; }",
                "tests": [{ "args": [[1, "a"]], "expected": [1, "a"] }]
            })))
            .unwrap();

        assert_eq!(result, GradingResult { passed: 1, total: 1 });
    }
}
