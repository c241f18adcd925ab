// exampro-shim - cache-first asset shim and sandboxed grader for ExamPro

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod grader;
pub mod metrics;
pub mod script;
pub mod server;
pub mod utils;
