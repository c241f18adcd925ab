//! Cross-cutting helpers.
//!
//! - `logging`: tracing subscriber initialization from [`LoggingConfig`](crate::config::LoggingConfig).

pub mod logging;
