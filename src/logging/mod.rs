//! Structured logging: tracing subscriber setup and single-line JSON output.

mod format;

pub use format::{ErrorLine, StructuredLogger};
