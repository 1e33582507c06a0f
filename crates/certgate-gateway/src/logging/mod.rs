//! Structured logging helpers
//!
//! Provides:
//! - Short request ids for correlating one authority call across log lines
//! - A span per dispatcher call
//! - Consolidated entry/exit lines with elapsed time

mod trace_context;

pub use trace_context::{generate_request_id, CallTrace};
