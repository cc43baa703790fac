//! Error types surfaced across the HTTP boundary.
//!
//! Everything else in this crate returns `anyhow::Result`; this module only
//! exists for the handful of failure modes a caller needs to render as a
//! specific HTTP status rather than a generic 500.

use std::fmt;

/// A failure that should be reported back to the HTTP caller as 4xx, with
/// the message shown verbatim and no state change.
#[derive(Debug)]
pub struct IngressError(pub String);

impl IngressError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for IngressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for IngressError {}

/// A failure from an external subprocess (plan generator, image builder,
/// container engine). Fatal for the caller's operation.
#[derive(Debug)]
pub struct ToolError {
    pub program: String,
    pub detail: String,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' failed: {}", self.program, self.detail)
    }
}

impl std::error::Error for ToolError {}
