//! Invocation context guard.
//!
//! The server owns a listening socket and runs a long-lived loop, so it must
//! only be started from the command-line entry point.  Library callers that
//! embed the crate pass their own context and are refused before any socket
//! is created.

use std::fmt;

/// How the server was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Started by the `wscast-server` binary.
    CommandLine,
    /// Any other host (tests, embedding applications, plugins, ...).
    Other(String),
}

impl ExecutionContext {
    pub fn is_command_line(&self) -> bool {
        matches!(self, ExecutionContext::CommandLine)
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::CommandLine => f.write_str("cli"),
            ExecutionContext::Other(name) => f.write_str(name),
        }
    }
}
