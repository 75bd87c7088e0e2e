// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failure classes, keyed by observable outcome rather than by source.
///
/// The class decides the recovery policy: transient errors are retried on the
/// next tick without advancing offsets, parse failures skip the bad line but
/// do advance, constraint violations abort one operation and are reported to
/// the user, and fatal errors abort startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientIo,
    Parse,
    Constraint,
    NotFound,
    Rendering,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientIo => "TRANSIENT_IO",
            Self::Parse => "PARSE",
            Self::Constraint => "CONSTRAINT",
            Self::NotFound => "NOT_FOUND",
            Self::Rendering => "RENDERING",
            Self::Fatal => "FATAL",
        }
    }

    /// Whether the failed operation should be retried on the next poll tick.
    pub fn retry_next_tick(&self) -> bool {
        matches!(self, Self::TransientIo)
    }

    /// Whether this failure aborts startup with a non-zero exit code.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified bridge failure.
#[derive(Debug, Clone)]
pub struct BridgeError {
    kind: ErrorKind,
    message: String,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// The window referenced by an operation does not exist in the live
    /// multiplexer. Routing treats this as an external kill.
    pub fn window_not_found(window_id: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("window {window_id} not found"))
    }

    /// A bind would violate the one-window-per-topic bijection.
    pub fn already_bound(window_id: &str) -> Self {
        Self::new(ErrorKind::Constraint, format!("window {window_id} is already bound"))
    }

    pub fn not_bound() -> Self {
        Self::new(ErrorKind::Constraint, "topic is not bound to a window".to_owned())
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BridgeError {}

/// Classify an error chain: returns the `ErrorKind` if a [`BridgeError`]
/// is anywhere in the chain, `TransientIo` for bare I/O errors, and
/// `Fatal` otherwise.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(bridge) = cause.downcast_ref::<BridgeError>() {
            return bridge.kind();
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ErrorKind::TransientIo;
        }
    }
    ErrorKind::Fatal
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
