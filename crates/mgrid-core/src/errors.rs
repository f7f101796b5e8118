//! Structured error types shared across mgrid crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`GridError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (axis names, ranks, paths, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the mgrid engine.
///
/// Setup-time variants (`Config`, `Strategy`, `Restart`) abort a sweep
/// before any worker touches the grid. `AllFailed` and `Resource` are the
/// only fatal runtime variants; per-point timeouts and failures are
/// recorded in the output logs and never surface here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum GridError {
    /// Malformed grid definition or load-balance axis mismatch.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Unrecognized load-balance method id.
    #[error("strategy error: {0}")]
    Strategy(ErrorInfo),
    /// Prior output incompatible with the current grid definition.
    #[error("restart error: {0}")]
    Restart(ErrorInfo),
    /// A prior record matched two grid points within tolerance.
    #[error("ambiguous match: {0}")]
    Ambiguous(ErrorInfo),
    /// Every attempt before the first checkpoint failed.
    #[error("all attempts failed: {0}")]
    AllFailed(ErrorInfo),
    /// Memory exhaustion reported by the simulator; always fatal.
    #[error("resource exhaustion: {0}")]
    Resource(ErrorInfo),
    /// Collective-communication failure between workers.
    #[error("comm error: {0}")]
    Comm(ErrorInfo),
    /// Filesystem errors while touching sweep output.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl GridError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            GridError::Config(info)
            | GridError::Strategy(info)
            | GridError::Restart(info)
            | GridError::Ambiguous(info)
            | GridError::AllFailed(info)
            | GridError::Resource(info)
            | GridError::Comm(info)
            | GridError::Io(info)
            | GridError::Serde(info) => info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_accessor_reaches_payload() {
        let err = GridError::Config(
            ErrorInfo::new("axis-empty", "axis has no values").with_context("axis", "fstar"),
        );
        assert_eq!(err.info().code, "axis-empty");
        assert_eq!(err.info().context.get("axis").unwrap(), "fstar");
    }

    #[test]
    fn display_includes_context_and_hint() {
        let info = ErrorInfo::new("chain-read", "cannot open chain file")
            .with_context("path", "out/run.chain.jsonl")
            .with_hint("set overwrite=true to start fresh");
        let text = format!("{info}");
        assert!(text.contains("chain-read"));
        assert!(text.contains("out/run.chain.jsonl"));
        assert!(text.contains("overwrite=true"));
    }
}
