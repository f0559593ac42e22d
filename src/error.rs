//! Error types for the Tokc compiler

use thiserror::Error;

/// Why a reference occurrence could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No source file or key path matched the reference
    NotFound,
    /// The reference reappeared in its own resolution chain
    Cycle,
    /// The depth guard stopped a runaway resolution
    DepthLimit,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnresolvedReason::NotFound => write!(f, "not found"),
            UnresolvedReason::Cycle => write!(f, "cycle detected"),
            UnresolvedReason::DepthLimit => write!(f, "depth limit exceeded"),
        }
    }
}

/// A single unresolved reference occurrence.
///
/// Unresolved references are never hard failures; they are collected during
/// a pass and surfaced as a diagnostics log when the build finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Document the reference occurred in
    pub source: String,
    /// The dotted path as written, without braces
    pub reference: String,
    pub reason: UnresolvedReason,
}

impl Diagnostic {
    pub fn new(
        source: impl Into<String>,
        reference: impl Into<String>,
        reason: UnresolvedReason,
    ) -> Self {
        Self {
            source: source.into(),
            reference: reference.into(),
            reason,
        }
    }

    /// One line of the diagnostics log: `file: {path} (reason)`
    pub fn render(&self) -> String {
        format!("{}: {{{}}} ({})", self.source, self.reference, self.reason)
    }
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Config error: {message}")]
    Config { message: String },

    #[error("Output error for {path}: {message}")]
    Output { path: String, message: String },

    #[error("Theme error: {message}")]
    Theme { message: String },

    #[error("Watch error: {message}")]
    Watch { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("{count} unresolved reference(s), see {log}")]
    UnresolvedReferences { count: usize, log: String },
}

pub type Result<T> = std::result::Result<T, TokenError>;

impl TokenError {
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn output(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Output {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn theme(message: impl Into<String>) -> Self {
        Self::Theme {
            message: message.into(),
        }
    }

    pub fn watch(message: impl Into<String>) -> Self {
        Self::Watch {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_render() {
        let diag = Diagnostic::new("aliases", "core.spacing.sm", UnresolvedReason::NotFound);
        assert_eq!(diag.render(), "aliases: {core.spacing.sm} (not found)");

        let diag = Diagnostic::new("core", "core.a", UnresolvedReason::Cycle);
        assert_eq!(diag.render(), "core: {core.a} (cycle detected)");
    }

    #[test]
    fn test_error_constructors() {
        let err = TokenError::parse("core.json", "unexpected token");
        assert!(matches!(err, TokenError::Parse { .. }));
        assert_eq!(err.to_string(), "Parse error in core.json: unexpected token");
    }
}
