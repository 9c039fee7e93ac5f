use crate::diagnostic::Diagnostic;
use crate::source::Span;
use std::path::PathBuf;
use thiserror::Error;

/// Every way a build can stop. None of them are recoverable at the driver level.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resolution error: {0}")]
    Resolution(Diagnostic),

    #[error("parse error: {0}")]
    Parse(Diagnostic),

    #[error("structural error: {0}")]
    Structural(Diagnostic),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("toolchain error: {0}")]
    Toolchain(String),
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

impl BuildError {
    pub fn resolution(span: &Span, message: &str) -> Self {
        BuildError::Resolution(Diagnostic::error_span(span.clone(), message))
    }

    pub fn parse(span: &Span, message: &str) -> Self {
        BuildError::Parse(Diagnostic::error_span(span.clone(), message))
    }

    pub fn structural(span: Option<&Span>, message: &str) -> Self {
        match span {
            Some(span) => BuildError::Structural(Diagnostic::error_span(span.clone(), message)),
            None => BuildError::Structural(Diagnostic::bare(message)),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            BuildError::Resolution(d) | BuildError::Parse(d) | BuildError::Structural(d) => Some(d),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self.diagnostic() {
            Some(diagnostic) => diagnostic.message.clone(),
            None => self.to_string(),
        }
    }
}
