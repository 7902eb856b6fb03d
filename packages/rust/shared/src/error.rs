//! Error types for docpipe.
//!
//! Library crates use [`DocpipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all docpipe operations.
#[derive(Debug, thiserror::Error)]
pub enum DocpipeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a source.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// A resource template string is malformed.
    #[error("invalid template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A URI does not structurally match a resource template.
    #[error("uri {uri:?} does not match template {template:?}: {reason}")]
    TemplateMismatch {
        template: String,
        uri: String,
        reason: String,
    },

    /// A named parameter is missing, unexpected, or not coercible to its type.
    #[error("parameter {name:?} expected {expected}, got {value:?}")]
    ParameterType {
        name: String,
        expected: String,
        value: String,
    },

    /// No available version satisfies the requested one.
    #[error("no version compatible with {requested:?} (available: {available:?})")]
    NoCompatibleVersion {
        requested: String,
        available: Vec<String>,
    },

    /// A named filter stage failed.
    #[error("filter stage {stage:?} failed: {source}")]
    FilterStage {
        stage: String,
        source: Box<DocpipeError>,
    },

    /// A source provider could not produce raw content.
    #[error("extraction of {source_ref:?} failed: {source}")]
    Extraction {
        source_ref: String,
        source: Box<DocpipeError>,
    },

    /// An operation exceeded its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The entry index maps diverged. Never recoverable.
    #[error("index invariant violated: {0}")]
    IndexInvariant(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocpipeError>;

impl DocpipeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attribute a failure to the named filter stage.
    pub fn filter_stage(stage: impl Into<String>, source: DocpipeError) -> Self {
        Self::FilterStage {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Attribute a failure to fetching `source_ref`.
    pub fn extraction(source_ref: impl Into<String>, source: DocpipeError) -> Self {
        Self::Extraction {
            source_ref: source_ref.into(),
            source: Box::new(source),
        }
    }

    /// Resolution failures a caller should surface as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TemplateMismatch { .. } | Self::NoCompatibleVersion { .. }
        )
    }

    /// Resolution failures a caller should surface as "bad parameter".
    pub fn is_bad_parameter(&self) -> bool {
        matches!(self, Self::ParameterType { .. })
    }

    /// Errors that must abort a batch instead of being reported per unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IndexInvariant(_))
    }
}
