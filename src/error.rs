//! Unified error handling for the svitlo crate
//!
//! Stage-specific errors ([`FetchError`], [`DecodeError`], [`OcrError`]) stay
//! inside a region update: the adapter logs them and reports no changes. Only
//! storage failures and unknown region codes reach callers through [`Error`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use svitlo::error::{Error, ErrorCategory, SvitloErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(error = %err, "will retry on the next cycle");
//!     } else {
//!         tracing::error!(category = ?err.category(), error = %err, "fatal");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::utils::error::{DecodeError, FetchError, OcrError};

/// Common trait for all svitlo error types
pub trait SvitloErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later attempt may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Page loading, HTTP, session and timeout errors
    Network,
    /// Artifact decoding errors
    Decoding,
    /// Caption/metadata extraction errors
    Metadata,
    /// Database and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Decoding => "decoding",
            Self::Metadata => "metadata",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the svitlo crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Decode-specific errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// OCR errors
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Region code not present in the registry
    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl SvitloErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_)
            | Self::ServerError { .. }
            | Self::Timeout(_)
            | Self::ArtifactNotFound(_)
            | Self::Session(_)
            | Self::NoPage
            | Self::Exhausted { .. } => true,
            Self::FrameOutOfRange(_) | Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Network
    }
}

impl SvitloErrorTrait for DecodeError {
    fn is_recoverable(&self) -> bool {
        // A fresh artifact may decode where this one did not
        !matches!(self, Self::Pattern { .. } | Self::WrongArtifact { .. })
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Pattern { .. } | Self::WrongArtifact { .. } => ErrorCategory::Config,
            _ => ErrorCategory::Decoding,
        }
    }
}

impl SvitloErrorTrait for OcrError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_))
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Metadata
    }
}

impl SvitloErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Decode(e) => e.is_recoverable(),
            Self::Ocr(e) => e.is_recoverable(),
            Self::Database(_) => false,
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::UnknownRegion(_) => false,
            Self::Other(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Decode(e) => e.category(),
            Self::Ocr(e) => e.category(),
            Self::Database(_) | Self::Io(_) | Self::Json(_) => ErrorCategory::Storage,
            Self::UnknownRegion(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other(context.into())
    }
}

// Conversion from rusqlite::Error
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
