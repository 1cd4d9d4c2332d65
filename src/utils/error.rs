//! Error types for the acquisition and decode stages
//!
//! None of these are fatal for an update cycle: the region adapter logs them
//! and reports "no change".

use thiserror::Error;

/// Errors that can occur while acquiring an artifact
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("Server error: {status} for {url}")]
    ServerError { status: u16, url: String },

    /// Attempt exceeded its time budget
    #[error("Attempt timed out after {0}s")]
    Timeout(u64),

    /// Page loaded but no element matched the source heuristic
    #[error("Artifact not found on {0}")]
    ArtifactNotFound(String),

    /// Browser or session level failure
    #[error("Session error: {0}")]
    Session(String),

    /// Operation needs an open page
    #[error("No page is open in this session")]
    NoPage,

    /// Frame index past the end of the document's frames
    #[error("Frame {0} does not exist")]
    FrameOutOfRange(usize),

    /// Every attempt failed
    #[error("All {attempts} fetch attempts failed, last error: {last}")]
    Exhausted { attempts: u32, last: String },

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors that can occur while turning an artifact into a schedule
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Image bytes could not be decoded
    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// Artifact is empty
    #[error("Artifact is empty")]
    EmptyArtifact,

    /// Decoder was handed the wrong kind of artifact
    #[error("Decoder expects {expected} artifacts, got {actual}")]
    WrongArtifact {
        expected: &'static str,
        actual: &'static str,
    },

    /// Invalid decoder pattern in configuration
    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

impl DecodeError {
    /// Create a pattern error
    pub fn pattern(pattern: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }
}

/// Errors raised by optical character recognition
#[derive(Error, Debug)]
pub enum OcrError {
    /// Recognizer process could not be started or talked to
    #[error("Failed to run OCR engine: {0}")]
    Io(#[from] std::io::Error),

    /// Recognizer exited with a failure
    #[error("OCR engine failed: {0}")]
    Engine(String),

    /// Recognizer did not finish in time and was killed
    #[error("OCR engine timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Caption crop could not be prepared
    #[error("Failed to prepare caption crop: {0}")]
    Image(#[from] image::ImageError),

    /// Recognized text is empty
    #[error("OCR produced no text")]
    Empty,
}
