//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod clock;
pub mod error;
pub mod retry;

use encoding_rs::{UTF_8, WINDOWS_1251};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use self::error::FetchError;

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text.trim(), " ").to_string()
}

/// Decode page bytes to a string
///
/// Tries, in order:
/// 1. The charset named in the Content-Type header
/// 2. UTF-8
/// 3. windows-1251 (legacy Cyrillic pages)
pub fn decode_markup(bytes: &[u8], content_type: &str) -> Result<String, FetchError> {
    let content_type = content_type.to_lowercase();

    if content_type.contains("charset=windows-1251") || content_type.contains("charset=cp1251") {
        return decode_with(bytes, WINDOWS_1251);
    }

    if let Ok(text) = decode_with(bytes, UTF_8) {
        return Ok(text);
    }

    decode_with(bytes, WINDOWS_1251)
}

fn decode_with(bytes: &[u8], encoding: &'static encoding_rs::Encoding) -> Result<String, FetchError> {
    let (cow, _encoding, had_errors) = encoding.decode(bytes);

    if had_errors {
        return Err(FetchError::Decode(format!(
            "{} decoding errors",
            encoding.name()
        )));
    }

    Ok(cow.into_owned())
}

/// Short SHA-256 fingerprint of raw artifact bytes, for logs
pub fn fingerprint(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    format!("{hash:x}").chars().take(16).collect()
}

/// Format byte size as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return String::from("0 B");
    }

    let base: f64 = 1024.0;
    let exponent = (bytes as f64).log(base).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes as f64 / base.powi(exponent as i32);

    format!("{value:.2} {}", UNITS[exponent])
}
