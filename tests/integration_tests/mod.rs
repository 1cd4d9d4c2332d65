//! Integration tests module
//!
//! End-to-end tests of the svitlo update pipeline against mock sources:
//! - fetch → decode → diff → store for image and markup regions
//! - Failure handling: failed fetches, missing metadata, storage errors

pub mod error_scenarios;
pub mod fixtures;
pub mod pipeline_test;
