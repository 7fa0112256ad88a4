//! Error handling for the trip processing pipeline.
//!
//! Fatal errors (no input files, a failed weather or solar fetch) abort the
//! run. Per-row rejections are never errors; they are counted in
//! [`crate::models::CleaningStats`] and reported per source file.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("No trip source files found matching pattern: {pattern}")]
    NoSourceFiles { pattern: String },

    #[error("Request to {service} service failed")]
    ServiceRequest {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} service returned status {status} for {url}")]
    ServiceStatus {
        service: &'static str,
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Malformed {service} payload: {reason}")]
    MalformedPayload {
        service: &'static str,
        reason: String,
    },

    #[error("Duplicate join key in {table} table; hourly/daily keys must be unique")]
    DuplicateJoinKey { table: &'static str },

    #[error("Processing failed for {}: {reason}", path.display())]
    ProcessingFailed { path: PathBuf, reason: String },

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Failed to read globbed path: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
