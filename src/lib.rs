//! Bikeshare Processor Library
//!
//! A Rust library for turning monthly bikeshare trip CSV exports into clean,
//! context-enriched Parquet datasets and per-station demand profiles.
//!
//! This library provides tools for:
//! - Building a canonical station registry with deterministic deduplication
//! - Normalizing trips with staged validity filtering and station imputation
//! - Joining hourly weather, day/night, and weekend context onto each trip
//! - Generating normalized 24-hour demand signatures for station clustering
//! - Per-file failure recovery and reproducible rejection accounting

pub mod config;
pub mod enrichment;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod registry;
pub mod signatures;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use config::{CompressionAlgorithm, PipelineConfig};
pub use error::{PipelineError, Result};
pub use models::{CleaningStats, ProcessingStats, Station};
pub use pipeline::Pipeline;
