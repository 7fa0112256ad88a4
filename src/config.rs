//! Configuration for a pipeline run.
//!
//! A run is parameterized by a target year, a reference location and timezone
//! for the weather and solar context, the input/output path conventions, and
//! the trip validity bounds. Defaults reproduce the New York City reference
//! configuration.

use crate::error::{PipelineError, Result};
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported compression algorithms for parquet output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    None,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::None => ParquetCompression::Uncompressed,
        }
    }
}

/// Full configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Target year; weather and solar context cover Jan 1 - Dec 31
    pub year: i32,

    /// Reference latitude for the weather/solar services
    pub latitude: f64,

    /// Reference longitude for the weather/solar services
    pub longitude: f64,

    /// IANA timezone name; all timestamps are naive local time in this zone
    pub timezone: String,

    /// Directory containing the raw trip CSV files
    pub input_dir: PathBuf,

    /// Directory for per-source cleaned parquet files
    pub interim_dir: PathBuf,

    /// Directory for the registry, enriched months, and signature tables
    pub output_dir: PathBuf,

    /// Minimum valid trip duration in seconds (exclusive bound)
    pub min_duration_secs: f64,

    /// Maximum valid trip duration in seconds (exclusive bound)
    pub max_duration_secs: f64,

    /// Compression for parquet artifacts
    pub compression: CompressionAlgorithm,

    /// Maximum concurrent source files in the normalizer phase
    pub max_concurrent_files: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            year: 2025,
            latitude: 40.7143,
            longitude: -74.006,
            timezone: "America/New_York".to_string(),
            input_dir: PathBuf::from("data/raw/trips"),
            interim_dir: PathBuf::from("data/interim"),
            output_dir: PathBuf::from("data/processed"),
            min_duration_secs: 180.0,
            max_duration_secs: 10800.0,
            compression: CompressionAlgorithm::Snappy,
            max_concurrent_files: num_cpus::get(),
        }
    }
}

impl PipelineConfig {
    /// Glob pattern for discovering raw trip sources
    pub fn source_pattern(&self) -> String {
        self.input_dir.join("*.csv").to_string_lossy().into_owned()
    }

    /// Path of the persisted station registry artifact
    pub fn registry_path(&self) -> PathBuf {
        self.output_dir.join("stations.csv")
    }

    /// Directory holding the per-month enriched trip files
    pub fn enriched_dir(&self) -> PathBuf {
        self.output_dir.join("trips_enriched")
    }

    /// Directory holding the demand signature tables
    pub fn signatures_dir(&self) -> PathBuf {
        self.output_dir.join("clustering")
    }

    /// Validate ranges that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.min_duration_secs >= self.max_duration_secs {
            return Err(PipelineError::Configuration {
                message: format!(
                    "min duration {}s must be below max duration {}s",
                    self.min_duration_secs, self.max_duration_secs
                ),
            });
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(PipelineError::Configuration {
                message: format!("latitude {} out of range", self.latitude),
            });
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(PipelineError::Configuration {
                message: format!("longitude {} out of range", self.longitude),
            });
        }
        if self.max_concurrent_files == 0 {
            return Err(PipelineError::Configuration {
                message: "max_concurrent_files must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.year, 2025);
        assert_eq!(config.timezone, "America/New_York");
    }

    #[test]
    fn inverted_duration_bounds_rejected() {
        let config = PipelineConfig {
            min_duration_secs: 10800.0,
            max_duration_secs: 180.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_latitude_rejected() {
        let config = PipelineConfig {
            latitude: 91.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn source_pattern_targets_csv_files() {
        let config = PipelineConfig::default();
        assert!(config.source_pattern().ends_with("*.csv"));
    }
}
