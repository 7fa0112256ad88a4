//! Command-line argument definitions for the bikeshare processor.
//!
//! The CLI mirrors the pipeline phases: each phase is a subcommand, plus
//! `run` for the full chain. All subcommands share the same configuration
//! surface so a phase can be re-run later against the same directories.

use crate::config::{CompressionAlgorithm, PipelineConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the bikeshare trip data processor
///
/// Builds clean, weather-enriched trip datasets and per-station demand
/// signatures from monthly bikeshare system data exports.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bikeshare-processor",
    version,
    about = "Process bikeshare trip CSV exports into enriched Parquet datasets",
    long_about = "Processes monthly bikeshare trip CSV exports through three phases: \
                  normalize (station registry, validity filtering, imputation), \
                  enrich (hourly weather, day/night, and weekend context), and \
                  signatures (per-station 24-hour demand profiles for clustering)."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands, one per pipeline phase
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Build the station registry and normalize raw trip files
    Normalize(PipelineArgs),
    /// Join weather, day/night, and weekend context onto cleaned trips
    Enrich(PipelineArgs),
    /// Generate weekday/weekend demand signature tables
    Signatures(PipelineArgs),
    /// Run all three phases back to back
    Run(PipelineArgs),
}

/// Shared configuration arguments for every phase
#[derive(Debug, Clone, Parser)]
pub struct PipelineArgs {
    /// Directory containing the raw monthly trip CSV files
    ///
    /// Files are expected to follow the `YYYYMM-...csv` naming convention;
    /// all files sharing a YYYYMM prefix are treated as one logical month.
    #[arg(
        short = 'i',
        long = "input",
        value_name = "PATH",
        help = "Directory containing raw trip CSV files"
    )]
    pub input_dir: Option<PathBuf>,

    /// Directory for per-source cleaned Parquet files
    #[arg(
        long = "interim",
        value_name = "PATH",
        help = "Directory for intermediate cleaned Parquet files"
    )]
    pub interim_dir: Option<PathBuf>,

    /// Directory for final artifacts
    ///
    /// Receives the station registry, the per-month enriched trip files,
    /// and the demand signature tables.
    #[arg(
        short = 'o',
        long = "output",
        value_name = "PATH",
        help = "Directory for final output artifacts"
    )]
    pub output_dir: Option<PathBuf>,

    /// Target year for the weather and solar context
    #[arg(
        short = 'y',
        long = "year",
        value_name = "YEAR",
        help = "Target year covered by the weather and solar context"
    )]
    pub year: Option<i32>,

    /// Reference latitude for the weather and solar services
    #[arg(long = "lat", value_name = "DEG", help = "Reference latitude")]
    pub latitude: Option<f64>,

    /// Reference longitude for the weather and solar services
    #[arg(long = "lon", value_name = "DEG", help = "Reference longitude")]
    pub longitude: Option<f64>,

    /// IANA timezone of the system's local timestamps
    #[arg(
        long = "timezone",
        value_name = "TZ",
        help = "IANA timezone name, e.g. America/New_York"
    )]
    pub timezone: Option<String>,

    /// Minimum valid trip duration in seconds (exclusive)
    #[arg(
        long = "min-duration",
        value_name = "SECS",
        help = "Minimum valid trip duration in seconds (exclusive bound)"
    )]
    pub min_duration_secs: Option<f64>,

    /// Maximum valid trip duration in seconds (exclusive)
    #[arg(
        long = "max-duration",
        value_name = "SECS",
        help = "Maximum valid trip duration in seconds (exclusive bound)"
    )]
    pub max_duration_secs: Option<f64>,

    /// Compression for Parquet artifacts
    #[arg(
        long = "compression",
        value_enum,
        default_value = "snappy",
        help = "Compression algorithm for Parquet output"
    )]
    pub compression: CompressionAlgorithm,

    /// Number of source files processed concurrently
    #[arg(
        short = 'j',
        long = "workers",
        value_name = "COUNT",
        help = "Maximum concurrent source files (defaults to CPU count)"
    )]
    pub workers: Option<usize>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Suppress output (quiet mode)
    ///
    /// Only show errors. Overrides verbose settings.
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl PipelineArgs {
    /// Resolve the final configuration, overlaying explicit flags on defaults.
    pub fn to_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            year: self.year.unwrap_or(defaults.year),
            latitude: self.latitude.unwrap_or(defaults.latitude),
            longitude: self.longitude.unwrap_or(defaults.longitude),
            timezone: self.timezone.clone().unwrap_or(defaults.timezone),
            input_dir: self.input_dir.clone().unwrap_or(defaults.input_dir),
            interim_dir: self.interim_dir.clone().unwrap_or(defaults.interim_dir),
            output_dir: self.output_dir.clone().unwrap_or(defaults.output_dir),
            min_duration_secs: self.min_duration_secs.unwrap_or(defaults.min_duration_secs),
            max_duration_secs: self.max_duration_secs.unwrap_or(defaults.max_duration_secs),
            compression: self.compression,
            max_concurrent_files: self.workers.unwrap_or(defaults.max_concurrent_files),
        }
    }

    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }
}
