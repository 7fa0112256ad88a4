//! Core data structures shared across pipeline phases.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Canonical column names of the raw trip schema.
pub mod columns {
    pub const RIDE_ID: &str = "ride_id";
    pub const RIDEABLE_TYPE: &str = "rideable_type";
    pub const MEMBER_CASUAL: &str = "member_casual";
    pub const STARTED_AT: &str = "started_at";
    pub const ENDED_AT: &str = "ended_at";
    pub const START_STATION_ID: &str = "start_station_id";
    pub const START_STATION_NAME: &str = "start_station_name";
    pub const START_LAT: &str = "start_lat";
    pub const START_LNG: &str = "start_lng";
    pub const END_STATION_ID: &str = "end_station_id";
    pub const END_STATION_NAME: &str = "end_station_name";
    pub const END_LAT: &str = "end_lat";
    pub const END_LNG: &str = "end_lng";
    pub const TRIP_DURATION: &str = "trip_duration";
}

/// One canonical station record resolved by the registry.
///
/// Station ids are numeric but not necessarily integral in real feeds
/// (e.g. `6432.08`), so the id is carried as `f64`. Name and coordinates
/// may be missing; a registry entry with nulls is legal and simply cannot
/// contribute to imputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: f64,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Per-source rejection breakdown produced by the trip normalizer.
///
/// Every raw row ends up in exactly one bucket: one of the three rejection
/// counts or `final_rows`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningStats {
    /// Source file the stats describe
    pub source: PathBuf,
    /// Rows read from the source
    pub initial_rows: usize,
    /// Rows dropped because a timestamp failed to parse
    pub corrupted_dates: usize,
    /// Rows dropped by the duration/same-station validity mask
    pub invalid_trips: usize,
    /// Rows whose station id was unresolvable even after imputation
    pub irrecoverable_ids: usize,
    /// Rows written to the cleaned artifact
    pub final_rows: usize,
}

impl CleaningStats {
    /// Total rows rejected across all stages
    pub fn rejected_rows(&self) -> usize {
        self.corrupted_dates + self.invalid_trips + self.irrecoverable_ids
    }
}

/// Aggregate statistics for a phase of the run.
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub total_rows: usize,
    pub processing_time_ms: u128,
}

/// Extract the month key (leading `YYYYMM` digits) from a source file name.
///
/// Trip files are named like `202501-citibike-tripdata_3.csv`; all files
/// sharing a prefix belong to the same logical month. Files without a
/// recognizable prefix fall back to their full stem so they still form
/// their own processing unit rather than being silently skipped.
pub fn month_key(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Compiled per call; file counts are small enough that this never shows up.
    let re = Regex::new(r"^(\d{6})").expect("static regex");
    match re.captures(&stem) {
        Some(caps) => caps[1].to_string(),
        None => stem,
    }
}
