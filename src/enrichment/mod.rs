//! Temporal enrichment: weather, day/night, and weekend context per trip.
//!
//! Works one logical month at a time. Both context joins are many-to-one
//! left joins that must never drop or duplicate a trip; uniqueness of the
//! right-hand keys (hour, date) is an invariant of the weather/solar frames
//! and is validated when the joiner is constructed, not papered over in the
//! join logic.

pub mod solar;
pub mod weather;

use crate::error::{PipelineError, Result};
use crate::models::columns;
use polars::prelude::*;
use std::path::PathBuf;
use tracing::debug;

/// Station attribute columns that are redundant once imputation has run;
/// they are dropped before the month is persisted.
const REDUNDANT_COLUMNS: [&str; 6] = [
    columns::START_STATION_NAME,
    columns::START_LAT,
    columns::START_LNG,
    columns::END_STATION_NAME,
    columns::END_LAT,
    columns::END_LNG,
];

/// Joins cleaned trips against the hourly weather and daily solar tables.
///
/// Built once per run and shared read-only across every month.
#[derive(Debug, Clone)]
pub struct EnrichmentJoiner {
    weather: DataFrame,
    solar: DataFrame,
}

impl EnrichmentJoiner {
    /// Validate the join-key uniqueness invariants and build the joiner.
    pub fn new(weather: DataFrame, solar: DataFrame) -> Result<Self> {
        if weather.column("time")?.n_unique()? != weather.height() {
            return Err(PipelineError::DuplicateJoinKey { table: "weather" });
        }
        if solar.column("date")?.n_unique()? != solar.height() {
            return Err(PipelineError::DuplicateJoinKey { table: "solar" });
        }
        Ok(Self { weather, solar })
    }

    /// Enrich one month of cleaned trips.
    ///
    /// Weather join: the start timestamp rounded to the nearest hour (an
    /// exact half-hour rounds up) looked up against the hourly table; a miss
    /// leaves the measures null. Day/night join: `is_day = 1` iff the start
    /// lies within [sunrise, sunset] of its calendar date, inclusive at both
    /// ends; a missing solar date yields 0. Neither join drops a trip.
    pub fn enrich(&self, trips: DataFrame) -> Result<DataFrame> {
        let mut frame = trips;
        for column in REDUNDANT_COLUMNS {
            if frame.column(column).is_ok() {
                frame = frame.drop(column)?;
            }
        }

        // +30 minutes then truncate-to-hour is round half up, with no
        // dependence on a library tie-breaking rule.
        let nearest_hour = (col(columns::STARTED_AT).cast(DataType::Int64)
            + lit(1_800_000i64))
        .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
        .dt()
        .truncate(lit("1h"))
        .alias("temp_time");

        let enriched = frame
            .lazy()
            .with_columns([
                nearest_hour,
                col(columns::STARTED_AT)
                    .cast(DataType::Date)
                    .alias("temp_date"),
            ])
            .join(
                self.weather.clone().lazy(),
                [col("temp_time")],
                [col("time")],
                JoinArgs::new(JoinType::Left),
            )
            .join(
                self.solar.clone().lazy(),
                [col("temp_date")],
                [col("date")],
                JoinArgs::new(JoinType::Left),
            )
            .with_columns([
                col(columns::STARTED_AT)
                    .gt_eq(col("sunrise"))
                    .and(col(columns::STARTED_AT).lt_eq(col("sunset")))
                    // Missing solar dates compare to null; left-join policy
                    // keeps the trip and classifies it as night.
                    .fill_null(lit(false))
                    .cast(DataType::Int32)
                    .alias("is_day"),
                // chrono-style weekday: Monday = 1 .. Sunday = 7
                col(columns::STARTED_AT)
                    .dt()
                    .weekday()
                    .gt_eq(lit(6))
                    .cast(DataType::Int32)
                    .alias("is_weekend"),
            ])
            .select([col("*").exclude(["temp_time", "temp_date", "sunrise", "sunset"])])
            .collect()?;

        Ok(enriched)
    }
}

/// Merge the interim parquet files of one month and enrich the result.
pub fn enrich_month(joiner: &EnrichmentJoiner, files: &[PathBuf]) -> Result<DataFrame> {
    debug!(files = files.len(), "merging month sub-files");

    let frames = files
        .iter()
        .map(|path| LazyFrame::scan_parquet(path, Default::default()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let merged = concat(
        frames,
        UnionArgs {
            diagonal: true,
            ..Default::default()
        },
    )?
    .collect()?;

    joiner.enrich(merged)
}
