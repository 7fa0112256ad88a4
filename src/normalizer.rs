//! Trip normalization: typing, validity filtering, and station imputation.
//!
//! Each raw source file passes through an ordered sequence of irreversible
//! filter/transform stages; a row that fails an earlier stage is never seen
//! by a later one. Every stage reports its rejection count so the per-source
//! [`CleaningStats`] are reproducible:
//!
//! 1. cast/parse fields (timestamps coerce to null on failure)
//! 2. drop rows with unparseable timestamps        -> `corrupted_dates`
//! 3. derive `trip_duration` = end - start seconds
//! 4. validity mask (duration window, same-station) -> `invalid_trips`
//! 5. impute missing station attributes from the registry (fills nulls only)
//! 6. drop rows whose station id is still null      -> `irrecoverable_ids`
//!
//! Every emitted row has non-null station ids on both ends and a duration
//! strictly inside the configured window.

use crate::config::{CompressionAlgorithm, PipelineConfig};
use crate::error::Result;
use crate::models::{columns, CleaningStats};
use crate::registry::{read_source_csv, StationRegistry};
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Applies the cleaning policy to one raw source file at a time.
#[derive(Debug, Clone)]
pub struct TripNormalizer {
    min_duration_secs: f64,
    max_duration_secs: f64,
}

impl TripNormalizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_duration_secs: config.min_duration_secs,
            max_duration_secs: config.max_duration_secs,
        }
    }

    /// Run the full stage sequence over one source file.
    pub fn normalize_file(
        &self,
        path: &Path,
        registry: &StationRegistry,
    ) -> Result<(DataFrame, CleaningStats)> {
        let raw = read_source_csv(path)?;
        let mut stats = CleaningStats {
            source: path.to_path_buf(),
            initial_rows: raw.height(),
            ..Default::default()
        };

        let typed = cast_fields(raw)?;

        let dated = drop_corrupted_dates(typed)?;
        stats.corrupted_dates = stats.initial_rows - dated.height();

        let with_duration = derive_duration(dated)?;

        let valid = self.apply_validity_mask(with_duration)?;
        stats.invalid_trips =
            stats.initial_rows - stats.corrupted_dates - valid.height();

        let imputed = impute_stations(valid, registry)?;

        let clean = drop_irrecoverable_ids(&imputed)?;
        stats.irrecoverable_ids = imputed.height() - clean.height();
        stats.final_rows = clean.height();

        debug!(
            source = %path.display(),
            initial = stats.initial_rows,
            corrupted_dates = stats.corrupted_dates,
            invalid = stats.invalid_trips,
            irrecoverable = stats.irrecoverable_ids,
            emitted = stats.final_rows,
            "normalized source"
        );
        Ok((clean, stats))
    }

    /// Keep rows strictly inside the duration window whose endpoints differ.
    ///
    /// Null station ids must not trip the same-station check here; they flow
    /// through to imputation and, failing that, the irrecoverable stage.
    fn apply_validity_mask(&self, df: DataFrame) -> Result<DataFrame> {
        let same_station = col(columns::START_STATION_ID)
            .eq(col(columns::END_STATION_ID))
            .fill_null(lit(false));

        let kept = df
            .lazy()
            .filter(
                col(columns::TRIP_DURATION)
                    .gt(lit(self.min_duration_secs))
                    .and(col(columns::TRIP_DURATION).lt(lit(self.max_duration_secs)))
                    .and(same_station.not()),
            )
            .collect()?;
        Ok(kept)
    }
}

/// Cast the all-string raw frame to the typed trip schema.
fn cast_fields(raw: DataFrame) -> Result<DataFrame> {
    let strptime = StrptimeOptions {
        format: Some(TIMESTAMP_FORMAT.into()),
        strict: false,
        // Feeds carry fractional seconds on and off; a non-exact match
        // parses the leading seconds and ignores the remainder.
        exact: false,
        cache: true,
    };

    let typed = raw
        .lazy()
        .select([
            col(columns::RIDE_ID),
            col(columns::RIDEABLE_TYPE)
                .cast(DataType::Categorical(None, CategoricalOrdering::Physical)),
            col(columns::MEMBER_CASUAL)
                .cast(DataType::Categorical(None, CategoricalOrdering::Physical)),
            col(columns::STARTED_AT).str().to_datetime(
                Some(TimeUnit::Milliseconds),
                None,
                strptime.clone(),
                lit("raise"),
            ),
            col(columns::ENDED_AT).str().to_datetime(
                Some(TimeUnit::Milliseconds),
                None,
                strptime,
                lit("raise"),
            ),
            col(columns::START_STATION_ID).cast(DataType::Float64),
            col(columns::START_STATION_NAME),
            col(columns::START_LAT).cast(DataType::Float64),
            col(columns::START_LNG).cast(DataType::Float64),
            col(columns::END_STATION_ID).cast(DataType::Float64),
            col(columns::END_STATION_NAME),
            col(columns::END_LAT).cast(DataType::Float64),
            col(columns::END_LNG).cast(DataType::Float64),
        ])
        .collect()?;
    Ok(typed)
}

fn drop_corrupted_dates(df: DataFrame) -> Result<DataFrame> {
    let dated = df
        .lazy()
        .filter(
            col(columns::STARTED_AT)
                .is_not_null()
                .and(col(columns::ENDED_AT).is_not_null()),
        )
        .collect()?;
    Ok(dated)
}

fn derive_duration(df: DataFrame) -> Result<DataFrame> {
    let with_duration = df
        .lazy()
        .with_columns([((col(columns::ENDED_AT).cast(DataType::Int64)
            - col(columns::STARTED_AT).cast(DataType::Int64))
        .cast(DataType::Float64)
            / lit(1000.0))
        .alias(columns::TRIP_DURATION)])
        .collect()?;
    Ok(with_duration)
}

/// Fill missing station names and coordinates from the registry by id.
///
/// Imputation never overwrites a present value; it only fills nulls, so a
/// row that is already complete comes out byte-identical.
fn impute_stations(df: DataFrame, registry: &StationRegistry) -> Result<DataFrame> {
    let mut frame = df;
    for end in ["start", "end"] {
        let lookup = registry.lookup_frame(end)?;
        let id_col = format!("{end}_station_id");
        let name_col = format!("{end}_station_name");
        let lat_col = format!("{end}_lat");
        let lng_col = format!("{end}_lng");

        frame = frame
            .lazy()
            .join(
                lookup.lazy(),
                [col(id_col.as_str())],
                [col(id_col.as_str())],
                JoinArgs::new(JoinType::Left),
            )
            .with_columns([
                col(name_col.as_str())
                    .fill_null(col(format!("__registry_{end}_name").as_str())),
                col(lat_col.as_str())
                    .fill_null(col(format!("__registry_{end}_lat").as_str())),
                col(lng_col.as_str())
                    .fill_null(col(format!("__registry_{end}_lng").as_str())),
            ])
            .select([col("*").exclude([
                format!("__registry_{end}_name"),
                format!("__registry_{end}_lat"),
                format!("__registry_{end}_lng"),
            ])])
            .collect()?;
    }
    Ok(frame)
}

fn drop_irrecoverable_ids(df: &DataFrame) -> Result<DataFrame> {
    let clean = df
        .clone()
        .lazy()
        .filter(
            col(columns::START_STATION_ID)
                .is_not_null()
                .and(col(columns::END_STATION_ID).is_not_null()),
        )
        .collect()?;
    Ok(clean)
}

/// Write one cleaned frame as a parquet artifact.
pub fn write_parquet(
    df: &mut DataFrame,
    path: &Path,
    compression: CompressionAlgorithm,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    ParquetWriter::new(file)
        .with_compression(compression.to_polars_compression())
        .finish(df)?;
    Ok(())
}
