//! Station registry construction.
//!
//! Scans every raw trip source once, projecting both the trip-start and
//! trip-end station columns, and resolves exactly one canonical record per
//! station id. Conflicts are settled by an explicit, reproducible tie-break:
//! within a source, records are sorted by station name (nulls last) and the
//! first one wins; across sources, the first occurrence in accumulation
//! order wins. The registry is therefore deterministic whenever the source
//! file list order is deterministic, which is why the pipeline sorts
//! discovered paths before scanning.
//!
//! Modeled as an explicit two-stage reduction (per-source scan -> barrier ->
//! global merge) so each tie-break rule is testable in isolation.

use crate::error::Result;
use crate::models::{columns, Station};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Read a raw trip CSV with every column as a string.
///
/// All casting happens explicitly downstream, so parse failures surface as
/// nulls in exactly one place instead of being scattered across schema
/// inference. Shared by the registry scan and the trip normalizer.
pub(crate) fn read_source_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Extract the per-source deduplicated station set from one raw trip file.
///
/// Both station projections (trip start, trip end) are stacked under the
/// canonical column names, ids that fail numeric coercion are discarded
/// (they can never be joined later), and one record per id survives under
/// the sort-by-name-first-wins rule.
pub fn scan_source(path: &Path) -> Result<DataFrame> {
    let raw = read_source_csv(path)?;

    let start = raw.clone().lazy().select([
        col(columns::START_STATION_ID).alias("station_id"),
        col(columns::START_STATION_NAME).alias("station_name"),
        col(columns::START_LAT).alias("lat"),
        col(columns::START_LNG).alias("lng"),
    ]);
    let end = raw.lazy().select([
        col(columns::END_STATION_ID).alias("station_id"),
        col(columns::END_STATION_NAME).alias("station_name"),
        col(columns::END_LAT).alias("lat"),
        col(columns::END_LNG).alias("lng"),
    ]);

    let stations = concat([start, end], UnionArgs::default())?
        .with_columns([
            // Non-strict casts: unparseable ids/coords become null
            col("station_id").cast(DataType::Float64),
            col("lat").cast(DataType::Float64),
            col("lng").cast(DataType::Float64),
        ])
        .drop_nulls(Some(vec![col("station_id")]))
        // Nulls last so a named observation always beats an unnamed one
        .sort(
            ["station_name"],
            SortMultipleOptions::default().with_nulls_last(true),
        )
        .unique_stable(Some(vec!["station_id".into()]), UniqueKeepStrategy::First)
        .collect()?;

    debug!(
        source = %path.display(),
        stations = stations.height(),
        "scanned station projections"
    );
    Ok(stations)
}

/// Accumulates per-source station sets for the global merge.
///
/// The merge is the one aggregation barrier of the pipeline: every source
/// scan must have completed before it runs.
#[derive(Debug, Default)]
pub struct StationRegistryBuilder {
    frames: Vec<DataFrame>,
}

impl StationRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one per-source station set, preserving accumulation order.
    pub fn push(&mut self, frame: DataFrame) {
        self.frames.push(frame);
    }

    /// Global deduplication pass: first occurrence in accumulation order wins.
    pub fn merge(self) -> Result<StationRegistry> {
        let lazy_frames: Vec<LazyFrame> = self.frames.into_iter().map(|df| df.lazy()).collect();

        let merged = if lazy_frames.is_empty() {
            DataFrame::new(vec![
                Column::new_empty("station_id".into(), &DataType::Float64),
                Column::new_empty("station_name".into(), &DataType::String),
                Column::new_empty("lat".into(), &DataType::Float64),
                Column::new_empty("lng".into(), &DataType::Float64),
            ])?
        } else {
            concat(lazy_frames, UnionArgs::default())?
                .unique_stable(Some(vec!["station_id".into()]), UniqueKeepStrategy::First)
                .sort(["station_id"], SortMultipleOptions::default())
                .collect()?
        };

        StationRegistry::from_frame(merged)
    }
}

/// Canonical mapping from station id to its resolved name and coordinates.
///
/// Built once per run, immutable and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct StationRegistry {
    frame: DataFrame,
    // Ids are parsed once from text, so keying the index on the raw f64
    // bit pattern is sound.
    index: HashMap<u64, Station>,
}

impl StationRegistry {
    fn from_frame(frame: DataFrame) -> Result<Self> {
        let ids = frame.column("station_id")?.f64()?;
        let names = frame.column("station_name")?.str()?;
        let lats = frame.column("lat")?.f64()?;
        let lngs = frame.column("lng")?.f64()?;

        let mut index = HashMap::with_capacity(frame.height());
        for i in 0..frame.height() {
            if let Some(id) = ids.get(i) {
                index.insert(
                    id.to_bits(),
                    Station {
                        id,
                        name: names.get(i).map(str::to_string),
                        lat: lats.get(i),
                        lng: lngs.get(i),
                    },
                );
            }
        }

        Ok(Self { frame, index })
    }

    /// The canonical station table (`station_id`, `station_name`, `lat`, `lng`).
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Look up the canonical record for a station id.
    pub fn get(&self, id: f64) -> Option<&Station> {
        self.index.get(&id.to_bits())
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Registry columns renamed for joining against one end of a trip,
    /// e.g. `start_station_id` / `__registry_start_name` / ...
    pub(crate) fn lookup_frame(&self, end: &str) -> Result<DataFrame> {
        let renamed = self
            .frame
            .clone()
            .lazy()
            .select([
                col("station_id").alias(format!("{end}_station_id").as_str()),
                col("station_name").alias(format!("__registry_{end}_name").as_str()),
                col("lat").alias(format!("__registry_{end}_lat").as_str()),
                col("lng").alias(format!("__registry_{end}_lng").as_str()),
            ])
            .collect()?;
        Ok(renamed)
    }

    /// Persist the registry as a standalone CSV artifact.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut self.frame.clone())?;
        Ok(())
    }
}
