//! Per-station daily demand signatures.
//!
//! A signature is a 24-element vector of trip-start counts by hour of day,
//! min-max normalized per station so each describes the shape of demand
//! rather than its volume. Weekday and weekend trips produce two independent
//! signature tables.

use crate::error::Result;
use crate::models::columns;
use polars::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const HOURS: usize = 24;

/// The weekday/weekend partition a signature table is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayClass {
    Weekday,
    Weekend,
}

impl DayClass {
    fn weekend_flag(self) -> i32 {
        match self {
            DayClass::Weekday => 0,
            DayClass::Weekend => 1,
        }
    }

    /// File name of the persisted signature table for this partition.
    pub fn file_name(self) -> &'static str {
        match self {
            DayClass::Weekday => "signatures_weekday.csv",
            DayClass::Weekend => "signatures_weekend.csv",
        }
    }
}

impl std::fmt::Display for DayClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayClass::Weekday => write!(f, "weekday"),
            DayClass::Weekend => write!(f, "weekend"),
        }
    }
}

/// Build the signature table for one day-class partition of enriched trips.
///
/// Output columns: `station_id`, then `h_00` .. `h_23`; one row per station
/// that has at least one trip in the partition, sorted by station id. Hours
/// with no trips count as zero, and a station whose 24 counts are all equal
/// normalizes to all zeros.
pub fn generate(trips: LazyFrame, class: DayClass) -> Result<DataFrame> {
    let counts = trips
        .filter(col("is_weekend").eq(lit(class.weekend_flag())))
        .with_columns([col(columns::STARTED_AT)
            .dt()
            .hour()
            .cast(DataType::Int64)
            .alias("hour")])
        .group_by([col(columns::START_STATION_ID), col("hour")])
        .agg([len().cast(DataType::Float64).alias("n_trips")])
        .collect()?;

    let stations = counts.column(columns::START_STATION_ID)?.f64()?;
    let hours = counts.column("hour")?.i64()?;
    let totals = counts.column("n_trips")?.f64()?;

    // Absent (station, hour) groups are implicit zeros in the profile.
    let mut profiles: HashMap<u64, [f64; HOURS]> = HashMap::new();
    for idx in 0..counts.height() {
        let (Some(station), Some(hour), Some(n)) =
            (stations.get(idx), hours.get(idx), totals.get(idx))
        else {
            continue;
        };
        profiles.entry(station.to_bits()).or_insert([0.0; HOURS])[hour as usize] = n;
    }

    let mut rows: Vec<(f64, [f64; HOURS])> = profiles
        .into_iter()
        .map(|(bits, profile)| (f64::from_bits(bits), profile))
        .collect();
    rows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    for (_, profile) in rows.iter_mut() {
        min_max_normalize(profile);
    }

    debug!(class = %class, stations = rows.len(), "built demand signatures");

    let ids: Vec<f64> = rows.iter().map(|(id, _)| *id).collect();
    let mut frame_columns = vec![Column::new("station_id".into(), ids)];
    for hour in 0..HOURS {
        let values: Vec<f64> = rows.iter().map(|(_, profile)| profile[hour]).collect();
        frame_columns.push(Column::new(format!("h_{hour:02}").into(), values));
    }

    Ok(DataFrame::new(frame_columns)?)
}

/// Scale one profile to [0, 1] in place. A flat profile carries no shape
/// information and becomes all zeros instead of dividing by zero.
fn min_max_normalize(profile: &mut [f64; HOURS]) {
    let min = profile.iter().copied().fold(f64::INFINITY, f64::min);
    let max = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if range == 0.0 {
        profile.fill(0.0);
    } else {
        for value in profile.iter_mut() {
            *value = (*value - min) / range;
        }
    }
}

/// Persist one signature table as CSV.
pub fn persist(mut frame: DataFrame, dir: &Path, class: DayClass) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(class.file_name());
    let mut file = std::fs::File::create(&path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut frame)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> i64 {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    /// (start timestamp, station id, is_weekend)
    fn enriched(rows: &[(&str, f64, i32)]) -> LazyFrame {
        let starts: Vec<i64> = rows.iter().map(|(t, _, _)| ts(t)).collect();
        let stations: Vec<f64> = rows.iter().map(|(_, id, _)| *id).collect();
        let weekends: Vec<i32> = rows.iter().map(|(_, _, w)| *w).collect();
        DataFrame::new(vec![
            Column::new("started_at".into(), starts),
            Column::new("start_station_id".into(), stations),
            Column::new("is_weekend".into(), weekends),
        ])
        .unwrap()
        .lazy()
        .with_columns([
            col("started_at").cast(DataType::Datetime(TimeUnit::Milliseconds, None))
        ])
    }

    fn hour_value(frame: &DataFrame, row: usize, hour: usize) -> f64 {
        frame
            .column(&format!("h_{hour:02}"))
            .unwrap()
            .f64()
            .unwrap()
            .get(row)
            .unwrap()
    }

    #[test]
    fn peak_hour_normalizes_to_one_and_empty_hours_to_zero() {
        let trips = enriched(&[
            ("2025-01-06 08:10:00", 100.01, 0),
            ("2025-01-06 08:40:00", 100.01, 0),
            ("2025-01-06 17:15:00", 100.01, 0),
        ]);

        let frame = generate(trips, DayClass::Weekday).unwrap();
        assert_eq!(frame.height(), 1);
        // Two trips at 08:xx is the peak, one at 17:xx is half of it
        assert_eq!(hour_value(&frame, 0, 8), 1.0);
        assert_eq!(hour_value(&frame, 0, 17), 0.5);
        assert_eq!(hour_value(&frame, 0, 3), 0.0);
    }

    #[test]
    fn single_active_hour_yields_exactly_one_peak() {
        let trips = enriched(&[
            ("2025-01-06 09:00:00", 100.01, 0),
            ("2025-01-06 09:30:00", 100.01, 0),
        ]);

        let frame = generate(trips, DayClass::Weekday).unwrap();
        assert_eq!(hour_value(&frame, 0, 9), 1.0);
        let row_sum: f64 = (0..24).map(|h| hour_value(&frame, 0, h)).sum();
        assert_eq!(row_sum, 1.0);
    }

    #[test]
    fn flat_profile_normalizes_to_all_zeros() {
        // One trip in every hour of the day: no shape, all zeros
        let rows: Vec<(String, f64, i32)> = (0..24)
            .map(|h| (format!("2025-01-06 {h:02}:30:00"), 100.01, 0))
            .collect();
        let borrowed: Vec<(&str, f64, i32)> =
            rows.iter().map(|(t, id, w)| (t.as_str(), *id, *w)).collect();

        let frame = generate(enriched(&borrowed), DayClass::Weekday).unwrap();
        for hour in 0..24 {
            assert_eq!(hour_value(&frame, 0, hour), 0.0);
        }
    }

    #[test]
    fn partitions_are_independent() {
        let trips = enriched(&[
            ("2025-01-06 08:00:00", 100.01, 0),
            ("2025-01-04 14:00:00", 200.02, 1),
        ]);

        let weekday = generate(trips.clone(), DayClass::Weekday).unwrap();
        let weekend = generate(trips, DayClass::Weekend).unwrap();

        assert_eq!(weekday.height(), 1);
        assert_eq!(weekend.height(), 1);
        assert_eq!(
            weekday.column("station_id").unwrap().f64().unwrap().get(0),
            Some(100.01)
        );
        assert_eq!(
            weekend.column("station_id").unwrap().f64().unwrap().get(0),
            Some(200.02)
        );
    }

    #[test]
    fn stations_are_sorted_and_columns_complete() {
        let trips = enriched(&[
            ("2025-01-06 08:00:00", 300.03, 0),
            ("2025-01-06 09:00:00", 100.01, 0),
            ("2025-01-06 10:00:00", 200.02, 0),
        ]);

        let frame = generate(trips, DayClass::Weekday).unwrap();
        assert_eq!(frame.width(), 25);

        let ids = frame.column("station_id").unwrap().f64().unwrap();
        assert_eq!(ids.get(0), Some(100.01));
        assert_eq!(ids.get(1), Some(200.02));
        assert_eq!(ids.get(2), Some(300.03));
    }

    #[test]
    fn empty_partition_yields_empty_table() {
        let trips = enriched(&[("2025-01-04 14:00:00", 100.01, 1)]);
        let frame = generate(trips, DayClass::Weekday).unwrap();
        assert_eq!(frame.height(), 0);
        assert_eq!(frame.width(), 25);
    }

    #[test]
    fn persist_writes_csv_with_hour_columns() {
        let dir = tempfile::TempDir::new().unwrap();
        let trips = enriched(&[("2025-01-06 08:00:00", 100.01, 0)]);
        let frame = generate(trips, DayClass::Weekday).unwrap();

        persist(frame, dir.path(), DayClass::Weekday).unwrap();
        let written =
            std::fs::read_to_string(dir.path().join("signatures_weekday.csv")).unwrap();
        assert!(written.starts_with("station_id,h_00,h_01"));
        assert!(written.contains("h_23"));
    }
}
