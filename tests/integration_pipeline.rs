//! End-to-end flow over synthetic source data: normalize, enrich with
//! fixture weather/solar context, then generate demand signatures. No
//! network access; the context frames are built in-process.

use bikeshare_processor::enrichment::{enrich_month, EnrichmentJoiner};
use bikeshare_processor::models::month_key;
use bikeshare_processor::normalizer::write_parquet;
use bikeshare_processor::signatures::{self, DayClass};
use bikeshare_processor::{Pipeline, PipelineConfig};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

const HEADER: &str = "ride_id,rideable_type,started_at,ended_at,start_station_name,start_station_id,end_station_name,end_station_id,start_lat,start_lng,end_lat,end_lng,member_casual";

fn write_source(dir: &std::path::Path, name: &str, rows: &[&str]) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
}

fn ts(s: &str) -> i64 {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .unwrap()
        .and_utc()
        .timestamp_millis()
}

fn day(s: &str) -> i32 {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
    (date - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()).num_days() as i32
}

fn weather_fixture(hours: &[&str]) -> DataFrame {
    let times: Vec<i64> = hours.iter().map(|h| ts(h)).collect();
    let temps: Vec<f64> = (0..hours.len()).map(|i| 5.0 + i as f64).collect();
    DataFrame::new(vec![
        Column::new("time".into(), times),
        Column::new("temperature_c".into(), temps),
    ])
    .unwrap()
    .lazy()
    .with_columns([col("time").cast(DataType::Datetime(TimeUnit::Milliseconds, None))])
    .collect()
    .unwrap()
}

fn solar_fixture(dates: &[&str]) -> DataFrame {
    let days: Vec<i32> = dates.iter().map(|d| day(d)).collect();
    let sunrises: Vec<i64> = dates
        .iter()
        .map(|d| ts(&format!("{d} 07:20:00")))
        .collect();
    let sunsets: Vec<i64> = dates
        .iter()
        .map(|d| ts(&format!("{d} 16:40:00")))
        .collect();
    DataFrame::new(vec![
        Column::new("date".into(), days),
        Column::new("sunrise".into(), sunrises),
        Column::new("sunset".into(), sunsets),
    ])
    .unwrap()
    .lazy()
    .with_columns([
        col("date").cast(DataType::Date),
        col("sunrise").cast(DataType::Datetime(TimeUnit::Milliseconds, None)),
        col("sunset").cast(DataType::Datetime(TimeUnit::Milliseconds, None)),
    ])
    .collect()
    .unwrap()
}

#[tokio::test]
async fn full_pipeline_flow() {
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("raw");
    std::fs::create_dir_all(&raw).unwrap();

    // Two logical months, the first split over two sub-files. One trip per
    // file is valid; the first file also carries a too-short trip.
    write_source(
        &raw,
        "202501-citibike-tripdata_1.csv",
        &[
            // Saturday, daytime, 400s: valid
            "a1,classic_bike,2025-01-04 10:00:00,2025-01-04 10:06:40,Alpha St,100.01,Beta Ave,200.02,40.71,-74.00,40.72,-74.01,member",
            // 60s: rejected by the validity mask
            "a2,classic_bike,2025-01-04 11:00:00,2025-01-04 11:01:00,Alpha St,100.01,Beta Ave,200.02,40.71,-74.00,40.72,-74.01,casual",
        ],
    );
    write_source(
        &raw,
        "202501-citibike-tripdata_2.csv",
        &[
            // Monday commute, valid
            "b1,electric_bike,2025-01-06 08:00:00,2025-01-06 08:10:00,Alpha St,100.01,Beta Ave,200.02,40.71,-74.00,40.72,-74.01,member",
        ],
    );
    write_source(
        &raw,
        "202502-citibike-tripdata_1.csv",
        &[
            // Monday in February, valid
            "c1,classic_bike,2025-02-03 09:00:00,2025-02-03 09:12:00,Gamma Blvd,300.03,Beta Ave,200.02,40.73,-74.02,40.72,-74.01,casual",
        ],
    );

    let config = PipelineConfig {
        input_dir: raw,
        interim_dir: dir.path().join("interim"),
        output_dir: dir.path().join("processed"),
        ..Default::default()
    };
    let pipeline = Pipeline::new(config.clone()).unwrap();

    // Phase 1: registry + normalization
    let stats = pipeline.run_normalize().await.unwrap();
    assert_eq!(stats.files_processed, 3);
    assert_eq!(stats.files_failed, 0);
    assert_eq!(stats.total_rows, 3);

    let registry_csv = std::fs::read_to_string(config.registry_path()).unwrap();
    assert!(registry_csv.contains("Alpha St"));
    assert!(registry_csv.contains("Gamma Blvd"));

    // Phase 2: enrichment with fixture context, grouped by logical month
    let weather = weather_fixture(&[
        "2025-01-04 10:00:00",
        "2025-01-06 08:00:00",
        "2025-02-03 09:00:00",
    ]);
    let solar = solar_fixture(&["2025-01-04", "2025-01-06", "2025-02-03"]);
    let joiner = EnrichmentJoiner::new(weather, solar).unwrap();

    let mut months: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for entry in std::fs::read_dir(&config.interim_dir).unwrap() {
        let path = entry.unwrap().path();
        months.entry(month_key(&path)).or_default().push(path);
    }
    for files in months.values_mut() {
        files.sort();
    }
    assert_eq!(months.len(), 2);

    let enriched_dir = config.enriched_dir();
    std::fs::create_dir_all(&enriched_dir).unwrap();
    for (month, files) in &months {
        let mut frame = enrich_month(&joiner, files).unwrap();

        // Every trip keeps its row and gets non-null context flags
        let expected = if month == "202501" { 2 } else { 1 };
        assert_eq!(frame.height(), expected);
        assert_eq!(frame.column("temperature_c").unwrap().null_count(), 0);
        assert_eq!(frame.column("is_day").unwrap().null_count(), 0);
        assert_eq!(frame.column("is_weekend").unwrap().null_count(), 0);
        // All fixture trips start between sunrise and sunset
        let day_flags = frame.column("is_day").unwrap().i32().unwrap();
        assert!(day_flags.into_iter().all(|v| v == Some(1)));

        let out = enriched_dir.join(format!("{month}-tripdata.parquet"));
        write_parquet(&mut frame, &out, config.compression).unwrap();
    }

    // Phase 3: demand signatures over all enriched months
    let frames: Vec<LazyFrame> = std::fs::read_dir(&enriched_dir)
        .unwrap()
        .map(|entry| LazyFrame::scan_parquet(entry.unwrap().path(), Default::default()).unwrap())
        .collect();
    let trips = concat(
        frames,
        UnionArgs {
            diagonal: true,
            ..Default::default()
        },
    )
    .unwrap();

    let weekday = signatures::generate(trips.clone(), DayClass::Weekday).unwrap();
    let weekend = signatures::generate(trips, DayClass::Weekend).unwrap();

    // Weekday: Alpha St at 08h and Gamma Blvd at 09h; weekend: Alpha St at 10h
    assert_eq!(weekday.height(), 2);
    assert_eq!(weekend.height(), 1);

    let ids = weekday.column("station_id").unwrap().f64().unwrap();
    assert_eq!(ids.get(0), Some(100.01));
    assert_eq!(ids.get(1), Some(300.03));
    let h08 = weekday.column("h_08").unwrap().f64().unwrap();
    assert_eq!(h08.get(0), Some(1.0));
    let h10 = weekend.column("h_10").unwrap().f64().unwrap();
    assert_eq!(h10.get(0), Some(1.0));
}

#[tokio::test]
async fn structurally_broken_source_aborts_the_registry_phase() {
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("raw");
    std::fs::create_dir_all(&raw).unwrap();

    write_source(
        &raw,
        "202501-citibike-tripdata_1.csv",
        &[
            "a1,classic_bike,2025-01-04 10:00:00,2025-01-04 10:06:40,Alpha St,100.01,Beta Ave,200.02,40.71,-74.00,40.72,-74.01,member",
        ],
    );
    // A file without the station columns cannot contribute to the registry;
    // a silently partial registry would change imputation results for every
    // other source, so this aborts the phase instead of being skipped.
    let mut bogus = std::fs::File::create(raw.join("202502-broken.csv")).unwrap();
    writeln!(bogus, "just,some,columns").unwrap();
    writeln!(bogus, "1,2,3").unwrap();

    let config = PipelineConfig {
        input_dir: raw,
        interim_dir: dir.path().join("interim"),
        output_dir: dir.path().join("processed"),
        ..Default::default()
    };
    let pipeline = Pipeline::new(config.clone()).unwrap();

    assert!(pipeline.run_normalize().await.is_err());
    assert!(!config.registry_path().exists());
}
