//! Hourly weather context from the Open-Meteo archive service.
//!
//! One batch request covers the whole target year; the payload is parsed
//! into a frame with one row per hour, keyed by naive local timestamp.
//! Payload parsing is a pure function over the response body so it can be
//! tested without a network.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::Deserialize;
use tracing::info;

pub const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

const HOURLY_FIELDS: &str =
    "temperature_2m,precipitation,wind_speed_10m,relative_humidity_2m,cloud_cover";

const SERVICE: &str = "weather";

#[derive(Debug, Deserialize)]
struct HourlyResponse {
    hourly: HourlyBlock,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    precipitation: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
    relative_humidity_2m: Vec<Option<f64>>,
    cloud_cover: Vec<Option<f64>>,
}

/// Download the hourly weather history for the configured year and location.
///
/// A non-success status or malformed payload is fatal for the run: without
/// weather context no enrichment is possible.
pub async fn fetch_hourly_weather(
    client: &reqwest::Client,
    config: &PipelineConfig,
) -> Result<DataFrame> {
    info!(
        year = config.year,
        lat = config.latitude,
        lon = config.longitude,
        "downloading hourly weather history"
    );

    let params = [
        ("latitude", config.latitude.to_string()),
        ("longitude", config.longitude.to_string()),
        ("start_date", format!("{}-01-01", config.year)),
        ("end_date", format!("{}-12-31", config.year)),
        ("hourly", HOURLY_FIELDS.to_string()),
        ("timezone", config.timezone.clone()),
        ("timeformat", "iso8601".to_string()),
    ];

    let response = client
        .get(ARCHIVE_URL)
        .query(&params)
        .send()
        .await
        .map_err(|source| PipelineError::ServiceRequest {
            service: SERVICE,
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::ServiceStatus {
            service: SERVICE,
            url: response.url().to_string(),
            status,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|source| PipelineError::ServiceRequest {
            service: SERVICE,
            source,
        })?;

    let frame = parse_hourly_payload(&body)?;
    info!(rows = frame.height(), "weather history ready");
    Ok(frame)
}

/// Parse an Open-Meteo hourly archive payload into the weather frame.
pub fn parse_hourly_payload(body: &str) -> Result<DataFrame> {
    let payload: HourlyResponse =
        serde_json::from_str(body).map_err(|e| PipelineError::MalformedPayload {
            service: SERVICE,
            reason: e.to_string(),
        })?;
    let hourly = payload.hourly;

    let n = hourly.time.len();
    for (name, len) in [
        ("temperature_2m", hourly.temperature_2m.len()),
        ("precipitation", hourly.precipitation.len()),
        ("wind_speed_10m", hourly.wind_speed_10m.len()),
        ("relative_humidity_2m", hourly.relative_humidity_2m.len()),
        ("cloud_cover", hourly.cloud_cover.len()),
    ] {
        if len != n {
            return Err(PipelineError::MalformedPayload {
                service: SERVICE,
                reason: format!("field {name} has {len} entries, expected {n}"),
            });
        }
    }

    let times = hourly
        .time
        .iter()
        .map(|t| parse_local_timestamp(t))
        .collect::<Result<Vec<i64>>>()?;

    let frame = DataFrame::new(vec![
        Column::new("time".into(), times),
        Column::new("temperature_c".into(), hourly.temperature_2m),
        Column::new("precipitation_mm".into(), hourly.precipitation),
        Column::new("wind_speed_kmh".into(), hourly.wind_speed_10m),
        Column::new("relative_humidity_pct".into(), hourly.relative_humidity_2m),
        Column::new("cloud_cover_pct".into(), hourly.cloud_cover),
    ])?
    .lazy()
    .with_columns([
        col("time").cast(DataType::Datetime(TimeUnit::Milliseconds, None))
    ])
    .collect()?;

    Ok(frame)
}

/// Parse an iso8601 local timestamp (minute or second resolution) to epoch ms.
pub(crate) fn parse_local_timestamp(value: &str) -> Result<i64> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map(|dt| dt.and_utc().timestamp_millis())
        .map_err(|e| PipelineError::MalformedPayload {
            service: SERVICE,
            reason: format!("unparseable timestamp '{value}': {e}"),
        })
}
