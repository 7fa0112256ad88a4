//! Daily sunrise/sunset context from the Open-Meteo archive service.
//!
//! One batch request yields a row per calendar day of the target year with
//! sunrise and sunset as naive local timestamps, the same timezone the trip
//! data uses. Parsing is pure and offline-testable, like the weather client.

use crate::config::PipelineConfig;
use crate::enrichment::weather::{parse_local_timestamp, ARCHIVE_URL};
use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::Deserialize;
use tracing::info;

const SERVICE: &str = "solar";

#[derive(Debug, Deserialize)]
struct DailyResponse {
    daily: DailyBlock,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    time: Vec<String>,
    sunrise: Vec<String>,
    sunset: Vec<String>,
}

/// Download the solar calendar (sunrise/sunset per day) for the target year.
pub async fn fetch_solar_calendar(
    client: &reqwest::Client,
    config: &PipelineConfig,
) -> Result<DataFrame> {
    info!(year = config.year, "downloading solar calendar");

    let params = [
        ("latitude", config.latitude.to_string()),
        ("longitude", config.longitude.to_string()),
        ("start_date", format!("{}-01-01", config.year)),
        ("end_date", format!("{}-12-31", config.year)),
        ("daily", "sunrise,sunset".to_string()),
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

    let frame = parse_daily_payload(&body)?;
    info!(days = frame.height(), "solar calendar ready");
    Ok(frame)
}

/// Parse an Open-Meteo daily payload into the solar frame
/// (`date`, `sunrise`, `sunset`).
pub fn parse_daily_payload(body: &str) -> Result<DataFrame> {
    let payload: DailyResponse =
        serde_json::from_str(body).map_err(|e| PipelineError::MalformedPayload {
            service: SERVICE,
            reason: e.to_string(),
        })?;
    let daily = payload.daily;

    let n = daily.time.len();
    if daily.sunrise.len() != n || daily.sunset.len() != n {
        return Err(PipelineError::MalformedPayload {
            service: SERVICE,
            reason: format!(
                "expected {n} sunrise/sunset entries, got {}/{}",
                daily.sunrise.len(),
                daily.sunset.len()
            ),
        });
    }

    let dates = daily
        .time
        .iter()
        .map(|d| parse_local_date(d))
        .collect::<Result<Vec<i32>>>()?;
    let sunrises = daily
        .sunrise
        .iter()
        .map(|t| parse_local_timestamp(t))
        .collect::<Result<Vec<i64>>>()?;
    let sunsets = daily
        .sunset
        .iter()
        .map(|t| parse_local_timestamp(t))
        .collect::<Result<Vec<i64>>>()?;

    let frame = DataFrame::new(vec![
        Column::new("date".into(), dates),
        Column::new("sunrise".into(), sunrises),
        Column::new("sunset".into(), sunsets),
    ])?
    .lazy()
    .with_columns([
        col("date").cast(DataType::Date),
        col("sunrise").cast(DataType::Datetime(TimeUnit::Milliseconds, None)),
        col("sunset").cast(DataType::Datetime(TimeUnit::Milliseconds, None)),
    ])
    .collect()?;

    Ok(frame)
}

/// Parse a `YYYY-MM-DD` local date into days since the epoch.
fn parse_local_date(value: &str) -> Result<i32> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
        PipelineError::MalformedPayload {
            service: SERVICE,
            reason: format!("unparseable date '{value}': {e}"),
        }
    })?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
    Ok((date - epoch).num_days() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "daily": {
            "time": ["2025-06-21", "2025-06-22"],
            "sunrise": ["2025-06-21T05:25", "2025-06-22T05:25"],
            "sunset": ["2025-06-21T20:30", "2025-06-22T20:31"]
        }
    }"#;

    #[test]
    fn parses_daily_payload() {
        let frame = parse_daily_payload(PAYLOAD).unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(
            frame.column("sunrise").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
    }

    #[test]
    fn rejects_length_mismatch() {
        let bad = r#"{
            "daily": {
                "time": ["2025-06-21", "2025-06-22"],
                "sunrise": ["2025-06-21T05:25"],
                "sunset": ["2025-06-21T20:30", "2025-06-22T20:31"]
            }
        }"#;
        assert!(matches!(
            parse_daily_payload(bad).unwrap_err(),
            PipelineError::MalformedPayload { service: "solar", .. }
        ));
    }

    #[test]
    fn date_parsing_is_epoch_relative() {
        assert_eq!(parse_local_date("1970-01-02").unwrap(), 1);
        assert!(parse_local_date("junk").is_err());
    }
}
