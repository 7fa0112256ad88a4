//! Pipeline orchestration: normalize, enrich, signatures.
//!
//! The three phases form a linear dependency chain through filesystem
//! artifacts, so each can also be run on its own against the artifacts of a
//! previous invocation. Failure policy differs by phase: a failed registry
//! scan or context fetch aborts the run (every later stage depends on them),
//! while a single source file or month failing mid-phase is logged, counted,
//! and skipped.

use crate::config::PipelineConfig;
use crate::enrichment::{enrich_month, solar, weather, EnrichmentJoiner};
use crate::error::{PipelineError, Result};
use crate::models::{month_key, CleaningStats, ProcessingStats};
use crate::normalizer::{write_parquet, TripNormalizer};
use crate::registry::{scan_source, StationRegistry, StationRegistryBuilder};
use crate::signatures::{self, DayClass};

use colored::*;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{debug, error, info};

/// Owns one run's configuration and drives the phases.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Discover raw trip sources, sorted so accumulation order (and with it
    /// every registry tie-break) is reproducible across runs.
    fn discover_sources(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.config.source_pattern();
        let mut paths = glob::glob(&pattern)?.collect::<std::result::Result<Vec<_>, _>>()?;
        paths.sort();

        if paths.is_empty() {
            return Err(PipelineError::NoSourceFiles { pattern });
        }
        debug!(sources = paths.len(), "discovered raw trip sources");
        Ok(paths)
    }

    /// Phase 1: build the station registry, then normalize every source.
    pub async fn run_normalize(&self) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        println!("{}", "Normalizing raw trip data".bright_green().bold());
        println!(
            "  {} {}",
            "Input:".bright_cyan(),
            self.config.input_dir.display()
        );

        let sources = self.discover_sources()?;
        println!(
            "  {} {} source files",
            "Found".bright_green(),
            sources.len().to_string().bright_white().bold()
        );

        let registry = Arc::new(self.build_registry(&sources).await?);
        registry.persist(&self.config.registry_path())?;
        println!(
            "  {} {} stations resolved",
            "Registry:".bright_cyan(),
            registry.len().to_string().bright_white().bold()
        );

        let stats = self.normalize_sources(&sources, registry).await?;

        let total_time = start_time.elapsed().as_millis();
        println!("\n{}", "Normalization Summary".bright_green().bold());
        println!(
            "  {} {}ms",
            "Time elapsed:".bright_cyan(),
            total_time.to_string().bright_white()
        );
        println!(
            "  {} {}",
            "Files processed:".bright_cyan(),
            stats.files_processed.to_string().bright_white()
        );
        if stats.files_failed > 0 {
            println!(
                "  {} {}",
                "Files failed:".bright_red(),
                stats.files_failed.to_string().bright_red().bold()
            );
        }
        println!(
            "  {} {}",
            "Clean rows:".bright_cyan(),
            stats.total_rows.to_string().bright_white().bold()
        );

        Ok(ProcessingStats {
            processing_time_ms: total_time,
            ..stats
        })
    }

    /// Scan every source for station records, in accumulation order.
    ///
    /// A failed scan is fatal: a partial registry would silently change the
    /// imputation results of every downstream file.
    async fn build_registry(&self, sources: &[PathBuf]) -> Result<StationRegistry> {
        let concurrency = self.config.max_concurrent_files.min(sources.len());

        // `buffered` (not unordered) keeps the push order equal to the sorted
        // path order regardless of task completion order.
        let frames = stream::iter(sources.to_vec())
            .map(|path| async move {
                let scan_path = path.clone();
                task::spawn_blocking(move || scan_source(&scan_path))
                    .await
                    .map_err(|e| PipelineError::ProcessingFailed {
                        path,
                        reason: e.to_string(),
                    })?
            })
            .buffered(concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut builder = StationRegistryBuilder::new();
        for frame in frames {
            builder.push(frame?);
        }
        builder.merge()
    }

    /// Normalize all sources concurrently; per-file failures are non-fatal.
    async fn normalize_sources(
        &self,
        sources: &[PathBuf],
        registry: Arc<StationRegistry>,
    ) -> Result<ProcessingStats> {
        std::fs::create_dir_all(&self.config.interim_dir)?;

        let pb = ProgressBar::new(sources.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_message("Normalizing files");

        let normalizer = TripNormalizer::new(&self.config);
        let compression = self.config.compression;
        let interim_dir = self.config.interim_dir.clone();
        let concurrency = self.config.max_concurrent_files.min(sources.len());
        let pb_clone = pb.clone();

        let results = stream::iter(sources.to_vec())
            .map(|path| {
                let normalizer = normalizer.clone();
                let registry = registry.clone();
                let interim_dir = interim_dir.clone();
                let pb = pb_clone.clone();
                async move {
                    if let Some(name) = path.file_name() {
                        pb.set_message(format!("Normalizing: {}", name.to_string_lossy()));
                    }

                    let task_path = path.clone();
                    let result = task::spawn_blocking(move || {
                        let (mut clean, stats) =
                            normalizer.normalize_file(&task_path, &registry)?;
                        let stem = task_path
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        let out = interim_dir.join(format!("{stem}.parquet"));
                        write_parquet(&mut clean, &out, compression)?;
                        Ok::<CleaningStats, PipelineError>(stats)
                    })
                    .await
                    .map_err(|e| PipelineError::ProcessingFailed {
                        path: path.clone(),
                        reason: e.to_string(),
                    })
                    .and_then(|inner| inner);
                    pb.inc(1);

                    match result {
                        Ok(stats) => {
                            debug!(source = %path.display(), "normalized source file");
                            Ok(stats)
                        }
                        Err(e) => {
                            error!("Failed to normalize {}: {:#}", path.display(), e);
                            Err(e)
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<_>>()
            .await;

        pb.finish_with_message("All source files normalized");

        let mut stats = ProcessingStats::default();
        let mut rejections = CleaningStats::default();
        for result in results {
            match result {
                Ok(cleaning) => {
                    stats.files_processed += 1;
                    stats.total_rows += cleaning.final_rows;
                    rejections.corrupted_dates += cleaning.corrupted_dates;
                    rejections.invalid_trips += cleaning.invalid_trips;
                    rejections.irrecoverable_ids += cleaning.irrecoverable_ids;
                }
                Err(_) => stats.files_failed += 1,
            }
        }

        info!(
            corrupted_dates = rejections.corrupted_dates,
            invalid_trips = rejections.invalid_trips,
            irrecoverable_ids = rejections.irrecoverable_ids,
            "rejection totals"
        );
        println!(
            "  {} {} corrupted dates, {} invalid trips, {} irrecoverable ids",
            "Rejected:".bright_cyan(),
            rejections.corrupted_dates.to_string().bright_white(),
            rejections.invalid_trips.to_string().bright_white(),
            rejections.irrecoverable_ids.to_string().bright_white()
        );

        Ok(stats)
    }

    /// Phase 2: fetch the weather/solar context and enrich month by month.
    pub async fn run_enrich(&self) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        println!("{}", "Enriching cleaned trips".bright_green().bold());

        // Context fetches are fatal: without them no month can be enriched.
        let client = reqwest::Client::new();
        let weather = weather::fetch_hourly_weather(&client, &self.config).await?;
        let solar = solar::fetch_solar_calendar(&client, &self.config).await?;
        println!(
            "  {} {} weather hours, {} solar days",
            "Context:".bright_cyan(),
            weather.height().to_string().bright_white(),
            solar.height().to_string().bright_white()
        );

        let joiner = EnrichmentJoiner::new(weather, solar)?;
        let months = self.interim_months()?;
        println!(
            "  {} {} months",
            "Found".bright_green(),
            months.len().to_string().bright_white().bold()
        );

        let enriched_dir = self.config.enriched_dir();
        std::fs::create_dir_all(&enriched_dir)?;

        let mut stats = ProcessingStats::default();
        for (month, files) in &months {
            let out = enriched_dir.join(format!("{month}-tripdata.parquet"));
            match enrich_month(&joiner, files)
                .and_then(|mut frame| {
                    write_parquet(&mut frame, &out, self.config.compression)?;
                    Ok(frame.height())
                }) {
                Ok(rows) => {
                    info!(month = %month, rows, "enriched month");
                    stats.files_processed += 1;
                    stats.total_rows += rows;
                }
                Err(e) => {
                    error!("Failed to enrich month {}: {:#}", month, e);
                    stats.files_failed += 1;
                }
            }
        }

        stats.processing_time_ms = start_time.elapsed().as_millis();
        println!("\n{}", "Enrichment Summary".bright_green().bold());
        println!(
            "  {} {}",
            "Months enriched:".bright_cyan(),
            stats.files_processed.to_string().bright_white()
        );
        if stats.files_failed > 0 {
            println!(
                "  {} {}",
                "Months failed:".bright_red(),
                stats.files_failed.to_string().bright_red().bold()
            );
        }
        println!(
            "  {} {}",
            "Rows enriched:".bright_cyan(),
            stats.total_rows.to_string().bright_white().bold()
        );

        Ok(stats)
    }

    /// Group the interim parquet files into logical months, sorted by key.
    fn interim_months(&self) -> Result<BTreeMap<String, Vec<PathBuf>>> {
        let pattern = self
            .config
            .interim_dir
            .join("*.parquet")
            .to_string_lossy()
            .into_owned();
        let mut paths = glob::glob(&pattern)?.collect::<std::result::Result<Vec<_>, _>>()?;
        paths.sort();

        if paths.is_empty() {
            return Err(PipelineError::NoSourceFiles { pattern });
        }

        let mut months: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for path in paths {
            months.entry(month_key(&path)).or_default().push(path);
        }
        Ok(months)
    }

    /// Phase 3: build the weekday and weekend demand signature tables.
    pub fn run_signatures(&self) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        println!("{}", "Generating demand signatures".bright_green().bold());

        let pattern = self
            .config
            .enriched_dir()
            .join("*.parquet")
            .to_string_lossy()
            .into_owned();
        let mut paths = glob::glob(&pattern)?.collect::<std::result::Result<Vec<_>, _>>()?;
        paths.sort();

        if paths.is_empty() {
            return Err(PipelineError::NoSourceFiles { pattern });
        }

        let frames = paths
            .iter()
            .map(|path| LazyFrame::scan_parquet(path, Default::default()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let trips = concat(
            frames,
            UnionArgs {
                diagonal: true,
                ..Default::default()
            },
        )?;

        let dir = self.config.signatures_dir();
        let mut stats = ProcessingStats::default();
        for class in [DayClass::Weekday, DayClass::Weekend] {
            let table = signatures::generate(trips.clone(), class)?;
            println!(
                "  {} {} stations ({})",
                "Signatures:".bright_cyan(),
                table.height().to_string().bright_white().bold(),
                class
            );
            stats.total_rows += table.height();
            signatures::persist(table, &dir, class)?;
            stats.files_processed += 1;
        }

        stats.processing_time_ms = start_time.elapsed().as_millis();
        Ok(stats)
    }

    /// Run all three phases back to back.
    pub async fn run_all(&self) -> Result<()> {
        self.run_normalize().await?;
        self.run_enrich().await?;
        self.run_signatures()?;
        Ok(())
    }
}
