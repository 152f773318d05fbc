//! Offline replay of a recorded metric stream through one pipeline.
//!
//! Input is a CSV whose first column is a timestamp and whose remaining
//! columns are numeric features. Results can be written to a CSV with one
//! row per sample once the window is full.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DetectorConfig;
use crate::detect::{DetectionPipeline, DetectionResult, FeatureVector};

const OUTPUT_HEADER: [&str; 7] = [
    "ts",
    "score_ecod",
    "score_iforest",
    "score_ens",
    "threshold",
    "exceed",
    "alarm",
];

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Delay between rows; zero replays as fast as possible.
    pub interval: Duration,
    /// Feature columns to use by header name; all non-timestamp columns if unset.
    pub features: Option<Vec<String>>,
}

/// One scored row.
#[derive(Debug, Clone)]
pub struct ReplayRow {
    pub ts: String,
    pub result: DetectionResult,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub rows: usize,
    pub results: usize,
    pub inconclusive: usize,
    pub exceeded: usize,
    pub alarms: usize,
}

/// Replay `options.input` through a pipeline built from `detector`.
pub async fn replay<F>(
    options: &ReplayOptions,
    detector: &DetectorConfig,
    on_row: F,
) -> Result<ReplaySummary>
where
    F: FnMut(&ReplayRow),
{
    let pipeline = DetectionPipeline::with_default_models(detector)
        .context("invalid detector configuration")?;
    replay_with(pipeline, options, on_row).await
}

/// Replay through a caller-supplied pipeline.
pub async fn replay_with<F>(
    mut pipeline: DetectionPipeline,
    options: &ReplayOptions,
    mut on_row: F,
) -> Result<ReplaySummary>
where
    F: FnMut(&ReplayRow),
{
    let mut reader = csv::Reader::from_path(&options.input)
        .with_context(|| format!("failed to open {}", options.input.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", options.input.display()))?
        .clone();
    let columns = select_columns(&headers, options.features.as_deref())?;
    info!(
        input = %options.input.display(),
        features = ?columns.iter().map(|&i| &headers[i]).collect::<Vec<_>>(),
        "replaying metric stream"
    );

    let mut writer = options.output.as_deref().map(open_output).transpose()?;

    let mut summary = ReplaySummary::default();
    for (line, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("malformed row {} in {}", line + 2, options.input.display()))?;
        let ts = record.get(0).unwrap_or_default().to_string();
        let features = parse_features(&record, &columns)
            .with_context(|| format!("row {} ({ts})", line + 2))?;
        summary.rows += 1;

        match pipeline.process_features(features) {
            Ok(Some(result)) => {
                summary.results += 1;
                summary.exceeded += usize::from(result.exceed);
                summary.alarms += usize::from(result.alarm);
                if let Some(w) = writer.as_mut() {
                    write_result(w, &ts, &result)?;
                }
                on_row(&ReplayRow { ts, result });
            }
            Ok(None) => {}
            Err(e) if e.is_scoring_failure() => {
                warn!(%ts, error = %e, "scoring failed, row inconclusive");
                summary.inconclusive += 1;
            }
            Err(e) => return Err(e).context("detection failed"),
        }

        if !options.interval.is_zero() {
            tokio::time::sleep(options.interval).await;
        }
    }

    if let Some(path) = &options.output {
        info!(output = %path.display(), results = summary.results, "saved detection results");
    }
    Ok(summary)
}

fn select_columns(headers: &csv::StringRecord, wanted: Option<&[String]>) -> Result<Vec<usize>> {
    if headers.len() < 2 {
        bail!("input needs a timestamp column and at least one feature column");
    }
    match wanted {
        None => Ok((1..headers.len()).collect()),
        Some(names) => names
            .iter()
            .map(|name| {
                headers
                    .iter()
                    .skip(1)
                    .position(|h| h.trim() == name)
                    .map(|i| i + 1)
                    .with_context(|| format!("feature column '{name}' not found in input"))
            })
            .collect(),
    }
}

fn parse_features(record: &csv::StringRecord, columns: &[usize]) -> Result<FeatureVector> {
    columns
        .iter()
        .map(|&i| {
            let raw = record.get(i).unwrap_or_default().trim();
            raw.parse::<f64>()
                .with_context(|| format!("column {i}: '{raw}' is not a number"))
        })
        .collect()
}

fn open_output(path: &Path) -> Result<csv::Writer<File>> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(OUTPUT_HEADER)?;
    writer.flush()?;
    Ok(writer)
}

fn write_result(writer: &mut csv::Writer<File>, ts: &str, r: &DetectionResult) -> Result<()> {
    writer.write_record([
        ts.to_string(),
        format!("{:.6}", r.score_ecod),
        format!("{:.6}", r.score_iforest),
        format!("{:.6}", r.score_ens),
        format!("{:.6}", r.threshold),
        u8::from(r.exceed).to_string(),
        u8::from(r.alarm).to_string(),
    ])?;
    writer.flush()?;
    Ok(())
}
