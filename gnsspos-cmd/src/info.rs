use std::collections::BTreeMap;
use std::io::stdout;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gnsspos::pos::{quality_label, TrajectoryMetadata, TrajectoryReader};
use gnsspos::timescale::TimeScales;
use serde::Serialize;

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum Format {
    Json,
    Text,
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    metadata: TrajectoryMetadata,
    epochs: usize,
    first_epoch_utc: Option<DateTime<Utc>>,
    last_epoch_utc: Option<DateTime<Utc>>,
    first_epoch_civil: Option<String>,
    last_epoch_civil: Option<String>,
    /// Epoch counts by quality label, or code for undocumented codes
    quality: BTreeMap<String, usize>,
}

fn render_text(info: &Info) -> String {
    let meta = &info.metadata;
    let mut lines = vec![
        info.filename.clone(),
        format!("  time system: {}", meta.time_system),
        format!("  coordinates: {}", meta.coord_type),
        format!(
            "  obs start:   {} (week {} sow {:.1})",
            meta.obs_start, meta.gps_week, meta.gps_sow
        ),
        format!("  obs end:     {}", meta.obs_end),
    ];
    if let Some([a, b, c]) = meta.ref_pos {
        lines.push(format!("  ref pos:     {a:.9} {b:.9} {c:.4}"));
    }
    lines.push(format!("  epochs:      {}", info.epochs));
    if let (Some(first), Some(last)) = (&info.first_epoch_utc, &info.last_epoch_utc) {
        lines.push(format!("  first (UTC): {}", first.to_rfc3339()));
        lines.push(format!("  last  (UTC): {}", last.to_rfc3339()));
    }
    if let (Some(first), Some(last)) = (&info.first_epoch_civil, &info.last_epoch_civil) {
        lines.push(format!("  first (civil): {first}"));
        lines.push(format!("  last  (civil): {last}"));
    }
    for (label, count) in &info.quality {
        lines.push(format!("  {label:>8}: {count}"));
    }
    lines.join("\n")
}

fn load(input: &Path, time_scales: &TimeScales) -> Result<Info> {
    let reader = TrajectoryReader::builder()
        .time_scales(time_scales.clone())
        .build();
    let (trajectory, metadata) = reader
        .read(input)
        .with_context(|| format!("reading {input:?}"))?;

    let quality = trajectory
        .quality_counts()
        .into_iter()
        .map(|(q, count)| {
            let label = quality_label(q).map_or_else(|| format!("Q={q}"), str::to_string);
            (label, count)
        })
        .collect();

    Ok(Info {
        filename: input.to_string_lossy().to_string(),
        metadata,
        epochs: trajectory.len(),
        first_epoch_utc: trajectory.utc_times().first().copied(),
        last_epoch_utc: trajectory.utc_times().last().copied(),
        first_epoch_civil: trajectory.civil_times().first().map(DateTime::to_rfc3339),
        last_epoch_civil: trajectory.civil_times().last().map(DateTime::to_rfc3339),
        quality,
    })
}

pub fn info(input: &Path, format: &Format, time_scales: &TimeScales) -> Result<()> {
    let info = load(input, time_scales)?;
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &info).context("serializing to json")?;
            println!();
        }
        Format::Text => println!("{}", render_text(&info)),
    }

    Ok(())
}
