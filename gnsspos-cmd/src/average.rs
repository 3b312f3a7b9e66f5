use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use gnsspos::aggregate::{Aggregator, PointSummary};
use gnsspos::occupation::read_link_file;
use gnsspos::pos::{QualityPolicy, TrajectoryReader};
use gnsspos::timescale::TimeScales;
use gnsspos::Error;
use tracing::{info, warn};

pub struct Opts<'a> {
    pub pos: &'a Path,
    pub link: &'a Path,
    pub sep: char,
    pub only_fixed: bool,
    pub skip_empty: bool,
    pub quality_policy: QualityPolicy,
    pub threads: Option<usize>,
    pub time_scales: TimeScales,
    pub output: &'a Path,
    pub clobber: bool,
}

pub fn write_csv<W: Write>(summaries: &[PointSummary], dest: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(dest);
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn average(opts: &Opts) -> Result<()> {
    if !opts.clobber && opts.output.exists() {
        bail!("{:?} exists; use --clobber", opts.output);
    }

    let reader = TrajectoryReader::builder()
        .time_scales(opts.time_scales.clone())
        .quality_policy(opts.quality_policy)
        .build();
    let (trajectory, metadata) = reader
        .read(opts.pos)
        .with_context(|| format!("reading trajectory {:?}", opts.pos))?;
    info!(
        "trajectory {} to {} ({}): {} epochs",
        metadata.obs_start,
        metadata.obs_end,
        metadata.time_system,
        trajectory.len()
    );

    let points = read_link_file(opts.link, opts.sep, &opts.time_scales)
        .with_context(|| format!("reading link file {:?}", opts.link))?;

    let aggregator = {
        let builder = Aggregator::builder().only_fixed(opts.only_fixed);
        match opts.threads {
            Some(num) => builder.num_threads(num).build(),
            None => builder.build(),
        }
    };

    let summaries = if opts.skip_empty {
        let mut summaries = Vec::default();
        for zult in aggregator.summarize_each(&trajectory, &points) {
            match zult {
                Ok(summary) => summaries.push(summary),
                Err(Error::EmptyWindow(point)) => warn!("skipping point {point}; no data"),
                Err(err) => return Err(err.into()),
            }
        }
        summaries
    } else {
        aggregator
            .summarize(&trajectory, &points)
            .context("averaging points")?
    };

    let dest = File::create(opts.output)
        .with_context(|| format!("failed to create output {:?}", opts.output))?;
    write_csv(&summaries, dest)?;
    info!(
        "wrote {} of {} points to {:?}",
        summaries.len(),
        points.len(),
        opts.output
    );

    Ok(())
}
