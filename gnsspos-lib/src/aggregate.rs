//! Per-point statistics of a trajectory over survey point occupations.
use chrono::{DateTime, Utc};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

use crate::occupation::OccupationEntry;
use crate::pos::{Trajectory, TrajectoryRecord};
use crate::{Error, Result};

/// Position statistics for a single occupied point.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PointSummary {
    pub point: String,
    pub lat: f64,
    pub lon: f64,
    pub h_ell: f64,
    pub lat_std: f64,
    pub lon_std: f64,
    pub h_ell_std: f64,
    /// Window start, UTC
    pub start: DateTime<Utc>,
    /// Window end, UTC
    pub end: DateTime<Utc>,
    /// Number of records the statistics were computed from
    pub num_obs: usize,
}

/// Mean and sample standard deviation of the non-NaN values.
///
/// The mean is NaN if there are no values, the standard deviation is NaN for fewer than
/// two values.
pub(crate) fn nan_mean_std<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    let values: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    let n = values.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, f64::NAN);
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (ss / (n - 1) as f64).sqrt())
}

/// Intersects occupations with a trajectory and computes position statistics.
///
/// Records are selected when their UTC time is within the closed interval
/// `[start_utc, end_utc]` of an occupation.
///
/// # Example
/// ```no_run
/// use gnsspos::aggregate::Aggregator;
/// use gnsspos::occupation::{read_link_file, DEFAULT_SEPARATOR};
/// use gnsspos::pos::read_pos;
/// use gnsspos::timescale::TimeScales;
///
/// let (trajectory, _) = read_pos("rover.pos").unwrap();
/// let points = read_link_file("rover_cubelink.txt", DEFAULT_SEPARATOR, &TimeScales::default()).unwrap();
/// let summaries = Aggregator::builder().build().summarize(&trajectory, &points).unwrap();
/// ```
#[derive(Clone, Debug, TypedBuilder)]
pub struct Aggregator {
    /// Only use records with a fixed solution (Q = 1).
    #[builder(default = true)]
    only_fixed: bool,
    /// Number of threads to use for processing points. Defaults to the rayon default.
    #[builder(default, setter(strip_option))]
    num_threads: Option<usize>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Aggregator::builder().build()
    }
}

impl Aggregator {
    /// Summarize a single occupation.
    ///
    /// # Errors
    /// [Error::EmptyWindow] if no records remain after windowing and filtering.
    pub fn summarize_point(
        &self,
        trajectory: &Trajectory,
        entry: &OccupationEntry,
    ) -> Result<PointSummary> {
        let range = trajectory.window(&entry.start_utc, &entry.end_utc);
        let window = &trajectory.records()[range];
        debug!(point = %entry.point, records = window.len(), "window selected");

        let selected: Vec<&TrajectoryRecord> = if self.only_fixed {
            let fixed: Vec<&TrajectoryRecord> = window.iter().filter(|r| r.is_fixed()).collect();
            info!(
                point = %entry.point,
                "only fixed solutions selected; {} out of {} observations are fixed",
                fixed.len(),
                window.len()
            );
            fixed
        } else {
            window.iter().collect()
        };

        if selected.is_empty() {
            error!("no data found for point {}", entry.point);
            return Err(Error::EmptyWindow(entry.point.clone()));
        }

        let (lat, lat_std) = nan_mean_std(selected.iter().map(|r| r.lat));
        let (lon, lon_std) = nan_mean_std(selected.iter().map(|r| r.lon));
        let (h_ell, h_ell_std) = nan_mean_std(selected.iter().map(|r| r.h_ell));

        Ok(PointSummary {
            point: entry.point.clone(),
            lat,
            lon,
            h_ell,
            lat_std,
            lon_std,
            h_ell_std,
            start: entry.start_utc,
            end: entry.end_utc,
            num_obs: selected.len(),
        })
    }

    /// Summarize every occupation, returning a result per occupation in input order.
    pub fn summarize_each(
        &self,
        trajectory: &Trajectory,
        entries: &[OccupationEntry],
    ) -> Vec<Result<PointSummary>> {
        let pool = {
            let mut pool = rayon::ThreadPoolBuilder::new();
            if let Some(num) = self.num_threads {
                pool = pool.num_threads(num);
            }
            pool
        }
        .build();

        match pool {
            Ok(pool) => pool.install(|| {
                entries
                    .par_iter()
                    .map(|e| self.summarize_point(trajectory, e))
                    .collect()
            }),
            Err(err) => {
                warn!("failed to construct thread pool ({err}); summarizing sequentially");
                entries
                    .iter()
                    .map(|e| self.summarize_point(trajectory, e))
                    .collect()
            }
        }
    }

    /// Summarize every occupation in input order.
    ///
    /// # Errors
    /// The error for the first occupation, in input order, that could not be summarized.
    pub fn summarize(
        &self,
        trajectory: &Trajectory,
        entries: &[OccupationEntry],
    ) -> Result<Vec<PointSummary>> {
        self.summarize_each(trajectory, entries)
            .into_iter()
            .collect()
    }
}
