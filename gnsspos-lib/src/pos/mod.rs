//! RTKLIB position solution (`.pos`) files.
//!
//! Only the geodetic (latitude/longitude/height) solution format is supported. Files
//! written with ECEF coordinates are recognized and rejected with
//! [Error::UnsupportedCoordinates].
mod header;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::ops::{Range, RangeInclusive};
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::geodesy::{llh_to_xyz_batch, Ellipsoid};
use crate::gpstime::CalendarTime;
use crate::timescale::{TimeScales, TimeSystem};
use crate::{Error, Result};

use header::{HeaderParser, State};

/// Number of whitespace separated fields in a geodetic solution record.
pub const NUM_RECORD_FIELDS: usize = 15;
/// Quality codes documented by RTKLIB: 1 fix, 2 float, 3 sbas, 4 dgps, 5 single, 6 ppp.
pub const QUALITY_CODES: RangeInclusive<u8> = 1..=6;
pub const Q_FIX: u8 = 1;

/// Short RTKLIB name for a quality code.
#[must_use]
pub fn quality_label(q: u8) -> Option<&'static str> {
    match q {
        1 => Some("fix"),
        2 => Some("float"),
        3 => Some("sbas"),
        4 => Some("dgps"),
        5 => Some("single"),
        6 => Some("ppp"),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum CoordinateType {
    /// Latitude, longitude, ellipsoidal height
    Llh,
    /// ECEF x, y, z
    Xyz,
}

impl Display for CoordinateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinateType::Llh => write!(f, "LLH"),
            CoordinateType::Xyz => write!(f, "XYZ"),
        }
    }
}

/// How to handle quality codes outside [QUALITY_CODES].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QualityPolicy {
    /// Accept the record and log a warning.
    #[default]
    Tolerate,
    /// Treat the record as malformed.
    Reject,
}

/// Header information of a solution file.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TrajectoryMetadata {
    /// Observation start as written, e.g., `2023/06/17 06:40:38.0`
    pub obs_start: String,
    pub obs_end: String,
    /// Reference (base) position; absent for single point solutions.
    pub ref_pos: Option<[f64; 3]>,
    pub time_system: TimeSystem,
    pub coord_type: CoordinateType,
    /// GPS week of `obs_start`
    pub gps_week: u32,
    /// GPS seconds-of-week of `obs_start`
    pub gps_sow: f64,
}

/// A single solution epoch.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TrajectoryRecord {
    pub ymd: String,
    pub hms: String,
    pub week: u32,
    pub sow: f64,
    pub lat: f64,
    pub lon: f64,
    pub h_ell: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Solution quality, see [QUALITY_CODES].
    pub q: u8,
    /// Number of satellites
    pub ns: u32,
    pub sdn: f64,
    pub sde: f64,
    pub sdu: f64,
    pub sdne: f64,
    pub sdeu: f64,
    pub sdun: f64,
    /// Age of differential in seconds
    pub age: f64,
    /// Ambiguity ratio
    pub ratio: f64,
}

impl TrajectoryRecord {
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.q == Q_FIX
    }
}

/// Time ordered solution records with their timestamps on the declared time scale,
/// UTC, and the configured civil zone.
///
/// All columns have the same length and the UTC column is non-decreasing.
#[derive(Clone, Debug)]
pub struct Trajectory {
    time_system: TimeSystem,
    records: Vec<TrajectoryRecord>,
    source_times: Vec<NaiveDateTime>,
    utc_times: Vec<DateTime<Utc>>,
    civil_times: Vec<DateTime<Tz>>,
}

impl Trajectory {
    /// Time system of [Trajectory::source_times].
    #[must_use]
    pub fn time_system(&self) -> TimeSystem {
        self.time_system
    }

    #[must_use]
    pub fn records(&self) -> &[TrajectoryRecord] {
        &self.records
    }

    #[must_use]
    pub fn source_times(&self) -> &[NaiveDateTime] {
        &self.source_times
    }

    #[must_use]
    pub fn utc_times(&self) -> &[DateTime<Utc>] {
        &self.utc_times
    }

    #[must_use]
    pub fn civil_times(&self) -> &[DateTime<Tz>] {
        &self.civil_times
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records per quality code.
    #[must_use]
    pub fn quality_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::default();
        for rec in &self.records {
            *counts.entry(rec.q).or_default() += 1;
        }
        counts
    }

    /// Stable sort of every column by UTC time.
    fn sort_by_utc(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.utc_times[i]);

        self.records = permute(&self.records, &order);
        self.source_times = permute(&self.source_times, &order);
        self.utc_times = permute(&self.utc_times, &order);
        self.civil_times = permute(&self.civil_times, &order);
    }

    /// Index range of records with `start <= utc <= end`.
    #[must_use]
    pub fn window(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> Range<usize> {
        let lo = self.utc_times.partition_point(|t| t < start);
        let hi = self.utc_times.partition_point(|t| t <= end);
        lo..hi.max(lo)
    }
}

fn permute<T: Clone>(values: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&i| values[i].clone()).collect()
}

fn num<T: FromStr>(fields: &[&str], idx: usize, name: &str, lineno: usize) -> Result<T>
where
    T::Err: Display,
{
    fields[idx].parse().map_err(|e| {
        Error::malformed(lineno, format!("invalid {name} {:?}: {e}", fields[idx]))
    })
}

/// Reads RTKLIB solution files.
///
/// # Example
/// ```no_run
/// use gnsspos::pos::{QualityPolicy, TrajectoryReader};
///
/// let reader = TrajectoryReader::builder()
///     .quality_policy(QualityPolicy::Reject)
///     .build();
/// let (trajectory, metadata) = reader.read("rover.pos").unwrap();
/// println!("{} epochs from {}", trajectory.len(), metadata.obs_start);
/// ```
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct TrajectoryReader {
    #[builder(default)]
    time_scales: TimeScales,
    /// Ellipsoid used for the ECEF columns.
    #[builder(default)]
    ellipsoid: Ellipsoid,
    #[builder(default)]
    quality_policy: QualityPolicy,
}

impl TrajectoryReader {
    /// Read a `.pos` file.
    ///
    /// # Errors
    /// [Error::FileNotFound] if `path` does not exist, [Error::InvalidFormat] if it does not
    /// have a `.pos` extension, otherwise see [TrajectoryReader::read_str].
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<(Trajectory, TrajectoryMetadata)> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        if path.extension().and_then(|e| e.to_str()) != Some("pos") {
            return Err(Error::InvalidFormat(format!("{path:?} is not a .pos file")));
        }
        let content = fs::read_to_string(path)?;
        let zult = self.read_str(&content)?;
        info!("RTKLIB pos file {path:?} successfully read");
        Ok(zult)
    }

    /// Parse solution file content.
    ///
    /// # Errors
    /// [Error::InvalidFormat] for header problems, [Error::UnsupportedCoordinates] for ECEF
    /// solutions, and [Error::MalformedRecord] for any record that cannot be parsed.
    ///
    /// Records that are not in time order, e.g., from a backward solution, are sorted by
    /// UTC time.
    pub fn read_str(&self, content: &str) -> Result<(Trajectory, TrajectoryMetadata)> {
        let mut lines = content.lines().enumerate().map(|(i, l)| (i + 1, l));

        let mut header = HeaderParser::new();
        for (lineno, line) in lines.by_ref() {
            if header.feed(line, lineno)? == State::Body {
                break;
            }
        }
        let metadata = header.finish()?;
        debug!(?metadata, "header parsed");

        let mut trajectory = Trajectory {
            time_system: metadata.time_system,
            records: Vec::default(),
            source_times: Vec::default(),
            utc_times: Vec::default(),
            civil_times: Vec::default(),
        };
        let mut out_of_range = 0usize;
        let mut llh = Vec::default();

        for (lineno, line) in lines {
            if line.trim().is_empty() || line.starts_with('%') {
                continue;
            }
            let (record, naive) = self.parse_record(line, lineno)?;

            if !QUALITY_CODES.contains(&record.q) {
                match self.quality_policy {
                    QualityPolicy::Tolerate => out_of_range += 1,
                    QualityPolicy::Reject => {
                        return Err(Error::malformed(
                            lineno,
                            format!("quality code {} out of range", record.q),
                        ))
                    }
                }
            }

            let utc = self.time_scales.to_utc(naive, metadata.time_system);
            llh.push([record.lat, record.lon, record.h_ell]);
            trajectory.civil_times.push(self.time_scales.to_civil(&utc));
            trajectory.utc_times.push(utc);
            trajectory.source_times.push(naive);
            trajectory.records.push(record);
        }

        let xyz = llh_to_xyz_batch(&self.ellipsoid, &llh);
        for (rec, [x, y, z]) in trajectory.records.iter_mut().zip(xyz) {
            (rec.x, rec.y, rec.z) = (x, y, z);
        }

        if !trajectory.utc_times.windows(2).all(|w| w[0] <= w[1]) {
            trajectory.sort_by_utc();
            info!(
                records = trajectory.len(),
                "records are not in time order; sorted by UTC"
            );
        }

        if out_of_range > 0 {
            warn!(
                count = out_of_range,
                "records with quality codes outside {QUALITY_CODES:?}"
            );
        }
        info!(
            records = trajectory.len(),
            time_system = %trajectory.time_system,
            "trajectory table built"
        );

        Ok((trajectory, metadata))
    }

    fn parse_record(
        &self,
        line: &str,
        lineno: usize,
    ) -> Result<(TrajectoryRecord, NaiveDateTime)> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != NUM_RECORD_FIELDS {
            return Err(Error::malformed(
                lineno,
                format!("expected {NUM_RECORD_FIELDS} fields, got {}", fields.len()),
            ));
        }

        let (ymd, hms) = (fields[0], fields[1]);
        let cal =
            CalendarTime::parse(ymd, hms).map_err(|e| Error::malformed(lineno, e.to_string()))?;
        let (week, sow) = cal
            .gps_week_sow()
            .map_err(|e| Error::malformed(lineno, e.to_string()))?;
        let naive = cal
            .to_naive()
            .map_err(|e| Error::malformed(lineno, e.to_string()))?;

        let lat = num(&fields, 2, "latitude", lineno)?;
        let lon = num(&fields, 3, "longitude", lineno)?;
        let h_ell = num(&fields, 4, "height", lineno)?;

        let record = TrajectoryRecord {
            ymd: ymd.to_string(),
            hms: hms.to_string(),
            week,
            sow,
            lat,
            lon,
            h_ell,
            // set by the batch conversion in read_str
            x: f64::NAN,
            y: f64::NAN,
            z: f64::NAN,
            q: num(&fields, 5, "Q", lineno)?,
            ns: num(&fields, 6, "ns", lineno)?,
            sdn: num(&fields, 7, "sdn", lineno)?,
            sde: num(&fields, 8, "sde", lineno)?,
            sdu: num(&fields, 9, "sdu", lineno)?,
            sdne: num(&fields, 10, "sdne", lineno)?,
            sdeu: num(&fields, 11, "sdeu", lineno)?,
            sdun: num(&fields, 12, "sdun", lineno)?,
            age: num(&fields, 13, "age", lineno)?,
            ratio: num(&fields, 14, "ratio", lineno)?,
        };

        Ok((record, naive))
    }
}

/// Read a `.pos` file with the default [TrajectoryReader] settings.
///
/// # Errors
/// See [TrajectoryReader::read].
pub fn read_pos<P: AsRef<Path>>(path: P) -> Result<(Trajectory, TrajectoryMetadata)> {
    TrajectoryReader::default().read(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::llh_to_xyz;
    use test_case::test_case;

    const HEADER: &str = "\
% program   : RTKPOST ver.2.4.3 b34
% inp file  : rover.obs
% obs start : 2023/06/17 06:40:38.0 GPST (week2266 542438.0s)
% obs end   : 2023/06/17 06:40:40.0 GPST (week2266 542440.0s)
% pos mode  : Kinematic
% ref pos   :  45.478100000    9.229600000   180.0000
%
% (lat/lon/height=WGS84/ellipsoidal,Q=1:fix,2:float,3:sbas,4:dgps,5:single,6:ppp,ns=# of satellites)
%  GPST                  latitude(deg) longitude(deg)  height(m)   Q  ns   sdn(m)   sde(m)   sdu(m)  sdne(m)  sdeu(m)  sdun(m) age(s)  ratio
";

    const RECORDS: &str = "\
2023/06/17 06:40:38.000   45.478100000    9.229600000   180.0000   1  12   0.0040   0.0030   0.0090   0.0010  -0.0020   0.0030   1.00    9.9
2023/06/17 06:40:39.000   45.478100100    9.229600100   180.0100   2  11   0.0400   0.0300   0.0900   0.0100  -0.0200   0.0300   1.00    1.2
2023/06/17 06:40:40.000   45.478100200    9.229600200   180.0200   1  12   0.0040   0.0030   0.0090   0.0010  -0.0020   0.0030   1.00   12.5
";

    fn parse(content: &str) -> Result<(Trajectory, TrajectoryMetadata)> {
        TrajectoryReader::default().read_str(content)
    }

    #[test]
    fn metadata() {
        let (_, meta) = parse(&format!("{HEADER}{RECORDS}")).unwrap();
        assert_eq!(meta.obs_start, "2023/06/17 06:40:38.0");
        assert_eq!(meta.obs_end, "2023/06/17 06:40:40.0");
        assert_eq!(meta.ref_pos, Some([45.4781, 9.2296, 180.0]));
        assert_eq!(meta.time_system, TimeSystem::Gpst);
        assert_eq!(meta.coord_type, CoordinateType::Llh);
        assert_eq!(meta.gps_week, 2266);
        assert_eq!(meta.gps_sow, 542_438.0);
    }

    #[test]
    fn records() {
        let (traj, _) = parse(&format!("{HEADER}{RECORDS}")).unwrap();
        assert_eq!(traj.len(), 3);

        let rec = &traj.records()[1];
        assert_eq!(rec.ymd, "2023/06/17");
        assert_eq!(rec.hms, "06:40:39.000");
        assert_eq!((rec.week, rec.sow), (2266, 542_439.0));
        assert_eq!(rec.q, 2);
        assert_eq!(rec.ns, 11);
        assert_eq!(
            [rec.sdn, rec.sde, rec.sdu, rec.sdne, rec.sdeu, rec.sdun],
            [0.04, 0.03, 0.09, 0.01, -0.02, 0.03]
        );
        assert_eq!((rec.age, rec.ratio), (1.0, 1.2));
        assert_eq!((rec.x, rec.y, rec.z), llh_to_xyz(rec.lat, rec.lon, rec.h_ell));
    }

    #[test]
    fn utc_is_leap_seconds_behind_gpst() {
        let (traj, _) = parse(&format!("{HEADER}{RECORDS}")).unwrap();
        for (src, utc) in traj.source_times().iter().zip(traj.utc_times()) {
            assert_eq!(*src - utc.naive_utc(), chrono::Duration::seconds(18));
        }
        assert_eq!(
            traj.civil_times()[0].to_rfc3339(),
            "2023-06-17T08:40:20+02:00"
        );
    }

    #[test]
    fn utc_header_is_not_shifted() {
        let content = format!("{HEADER}{RECORDS}").replace("GPST", "UTC");
        let (traj, meta) = parse(&content).unwrap();
        assert_eq!(meta.time_system, TimeSystem::Utc);
        assert_eq!(traj.time_system(), TimeSystem::Utc);
        assert_eq!(traj.utc_times()[0].naive_utc(), traj.source_times()[0]);
    }

    #[test]
    fn header_only() {
        let (traj, _) = parse(HEADER).unwrap();
        assert!(traj.is_empty());
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let content = format!("{HEADER}\n{RECORDS}%\n\n");
        let (traj, _) = parse(&content).unwrap();
        assert_eq!(traj.len(), 3);
    }

    #[test]
    fn xyz_is_unsupported() {
        let content = HEADER.replace(
            "latitude(deg) longitude(deg)  height(m)",
            "x-ecef(m) y-ecef(m) z-ecef(m)",
        );
        let zult = parse(&format!("{content}{RECORDS}"));
        assert!(matches!(
            zult,
            Err(Error::UnsupportedCoordinates(CoordinateType::Xyz))
        ));
    }

    #[test]
    fn unrecognized_header_line() {
        let content = HEADER.replace("% pos mode  : Kinematic", "% this is not a header");
        let err = parse(&content).unwrap_err();
        assert!(err.is_invalid_format(), "{err}");
    }

    #[test_case("2023/06/17 06:40:41.000 45.4781 9.2296 180.0 1 12 0.004 0.003 0.009 0.001 -0.002 0.003 1.00" ; "missing field")]
    #[test_case("2023/06/17 06:40:41.000 45.4781 9.2296 180.0 1 12 0.004 0.003 0.009 0.001 -0.002 0.003 1.00 9.9 7" ; "extra field")]
    #[test_case("2023/06/17 06:40:41.000 north 9.2296 180.0 1 12 0.004 0.003 0.009 0.001 -0.002 0.003 1.00 9.9" ; "non-numeric latitude")]
    #[test_case("2023/06/17 06:40:41.000 45.4781 9.2296 180.0 x 12 0.004 0.003 0.009 0.001 -0.002 0.003 1.00 9.9" ; "non-numeric quality")]
    #[test_case("2023/13/17 06:40:41.000 45.4781 9.2296 180.0 1 12 0.004 0.003 0.009 0.001 -0.002 0.003 1.00 9.9" ; "invalid month")]
    fn malformed_record(line: &str) {
        let content = format!("{HEADER}{RECORDS}{line}\n");
        match parse(&content) {
            Err(Error::MalformedRecord { line, .. }) => assert_eq!(line, 13),
            zult => panic!("expected malformed record, got {zult:?}"),
        }
    }

    #[test]
    fn descending_epochs_are_sorted() {
        let descending: String = RECORDS.lines().rev().map(|l| format!("{l}\n")).collect();
        let (sorted, _) = parse(&format!("{HEADER}{RECORDS}")).unwrap();
        let (traj, _) = parse(&format!("{HEADER}{descending}")).unwrap();

        assert_eq!(traj.records(), sorted.records());
        assert_eq!(traj.source_times(), sorted.source_times());
        assert_eq!(traj.utc_times(), sorted.utc_times());
        assert_eq!(traj.civil_times(), sorted.civil_times());
        assert_eq!(traj.window(&traj.utc_times()[1], &traj.utc_times()[2]), 1..3);
    }

    #[test]
    fn unordered_epochs_keep_equal_times_stable() {
        let line = "2023/06/17 06:40:39.000 45.0 9.0 100.0 5 12 0.004 0.003 0.009 0.001 -0.002 0.003 1.00 9.9\n";
        let (traj, _) = parse(&format!("{HEADER}{RECORDS}{line}")).unwrap();

        let qs: Vec<u8> = traj.records().iter().map(|r| r.q).collect();
        assert_eq!(qs, vec![1, 2, 5, 1]);
        assert!(traj.utc_times().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn quality_policy() {
        let line = "2023/06/17 06:40:41.000 45.4781 9.2296 180.0 7 12 0.004 0.003 0.009 0.001 -0.002 0.003 1.00 9.9\n";
        let content = format!("{HEADER}{RECORDS}{line}");

        let (traj, _) = parse(&content).unwrap();
        assert_eq!(traj.quality_counts().get(&7), Some(&1));

        let reader = TrajectoryReader::builder()
            .quality_policy(QualityPolicy::Reject)
            .build();
        assert!(matches!(
            reader.read_str(&content),
            Err(Error::MalformedRecord { line: 13, .. })
        ));
    }

    #[test]
    fn window_is_closed() {
        let (traj, _) = parse(&format!("{HEADER}{RECORDS}")).unwrap();
        let utc = traj.utc_times();
        assert_eq!(traj.window(&utc[1], &utc[2]), 1..3);
        assert_eq!(traj.window(&utc[0], &utc[0]), 0..1);
        assert_eq!(traj.window(&utc[2], &utc[0]), 2..2);
    }

    #[test]
    fn quality_labels() {
        assert_eq!(quality_label(1), Some("fix"));
        assert_eq!(quality_label(6), Some("ppp"));
        assert_eq!(quality_label(0), None);
    }
}
