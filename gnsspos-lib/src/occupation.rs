//! Survey point occupations from Stonex link log files.
//!
//! Only the point name, antenna height, and occupation start/end are read from each line.
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
#[cfg(feature = "serde")]
use serde::Serialize;
use tracing::{debug, info};

use crate::timescale::TimeScales;
use crate::{Error, Result};

pub const DEFAULT_SEPARATOR: char = ';';
const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.f";

const NAME_IDX: usize = 2;
const ANTENNA_IDX: usize = 9;
/// Minimum number of fields for [NAME_IDX] and [ANTENNA_IDX] to exist.
const MIN_FIELDS: usize = ANTENNA_IDX + 1;

/// The subset of link log fields that are used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkFields<'a> {
    pub name: &'a str,
    pub antenna_height: &'a str,
    pub start: &'a str,
    pub end: &'a str,
}

/// Extract the used fields from a single link log line by position: name at index 2,
/// antenna height at index 9, start and end as the third and second from last fields.
///
/// # Errors
/// [Error::MalformedRecord] if the line has too few fields.
pub fn extract_link_fields(line: &str, sep: char, lineno: usize) -> Result<LinkFields<'_>> {
    let fields: Vec<&str> = line.split(sep).collect();
    if fields.len() < MIN_FIELDS {
        return Err(Error::malformed(
            lineno,
            format!("expected at least {MIN_FIELDS} fields, got {}", fields.len()),
        ));
    }
    let n = fields.len();
    Ok(LinkFields {
        name: fields[NAME_IDX],
        antenna_height: fields[ANTENNA_IDX],
        start: fields[n - 3],
        end: fields[n - 2],
    })
}

/// A single occupied survey point.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct OccupationEntry {
    pub point: String,
    /// Antenna height as written in the log
    pub h_ant: String,
    pub start: String,
    pub end: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub start_civil: DateTime<Tz>,
    pub end_civil: DateTime<Tz>,
}

fn timestamp(s: &str, lineno: usize) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| Error::malformed(lineno, format!("invalid timestamp {s:?}: {e}")))
}

/// Parse link log content. Timestamps are taken to be GPST and are always shifted by the
/// configured leap seconds to get UTC.
///
/// # Errors
/// [Error::MalformedRecord] for lines with too few fields or invalid timestamps.
pub fn parse_link_str(
    content: &str,
    sep: char,
    time_scales: &TimeScales,
) -> Result<Vec<OccupationEntry>> {
    let mut entries = Vec::default();
    for (i, line) in content.lines().enumerate() {
        let lineno = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields = extract_link_fields(line, sep, lineno)?;
        let start_utc = time_scales.gpst_to_utc(timestamp(fields.start, lineno)?);
        let end_utc = time_scales.gpst_to_utc(timestamp(fields.end, lineno)?);
        debug!(point = fields.name, %start_utc, %end_utc, "occupation");

        entries.push(OccupationEntry {
            point: fields.name.to_string(),
            h_ant: fields.antenna_height.to_string(),
            start: fields.start.to_string(),
            end: fields.end.to_string(),
            start_civil: time_scales.to_civil(&start_utc),
            end_civil: time_scales.to_civil(&end_utc),
            start_utc,
            end_utc,
        });
    }
    Ok(entries)
}

/// Read a link log file.
///
/// # Errors
/// [Error::FileNotFound] if `path` does not exist, otherwise see [parse_link_str].
pub fn read_link_file<P: AsRef<Path>>(
    path: P,
    sep: char,
    time_scales: &TimeScales,
) -> Result<Vec<OccupationEntry>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let entries = parse_link_str(&content, sep, time_scales)?;
    info!(points = entries.len(), "link file {path:?} read");
    Ok(entries)
}
