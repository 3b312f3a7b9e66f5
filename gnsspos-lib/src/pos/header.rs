use tracing::{error, trace};

use super::{CoordinateType, TrajectoryMetadata};
use crate::gpstime::CalendarTime;
use crate::timescale::TimeSystem;
use crate::{Error, Result};

const MARKER_OBS_START: &str = "obs start";
const MARKER_OBS_END: &str = "obs end";
const MARKER_REF_POS: &str = "ref pos";
const MARKER_LLH: &str = "latitude(deg)";
const MARKER_XYZ: &str = "x-ecef(m)";

/// Every kind of `%` line a solution file header may contain.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HeaderLine {
    ObsStart {
        start: String,
        system: TimeSystem,
        week_sow: Option<(u32, f64)>,
    },
    ObsEnd(String),
    RefPos([f64; 3]),
    Columns(CoordinateType),
    /// `% key : value` processing option lines, e.g., `pos mode`, `elev mask`.
    Setting,
    /// Bare `%` or a parenthesized legend.
    Legend,
}

fn timestamp(fields: &[&str], lineno: usize) -> Result<String> {
    match fields {
        [ymd, hms, ..] => Ok(format!("{ymd} {hms}")),
        _ => Err(Error::InvalidFormat(format!(
            "expected date and time at line {lineno}"
        ))),
    }
}

/// Parse the `(week2266 542438.0s)` annotation that follows the obs start time.
fn week_sow(week: &str, sow: &str) -> Option<(u32, f64)> {
    let week = week.strip_prefix("(week")?.parse().ok()?;
    let sow = sow.strip_suffix(')')?;
    let sow = sow.strip_suffix('s').unwrap_or(sow).parse().ok()?;
    Some((week, sow))
}

/// Classify a single `%` header line.
///
/// # Errors
/// [Error::InvalidFormat] if the line is not one of the recognized categories or a
/// recognized line has invalid content.
pub(crate) fn classify(line: &str, lineno: usize) -> Result<HeaderLine> {
    let Some(body) = line.strip_prefix('%') else {
        return Err(Error::InvalidFormat(format!(
            "expected header line at line {lineno}"
        )));
    };
    let text = body.trim();

    if line.contains(MARKER_LLH) {
        return Ok(HeaderLine::Columns(CoordinateType::Llh));
    }
    if line.contains(MARKER_XYZ) {
        return Ok(HeaderLine::Columns(CoordinateType::Xyz));
    }
    if text.is_empty() || (text.starts_with('(') && text.ends_with(')')) {
        return Ok(HeaderLine::Legend);
    }

    let value = text
        .split_once(':')
        .map(|(key, value)| (key.trim(), value));

    match value {
        Some((MARKER_OBS_START, value)) => {
            let fields: Vec<&str> = value.split_whitespace().collect();
            let start = timestamp(&fields, lineno)?;
            let system = fields
                .get(2)
                .ok_or_else(|| {
                    Error::InvalidFormat(format!("missing time system at line {lineno}"))
                })?
                .parse()?;
            let week_sow = match fields.get(3..5) {
                Some([w, s]) => week_sow(w, s),
                _ => None,
            };
            Ok(HeaderLine::ObsStart {
                start,
                system,
                week_sow,
            })
        }
        Some((MARKER_OBS_END, value)) => {
            let fields: Vec<&str> = value.split_whitespace().collect();
            Ok(HeaderLine::ObsEnd(timestamp(&fields, lineno)?))
        }
        Some((MARKER_REF_POS, value)) => {
            let coords: Vec<f64> = value
                .split_whitespace()
                .take(3)
                .map(str::parse)
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| {
                    Error::InvalidFormat(format!("invalid ref pos at line {lineno}: {e}"))
                })?;
            match coords[..] {
                [a, b, c] => Ok(HeaderLine::RefPos([a, b, c])),
                _ => Err(Error::InvalidFormat(format!(
                    "ref pos requires 3 values at line {lineno}"
                ))),
            }
        }
        Some((key, _)) if is_setting_key(key) => Ok(HeaderLine::Setting),
        _ => Err(Error::InvalidFormat(format!(
            "unrecognized header line {lineno}: {line:?}"
        ))),
    }
}

fn is_setting_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '/' | '.'))
}

/// Where the header parser is in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// Reading `%` lines before the column line
    Header,
    /// Column line seen; following lines are records
    Body,
}

/// Accumulates header content until the column line is reached.
#[derive(Debug)]
pub(crate) struct HeaderParser {
    state: State,
    obs_start: Option<(String, TimeSystem, Option<(u32, f64)>)>,
    obs_end: Option<String>,
    ref_pos: Option<[f64; 3]>,
}

impl HeaderParser {
    pub(crate) fn new() -> Self {
        Self {
            state: State::Header,
            obs_start: None,
            obs_end: None,
            ref_pos: None,
        }
    }

    /// Feed the next header line, returning the new state.
    ///
    /// # Errors
    /// [Error::InvalidFormat] for unrecognized lines, or
    /// [Error::UnsupportedCoordinates] if the columns are ECEF.
    pub(crate) fn feed(&mut self, line: &str, lineno: usize) -> Result<State> {
        if self.state == State::Body {
            return Ok(State::Body);
        }
        if line.trim().is_empty() {
            return Ok(self.state);
        }

        let kind = classify(line, lineno)?;
        trace!(lineno, ?kind, "header line");
        match kind {
            HeaderLine::ObsStart {
                start,
                system,
                week_sow,
            } => self.obs_start = Some((start, system, week_sow)),
            HeaderLine::ObsEnd(end) => self.obs_end = Some(end),
            HeaderLine::RefPos(pos) => self.ref_pos = Some(pos),
            HeaderLine::Columns(CoordinateType::Llh) => self.state = State::Body,
            HeaderLine::Columns(CoordinateType::Xyz) => {
                error!("XYZ trajectory files are not supported");
                return Err(Error::UnsupportedCoordinates(CoordinateType::Xyz));
            }
            HeaderLine::Setting | HeaderLine::Legend => {}
        }
        Ok(self.state)
    }

    /// Complete the header once the column line has been seen.
    ///
    /// # Errors
    /// [Error::InvalidFormat] if the column line or required fields are missing.
    pub(crate) fn finish(self) -> Result<TrajectoryMetadata> {
        if self.state != State::Body {
            return Err(Error::InvalidFormat(
                "missing coordinate column header".to_string(),
            ));
        }
        let Some((obs_start, time_system, week_sow)) = self.obs_start else {
            return Err(Error::InvalidFormat("missing obs start".to_string()));
        };
        let Some(obs_end) = self.obs_end else {
            return Err(Error::InvalidFormat("missing obs end".to_string()));
        };

        let (gps_week, gps_sow) = match week_sow {
            Some(ws) => ws,
            None => {
                let (ymd, hms) = obs_start
                    .split_once(' ')
                    .unwrap_or((obs_start.as_str(), ""));
                CalendarTime::parse(ymd, hms)
                    .and_then(|c| c.gps_week_sow())
                    .map_err(|e| Error::InvalidFormat(format!("invalid obs start: {e}")))?
            }
        };

        Ok(TrajectoryMetadata {
            obs_start,
            obs_end,
            ref_pos: self.ref_pos,
            time_system,
            coord_type: CoordinateType::Llh,
            gps_week,
            gps_sow,
        })
    }
}
