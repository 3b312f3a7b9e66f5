//! Calendar time to GPS week and seconds-of-week.
//!
//! Reference: IS-GPS-200, section 20.3.3.3.3.1; Fliegel & Van Flandern (1968) for the
//! Gregorian calendar to Julian day number conversion.
use chrono::{NaiveDate, NaiveDateTime};

use crate::{Error, Result};

/// Julian day number of the GPS epoch, 1980-01-06.
pub const GPS_EPOCH_JDN: i64 = 2_444_245;
pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const SECONDS_PER_WEEK: f64 = 604_800.0;

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Julian day number (the day starting at noon) for a Gregorian calendar date.
fn julian_day_number(year: i32, month: u32, day: u32) -> i64 {
    let (year, month, day) = (i64::from(year), i64::from(month), i64::from(day));
    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    day + (153 * m + 2) / 5 + 365 * y + y / 4 - y / 100 + y / 400 - 32045
}

/// Convert a calendar time to GPS week number and seconds-of-week.
///
/// The calendar time is taken to be on the GPS time scale; no leap seconds are applied.
///
/// # Errors
/// [Error::InvalidTime] if any field is outside its calendar range or the time is before
/// the GPS epoch.
pub fn calendar_to_gps_week_sow(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: f64,
) -> Result<(u32, f64)> {
    if !(1..=12).contains(&month) {
        return Err(Error::InvalidTime(format!("month {month}")));
    }
    if day < 1 || day > days_in_month(year, month) {
        return Err(Error::InvalidTime(format!("day {day} for {year}-{month:02}")));
    }
    if hour > 23 {
        return Err(Error::InvalidTime(format!("hour {hour}")));
    }
    if minute > 59 {
        return Err(Error::InvalidTime(format!("minute {minute}")));
    }
    if !(0.0..60.0).contains(&second) {
        return Err(Error::InvalidTime(format!("second {second}")));
    }

    let days = julian_day_number(year, month, day) - GPS_EPOCH_JDN;
    if days < 0 {
        return Err(Error::InvalidTime(format!(
            "{year}-{month:02}-{day:02} is before the GPS epoch"
        )));
    }
    let week = u32::try_from(days / 7)
        .map_err(|_| Error::InvalidTime(format!("week out of range for year {year}")))?;
    let day_of_week = (days % 7) as f64;
    let sow = day_of_week * SECONDS_PER_DAY
        + f64::from(hour) * 3600.0
        + f64::from(minute) * 60.0
        + second;

    Ok((week, sow))
}

/// Calendar fields read from the fixed-width `YYYY/MM/DD` and `HH:MM:SS.ffffff` strings
/// used by RTKLIB solution files.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalendarTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: f64,
}

fn field<T: std::str::FromStr>(
    s: &str,
    range: std::ops::RangeFrom<usize>,
    name: &str,
) -> Result<T> {
    s.get(range)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::InvalidTime(format!("invalid {name} in {s:?}")))
}

fn fixed<T: std::str::FromStr>(s: &str, range: std::ops::Range<usize>, name: &str) -> Result<T> {
    s.get(range)
        .filter(|v| v.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::InvalidTime(format!("invalid {name} in {s:?}")))
}

impl CalendarTime {
    /// Parse date `YYYY/MM/DD` and time `HH:MM:SS[.f]` strings by fixed character offsets.
    ///
    /// # Errors
    /// [Error::InvalidTime] if a field is missing or not numeric. Ranges are not checked
    /// here; see [CalendarTime::gps_week_sow] and [CalendarTime::to_naive].
    pub fn parse(ymd: &str, hms: &str) -> Result<Self> {
        Ok(CalendarTime {
            year: fixed(ymd, 0..4, "year")?,
            month: fixed(ymd, 5..7, "month")?,
            day: fixed(ymd, 8..10, "day")?,
            hour: fixed(hms, 0..2, "hour")?,
            minute: fixed(hms, 3..5, "minute")?,
            second: field(hms, 6.., "second")?,
        })
    }

    /// GPS week and seconds-of-week for this time.
    ///
    /// # Errors
    /// See [calendar_to_gps_week_sow].
    pub fn gps_week_sow(&self) -> Result<(u32, f64)> {
        calendar_to_gps_week_sow(
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        )
    }

    /// Timestamp without a time zone, with nanosecond resolution.
    ///
    /// # Errors
    /// [Error::InvalidTime] if the fields do not form a valid date and time.
    pub fn to_naive(&self) -> Result<NaiveDateTime> {
        let invalid = || Error::InvalidTime(format!("{self:?}"));
        if !(0.0..60.0).contains(&self.second) {
            return Err(invalid());
        }
        let whole = self.second.trunc();
        let nanos = (((self.second - whole) * 1e9).round() as u32).min(999_999_999);
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|d| d.and_hms_nano_opt(self.hour, self.minute, whole as u32, nanos))
            .ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1980, 1, 6, 0, 0, 0.0, 0, 0.0 ; "gps epoch")]
    #[test_case(1980, 1, 12, 23, 59, 59.5, 0, 604_799.5 ; "end of first week")]
    #[test_case(1980, 1, 13, 0, 0, 0.0, 1, 0.0 ; "start of second week")]
    #[test_case(1999, 8, 22, 0, 0, 0.0, 1024, 0.0 ; "first rollover")]
    #[test_case(2023, 6, 17, 6, 40, 38.0, 2266, 542_438.0 ; "saturday")]
    #[test_case(2024, 2, 29, 12, 0, 0.0, 2303, 388_800.0 ; "leap day")]
    #[test_case(2025, 4, 19, 9, 47, 8.0, 2362, 553_628.0 ; "april 2025")]
    fn known_dates(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: f64, week: u32, sow: f64) {
        let (w, t) = calendar_to_gps_week_sow(y, mo, d, h, mi, s).unwrap();
        assert_eq!(w, week);
        assert!((t - sow).abs() < 1e-9, "sow={t}");
    }

    #[test]
    fn week_steps_every_seven_days() {
        let start = NaiveDate::from_ymd_opt(2019, 12, 3).unwrap();
        let (w0, s0) = calendar_to_gps_week_sow(2019, 12, 3, 10, 0, 0.0).unwrap();
        for k in 1..200u64 {
            let date = start + chrono::Days::new(7 * k);
            let (w, s) = calendar_to_gps_week_sow(
                chrono::Datelike::year(&date),
                chrono::Datelike::month(&date),
                chrono::Datelike::day(&date),
                10,
                0,
                0.0,
            )
            .unwrap();
            assert_eq!(w, w0 + k as u32, "date={date}");
            assert_eq!(s, s0);
        }
    }

    #[test]
    fn sow_in_range_for_every_day() {
        let mut date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        for _ in 0..800 {
            let (_, sow) = calendar_to_gps_week_sow(
                chrono::Datelike::year(&date),
                chrono::Datelike::month(&date),
                chrono::Datelike::day(&date),
                23,
                59,
                59.999_999,
            )
            .unwrap();
            assert!((0.0..SECONDS_PER_WEEK).contains(&sow), "date={date} sow={sow}");
            date = date.succ_opt().unwrap();
        }
    }

    #[test_case(2023, 13, 1, 0, 0, 0.0 ; "month")]
    #[test_case(2023, 2, 29, 0, 0, 0.0 ; "not a leap year")]
    #[test_case(1900, 2, 29, 0, 0, 0.0 ; "century not a leap year")]
    #[test_case(2023, 4, 31, 0, 0, 0.0 ; "day")]
    #[test_case(2023, 4, 1, 24, 0, 0.0 ; "hour")]
    #[test_case(2023, 4, 1, 0, 60, 0.0 ; "minute")]
    #[test_case(2023, 4, 1, 0, 0, 60.0 ; "second")]
    #[test_case(2023, 4, 1, 0, 0, -0.5 ; "negative second")]
    #[test_case(1980, 1, 5, 23, 59, 59.0 ; "before epoch")]
    fn invalid_input(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: f64) {
        let zult = calendar_to_gps_week_sow(y, mo, d, h, mi, s);
        assert!(matches!(zult, Err(Error::InvalidTime(_))), "{zult:?}");
    }

    #[test]
    fn parse_fixed_width() {
        let cal = CalendarTime::parse("2023/06/17", "06:40:38.250000").unwrap();
        assert_eq!(
            cal,
            CalendarTime {
                year: 2023,
                month: 6,
                day: 17,
                hour: 6,
                minute: 40,
                second: 38.25,
            }
        );
        let naive = cal.to_naive().unwrap();
        assert_eq!(naive.to_string(), "2023-06-17 06:40:38.250");
    }

    #[test_case("2023-06-1", "06:40:38.0" ; "short date")]
    #[test_case("2023/0a/17", "06:40:38.0" ; "letters in month")]
    #[test_case("2023/06/17", "06:40" ; "missing seconds")]
    #[test_case("2023/06/17", "6:40:38.0" ; "unpadded hour")]
    fn parse_rejects(ymd: &str, hms: &str) {
        assert!(CalendarTime::parse(ymd, hms).is_err());
    }
}
