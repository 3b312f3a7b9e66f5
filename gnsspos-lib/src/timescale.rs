//! Time scale conversions between the log clock, UTC, and a civil time zone.
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::Error;

/// GPST - UTC in seconds since 2017-01-01.
pub const DEFAULT_LEAP_SECONDS: i32 = 18;
pub const DEFAULT_CIVIL_ZONE: Tz = chrono_tz::Europe::Rome;

/// Time system a solution file declares for its timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeSystem {
    Gpst,
    Utc,
}

impl FromStr for TimeSystem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpst" => Ok(TimeSystem::Gpst),
            "utc" => Ok(TimeSystem::Utc),
            _ => Err(Error::InvalidFormat(format!("unknown time system {s:?}"))),
        }
    }
}

impl Display for TimeSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSystem::Gpst => write!(f, "GPST"),
            TimeSystem::Utc => write!(f, "UTC"),
        }
    }
}

/// Leap second offset and civil time zone used to derive UTC and local timestamps.
///
/// The leap second count is fixed for the whole dataset; it is not looked up from a
/// leap second table.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeScales {
    /// GPST - UTC in seconds.
    #[builder(default = DEFAULT_LEAP_SECONDS)]
    #[cfg_attr(feature = "serde", serde(default = "default_leap_seconds"))]
    pub leap_seconds: i32,
    /// IANA zone for civil timestamps. Daylight saving follows the zone's rules.
    #[builder(default = DEFAULT_CIVIL_ZONE)]
    #[cfg_attr(feature = "serde", serde(default = "default_civil_zone"))]
    pub civil_zone: Tz,
}

#[cfg(feature = "serde")]
fn default_leap_seconds() -> i32 {
    DEFAULT_LEAP_SECONDS
}

#[cfg(feature = "serde")]
fn default_civil_zone() -> Tz {
    DEFAULT_CIVIL_ZONE
}

impl Default for TimeScales {
    fn default() -> Self {
        TimeScales::builder().build()
    }
}

impl TimeScales {
    /// Interpret `naive` on the GPS time scale and return the UTC instant.
    #[must_use]
    pub fn gpst_to_utc(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        (naive - Duration::seconds(i64::from(self.leap_seconds))).and_utc()
    }

    /// Interpret `naive` on `system` and return the UTC instant. Only GPST is shifted.
    #[must_use]
    pub fn to_utc(&self, naive: NaiveDateTime, system: TimeSystem) -> DateTime<Utc> {
        match system {
            TimeSystem::Gpst => self.gpst_to_utc(naive),
            TimeSystem::Utc => naive.and_utc(),
        }
    }

    #[must_use]
    pub fn to_civil(&self, utc: &DateTime<Utc>) -> DateTime<Tz> {
        utc.with_timezone(&self.civil_zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn gpst_is_ahead_of_utc() {
        let ts = TimeScales::default();
        let utc = ts.gpst_to_utc(naive(2023, 6, 17, 6, 40, 38));
        assert_eq!(utc.naive_utc(), naive(2023, 6, 17, 6, 40, 20));
    }

    #[test]
    fn utc_is_not_shifted() {
        let ts = TimeScales::default();
        let utc = ts.to_utc(naive(2023, 6, 17, 6, 40, 38), TimeSystem::Utc);
        assert_eq!(utc.naive_utc(), naive(2023, 6, 17, 6, 40, 38));
    }

    #[test]
    fn leap_seconds_crossing_midnight() {
        let ts = TimeScales::builder().leap_seconds(18).build();
        let utc = ts.gpst_to_utc(naive(2024, 1, 1, 0, 0, 5));
        assert_eq!(utc.naive_utc(), naive(2023, 12, 31, 23, 59, 47));
    }

    #[test]
    fn overridden_leap_seconds() {
        let ts = TimeScales::builder().leap_seconds(17).build();
        let utc = ts.gpst_to_utc(naive(2016, 6, 1, 0, 0, 17));
        assert_eq!(utc.naive_utc(), naive(2016, 6, 1, 0, 0, 0));
    }

    #[test]
    fn civil_follows_daylight_saving() {
        let ts = TimeScales::default();
        let winter = ts.to_civil(&naive(2023, 1, 10, 12, 0, 0).and_utc());
        let summer = ts.to_civil(&naive(2023, 7, 10, 12, 0, 0).and_utc());
        assert_eq!(winter.hour(), 13);
        assert_eq!(summer.hour(), 14);

        // Europe/Rome switches to CEST at 01:00 UTC on 2023-03-26
        let before = ts.to_civil(&naive(2023, 3, 26, 0, 59, 59).and_utc());
        let after = ts.to_civil(&naive(2023, 3, 26, 1, 0, 0).and_utc());
        assert_eq!(before.naive_local(), naive(2023, 3, 26, 1, 59, 59));
        assert_eq!(after.naive_local(), naive(2023, 3, 26, 3, 0, 0));
    }

    #[test]
    fn other_zone() {
        let ts = TimeScales::builder()
            .civil_zone(chrono_tz::Asia::Tokyo)
            .build();
        let civil = ts.to_civil(&naive(2023, 7, 10, 12, 0, 0).and_utc());
        assert_eq!(civil.hour(), 21);
    }

    #[test]
    fn parse_time_system() {
        assert_eq!("GPST".parse::<TimeSystem>().unwrap(), TimeSystem::Gpst);
        assert_eq!("gpst".parse::<TimeSystem>().unwrap(), TimeSystem::Gpst);
        assert_eq!("UTC".parse::<TimeSystem>().unwrap(), TimeSystem::Utc);
        assert!("JST".parse::<TimeSystem>().unwrap_err().is_invalid_format());
    }
}
