//! Supported time encodings and their resolutions

use super::epoch::EpochTimeCodec;
use super::zoned::{ZonedDayTimeCodec, ZonedHourTimeCodec, ZonedYearTimeCodec};
use super::TimeCodec;
use crate::error::{Error, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The encodings a time key can be stored with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeResolution {
    Second,
    Minute,
    Hour,
    DayZoned,
    HourZoned,
    YearZoned,
    Millisecond,
    Nanosecond,
}

/// Smallest unit of time a codec can tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TemporalUnit {
    Nanos,
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
    Years,
}

impl TemporalUnit {
    /// Nominal length of the unit. Days and years in a zone can be longer or
    /// shorter than this.
    pub fn nominal_duration(&self) -> Duration {
        match self {
            TemporalUnit::Nanos => Duration::from_nanos(1),
            TemporalUnit::Millis => Duration::from_millis(1),
            TemporalUnit::Seconds => Duration::from_secs(1),
            TemporalUnit::Minutes => Duration::from_secs(60),
            TemporalUnit::Hours => Duration::from_secs(3_600),
            TemporalUnit::Days => Duration::from_secs(86_400),
            TemporalUnit::Years => Duration::from_secs(31_556_952),
        }
    }
}

impl TimeResolution {
    pub const ALL: [TimeResolution; 8] = [
        TimeResolution::Second,
        TimeResolution::Minute,
        TimeResolution::Hour,
        TimeResolution::DayZoned,
        TimeResolution::HourZoned,
        TimeResolution::YearZoned,
        TimeResolution::Millisecond,
        TimeResolution::Nanosecond,
    ];

    /// Bytes written per instant
    pub fn encoded_size(&self) -> usize {
        match self {
            TimeResolution::Second => 4,
            TimeResolution::Minute => 4,
            TimeResolution::Hour => 3,
            TimeResolution::DayZoned => 3,
            TimeResolution::HourZoned => 4,
            TimeResolution::YearZoned => 2,
            TimeResolution::Millisecond => 8,
            TimeResolution::Nanosecond => 8,
        }
    }

    pub fn temporal_unit(&self) -> TemporalUnit {
        match self {
            TimeResolution::Second => TemporalUnit::Seconds,
            TimeResolution::Minute => TemporalUnit::Minutes,
            TimeResolution::Hour | TimeResolution::HourZoned => TemporalUnit::Hours,
            TimeResolution::DayZoned => TemporalUnit::Days,
            TimeResolution::YearZoned => TemporalUnit::Years,
            TimeResolution::Millisecond => TemporalUnit::Millis,
            TimeResolution::Nanosecond => TemporalUnit::Nanos,
        }
    }

    pub fn is_zoned(&self) -> bool {
        matches!(
            self,
            TimeResolution::DayZoned | TimeResolution::HourZoned | TimeResolution::YearZoned
        )
    }

    /// Build the codec for this resolution. Zoned resolutions use `zone`, or
    /// UTC when none is given; the others ignore it.
    pub fn codec(&self, zone: Option<Tz>) -> Box<dyn TimeCodec> {
        let zone = zone.unwrap_or(Tz::UTC);
        match self {
            TimeResolution::Second => Box::new(EpochTimeCodec::seconds()),
            TimeResolution::Minute => Box::new(EpochTimeCodec::minutes()),
            TimeResolution::Hour => Box::new(EpochTimeCodec::hours()),
            TimeResolution::Millisecond => Box::new(EpochTimeCodec::millis()),
            TimeResolution::Nanosecond => Box::new(EpochTimeCodec::nanos()),
            TimeResolution::DayZoned => Box::new(ZonedDayTimeCodec::new(zone)),
            TimeResolution::HourZoned => Box::new(ZonedHourTimeCodec::new(zone)),
            TimeResolution::YearZoned => Box::new(ZonedYearTimeCodec::new(zone)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TimeResolution::Second => "SECOND",
            TimeResolution::Minute => "MINUTE",
            TimeResolution::Hour => "HOUR",
            TimeResolution::DayZoned => "DAY_ZONED",
            TimeResolution::HourZoned => "HOUR_ZONED",
            TimeResolution::YearZoned => "YEAR_ZONED",
            TimeResolution::Millisecond => "MILLISECOND",
            TimeResolution::Nanosecond => "NANOSECOND",
        }
    }
}

impl fmt::Display for TimeResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TimeResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalised = s.trim().to_ascii_uppercase().replace('-', "_");
        TimeResolution::ALL
            .into_iter()
            .find(|resolution| resolution.name() == normalised)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown time resolution: {}", s)))
    }
}

/// Parse an IANA zone id such as `Europe/London`
pub fn parse_zone(id: &str) -> Result<Tz> {
    id.parse::<Tz>()
        .map_err(|e| Error::InvalidArgument(format!("Unknown time zone '{}': {}", id, e)))
}
