//! Codecs that decompose an instant into calendar fields in a time zone
//!
//! Day and hour boundaries in a zone with daylight saving do not sit a fixed
//! duration apart, so these codecs work from the local date rather than doing
//! arithmetic on a UTC count.

use super::resolution::{TemporalUnit, TimeResolution};
use super::{check_readable, check_writable, TimeCodec};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const DAY_WIDTH: usize = 3;
const MAX_EPOCH_DAY: i64 = (1 << (DAY_WIDTH * 8)) - 1;

fn unix_epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// First instant at or after `local` on the zone's clock. Gaps (e.g. a
/// midnight spring-forward) resolve to the first valid minute after them.
fn start_of_local(zone: &Tz, local: NaiveDateTime) -> Result<DateTime<Utc>> {
    let mut candidate = local;
    // Transitions never skip more than a few hours
    for _ in 0..(6 * 60) {
        match zone.from_local_datetime(&candidate) {
            LocalResult::Single(t) => return Ok(t.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => candidate += Duration::minutes(1),
        }
    }
    Err(Error::OutOfRange(format!(
        "No valid instant for {} in zone {}",
        local, zone
    )))
}

/// Local date in the zone, as 3 bytes of days since 1970-01-01
#[derive(Debug, Clone, Copy)]
pub struct ZonedDayTimeCodec {
    zone: Tz,
}

impl ZonedDayTimeCodec {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn epoch_day_for(&self, instant: DateTime<Utc>) -> Result<u32> {
        let local_date = instant.with_timezone(&self.zone).date_naive();
        let epoch_day = local_date.signed_duration_since(unix_epoch_date()).num_days();
        if (0..=MAX_EPOCH_DAY).contains(&epoch_day) {
            Ok(epoch_day as u32)
        } else {
            Err(Error::OutOfRange(format!(
                "{} (local date {}) cannot be encoded by the {} codec",
                instant.to_rfc3339(),
                local_date,
                TimeResolution::DayZoned
            )))
        }
    }

    /// Start of the given local day, as an instant
    pub fn start_of_epoch_day(&self, epoch_day: u32) -> Result<DateTime<Utc>> {
        let date = unix_epoch_date()
            .checked_add_signed(Duration::days(epoch_day as i64))
            .ok_or_else(|| Error::OutOfRange(format!("Epoch day {} is not a valid date", epoch_day)))?;
        start_of_local(&self.zone, date.and_time(chrono::NaiveTime::MIN))
    }
}

impl TimeCodec for ZonedDayTimeCodec {
    fn resolution(&self) -> TimeResolution {
        TimeResolution::DayZoned
    }

    fn encoded_size(&self) -> usize {
        DAY_WIDTH
    }

    fn temporal_unit(&self) -> TemporalUnit {
        TemporalUnit::Days
    }

    fn write(&self, buf: &mut dyn BufMut, instant: DateTime<Utc>) -> Result<()> {
        check_writable(self, buf)?;
        let epoch_day = self.epoch_day_for(instant)?;
        buf.put_uint(epoch_day as u64, DAY_WIDTH);
        Ok(())
    }

    fn read(&self, buf: &mut dyn Buf) -> Result<DateTime<Utc>> {
        check_readable(self, buf)?;
        let epoch_day = buf.get_uint(DAY_WIDTH) as u32;
        self.start_of_epoch_day(epoch_day)
    }
}

/// Local date plus a one byte count of whole hours elapsed since the start of
/// that local day.
///
/// Reading adds the hour count to the decoded start of day, so the repeated
/// hour when clocks go back and the short day when they go forward both
/// decode to the right wall-clock hour.
#[derive(Debug, Clone, Copy)]
pub struct ZonedHourTimeCodec {
    day: ZonedDayTimeCodec,
}

impl ZonedHourTimeCodec {
    pub fn new(zone: Tz) -> Self {
        Self {
            day: ZonedDayTimeCodec::new(zone),
        }
    }

    pub fn zone(&self) -> Tz {
        self.day.zone()
    }
}

impl TimeCodec for ZonedHourTimeCodec {
    fn resolution(&self) -> TimeResolution {
        TimeResolution::HourZoned
    }

    fn encoded_size(&self) -> usize {
        DAY_WIDTH + 1
    }

    fn temporal_unit(&self) -> TemporalUnit {
        TemporalUnit::Hours
    }

    fn write(&self, buf: &mut dyn BufMut, instant: DateTime<Utc>) -> Result<()> {
        check_writable(self, buf)?;
        let epoch_day = self.day.epoch_day_for(instant)?;
        let start_of_day = self.day.start_of_epoch_day(epoch_day)?;
        let hours = instant.signed_duration_since(start_of_day).num_hours();
        let hours = u8::try_from(hours).map_err(|_| {
            Error::Internal(format!(
                "{} is {} hours after the start of its local day",
                instant.to_rfc3339(),
                hours
            ))
        })?;
        buf.put_uint(epoch_day as u64, DAY_WIDTH);
        buf.put_u8(hours);
        Ok(())
    }

    fn read(&self, buf: &mut dyn Buf) -> Result<DateTime<Utc>> {
        check_readable(self, buf)?;
        let epoch_day = buf.get_uint(DAY_WIDTH) as u32;
        let hours = buf.get_u8();
        let start_of_day = self.day.start_of_epoch_day(epoch_day)?;
        Ok(start_of_day + Duration::hours(hours as i64))
    }
}

/// Local calendar year in the zone, as 2 bytes
#[derive(Debug, Clone, Copy)]
pub struct ZonedYearTimeCodec {
    zone: Tz,
}

impl ZonedYearTimeCodec {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }
}

impl TimeCodec for ZonedYearTimeCodec {
    fn resolution(&self) -> TimeResolution {
        TimeResolution::YearZoned
    }

    fn encoded_size(&self) -> usize {
        2
    }

    fn temporal_unit(&self) -> TemporalUnit {
        TemporalUnit::Years
    }

    fn write(&self, buf: &mut dyn BufMut, instant: DateTime<Utc>) -> Result<()> {
        check_writable(self, buf)?;
        let year = instant.with_timezone(&self.zone).year();
        let year = u16::try_from(year).map_err(|_| {
            Error::OutOfRange(format!(
                "Year {} of {} cannot be encoded by the {} codec",
                year,
                instant.to_rfc3339(),
                TimeResolution::YearZoned
            ))
        })?;
        buf.put_u16(year);
        Ok(())
    }

    fn read(&self, buf: &mut dyn Buf) -> Result<DateTime<Utc>> {
        check_readable(self, buf)?;
        let year = buf.get_u16();
        let new_year = NaiveDate::from_ymd_opt(year as i32, 1, 1)
            .ok_or_else(|| Error::OutOfRange(format!("Year {} is not a valid date", year)))?;
        start_of_local(&self.zone, new_year.and_time(chrono::NaiveTime::MIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn round_trip(codec: &dyn TimeCodec, instant: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let mut buf = Vec::new();
        codec.write(&mut buf, instant)?;
        assert_eq!(buf.len(), codec.encoded_size());
        codec.read(&mut buf.as_slice())
    }

    #[test]
    fn test_day_uses_local_date() -> Result<()> {
        let codec = ZonedDayTimeCodec::new(Tz::America__New_York);
        // 02:00 UTC on the 2nd is still the 1st in New York
        let read = round_trip(&codec, utc(2024, 3, 2, 2, 0))?;
        assert_eq!(read, utc(2024, 3, 1, 5, 0));
        Ok(())
    }

    #[test]
    fn test_day_in_utc() -> Result<()> {
        let codec = ZonedDayTimeCodec::new(Tz::UTC);
        assert_eq!(codec.epoch_day_for(utc(1970, 1, 2, 23, 59))?, 1);
        assert_eq!(round_trip(&codec, utc(2024, 7, 4, 13, 30))?, utc(2024, 7, 4, 0, 0));
        assert!(codec.epoch_day_for(utc(1969, 12, 31, 12, 0)).is_err());
        Ok(())
    }

    #[test]
    fn test_hour_across_spring_forward() -> Result<()> {
        // London skips 01:00-02:00 local on 2024-03-31
        let codec = ZonedHourTimeCodec::new(Tz::Europe__London);
        let zone = Tz::Europe__London;

        for utc_hour in 0..6 {
            let instant = utc(2024, 3, 31, utc_hour, 45);
            let read = round_trip(&codec, instant)?;
            let expected = instant.with_timezone(&zone);
            let actual = read.with_timezone(&zone);
            assert_eq!(actual.date_naive(), expected.date_naive());
            assert_eq!(actual.hour(), expected.hour());
            assert_eq!(actual.minute(), 0);
        }
        Ok(())
    }

    #[test]
    fn test_hour_across_fall_back() -> Result<()> {
        // London repeats 01:00-02:00 local on 2024-10-27
        let codec = ZonedHourTimeCodec::new(Tz::Europe__London);
        let first = utc(2024, 10, 27, 0, 30);
        let second = utc(2024, 10, 27, 1, 30);
        assert_eq!(
            first.with_timezone(&Tz::Europe__London).hour(),
            second.with_timezone(&Tz::Europe__London).hour()
        );

        assert_eq!(round_trip(&codec, first)?, utc(2024, 10, 27, 0, 0));
        assert_eq!(round_trip(&codec, second)?, utc(2024, 10, 27, 1, 0));
        Ok(())
    }

    #[test]
    fn test_hour_layout() -> Result<()> {
        let codec = ZonedHourTimeCodec::new(Tz::UTC);
        let mut buf = Vec::new();
        codec.write(&mut buf, utc(1970, 1, 3, 7, 59))?;
        assert_eq!(buf, vec![0, 0, 2, 7]);
        Ok(())
    }

    #[test]
    fn test_year() -> Result<()> {
        let codec = ZonedYearTimeCodec::new(Tz::Australia__Sydney);
        // Already 2025 in Sydney
        let read = round_trip(&codec, utc(2024, 12, 31, 20, 0))?;
        assert_eq!(read.with_timezone(&Tz::Australia__Sydney).year(), 2025);
        assert_eq!(read, utc(2024, 12, 31, 13, 0));
        Ok(())
    }

    #[test]
    fn test_midnight_gap_resolves_forward() -> Result<()> {
        // Santiago springs forward at local midnight on 2024-09-08
        let zone = Tz::America__Santiago;
        let local = NaiveDate::from_ymd_opt(2024, 9, 8)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let start = start_of_local(&zone, local)?;
        assert_eq!(start.with_timezone(&zone).hour(), 1);
        Ok(())
    }
}
