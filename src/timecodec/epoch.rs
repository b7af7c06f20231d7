//! Codecs that count fixed-length units from an epoch

use super::resolution::{TemporalUnit, TimeResolution};
use super::{check_readable, check_writable, TimeCodec};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};

/// 2000-01-01T00:00:00Z in seconds since the Unix epoch
pub const Y2K_EPOCH_SECONDS: i64 = 946_684_800;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Unsigned count of units since an epoch, stored big-endian in a fixed width.
///
/// The count is floored, so the decoded instant is always the start of the
/// unit the original instant fell in.
#[derive(Debug, Clone, Copy)]
pub struct EpochTimeCodec {
    resolution: TimeResolution,
    /// Length of one unit in nanoseconds
    unit_nanos: i64,
    /// Epoch as a count of units since 1970
    epoch_offset: i64,
    width: usize,
}

impl EpochTimeCodec {
    /// 4 bytes of seconds since 2000-01-01, good until 2136
    pub fn seconds() -> Self {
        Self {
            resolution: TimeResolution::Second,
            unit_nanos: NANOS_PER_SECOND,
            epoch_offset: Y2K_EPOCH_SECONDS,
            width: 4,
        }
    }

    /// 4 bytes of minutes since 1970
    pub fn minutes() -> Self {
        Self {
            resolution: TimeResolution::Minute,
            unit_nanos: 60 * NANOS_PER_SECOND,
            epoch_offset: 0,
            width: 4,
        }
    }

    /// 3 bytes of hours since 1970, good for about 1900 years
    pub fn hours() -> Self {
        Self {
            resolution: TimeResolution::Hour,
            unit_nanos: 3_600 * NANOS_PER_SECOND,
            epoch_offset: 0,
            width: 3,
        }
    }

    /// 8 bytes of milliseconds since 1970
    pub fn millis() -> Self {
        Self {
            resolution: TimeResolution::Millisecond,
            unit_nanos: 1_000_000,
            epoch_offset: 0,
            width: 8,
        }
    }

    /// 8 bytes of nanoseconds since 1970
    pub fn nanos() -> Self {
        Self {
            resolution: TimeResolution::Nanosecond,
            unit_nanos: 1,
            epoch_offset: 0,
            width: 8,
        }
    }

    fn max_count(&self) -> u64 {
        if self.width >= 8 {
            u64::MAX
        } else {
            (1u64 << (self.width * 8)) - 1
        }
    }

    /// Whole units since 1970, floored. `None` if the count overflows an i64.
    fn units_since_unix_epoch(&self, instant: DateTime<Utc>) -> Option<i64> {
        if self.unit_nanos >= NANOS_PER_SECOND {
            Some(instant.timestamp().div_euclid(self.unit_nanos / NANOS_PER_SECOND))
        } else {
            let per_second = NANOS_PER_SECOND / self.unit_nanos;
            let sub_second = instant.timestamp_subsec_nanos() as i64 / self.unit_nanos;
            instant
                .timestamp()
                .checked_mul(per_second)
                .and_then(|units| units.checked_add(sub_second))
        }
    }

    /// Encoded count for an instant, failing if it does not fit the width
    pub fn count_for(&self, instant: DateTime<Utc>) -> Result<u64> {
        let count = self
            .units_since_unix_epoch(instant)
            .and_then(|units| units.checked_sub(self.epoch_offset))
            .filter(|count| *count >= 0);
        match count {
            Some(count) if (count as u64) <= self.max_count() => Ok(count as u64),
            _ => Err(Error::OutOfRange(format!(
                "{} cannot be encoded by the {} codec ({} bytes)",
                instant.to_rfc3339(),
                self.resolution,
                self.width
            ))),
        }
    }

    /// Instant for an encoded count
    pub fn instant_for(&self, count: u64) -> Result<DateTime<Utc>> {
        let out_of_range = || {
            Error::OutOfRange(format!(
                "Count {} is outside the range of the {} codec",
                count, self.resolution
            ))
        };
        let units = i64::try_from(count)
            .ok()
            .and_then(|count| count.checked_add(self.epoch_offset))
            .ok_or_else(out_of_range)?;

        let instant = if self.unit_nanos >= NANOS_PER_SECOND {
            units
                .checked_mul(self.unit_nanos / NANOS_PER_SECOND)
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
        } else {
            let per_second = NANOS_PER_SECOND / self.unit_nanos;
            let secs = units.div_euclid(per_second);
            let nanos = (units.rem_euclid(per_second) * self.unit_nanos) as u32;
            DateTime::from_timestamp(secs, nanos)
        };
        instant.ok_or_else(out_of_range)
    }
}

impl TimeCodec for EpochTimeCodec {
    fn resolution(&self) -> TimeResolution {
        self.resolution
    }

    fn encoded_size(&self) -> usize {
        self.width
    }

    fn temporal_unit(&self) -> TemporalUnit {
        self.resolution.temporal_unit()
    }

    fn write(&self, buf: &mut dyn BufMut, instant: DateTime<Utc>) -> Result<()> {
        check_writable(self, buf)?;
        let count = self.count_for(instant)?;
        buf.put_uint(count, self.width);
        Ok(())
    }

    fn read(&self, buf: &mut dyn Buf) -> Result<DateTime<Utc>> {
        check_readable(self, buf)?;
        let count = buf.get_uint(self.width);
        self.instant_for(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_seconds_offset_from_2000() -> Result<()> {
        let codec = EpochTimeCodec::seconds();
        assert_eq!(codec.count_for(utc(2000, 1, 1, 0, 0, 0))?, 0);
        assert_eq!(codec.count_for(utc(2000, 1, 1, 0, 1, 1))?, 61);

        // Before the offset epoch is out of range
        assert!(matches!(
            codec.count_for(utc(1999, 12, 31, 23, 59, 59)),
            Err(Error::OutOfRange(_))
        ));

        // A raw u32 from 1970 would stop in 2106; the offset reaches 2136
        assert!(codec.count_for(utc(2130, 1, 1, 0, 0, 0)).is_ok());
        assert!(codec.count_for(utc(2137, 1, 1, 0, 0, 0)).is_err());
        Ok(())
    }

    #[test]
    fn test_hours_width() -> Result<()> {
        let codec = EpochTimeCodec::hours();
        let mut buf = Vec::new();
        codec.write(&mut buf, utc(1970, 1, 2, 1, 59, 59))?;
        assert_eq!(buf, vec![0, 0, 25]);
        assert!(codec.count_for(utc(3900, 1, 1, 0, 0, 0)).is_err());
        Ok(())
    }

    #[test]
    fn test_floor_not_round() -> Result<()> {
        let codec = EpochTimeCodec::minutes();
        let instant = utc(2024, 6, 1, 10, 30, 59);
        let mut buf = Vec::new();
        codec.write(&mut buf, instant)?;
        assert_eq!(codec.read(&mut buf.as_slice())?, utc(2024, 6, 1, 10, 30, 0));
        Ok(())
    }

    #[test]
    fn test_millis_keeps_sub_second() -> Result<()> {
        let codec = EpochTimeCodec::millis();
        let instant = utc(2024, 6, 1, 10, 30, 59) + chrono::Duration::nanoseconds(123_456_789);
        let mut buf = Vec::new();
        codec.write(&mut buf, instant)?;
        assert_eq!(buf.len(), 8);
        let read = codec.read(&mut buf.as_slice())?;
        assert_eq!(read.timestamp_subsec_nanos(), 123_000_000);
        Ok(())
    }

    #[test]
    fn test_nanos_exact() -> Result<()> {
        let codec = EpochTimeCodec::nanos();
        let instant = utc(2200, 2, 3, 4, 5, 6) + chrono::Duration::nanoseconds(7);
        let mut buf = Vec::new();
        codec.write(&mut buf, instant)?;
        assert_eq!(codec.read(&mut buf.as_slice())?, instant);
        assert!(codec.count_for(utc(1969, 12, 31, 23, 59, 59)).is_err());
        assert!(codec.count_for(utc(2300, 1, 1, 0, 0, 0)).is_err());
        Ok(())
    }

    #[test]
    fn test_byte_order_matches_time_order() -> Result<()> {
        let codec = EpochTimeCodec::seconds();
        let (mut early, mut late) = (Vec::new(), Vec::new());
        codec.write(&mut early, utc(2010, 5, 1, 0, 0, 0))?;
        codec.write(&mut late, utc(2010, 5, 1, 0, 4, 16))?;
        assert!(early < late);
        Ok(())
    }
}
