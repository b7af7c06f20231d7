//! Time Codecs
//!
//! Fixed-width binary encodings of instants for use in lookup keys. Every
//! codec floors to its resolution and writes big-endian, so byte order
//! matches time order for keys built with the same codec.
//!
//! ```text
//! SECOND       4 bytes   seconds since 2000-01-01T00:00Z
//! MINUTE       4 bytes   minutes since 1970
//! HOUR         3 bytes   hours since 1970
//! DAY_ZONED    3 bytes   local epoch-day
//! HOUR_ZONED   4 bytes   local epoch-day + hours into that day
//! YEAR_ZONED   2 bytes   local year
//! MILLISECOND  8 bytes   millis since 1970
//! NANOSECOND   8 bytes   nanos since 1970
//! ```

pub mod epoch;
pub mod resolution;
pub mod zoned;

pub use epoch::{EpochTimeCodec, Y2K_EPOCH_SECONDS};
pub use resolution::{parse_zone, TemporalUnit, TimeResolution};
pub use zoned::{ZonedDayTimeCodec, ZonedHourTimeCodec, ZonedYearTimeCodec};

use crate::error::{Error, Result};
use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};
use std::fmt;

/// Reads and writes instants at a fixed resolution
pub trait TimeCodec: Send + Sync + fmt::Debug {
    fn resolution(&self) -> TimeResolution;

    /// Bytes consumed by one encoded instant, between 1 and 8
    fn encoded_size(&self) -> usize;

    fn temporal_unit(&self) -> TemporalUnit;

    /// Append the encoded instant to `buf`
    fn write(&self, buf: &mut dyn BufMut, instant: DateTime<Utc>) -> Result<()>;

    /// Consume one encoded instant from `buf`
    fn read(&self, buf: &mut dyn Buf) -> Result<DateTime<Utc>>;

    /// The instant this codec would decode `instant` back to
    fn floor(&self, instant: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let mut scratch = [0u8; 8];
        let size = self.encoded_size();
        {
            let mut out: &mut [u8] = &mut scratch[..size];
            self.write(&mut out, instant)?;
        }
        self.read(&mut &scratch[..size])
    }

    /// Write `prefix` followed by the encoded instant
    fn write_key(&self, buf: &mut dyn BufMut, prefix: &[u8], instant: DateTime<Utc>) -> Result<()> {
        if buf.remaining_mut() < prefix.len() + self.encoded_size() {
            return Err(Error::Usage(format!(
                "Key needs {} bytes but only {} remain",
                prefix.len() + self.encoded_size(),
                buf.remaining_mut()
            )));
        }
        buf.put_slice(prefix);
        self.write(buf, instant)
    }
}

pub(crate) fn check_writable<C: TimeCodec + ?Sized>(codec: &C, buf: &dyn BufMut) -> Result<()> {
    if buf.remaining_mut() < codec.encoded_size() {
        return Err(Error::Usage(format!(
            "{} codec needs {} bytes but only {} remain",
            codec.resolution(),
            codec.encoded_size(),
            buf.remaining_mut()
        )));
    }
    Ok(())
}

pub(crate) fn check_readable<C: TimeCodec + ?Sized>(codec: &C, buf: &dyn Buf) -> Result<()> {
    if buf.remaining() < codec.encoded_size() {
        return Err(Error::Usage(format!(
            "{} codec needs {} bytes but only {} are available",
            codec.resolution(),
            codec.encoded_size(),
            buf.remaining()
        )));
    }
    Ok(())
}
