//! Time unit a datapoint was written in.
//!
//! The unit travels with every datapoint as a single byte. Byte values are
//! part of the on-disk format and must never be renumbered.

use serde::{Deserialize, Serialize};

/// Time unit of a datapoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TimeUnit {
    /// Unit not specified
    #[default]
    None = 0,
    /// Seconds
    Second = 1,
    /// Milliseconds
    Millisecond = 2,
    /// Microseconds
    Microsecond = 3,
    /// Nanoseconds
    Nanosecond = 4,
    /// Minutes
    Minute = 5,
    /// Hours
    Hour = 6,
    /// Days
    Day = 7,
    /// 365-day years
    Year = 8,
}

/// Byte that does not name a known [`TimeUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid time unit byte: {0}")]
pub struct InvalidTimeUnit(pub u8);

impl TimeUnit {
    /// Wire representation.
    #[inline]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for TimeUnit {
    type Error = InvalidTimeUnit;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            0 => TimeUnit::None,
            1 => TimeUnit::Second,
            2 => TimeUnit::Millisecond,
            3 => TimeUnit::Microsecond,
            4 => TimeUnit::Nanosecond,
            5 => TimeUnit::Minute,
            6 => TimeUnit::Hour,
            7 => TimeUnit::Day,
            8 => TimeUnit::Year,
            other => return Err(InvalidTimeUnit(other)),
        })
    }
}
