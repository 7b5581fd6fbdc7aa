//! Nanosecond-precision timestamp type
//!
//! ## Precision
//!
//! Timestamps are stored as signed nanoseconds since Unix epoch
//! (1970-01-01 00:00:00 UTC), the resolution commit logs are written at.
//! Negative values are legal and represent instants before the epoch.
//!
//! ## Usage
//!
//! ```
//! use quill_core::Timestamp;
//!
//! let from_secs = Timestamp::from_secs(1000);
//! let from_nanos = Timestamp::from_nanos(1_000_000_000_000);
//! assert_eq!(from_secs, from_nanos);
//! ```

use serde::{Deserialize, Serialize};

/// Nanosecond-precision timestamp
///
/// ## Invariants
///
/// - Timestamps are always in nanoseconds
/// - Timestamps are comparable and orderable
/// - The zero timestamp represents Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Maximum representable timestamp
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a timestamp from nanoseconds since epoch
    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    /// Create a timestamp from milliseconds since epoch
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Timestamp(millis.saturating_mul(1_000_000))
    }

    /// Create a timestamp from seconds since epoch
    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000_000))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get nanoseconds since Unix epoch
    #[inline]
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Get milliseconds since Unix epoch (truncates toward zero)
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0 / 1_000_000
    }

    /// Get seconds since Unix epoch (truncates toward zero)
    #[inline]
    pub const fn as_secs(&self) -> i64 {
        self.0 / 1_000_000_000
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:09}", sign, abs / 1_000_000_000, abs % 1_000_000_000)
    }
}

impl From<Timestamp> for i64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
