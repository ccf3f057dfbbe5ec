//! Nanosecond-precision timestamps.
//!
//! [`Timestamp`] wraps a `u64` of nanoseconds. [`Timestamp::now`] reads
//! `CLOCK_MONOTONIC` where available so liveness bookkeeping on the message
//! path is immune to NTP adjustments; exchange-supplied times come in via
//! [`Timestamp::from_secs_f64`] / [`Timestamp::from_millis`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanosecond-precision timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current monotonic time in nanoseconds.
    #[inline]
    pub fn now() -> Self {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
            // SAFETY: valid pointer to a stack-allocated timespec.
            unsafe {
                libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
            }
            Self(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            use std::time::{SystemTime, UNIX_EPOCH};
            let dur = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before UNIX epoch");
            Self(dur.as_nanos() as u64)
        }
    }

    /// From milliseconds since the epoch.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * 1_000_000)
    }

    /// From (possibly fractional) seconds since the epoch, as exchanges
    /// report trade times.
    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1e9) as u64)
    }

    /// To milliseconds since the epoch.
    #[inline]
    pub const fn to_millis(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Raw nanosecond value.
    #[inline]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Nanoseconds elapsed from `earlier` to `self`, saturating at zero.
    #[inline]
    pub const fn elapsed_since(&self, earlier: &Timestamp) -> u64 {
        if self.0 >= earlier.0 {
            self.0 - earlier.0
        } else {
            0
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
    }
}
