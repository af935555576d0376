// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic timestamps for flip completions and trace events.
//!
//! [`HostTime`] is a point on the device's monotonic clock in nanoseconds.
//! Where the epoch lies is up to the device: only differences between two
//! timestamps from the same device are meaningful.

use core::fmt;

/// A point on a monotonic clock, in nanoseconds since a device-defined epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// The device epoch.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from nanoseconds.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({}ns)", self.0)
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;

    use super::*;

    #[test]
    fn epoch_is_zero_nanoseconds() {
        assert_eq!(HostTime::ZERO, HostTime::from_nanos(0));
        assert_eq!(HostTime::from_nanos(16_667_000).as_nanos(), 16_667_000);
        assert!(HostTime::ZERO < HostTime(1), "timestamps order by nanoseconds");
    }

    #[test]
    fn debug_shows_unit() {
        assert_eq!(format!("{:?}", HostTime(1_500)), "HostTime(1500ns)");
    }
}
