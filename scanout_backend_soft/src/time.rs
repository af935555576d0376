// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device clock: nanoseconds since the device was created.

use std::time::{Duration, Instant};

use scanout_core::time::HostTime;

/// Converts the time elapsed since `epoch` to a [`HostTime`].
pub(crate) fn since(epoch: Instant) -> HostTime {
    duration_to_host_time(epoch.elapsed())
}

fn duration_to_host_time(elapsed: Duration) -> HostTime {
    HostTime::from_nanos(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::{Duration, HostTime, Instant, duration_to_host_time, since};

    #[test]
    fn clock_is_monotonic_non_decreasing() {
        let epoch = Instant::now();
        let first = since(epoch);
        let second = since(epoch);
        assert!(second >= first, "device clock should not go backwards");
    }

    #[test]
    fn durations_convert_to_nanoseconds() {
        assert_eq!(
            duration_to_host_time(Duration::new(12, 345_678_901)),
            HostTime(12_345_678_901)
        );
    }

    #[test]
    fn conversion_saturates() {
        assert_eq!(
            duration_to_host_time(Duration::MAX),
            HostTime(u64::MAX)
        );
    }
}
