//! Lease clock

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Instant;

/// UTC timestamps advanced by a monotonic timer from a fixed anchor.
///
/// Wall-clock steps after the anchor is taken do not move the clock, so a
/// backward step never freezes eviction and a forward step never expires
/// every lease at once.
#[derive(Clone, Copy, Debug)]
pub struct LeaseClock {
    anchor_wall: DateTime<Utc>,
    anchor: Instant,
}

impl Default for LeaseClock {
    fn default() -> Self {
        Self::anchored_at(Utc::now())
    }
}

impl LeaseClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock that reads `wall` right now and advances monotonically from it
    pub fn anchored_at(wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall: wall,
            anchor: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.anchor.elapsed()).unwrap_or_else(|_| TimeDelta::zero());
        self.anchor_wall
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_advances_from_anchor() {
        let anchor = Utc::now() - TimeDelta::hours(1);
        let clock = LeaseClock::anchored_at(anchor);
        let first = clock.now();
        assert!(first >= anchor);
        assert!(first < anchor + TimeDelta::seconds(5));

        thread::sleep(Duration::from_millis(20));
        let second = clock.now();
        assert!(second - first >= TimeDelta::milliseconds(20));
    }

    #[test]
    fn test_independent_of_wall_clock() {
        // An anchor far ahead of the wall clock stands in for a backward step
        let anchor = Utc::now() + TimeDelta::days(1);
        let clock = LeaseClock::anchored_at(anchor);
        assert!(clock.now() >= anchor);
        assert!(clock.now() > Utc::now());
    }
}
