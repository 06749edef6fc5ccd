//! Link liveness watchdog
//!
//! Freshness is measured from the last successfully decoded packet, so a
//! link that delivers only garbage still goes stale. The watchdog is armed
//! when a connection starts and disarms itself when it fires, which gives
//! exactly one stale report per episode.

use std::time::{Duration, Instant};

use tracing::trace;

/// Result of a watchdog poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogStatus {
    /// Not watching (no connection in progress)
    Disarmed,
    Fresh,
    /// Silent past the warning threshold; reported once per silence
    Warn(Duration),
    /// Silent past the stale threshold; the watchdog is now disarmed
    Stale(Duration),
}

#[derive(Debug, Clone)]
pub struct ConnectionWatchdog {
    warn_after: Duration,
    stale_after: Duration,
    last_fresh: Option<Instant>,
    warned: bool,
}

impl ConnectionWatchdog {
    pub fn new(warn_after: Duration, stale_after: Duration) -> Self {
        Self {
            warn_after,
            stale_after,
            last_fresh: None,
            warned: false,
        }
    }

    /// Start watching from `now`
    pub fn arm(&mut self, now: Instant) {
        self.last_fresh = Some(now);
        self.warned = false;
    }

    pub fn disarm(&mut self) {
        self.last_fresh = None;
        self.warned = false;
    }

    pub fn is_armed(&self) -> bool {
        self.last_fresh.is_some()
    }

    /// Record a decoded packet; ignored while disarmed
    pub fn feed(&mut self, now: Instant) {
        if self.last_fresh.is_some() {
            self.last_fresh = Some(now);
            self.warned = false;
        }
    }

    pub fn check(&mut self, now: Instant) -> WatchdogStatus {
        let Some(last) = self.last_fresh else {
            return WatchdogStatus::Disarmed;
        };
        let silent = now.saturating_duration_since(last);
        trace!("Watchdog: {} ms since last packet", silent.as_millis());

        if silent > self.stale_after {
            self.disarm();
            WatchdogStatus::Stale(silent)
        } else if silent > self.warn_after && !self.warned {
            self.warned = true;
            WatchdogStatus::Warn(silent)
        } else {
            WatchdogStatus::Fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn watchdog() -> ConnectionWatchdog {
        ConnectionWatchdog::new(ms(200), ms(400))
    }

    #[test]
    fn test_disarmed_until_armed() {
        let mut wd = watchdog();
        let t0 = Instant::now();
        wd.feed(t0);
        assert_eq!(wd.check(t0 + ms(10_000)), WatchdogStatus::Disarmed);
    }

    #[test]
    fn test_warn_once_then_stale_once() {
        let mut wd = watchdog();
        let t0 = Instant::now();
        wd.arm(t0);
        assert_eq!(wd.check(t0 + ms(100)), WatchdogStatus::Fresh);
        assert_eq!(wd.check(t0 + ms(250)), WatchdogStatus::Warn(ms(250)));
        assert_eq!(wd.check(t0 + ms(300)), WatchdogStatus::Fresh);
        assert_eq!(wd.check(t0 + ms(401)), WatchdogStatus::Stale(ms(401)));
        assert_eq!(wd.check(t0 + ms(900)), WatchdogStatus::Disarmed);
        assert!(!wd.is_armed());
    }

    #[test]
    fn test_feed_restarts_timer() {
        let mut wd = watchdog();
        let t0 = Instant::now();
        wd.arm(t0);
        wd.check(t0 + ms(250));
        wd.feed(t0 + ms(350));
        assert_eq!(wd.check(t0 + ms(500)), WatchdogStatus::Fresh);
        // A new silence warns again
        assert_eq!(wd.check(t0 + ms(600 + 1)), WatchdogStatus::Warn(ms(251)));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut wd = watchdog();
        let t0 = Instant::now();
        wd.arm(t0);
        assert_eq!(wd.check(t0 + ms(400)), WatchdogStatus::Warn(ms(400)));
        assert_eq!(wd.check(t0 + ms(400)), WatchdogStatus::Fresh);
    }

    #[test]
    fn test_rearm_after_stale() {
        let mut wd = watchdog();
        let t0 = Instant::now();
        wd.arm(t0);
        assert!(matches!(wd.check(t0 + ms(500)), WatchdogStatus::Stale(_)));
        wd.arm(t0 + ms(600));
        assert_eq!(wd.check(t0 + ms(700)), WatchdogStatus::Fresh);
    }
}
