use std::time::{Duration, Instant};

/// Cadence of the watchdog check, independent of the analysis tick.
pub const WATCHDOG_PERIOD: Duration = Duration::from_millis(1000);

/// Sustained silence before the watchdog kicks the capture source.
pub const RESTART_AFTER: Duration = Duration::from_millis(3000);

/// Sustained silence before the watchdog gives up on the current source and
/// rolls back to the last known-good constraints.
pub const ROLLBACK_AFTER: Duration = Duration::from_millis(5000);

/// What the watchdog should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    Healthy,
    Restart,
    Rollback,
}

/// Escalation ladder over elapsed silence. Pure so the timing contract is
/// testable without clocks.
pub fn assess(silence: Duration) -> WatchdogVerdict {
    if silence >= ROLLBACK_AFTER {
        WatchdogVerdict::Rollback
    } else if silence >= RESTART_AFTER {
        WatchdogVerdict::Restart
    } else {
        WatchdogVerdict::Healthy
    }
}

/// Timestamp of the last observed capture energy.
///
/// The analysis tick marks it whenever instantaneous RMS clears the signal
/// floor; the watchdog tick marks it unconditionally while muted, since
/// silence during an intentional mute is never a failure.
#[derive(Debug)]
pub struct WatchdogState {
    last_signal: Instant,
}

impl WatchdogState {
    pub fn new(now: Instant) -> Self {
        Self { last_signal: now }
    }

    pub fn mark_signal(&mut self, now: Instant) {
        self.last_signal = now;
    }

    pub fn silence_duration(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_signal)
    }

    /// Test hook: pretend the last signal happened `age` ago.
    #[cfg(test)]
    pub fn backdate(&mut self, now: Instant, age: Duration) {
        self.last_signal = now.checked_sub(age).unwrap_or(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_below_restart_threshold() {
        assert_eq!(assess(Duration::from_millis(0)), WatchdogVerdict::Healthy);
        assert_eq!(assess(Duration::from_millis(2999)), WatchdogVerdict::Healthy);
    }

    #[test]
    fn restart_from_three_to_five_seconds() {
        assert_eq!(assess(Duration::from_millis(3000)), WatchdogVerdict::Restart);
        assert_eq!(assess(Duration::from_millis(4999)), WatchdogVerdict::Restart);
    }

    #[test]
    fn rollback_at_five_seconds() {
        assert_eq!(assess(Duration::from_millis(5000)), WatchdogVerdict::Rollback);
        assert_eq!(assess(Duration::from_secs(60)), WatchdogVerdict::Rollback);
    }

    #[test]
    fn mark_signal_resets_silence() {
        let start = Instant::now();
        let mut state = WatchdogState::new(start);
        state.backdate(start, Duration::from_secs(10));
        assert!(state.silence_duration(start) >= Duration::from_secs(10));

        state.mark_signal(start);
        assert_eq!(state.silence_duration(start), Duration::ZERO);
    }
}
