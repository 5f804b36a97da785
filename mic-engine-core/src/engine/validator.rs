use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::processing::analysis_window::{AnalysisWindow, SILENCE_DEVIATION_EPSILON};

/// Bounded-time probe confirming a newly acquired source actually produces
/// energy before the engine trusts it.
///
/// Polls the probe window at the analysis cadence and resolves as soon as
/// any sample strays from the silence baseline; a source that stays flat for
/// the whole window is treated as dead.
pub struct SignalValidator {
    timeout: Duration,
    poll_interval: Duration,
}

impl SignalValidator {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Block until the window shows signal or the timeout elapses.
    pub fn probe(&self, window: &Mutex<AnalysisWindow>) -> bool {
        let deadline = Instant::now() + self.timeout;
        loop {
            if window.lock().deviates_from_silence(SILENCE_DEVIATION_EPSILON) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::analysis_window::DEFAULT_WINDOW_SAMPLES;
    use std::sync::Arc;

    fn window() -> Arc<Mutex<AnalysisWindow>> {
        Arc::new(Mutex::new(AnalysisWindow::new(DEFAULT_WINDOW_SAMPLES)))
    }

    #[test]
    fn resolves_immediately_on_present_signal() {
        let w = window();
        w.lock().write(&[0.0, 0.1, 0.0]);

        let validator = SignalValidator::new(Duration::from_secs(5), Duration::from_millis(2));
        let start = Instant::now();
        assert!(validator.probe(&w));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn times_out_on_silence() {
        let w = window();
        w.lock().write(&[0.0; 64]);

        let validator =
            SignalValidator::new(Duration::from_millis(30), Duration::from_millis(5));
        let start = Instant::now();
        assert!(!validator.probe(&w));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn detects_signal_arriving_mid_probe() {
        let w = window();
        let writer = Arc::clone(&w);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.lock().write(&[0.5; 16]);
        });

        let validator =
            SignalValidator::new(Duration::from_millis(500), Duration::from_millis(5));
        assert!(validator.probe(&w));
        handle.join().unwrap();
    }

    #[test]
    fn sub_epsilon_noise_is_still_silence() {
        let w = window();
        w.lock().write(&[0.005; 64]);

        let validator =
            SignalValidator::new(Duration::from_millis(20), Duration::from_millis(5));
        assert!(!validator.probe(&w));
    }
}
