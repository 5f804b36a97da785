/// Additive offset inside `log10` so pure silence maps to a finite dB floor
/// (about -100 dB) instead of negative infinity.
pub const DB_EPSILON: f32 = 1e-5;

/// Instantaneous RMS above this floor counts as "the device is producing
/// energy" for watchdog purposes. Deliberately far below any usable noise
/// gate threshold: it separates a dead capture from ordinary quiet.
pub const SIGNAL_RMS_FLOOR: f32 = 0.001;

/// Per-sample deviation from the silence baseline that the signal validator
/// accepts as proof of life (2/128 of full scale).
pub const SILENCE_DEVIATION_EPSILON: f32 = 2.0 / 128.0;

/// Rolling window over the most recent capture samples.
///
/// The capture callback overwrites the oldest samples; the analysis tick and
/// the signal validator read a snapshot. Unlike a queue, reading does not
/// consume: every tick sees the latest full window. Wrap in
/// `Arc<parking_lot::Mutex<AnalysisWindow>>` for cross-thread access.
#[derive(Debug)]
pub struct AnalysisWindow {
    buffer: Vec<f32>,
    write_index: usize,
    filled: usize,
    capacity: usize,
}

/// Default window length in samples, roughly the analyser tap used by the
/// capture graph (about 21 ms at 48 kHz).
pub const DEFAULT_WINDOW_SAMPLES: usize = 1024;

impl AnalysisWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![0.0; capacity],
            write_index: 0,
            filled: 0,
            capacity,
        }
    }

    /// Append samples, overwriting the oldest once the window is full.
    pub fn write(&mut self, samples: &[f32]) {
        // Only the tail can survive anyway.
        let samples = if samples.len() > self.capacity {
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };

        for &sample in samples {
            self.buffer[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % self.capacity;
        }
        self.filled = (self.filled + samples.len()).min(self.capacity);
    }

    /// The retained samples, oldest first.
    pub fn snapshot(&self) -> Vec<f32> {
        if self.filled < self.capacity {
            return self.buffer[..self.filled].to_vec();
        }
        let mut out = Vec::with_capacity(self.capacity);
        out.extend_from_slice(&self.buffer[self.write_index..]);
        out.extend_from_slice(&self.buffer[..self.write_index]);
        out
    }

    /// RMS of the retained window, 0.0 when empty.
    pub fn rms(&self) -> f32 {
        rms(&self.buffer[..self.filled.min(self.capacity)])
    }

    /// Whether any retained sample strays from the silence baseline by more
    /// than `epsilon`. Used by the signal validator to decide that a newly
    /// acquired source is actually alive.
    pub fn deviates_from_silence(&self, epsilon: f32) -> bool {
        self.buffer[..self.filled.min(self.capacity)]
            .iter()
            .any(|s| s.abs() > epsilon)
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_index = 0;
        self.filled = 0;
    }
}

/// RMS of a sample slice normalized to [-1, 1]; 0.0 for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Convert an RMS level to decibels with the silence-safe epsilon.
pub fn db_from_rms(rms: f32) -> f32 {
    20.0 * (rms + DB_EPSILON).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn snapshot_preserves_arrival_order() {
        let mut window = AnalysisWindow::new(4);
        window.write(&[1.0, 2.0]);
        assert_eq!(window.snapshot(), vec![1.0, 2.0]);

        window.write(&[3.0, 4.0, 5.0]); // wraps, drops 1.0
        assert_eq!(window.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn oversized_write_keeps_tail() {
        let mut window = AnalysisWindow::new(3);
        window.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(window.snapshot(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn reads_do_not_consume() {
        let mut window = AnalysisWindow::new(8);
        window.write(&[0.5; 4]);
        assert_eq!(window.snapshot().len(), 4);
        assert_eq!(window.snapshot().len(), 4);
    }

    #[test]
    fn reset_clears_window() {
        let mut window = AnalysisWindow::new(8);
        window.write(&[0.5; 4]);
        window.reset();
        assert!(window.is_empty());
        assert!(!window.deviates_from_silence(0.0));
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0.0; 16]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_full_scale() {
        assert_relative_eq!(rms(&[1.0, -1.0, 1.0, -1.0]), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn db_of_silence_is_finite_floor() {
        let db = db_from_rms(0.0);
        assert!(db.is_finite());
        assert_relative_eq!(db, -100.0, epsilon = 1e-3);
    }

    #[test]
    fn db_of_full_scale_is_near_zero() {
        assert_relative_eq!(db_from_rms(1.0), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn deviation_probe_ignores_sub_epsilon_noise() {
        let mut window = AnalysisWindow::new(8);
        window.write(&[0.001, -0.002, 0.0]);
        assert!(!window.deviates_from_silence(SILENCE_DEVIATION_EPSILON));

        window.write(&[0.05]);
        assert!(window.deviates_from_silence(SILENCE_DEVIATION_EPSILON));
    }

    #[test]
    fn signal_floor_sits_below_usable_gate_range() {
        // -50 dB, a typical gate threshold, is well above the floor.
        let gate_rms = 10f32.powf(-50.0 / 20.0);
        assert!(gate_rms > SIGNAL_RMS_FLOOR);
    }
}
