use std::time::Duration;

/// Smoothing time constant while the gate opens.
pub const OPEN_TIME_CONSTANT: Duration = Duration::from_millis(50);

/// Smoothing time constant while the gate closes. Slower than opening so a
/// word tail is not clipped by an abrupt cut.
pub const CLOSE_TIME_CONSTANT: Duration = Duration::from_millis(100);

/// One-pole exponential gain smoother applied in the capture callback.
///
/// The analysis tick (and immediate mute/PTT actions) move the target; the
/// audio path approaches it per sample frame so gating never clicks.
///
/// The open/closed flag tracks gate transitions: `open_to` retargets only on
/// a closed-to-open transition, so a `mic_gain` change never rescales a ramp
/// that is already open. It takes effect the next time the gate opens.
#[derive(Debug)]
pub struct GainRamp {
    current: f32,
    target: f32,
    open: bool,
}

impl Default for GainRamp {
    fn default() -> Self {
        Self::new()
    }
}

impl GainRamp {
    pub fn new() -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            open: false,
        }
    }

    /// Drive the ramp toward zero (gate closed, PTT released, or muted).
    pub fn close(&mut self) {
        self.target = 0.0;
        self.open = false;
    }

    /// Open toward `gain`. A no-op while already open.
    pub fn open_to(&mut self, gain: f32) {
        if !self.open {
            self.target = gain.max(0.0);
            self.open = true;
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Apply the smoothed gain in place to an interleaved buffer.
    ///
    /// All channels of a frame get the same gain so the stereo image is
    /// untouched.
    pub fn process(&mut self, samples: &mut [f32], sample_rate: u32, channels: u16) {
        let channels = channels.max(1) as usize;
        let alpha = self.frame_alpha(sample_rate);
        for frame in samples.chunks_mut(channels) {
            self.current += (self.target - self.current) * alpha;
            for sample in frame {
                *sample *= self.current;
            }
        }
    }

    /// Per-frame smoothing coefficient for the active time constant.
    fn frame_alpha(&self, sample_rate: u32) -> f32 {
        let tau = if self.target > self.current {
            OPEN_TIME_CONSTANT
        } else {
            CLOSE_TIME_CONSTANT
        };
        let rate = sample_rate.max(1) as f32;
        1.0 - (-1.0 / (tau.as_secs_f32() * rate)).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RATE: u32 = 48_000;

    fn run(ramp: &mut GainRamp, frames: usize) -> Vec<f32> {
        let mut buf = vec![1.0f32; frames];
        ramp.process(&mut buf, RATE, 1);
        buf
    }

    #[test]
    fn opening_approaches_target_within_a_few_time_constants() {
        let mut ramp = GainRamp::new();
        ramp.open_to(1.0);

        // 250 ms = 5 open time constants.
        let out = run(&mut ramp, RATE as usize / 4);
        assert!(ramp.current() > 0.99, "current = {}", ramp.current());
        assert!(*out.last().unwrap() > 0.99);
    }

    #[test]
    fn closing_is_slower_than_opening() {
        let mut opening = GainRamp::new();
        opening.open_to(1.0);
        run(&mut opening, 2_400); // 50 ms

        let mut closing = GainRamp::new();
        closing.open_to(1.0);
        run(&mut closing, RATE as usize / 2); // settle open
        closing.close();
        run(&mut closing, 2_400); // 50 ms

        let rise = opening.current();
        let fall = 1.0 - closing.current();
        assert!(rise > fall, "rise {} should outpace fall {}", rise, fall);
    }

    #[test]
    fn gain_change_does_not_rescale_open_ramp() {
        let mut ramp = GainRamp::new();
        ramp.open_to(1.0);
        run(&mut ramp, 1_000);

        // Already open: a new gain must wait for the next open transition.
        ramp.open_to(2.0);
        assert_relative_eq!(ramp.target(), 1.0);

        ramp.close();
        ramp.open_to(2.0);
        assert_relative_eq!(ramp.target(), 2.0);
    }

    #[test]
    fn negative_gain_clamped_to_zero() {
        let mut ramp = GainRamp::new();
        ramp.open_to(-1.0);
        assert_eq!(ramp.target(), 0.0);
    }

    #[test]
    fn closed_ramp_silences_output() {
        let mut ramp = GainRamp::new();
        let out = run(&mut ramp, 64);
        assert!(out.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn stereo_frames_share_one_gain_step() {
        let mut ramp = GainRamp::new();
        ramp.open_to(1.0);
        let mut buf = vec![1.0f32; 8];
        ramp.process(&mut buf, RATE, 2);
        for frame in buf.chunks(2) {
            assert_relative_eq!(frame[0], frame[1]);
        }
    }
}
