use super::settings::EngineSettings;

/// Talk-policy control state.
///
/// Mutated only by settings updates, PTT key events and mute toggles; read
/// on every analysis tick. Push-to-talk and the noise gate are mutually
/// exclusive policies selected by `ptt_enabled`; mute overrides both.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    pub ptt_enabled: bool,
    pub ptt_active: bool,
    pub gate_threshold_db: f32,
    pub muted: bool,
    pub mic_gain: f32,
    pub was_speaking: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            ptt_enabled: false,
            ptt_active: false,
            gate_threshold_db: -50.0,
            muted: false,
            mic_gain: 1.0,
            was_speaking: false,
        }
    }
}

/// Per-tick output of the gain controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateDecision {
    pub target_gain: f32,
    pub gated: bool,
}

impl ControlState {
    /// Map the current policy state and a live dB reading to a gate decision.
    pub fn decide(&self, db: f32) -> GateDecision {
        if self.muted {
            return GateDecision {
                target_gain: 0.0,
                gated: true,
            };
        }

        let open = if self.ptt_enabled {
            self.ptt_active
        } else {
            db >= self.gate_threshold_db
        };

        GateDecision {
            target_gain: if open { self.mic_gain } else { 0.0 },
            gated: !open,
        }
    }

    /// Apply the control fields of a settings update. Device-affecting
    /// fields are handled separately by the capture manager.
    pub fn apply_settings(&mut self, settings: &EngineSettings) {
        self.ptt_enabled = settings.ptt_enabled;
        self.gate_threshold_db = settings.noise_gate_threshold_db;
        self.mic_gain = settings.mic_gain.max(0.0);
    }
}
