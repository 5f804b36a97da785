use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::engine::listeners::{LevelCallback, ListenerHandle, Registry, SpeakingCallback};
use crate::engine::scheduler::PeriodicTask;
use crate::engine::session::{CaptureSession, SourceRoute, SourceTap};
use crate::engine::validator::SignalValidator;
use crate::engine::watchdog::{assess, WatchdogState, WatchdogVerdict, WATCHDOG_PERIOD};
use crate::models::constraints::{CaptureConstraints, DeviceInfo};
use crate::models::error::EngineError;
use crate::models::settings::EngineSettings;
use crate::models::state::ControlState;
use crate::processing::analysis_window::{
    db_from_rms, AnalysisWindow, DEFAULT_WINDOW_SAMPLES, SIGNAL_RMS_FLOOR,
};
use crate::processing::gain_ramp::GainRamp;
use crate::processing::output::ProcessedStream;
use crate::traits::capture::{AudioBufferCallback, CaptureBackend, CaptureStream, CaptureTrack};

/// Target cadence of the analysis tick. Cooperative, not guaranteed exact.
pub const ANALYSIS_TICK_PERIOD: Duration = Duration::from_millis(16);

/// How long a replacement source gets to prove it produces signal before a
/// restart is abandoned and rolled back.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_millis(2000);

/// Shared engine state reachable from the tick threads and capture
/// callbacks. `MicEngine` is the owning public handle.
struct EngineInner<B: CaptureBackend> {
    backend: B,
    /// Probe window for replacement validation, `VALIDATION_TIMEOUT` in
    /// production.
    validation_timeout: Duration,
    control: Mutex<ControlState>,
    session: Mutex<Option<CaptureSession<B::Stream>>>,
    watchdog: Mutex<WatchdogState>,
    /// Single-flight guard: restart attempts never run concurrently. A
    /// request arriving while one is in flight is rejected; the watchdog
    /// cadence supplies the retry.
    restart_gate: Mutex<()>,
    window: Arc<Mutex<AnalysisWindow>>,
    gain: Arc<Mutex<GainRamp>>,
    output: ProcessedStream,
    level_listeners: Arc<Mutex<Registry<LevelCallback>>>,
    speaking_listeners: Arc<Mutex<Registry<SpeakingCallback>>>,
    ducking_flag: Mutex<Option<Arc<AtomicBool>>>,
    analysis_task: Mutex<Option<PeriodicTask>>,
    watchdog_task: Mutex<Option<PeriodicTask>>,
}

/// Route capture buffers according to the source tap.
///
/// The graph shape is fixed (tap → analysis window → gain ramp → output);
/// probe sources only feed their validation window, dead sources are
/// dropped.
fn pipeline_callback(
    tap: Arc<SourceTap>,
    probe: Arc<Mutex<AnalysisWindow>>,
    window: Arc<Mutex<AnalysisWindow>>,
    gain: Arc<Mutex<GainRamp>>,
    output: ProcessedStream,
) -> AudioBufferCallback {
    Arc::new(move |samples, sample_rate, channels| match tap.route() {
        SourceRoute::Dead => {}
        SourceRoute::Probe => probe.lock().write(samples),
        SourceRoute::Live => {
            window.lock().write(samples);
            let mut processed = samples.to_vec();
            gain.lock().process(&mut processed, sample_rate, channels);
            output.push(&processed, sample_rate, channels);
        }
    })
}

impl<B: CaptureBackend> EngineInner<B> {
    fn new(backend: B) -> Self {
        Self {
            backend,
            validation_timeout: VALIDATION_TIMEOUT,
            control: Mutex::new(ControlState::default()),
            session: Mutex::new(None),
            watchdog: Mutex::new(WatchdogState::new(Instant::now())),
            restart_gate: Mutex::new(()),
            window: Arc::new(Mutex::new(AnalysisWindow::new(DEFAULT_WINDOW_SAMPLES))),
            gain: Arc::new(Mutex::new(GainRamp::new())),
            output: ProcessedStream::new(),
            level_listeners: Arc::new(Mutex::new(Registry::new())),
            speaking_listeners: Arc::new(Mutex::new(Registry::new())),
            ducking_flag: Mutex::new(None),
            analysis_task: Mutex::new(None),
            watchdog_task: Mutex::new(None),
        }
    }

    fn acquire_routed(
        &self,
        constraints: &CaptureConstraints,
        route: SourceRoute,
    ) -> Result<(B::Stream, Arc<SourceTap>, Arc<Mutex<AnalysisWindow>>), EngineError> {
        let tap = SourceTap::new(route);
        let probe = Arc::new(Mutex::new(AnalysisWindow::new(DEFAULT_WINDOW_SAMPLES)));
        let callback = pipeline_callback(
            Arc::clone(&tap),
            Arc::clone(&probe),
            Arc::clone(&self.window),
            Arc::clone(&self.gain),
            self.output.clone(),
        );
        let stream = self.backend.acquire(constraints, callback)?;
        Ok((stream, tap, probe))
    }

    /// Make `stream` the one live session, retiring any predecessor.
    fn install_session(
        &self,
        stream: B::Stream,
        constraints: CaptureConstraints,
        tap: Arc<SourceTap>,
    ) {
        let mut guard = self.session.lock();
        if let Some(old) = guard.take() {
            old.shutdown();
        }
        self.window.lock().reset();
        tap.set_route(SourceRoute::Live);
        let session = CaptureSession::new(stream, constraints, tap);
        log::info!(
            "capture session {} installed (device: {})",
            session.id,
            session.constraints.device_id.as_deref().unwrap_or("default")
        );
        if let Some(track) = session.stream.tracks().first() {
            log::debug!("negotiated track settings: {:?}", track.settings());
        }
        *guard = Some(session);
        drop(guard);

        // Carries mute/PTT state over to the new source without waiting for
        // the next tick. The silence clock is deliberately NOT reset here:
        // only observed signal, a validated replacement, or the explicit
        // Critical-path reset may push it forward, or a failed kick would
        // never accumulate toward rollback.
        self.refresh_gain_policy();
    }

    fn set_input(&self, constraints: &CaptureConstraints) -> Result<(), EngineError> {
        let _gate = self.restart_gate.lock();

        if let Some(old) = self.session.lock().take() {
            old.shutdown();
        }

        let (stream, tap, _probe) = self
            .acquire_routed(constraints, SourceRoute::Live)
            .map_err(|e| {
                log::error!("input acquisition failed: {}", e);
                e
            })?;
        self.install_session(stream, constraints.clone(), tap);
        // A fresh input starts its silence clock from now.
        self.watchdog.lock().mark_signal(Instant::now());
        Ok(())
    }

    fn restart(&self, requested: &CaptureConstraints) -> bool {
        self.restart_with_timeout(requested, self.validation_timeout)
    }

    fn restart_with_timeout(
        &self,
        requested: &CaptureConstraints,
        probe_timeout: Duration,
    ) -> bool {
        let Some(_gate) = self.restart_gate.try_lock() else {
            log::warn!("restart requested while another attempt is in flight; rejected");
            return false;
        };

        let current = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.constraints.clone());

        // Cheapest viable transition: same device and a real property
        // change can be applied to the live tracks without touching the
        // stream. Identical constraints mean the caller wants a fresh
        // acquisition (the watchdog kick), so they skip this path.
        if let Some(current) = current.as_ref() {
            if current.device_matches(requested)
                && current.merged_in_place(requested) != *current
            {
                match self.apply_in_place(requested) {
                    Ok(()) => {
                        log::info!("capture constraints applied in place");
                        return true;
                    }
                    Err(e) => {
                        log::warn!(
                            "in-place reconfiguration failed ({}); replacing capture source",
                            e
                        );
                    }
                }
            }
        }

        self.replace_session(requested, probe_timeout, current)
    }

    fn apply_in_place(&self, requested: &CaptureConstraints) -> Result<(), EngineError> {
        let mut guard = self.session.lock();
        let session = guard
            .as_mut()
            .ok_or_else(|| EngineError::Backend("no active session".into()))?;
        for track in session.stream.tracks() {
            track.apply_constraints(requested)?;
        }
        session.constraints = session.constraints.merged_in_place(requested);
        Ok(())
    }

    /// Full replacement: acquire probe-routed, validate, then commit or
    /// discard and roll back. The previous session keeps running until the
    /// replacement has proven itself.
    fn replace_session(
        &self,
        requested: &CaptureConstraints,
        probe_timeout: Duration,
        last_good: Option<CaptureConstraints>,
    ) -> bool {
        let (stream, tap, probe) = match self.acquire_routed(requested, SourceRoute::Probe) {
            Ok(acquired) => acquired,
            Err(e) => {
                log::warn!("replacement acquisition failed: {}", e);
                self.rollback_with(last_good);
                return false;
            }
        };

        let validator = SignalValidator::new(probe_timeout, ANALYSIS_TICK_PERIOD);
        if !validator.probe(&probe) {
            log::warn!("discarding replacement source: {}", EngineError::ValidationTimeout);
            tap.set_route(SourceRoute::Dead);
            stream.stop_all();
            self.rollback_with(last_good);
            return false;
        }

        self.install_session(stream, requested.clone(), tap);
        // The replacement proved it produces signal, so the silence clock
        // restarts.
        self.watchdog.lock().mark_signal(Instant::now());
        true
    }

    fn rollback(&self) -> bool {
        let Some(_gate) = self.restart_gate.try_lock() else {
            log::warn!("rollback requested while a restart is in flight; rejected");
            return false;
        };
        let last_good = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.constraints.clone());
        self.rollback_with(last_good)
    }

    /// Re-acquire with the last known-good constraints. Best effort: on
    /// failure the engine is left without a source and reports unhealthy
    /// until an explicit `set_input`.
    ///
    /// Never touches the silence clock. A recovery reinstall of a device
    /// that is still silent must let elapsed silence keep accumulating so
    /// a failed Warn-stage kick can escalate to the Critical stage.
    fn rollback_with(&self, last_good: Option<CaptureConstraints>) -> bool {
        let Some(constraints) = last_good else {
            log::error!("rollback impossible: no known-good constraints");
            return false;
        };

        if let Some(old) = self.session.lock().take() {
            old.shutdown();
        }

        match self.acquire_routed(&constraints, SourceRoute::Live) {
            Ok((stream, tap, _probe)) => {
                log::info!("rolled back to last known-good capture source");
                self.install_session(stream, constraints, tap);
                true
            }
            Err(e) => {
                log::error!("{}", EngineError::RollbackFailed(e.to_string()));
                false
            }
        }
    }

    fn stop_input(&self) {
        let watchdog_task = self.watchdog_task.lock().take();
        if let Some(mut task) = watchdog_task {
            task.cancel();
        }

        // Serializes with any in-flight restart so whatever it installs is
        // released here rather than leaked.
        let _gate = self.restart_gate.lock();
        if let Some(session) = self.session.lock().take() {
            session.shutdown();
        }
    }

    fn cleanup(&self) {
        self.stop_input();
        let analysis_task = self.analysis_task.lock().take();
        if let Some(mut task) = analysis_task {
            task.cancel();
        }
        self.window.lock().reset();
        self.gain.lock().close();
        self.output.clear();
    }

    fn has_active_input(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.is_active())
            .unwrap_or(false)
    }

    fn is_healthy(&self) -> bool {
        let clock_running = self
            .analysis_task
            .lock()
            .as_ref()
            .map(|t| t.is_running())
            .unwrap_or(false);
        clock_running && self.has_active_input()
    }

    /// Immediate gain retarget for latency-sensitive control changes (mute
    /// and PTT). Gate-mode decisions stay with the analysis tick, which
    /// owns the live dB reading.
    fn refresh_gain_policy(&self) {
        let control = self.control.lock();
        let mut gain = self.gain.lock();
        if control.muted {
            gain.close();
        } else if control.ptt_enabled {
            if control.ptt_active {
                gain.open_to(control.mic_gain);
            } else {
                gain.close();
            }
        }
    }

    fn analysis_tick(&self) {
        let rms = self.window.lock().rms();
        let db = db_from_rms(rms);

        let (decision, speaking, speaking_edge) = {
            let mut control = self.control.lock();
            let decision = control.decide(db);
            let speaking = !decision.gated && !control.muted;
            let edge = speaking != control.was_speaking;
            if edge {
                control.was_speaking = speaking;
            }
            (decision, speaking, edge)
        };

        {
            let mut gain = self.gain.lock();
            if decision.gated {
                gain.close();
            } else {
                gain.open_to(decision.target_gain);
            }
        }

        // Edge-triggered ducking: listeners hear transitions, not every
        // tick. Callbacks run outside all engine locks.
        if speaking_edge {
            let flag = self.ducking_flag.lock().clone();
            if let Some(flag) = flag {
                flag.store(speaking, Ordering::SeqCst);
            }
            for cb in self.speaking_listeners.lock().snapshot() {
                cb(speaking);
            }
        }

        for cb in self.level_listeners.lock().snapshot() {
            cb(db, decision.gated);
        }

        // Raw energy above the floor proves the device is alive no matter
        // where the user's gate sits.
        if rms > SIGNAL_RMS_FLOOR {
            self.watchdog.lock().mark_signal(Instant::now());
        }
    }

    fn watchdog_tick(&self) {
        let now = Instant::now();

        if self.control.lock().muted {
            // Intentional silence is never a failure.
            self.watchdog.lock().mark_signal(now);
            return;
        }
        if self.session.lock().is_none() {
            // Nothing to supervise; recovery from a failed rollback takes
            // an explicit set_input.
            return;
        }

        let silence = self.watchdog.lock().silence_duration(now);
        match assess(silence) {
            WatchdogVerdict::Healthy => {}
            WatchdogVerdict::Restart => {
                log::warn!(
                    "no capture signal for {} ms; kicking capture source",
                    silence.as_millis()
                );
                let current = self
                    .session
                    .lock()
                    .as_ref()
                    .map(|s| s.constraints.clone());
                if let Some(constraints) = current {
                    // A failed kick stays silent so the clock keeps
                    // accumulating toward rollback.
                    self.restart(&constraints);
                }
            }
            WatchdogVerdict::Rollback => {
                log::error!(
                    "no capture signal for {} ms; rolling back capture source",
                    silence.as_millis()
                );
                self.rollback();
                // Reset regardless of outcome so a dead rollback target
                // does not re-trigger every tick.
                self.watchdog.lock().mark_signal(Instant::now());
            }
        }
    }
}

/// Live-microphone engine: capture supervision, talk-policy gain shaping,
/// level metering and speaking detection.
///
/// One engine instance owns at most one live capture session. Instances are
/// independent; create one per call session and `cleanup` (or drop) it when
/// the session ends.
pub struct MicEngine<B: CaptureBackend> {
    inner: Arc<EngineInner<B>>,
}

impl<B: CaptureBackend> MicEngine<B> {
    /// Build the processing pipeline and start the analysis clock.
    pub fn new(backend: B) -> Self {
        let engine = Self {
            inner: Arc::new(EngineInner::new(backend)),
        };
        engine.ensure_clock_running();
        engine
    }

    fn ensure_clock_running(&self) {
        let mut task = self.inner.analysis_task.lock();
        if task.as_ref().map(|t| t.is_running()).unwrap_or(false) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        *task = Some(PeriodicTask::spawn(
            "mic-analysis",
            ANALYSIS_TICK_PERIOD,
            move || tick_upgraded(&weak, EngineInner::analysis_tick),
        ));
    }

    fn ensure_watchdog_running(&self) {
        let mut task = self.inner.watchdog_task.lock();
        if task.as_ref().map(|t| t.is_running()).unwrap_or(false) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        *task = Some(PeriodicTask::spawn(
            "mic-watchdog",
            WATCHDOG_PERIOD,
            move || tick_upgraded(&weak, EngineInner::watchdog_tick),
        ));
    }

    /// Replace any existing session with a freshly acquired stream, make
    /// sure the analysis clock is running and start the watchdog.
    ///
    /// On failure the engine has no active input until the caller retries.
    pub fn set_input(&self, constraints: &CaptureConstraints) -> Result<(), EngineError> {
        self.inner.set_input(constraints)?;
        self.ensure_clock_running();
        self.ensure_watchdog_running();
        Ok(())
    }

    /// Attempt the cheapest transition to `constraints`; see the capture
    /// manager contract. Never panics; returns whether the new constraints
    /// are now in effect.
    pub fn restart(&self, constraints: &CaptureConstraints) -> bool {
        let committed = self.inner.restart(constraints);
        if committed {
            self.ensure_clock_running();
            self.ensure_watchdog_running();
        }
        committed
    }

    /// Re-acquire the last known-good constraints.
    pub fn rollback(&self) -> bool {
        self.inner.rollback()
    }

    /// Stop the watchdog and release the capture session. Idempotent.
    pub fn stop_input(&self) {
        self.inner.stop_input();
    }

    /// Full teardown: `stop_input` plus stopping the analysis clock and
    /// draining the pipeline. Idempotent; `set_input` revives the engine.
    pub fn cleanup(&self) {
        self.inner.cleanup();
    }

    /// True iff the analysis clock is running and the current stream has at
    /// least one active track.
    pub fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }

    /// Apply a flat settings object from the settings/UI layer. Control
    /// fields take effect synchronously; a change to any device-affecting
    /// field triggers a capture restart.
    pub fn update_settings(&self, settings: &EngineSettings) {
        self.inner.control.lock().apply_settings(settings);
        self.inner.refresh_gain_policy();

        let needs_restart = self
            .inner
            .session
            .lock()
            .as_ref()
            .map(|s| settings.requires_restart(&s.constraints))
            .unwrap_or(false);
        if needs_restart && !self.restart(&settings.capture_constraints()) {
            log::warn!("settings-driven restart failed; previous device configuration kept");
        }
    }

    /// PTT key state. Synchronous and effective immediately, even while a
    /// restart is in flight.
    pub fn set_ptt_active(&self, active: bool) {
        self.inner.control.lock().ptt_active = active;
        self.inner.refresh_gain_policy();
    }

    /// Mute state. Synchronous; overrides PTT and gate until unmuted.
    pub fn set_mute(&self, muted: bool) {
        self.inner.control.lock().muted = muted;
        self.inner.refresh_gain_policy();
    }

    pub fn is_muted(&self) -> bool {
        self.inner.control.lock().muted
    }

    /// The processed output handle for the transport layer. Identity is
    /// stable across internal restarts.
    pub fn processed_stream(&self) -> ProcessedStream {
        self.inner.output.clone()
    }

    /// Constraints currently in effect, if a session is installed.
    pub fn current_constraints(&self) -> Option<CaptureConstraints> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.constraints.clone())
    }

    /// Id of the raw capture session backing the pipeline, for diagnostics.
    pub fn current_session_id(&self) -> Option<Uuid> {
        self.inner.session.lock().as_ref().map(|s| s.id)
    }

    /// Input devices reported by the backend, for the settings UI.
    pub fn devices(&self) -> Result<Vec<DeviceInfo>, EngineError> {
        self.inner.backend.list_devices()
    }

    /// Register a level listener fired every analysis tick with
    /// `(db, is_gated)`.
    pub fn add_level_listener<F>(&self, callback: F) -> ListenerHandle<LevelCallback>
    where
        F: Fn(f32, bool) + Send + Sync + 'static,
    {
        let id = self
            .inner
            .level_listeners
            .lock()
            .insert(Arc::new(callback));
        ListenerHandle::new(&self.inner.level_listeners, id)
    }

    /// Register a speaking listener fired on voice-activity edges.
    pub fn add_speaking_listener<F>(&self, callback: F) -> ListenerHandle<SpeakingCallback>
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self
            .inner
            .speaking_listeners
            .lock()
            .insert(Arc::new(callback));
        ListenerHandle::new(&self.inner.speaking_listeners, id)
    }

    /// Legacy single-callback setter: adds to the same registry as
    /// `add_level_listener` without replacing earlier registrations.
    pub fn set_on_level_change<F>(&self, callback: F)
    where
        F: Fn(f32, bool) + Send + Sync + 'static,
    {
        self.inner
            .level_listeners
            .lock()
            .insert(Arc::new(callback));
    }

    /// Legacy single-callback setter for speaking changes.
    pub fn set_on_speaking_change<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.inner
            .speaking_listeners
            .lock()
            .insert(Arc::new(callback));
    }

    /// Share a ducking flag flipped on speaking edges, seeded with the
    /// current state.
    pub fn set_ducking_flag(&self, flag: Arc<AtomicBool>) {
        flag.store(self.inner.control.lock().was_speaking, Ordering::SeqCst);
        *self.inner.ducking_flag.lock() = Some(flag);
    }
}

impl<B: CaptureBackend> Drop for MicEngine<B> {
    fn drop(&mut self) {
        self.inner.cleanup();
    }
}

fn tick_upgraded<B, F>(weak: &Weak<EngineInner<B>>, tick: F)
where
    B: CaptureBackend,
    F: Fn(&EngineInner<B>),
{
    if let Some(inner) = weak.upgrade() {
        tick(&inner);
    }
}
