//! Engine audio synthesizer.
//!
//! Synthesizes vehicle engine sound from simulation state instead of
//! looping recorded samples: two sawtooth layers (idle rumble and rev)
//! plus filtered exhaust noise, cross-faded by RPM and throttle. The
//! synthesizer owns one [`EngineState`] per context and drives a single
//! [`EngineVoiceChain`] through smoothed parameter writes.
//!
//! All control happens at a fixed 60 Hz tick regardless of caller
//! frequency; callers may invoke [`EngineSynthesizer::update`] every
//! frame.

use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use overdrive_common::VehicleKinematics;

use crate::context::AudioEngineContext;
use crate::error::{AudioError, AudioResult};
use crate::graph::{
    BufferVoice, BufferVoiceControl, EngineVoiceChain, EngineVoiceParams, FREQ_SMOOTHING,
    GAIN_SMOOTHING,
};

/// Idle RPM floor.
pub const MIN_RPM: f32 = 600.0;

/// Rev limiter.
pub const MAX_RPM: f32 = 6000.0;

/// Time from `start()` until the engine reaches `Running`.
pub const STARTUP_DURATION: f32 = 1.5;

/// Fade-to-silence duration after `stop()`.
pub const STOP_FADE_DURATION: f32 = 0.8;

/// How long a backfire pins the backfire mix level at full.
pub const BACKFIRE_HOLD: f32 = 0.2;

/// Fixed control tick interval (60 Hz).
pub const CONTROL_TICK: f32 = 1.0 / 60.0;

/// Immutable per-archetype sound character.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineProfile {
    /// Fundamental frequency at zero RPM, in Hz.
    pub base_frequency_hz: f32,
    /// Hz added per RPM.
    pub rpm_to_frequency_gain: f32,
    /// Exhaust noise prominence in [0, 1].
    pub exhaust_tone: f32,
    /// RPM slew responsiveness in [0, 1]; max slew is `smoothness * 2000`
    /// RPM/s.
    pub smoothness: f32,
    /// Overall engine volume.
    pub volume: f32,
}

impl EngineProfile {
    /// Maximum RPM change per second for this profile.
    #[must_use]
    pub fn max_slew(&self) -> f32 {
        self.smoothness * 2000.0
    }
}

impl Default for EngineProfile {
    fn default() -> Self {
        // Generic sedan character.
        Self {
            base_frequency_hz: 70.0,
            rpm_to_frequency_gain: 0.015,
            exhaust_tone: 0.4,
            smoothness: 0.6,
            volume: 0.8,
        }
    }
}

/// Profile lookup keyed by vehicle archetype, with built-in defaults.
#[derive(Debug, Clone)]
pub struct ProfileLibrary {
    profiles: AHashMap<String, EngineProfile>,
}

impl ProfileLibrary {
    /// Library with the built-in vehicle archetypes.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut profiles = AHashMap::new();
        profiles.insert("sedan".to_string(), EngineProfile::default());
        profiles.insert(
            "sports".to_string(),
            EngineProfile {
                base_frequency_hz: 90.0,
                rpm_to_frequency_gain: 0.02,
                exhaust_tone: 0.8,
                smoothness: 0.9,
                volume: 1.0,
            },
        );
        profiles.insert(
            "truck".to_string(),
            EngineProfile {
                base_frequency_hz: 50.0,
                rpm_to_frequency_gain: 0.01,
                exhaust_tone: 0.6,
                smoothness: 0.4,
                volume: 0.9,
            },
        );
        profiles.insert(
            "motorcycle".to_string(),
            EngineProfile {
                base_frequency_hz: 110.0,
                rpm_to_frequency_gain: 0.025,
                exhaust_tone: 0.9,
                smoothness: 0.85,
                volume: 0.9,
            },
        );
        Self { profiles }
    }

    /// Register or replace a profile.
    pub fn register(&mut self, vehicle_type: impl Into<String>, profile: EngineProfile) {
        self.profiles.insert(vehicle_type.into(), profile);
    }

    /// Profile for a vehicle type, falling back to the default.
    #[must_use]
    pub fn get(&self, vehicle_type: &str) -> EngineProfile {
        self.profiles
            .get(vehicle_type)
            .copied()
            .unwrap_or_default()
    }
}

impl Default for ProfileLibrary {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Engine lifecycle phase.
///
/// `Idle` is reported while the engine is active with closed throttle at
/// the RPM floor; it behaves identically to `Running` for updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EnginePhase {
    /// No engine active.
    #[default]
    Off,
    /// Startup sample playing, voice fading in.
    Starting,
    /// Active at closed throttle.
    Idle,
    /// Active.
    Running,
    /// Fading to silence.
    Stopping,
}

impl EnginePhase {
    /// Whether the phase accepts throttle/load driven updates.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Idle)
    }
}

/// Mutable per-engine state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    /// Current RPM; always within `[MIN_RPM, MAX_RPM]`.
    pub rpm: f32,
    /// RPM the slew is heading toward.
    pub target_rpm: f32,
    /// Throttle input in [0, 1].
    pub throttle: f32,
    /// Engine load in [0, 1].
    pub load: f32,
    /// Current gear.
    pub gear: i32,
    /// Lifecycle phase.
    pub phase: EnginePhase,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            rpm: MIN_RPM,
            target_rpm: MIN_RPM,
            throttle: 0.0,
            load: 0.0,
            gear: 0,
            phase: EnginePhase::Off,
        }
    }
}

/// Layer gains derived from state each tick, never stored persistently.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MixLevels {
    /// Idle rumble layer.
    pub idle: f32,
    /// Rev layer.
    pub rev: f32,
    /// Exhaust noise layer.
    pub exhaust: f32,
    /// Backfire one-shot emphasis.
    pub backfire: f32,
}

impl MixLevels {
    /// Derive layer gains from RPM ratio, throttle and profile.
    #[must_use]
    pub fn derive(rpm_ratio: f32, throttle: f32, profile: &EngineProfile) -> Self {
        Self {
            idle: (1.0 - 0.8 * rpm_ratio).max(0.1),
            rev: throttle * rpm_ratio,
            exhaust: profile.exhaust_tone * rpm_ratio * 0.5,
            backfire: 0.0,
        }
    }
}

/// Active engine bookkeeping, dropped when the stop fade completes.
#[derive(Debug)]
struct ActiveEngine {
    profile: EngineProfile,
    state: EngineState,
    voice: Arc<EngineVoiceParams>,
    mix: MixLevels,
    phase_time: f32,
    backfire_time: f32,
}

/// Procedural vehicle engine sound.
#[derive(Debug)]
pub struct EngineSynthesizer {
    context: Arc<AudioEngineContext>,
    profiles: ProfileLibrary,
    active: Option<ActiveEngine>,
    tick_accumulator: f32,
}

impl EngineSynthesizer {
    /// Create a synthesizer bound to a context, with built-in profiles.
    #[must_use]
    pub fn new(context: Arc<AudioEngineContext>) -> Self {
        Self {
            context,
            profiles: ProfileLibrary::with_builtin(),
            active: None,
            tick_accumulator: 0.0,
        }
    }

    /// Mutable access to the profile library.
    pub fn profiles_mut(&mut self) -> &mut ProfileLibrary {
        &mut self.profiles
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> EnginePhase {
        self.active.as_ref().map_or(EnginePhase::Off, |e| e.state.phase)
    }

    /// Current engine state, if active.
    #[must_use]
    pub fn state(&self) -> Option<EngineState> {
        self.active.as_ref().map(|e| e.state)
    }

    /// Current mix levels, if active.
    #[must_use]
    pub fn mix_levels(&self) -> Option<MixLevels> {
        self.active.as_ref().map(|e| e.mix)
    }

    /// Start the engine for a vehicle archetype.
    ///
    /// Fails with [`AudioError::InvalidTransition`] if an engine is
    /// already active (including while stopping).
    pub fn start(&mut self, vehicle_type: &str) -> AudioResult<()> {
        if let Some(engine) = &self.active {
            return Err(AudioError::InvalidTransition {
                from: engine.state.phase,
                requested: EnginePhase::Starting,
            });
        }

        let profile = self.profiles.get(vehicle_type);
        info!("Starting engine for '{vehicle_type}'");

        let voice = Arc::new(EngineVoiceParams::new());
        let chain = EngineVoiceChain::new(voice.clone(), self.context.sample_rate(), fastrand::u64(..));
        self.context.play(chain);

        // The chain snapshots targets at build time, so the fade-in must
        // be requested after it exists to ramp from silence.
        let bus = self.context.buses().effective_engine();
        voice
            .voice_gain
            .set_smoothed(profile.volume * bus, STARTUP_DURATION);
        self.play_one_shot("engine_start", profile.volume);

        self.active = Some(ActiveEngine {
            profile,
            state: EngineState {
                phase: EnginePhase::Starting,
                ..EngineState::default()
            },
            voice,
            mix: MixLevels::default(),
            phase_time: 0.0,
            backfire_time: 0.0,
        });
        Ok(())
    }

    /// Begin the stop fade.
    ///
    /// Fails with [`AudioError::InvalidTransition`] if the engine is not
    /// active; calling it again during the fade is such a failure, which
    /// makes repeated stops harmless.
    pub fn stop(&mut self) -> AudioResult<()> {
        let Some(engine) = &mut self.active else {
            return Err(AudioError::InvalidTransition {
                from: EnginePhase::Off,
                requested: EnginePhase::Stopping,
            });
        };
        if !engine.state.phase.is_active() && engine.state.phase != EnginePhase::Starting {
            return Err(AudioError::InvalidTransition {
                from: engine.state.phase,
                requested: EnginePhase::Stopping,
            });
        }

        info!("Stopping engine (fade {STOP_FADE_DURATION}s)");
        engine.state.phase = EnginePhase::Stopping;
        engine.phase_time = 0.0;
        engine.voice.voice_gain.set_smoothed(0.0, STOP_FADE_DURATION / 4.0);
        Ok(())
    }

    /// Set throttle; values outside [0, 1] are clamped, never rejected.
    pub fn set_throttle(&mut self, throttle: f32) {
        if let Some(engine) = &mut self.active {
            engine.state.throttle = throttle.clamp(0.0, 1.0);
        }
    }

    /// Set load; values outside [0, 1] are clamped, never rejected.
    pub fn set_load(&mut self, load: f32) {
        if let Some(engine) = &mut self.active {
            engine.state.load = load.clamp(0.0, 1.0);
        }
    }

    /// Change gear; plays a shift click only on an actual change.
    pub fn shift_gear(&mut self, gear: i32) {
        let Some(engine) = &mut self.active else {
            return;
        };
        if engine.state.gear == gear {
            return;
        }
        debug!("Gear shift {} -> {}", engine.state.gear, gear);
        engine.state.gear = gear;
        let volume = engine.profile.volume * 0.5;
        self.play_one_shot("gear_click", volume);
    }

    /// Fire a backfire pop; no-op unless the engine is active.
    pub fn trigger_backfire(&mut self) {
        let Some(engine) = &mut self.active else {
            return;
        };
        if !engine.state.phase.is_active() {
            return;
        }
        debug!("Backfire");
        engine.backfire_time = BACKFIRE_HOLD;
        engine.mix.backfire = 1.0;
        let volume = engine.profile.volume;
        self.play_one_shot("backfire", volume);
    }

    /// Advance the engine. Rate-limited internally to the 60 Hz control
    /// tick; call as often as convenient.
    ///
    /// The mix is driven by throttle and load; kinematics are part of the
    /// per-tick game-state contract and reserved for position-aware
    /// emission.
    pub fn update(&mut self, dt: f32, _kinematics: &VehicleKinematics) {
        if self.active.is_none() {
            self.tick_accumulator = 0.0;
            return;
        }

        self.tick_accumulator += dt.max(0.0);
        while self.tick_accumulator >= CONTROL_TICK {
            self.tick_accumulator -= CONTROL_TICK;
            self.tick();
            if self.active.is_none() {
                self.tick_accumulator = 0.0;
                break;
            }
        }
    }

    /// One fixed control tick.
    fn tick(&mut self) {
        let bus = self.context.buses().effective_engine();
        let Some(engine) = &mut self.active else {
            return;
        };

        match engine.state.phase {
            EnginePhase::Starting => {
                engine.phase_time += CONTROL_TICK;
                if engine.phase_time >= STARTUP_DURATION {
                    engine.state.phase = EnginePhase::Running;
                    engine.state.rpm = MIN_RPM;
                    debug!("Engine running");
                }
            },
            EnginePhase::Running | EnginePhase::Idle => {
                Self::drive(engine, bus);
            },
            EnginePhase::Stopping => {
                engine.phase_time += CONTROL_TICK;
                if engine.phase_time >= STOP_FADE_DURATION {
                    engine.voice.stop();
                    self.active = None;
                    debug!("Engine released");
                }
            },
            EnginePhase::Off => {},
        }
    }

    /// Throttle/load driven parameter update for an active engine.
    fn drive(engine: &mut ActiveEngine, bus_gain: f32) {
        let state = &mut engine.state;
        let profile = &engine.profile;

        // Target RPM from inputs.
        state.target_rpm = (MIN_RPM + state.throttle * (MAX_RPM - MIN_RPM) + state.load * 1000.0)
            .clamp(MIN_RPM, MAX_RPM);

        // Bounded slew toward the target; snap inside one tick's reach.
        let max_delta = profile.max_slew() * CONTROL_TICK;
        let gap = state.target_rpm - state.rpm;
        if gap.abs() <= max_delta {
            state.rpm = state.target_rpm;
        } else {
            state.rpm += max_delta.copysign(gap);
        }
        state.rpm = state.rpm.clamp(MIN_RPM, MAX_RPM);

        // Idle is a reported sub-state of active.
        state.phase = if state.throttle < 0.05 && state.rpm <= MIN_RPM + 1.0 {
            EnginePhase::Idle
        } else {
            EnginePhase::Running
        };

        // Layer cross-fade.
        let rpm_ratio = (state.rpm - MIN_RPM) / (MAX_RPM - MIN_RPM);
        engine.mix = MixLevels::derive(rpm_ratio, state.throttle, profile);
        if engine.backfire_time > 0.0 {
            engine.backfire_time -= CONTROL_TICK;
            engine.mix.backfire = if engine.backfire_time > 0.0 { 1.0 } else { 0.0 };
        }

        // Frequencies and filter sweep.
        let freq = profile.base_frequency_hz + state.rpm * profile.rpm_to_frequency_gain;
        let cutoff = 1000.0 + 0.3 * state.rpm;

        let voice = &engine.voice;
        voice.idle_freq.set_smoothed(freq, FREQ_SMOOTHING);
        voice.rev_freq.set_smoothed(freq * 1.5, FREQ_SMOOTHING);
        voice.cutoff.set_smoothed(cutoff, FREQ_SMOOTHING);
        voice.idle_gain.set_smoothed(engine.mix.idle, GAIN_SMOOTHING);
        voice.rev_gain.set_smoothed(engine.mix.rev, GAIN_SMOOTHING);
        voice.exhaust_gain.set_smoothed(engine.mix.exhaust, GAIN_SMOOTHING);
        voice
            .voice_gain
            .set_smoothed(profile.volume * bus_gain, GAIN_SMOOTHING);
    }

    /// Play a one-shot sample from the bank. Missing assets drop the cue.
    fn play_one_shot(&self, sound: &'static str, gain: f32) -> bool {
        let id = overdrive_common::SoundId::new(sound);
        let Ok(buffer) = self.context.buffer(&id) else {
            debug!("One-shot '{sound}' not registered, cue dropped");
            return false;
        };
        let control = Arc::new(BufferVoiceControl::new());
        control
            .gain
            .set_immediate(gain * self.context.buses().effective_engine());
        self.context.play(BufferVoice::new(buffer, control, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use proptest::prelude::*;

    fn synth() -> EngineSynthesizer {
        EngineSynthesizer::new(Arc::new(AudioEngineContext::muted()))
    }

    fn still() -> VehicleKinematics {
        VehicleKinematics::at(Vec3::ZERO)
    }

    /// Advance in whole control ticks.
    fn run(synth: &mut EngineSynthesizer, seconds: f32) {
        let ticks = (seconds / CONTROL_TICK).ceil() as usize;
        for _ in 0..ticks {
            synth.update(CONTROL_TICK, &still());
        }
    }

    #[test]
    fn test_startup_scenario() {
        let mut s = synth();
        s.start("sedan").unwrap();
        assert_eq!(s.phase(), EnginePhase::Starting);

        run(&mut s, STARTUP_DURATION + CONTROL_TICK);
        assert!(s.phase().is_active());
        let state = s.state().unwrap();
        assert!((state.rpm - MIN_RPM).abs() < 1.0);
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut s = synth();
        s.start("sedan").unwrap();
        assert!(matches!(
            s.start("sports"),
            Err(AudioError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_unknown_vehicle_uses_default_profile() {
        let mut s = synth();
        assert!(s.start("hovercraft").is_ok());
        assert_eq!(s.phase(), EnginePhase::Starting);
    }

    #[test]
    fn test_stop_then_stop_is_noop_failure() {
        let mut s = synth();
        s.start("sedan").unwrap();
        run(&mut s, STARTUP_DURATION + CONTROL_TICK);

        s.stop().unwrap();
        assert_eq!(s.phase(), EnginePhase::Stopping);
        let second = s.stop();
        assert!(matches!(second, Err(AudioError::InvalidTransition { .. })));
        assert_eq!(s.phase(), EnginePhase::Stopping);

        run(&mut s, STOP_FADE_DURATION + CONTROL_TICK);
        assert_eq!(s.phase(), EnginePhase::Off);
        assert!(s.state().is_none());
    }

    #[test]
    fn test_stop_when_off_rejected() {
        let mut s = synth();
        assert!(matches!(
            s.stop(),
            Err(AudioError::InvalidTransition {
                from: EnginePhase::Off,
                ..
            })
        ));
    }

    #[test]
    fn test_throttle_and_load_clamp() {
        let mut s = synth();
        s.start("sedan").unwrap();
        s.set_throttle(-0.5);
        assert!(s.state().unwrap().throttle.abs() < f32::EPSILON);
        s.set_throttle(1.7);
        assert!((s.state().unwrap().throttle - 1.0).abs() < f32::EPSILON);
        s.set_load(2.5);
        assert!((s.state().unwrap().load - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rpm_ramp_is_slew_limited() {
        let mut s = synth();
        s.start("sedan").unwrap();
        // sedan smoothness 0.6 -> 1200 RPM/s -> 20 RPM per tick
        run(&mut s, STARTUP_DURATION + CONTROL_TICK);
        s.set_throttle(1.0);

        let before = s.state().unwrap().rpm;
        s.update(CONTROL_TICK, &still());
        let after = s.state().unwrap().rpm;

        let max_step = 0.6 * 2000.0 * CONTROL_TICK;
        assert!(after > before);
        assert!(after - before <= max_step + 0.01);
        assert!(after < MAX_RPM);
    }

    #[test]
    fn test_rpm_eventually_reaches_target() {
        let mut s = synth();
        s.start("sports").unwrap();
        run(&mut s, STARTUP_DURATION + CONTROL_TICK);
        s.set_throttle(1.0);

        run(&mut s, 5.0);
        let state = s.state().unwrap();
        assert!((state.rpm - MAX_RPM).abs() < 1.0);
    }

    #[test]
    fn test_idle_phase_reported_at_closed_throttle() {
        let mut s = synth();
        s.start("sedan").unwrap();
        run(&mut s, STARTUP_DURATION + 0.5);
        assert_eq!(s.phase(), EnginePhase::Idle);

        s.set_throttle(0.8);
        run(&mut s, 0.5);
        assert_eq!(s.phase(), EnginePhase::Running);
    }

    #[test]
    fn test_idle_mix_monotonically_decreasing() {
        let profile = EngineProfile::default();
        let mut prev = f32::INFINITY;
        for step in 0..=10 {
            let ratio = step as f32 / 10.0;
            let mix = MixLevels::derive(ratio, 0.5, &profile);
            assert!(mix.idle <= prev);
            assert!(mix.idle >= 0.1);
            prev = mix.idle;
        }
    }

    #[test]
    fn test_backfire_holds_then_clears() {
        let mut s = synth();
        s.start("sedan").unwrap();
        run(&mut s, STARTUP_DURATION + CONTROL_TICK);

        s.trigger_backfire();
        assert!((s.mix_levels().unwrap().backfire - 1.0).abs() < f32::EPSILON);

        run(&mut s, BACKFIRE_HOLD / 2.0);
        assert!((s.mix_levels().unwrap().backfire - 1.0).abs() < f32::EPSILON);

        run(&mut s, BACKFIRE_HOLD);
        assert!(s.mix_levels().unwrap().backfire.abs() < f32::EPSILON);
    }

    #[test]
    fn test_backfire_noop_when_off() {
        let mut s = synth();
        s.trigger_backfire();
        assert_eq!(s.phase(), EnginePhase::Off);
    }

    #[test]
    fn test_gear_shift_stores_gear() {
        let mut s = synth();
        s.start("sedan").unwrap();
        s.shift_gear(2);
        assert_eq!(s.state().unwrap().gear, 2);
        s.shift_gear(2); // no change
        assert_eq!(s.state().unwrap().gear, 2);
    }

    #[test]
    fn test_sub_tick_updates_accumulate() {
        let mut s = synth();
        s.start("sedan").unwrap();
        run(&mut s, STARTUP_DURATION + CONTROL_TICK);
        s.set_throttle(1.0);

        let before = s.state().unwrap().rpm;
        // Half a tick: no movement yet.
        s.update(CONTROL_TICK / 2.0, &still());
        assert!((s.state().unwrap().rpm - before).abs() < f32::EPSILON);
        // Second half completes the tick.
        s.update(CONTROL_TICK / 2.0, &still());
        assert!(s.state().unwrap().rpm > before);
    }

    proptest! {
        #[test]
        fn test_rpm_invariant_under_random_inputs(
            inputs in prop::collection::vec((0.0f32..2.0, -1.0f32..2.0), 1..120),
        ) {
            let mut s = synth();
            s.start("sports").unwrap();
            run(&mut s, STARTUP_DURATION + CONTROL_TICK);

            for (throttle, load) in inputs {
                s.set_throttle(throttle);
                s.set_load(load);
                s.update(CONTROL_TICK, &still());
                let rpm = s.state().unwrap().rpm;
                prop_assert!((MIN_RPM..=MAX_RPM).contains(&rpm));
            }
        }
    }
}
