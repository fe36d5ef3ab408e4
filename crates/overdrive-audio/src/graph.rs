//! Audio graph abstraction.
//!
//! A minimal node-based signal graph wired into fixed topologies:
//! oscillators, buffered noise, gain stages, a swept lowpass filter and a
//! soft limiter. The graph is a **write-only control surface**: the
//! control-rate side only ever sets parameter targets (immediate or
//! smoothed); the sample-rate side reads them while rendering and no node
//! state is ever read back.
//!
//! ## Timing domains
//!
//! Parameter targets cross from the control thread to the render thread as
//! f32 bit-patterns in atomics. The render side approaches each target
//! exponentially over the requested time constant, so a control-rate write
//! (≈60 Hz) never produces an audible step in the much faster sample
//! stream. An immediate set snaps on the next rendered sample.
//!
//! ## Topologies
//!
//! - [`EngineVoiceChain`]: (idle osc → gain) + (rev osc → gain) +
//!   (noise → lowpass → gain) → soft limiter → voice gain. Mono, endless;
//!   driven by the engine synthesizer.
//! - [`BufferVoice`]: PCM one-shot/loop playback with smoothed gain,
//!   constant-power pan and smoothed playback rate. Stereo; driven by the
//!   spatial engine and engine one-shots.

use std::f32::consts::{FRAC_PI_4, TAU};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rodio::Source;

use crate::assets::AudioBuffer;

/// Sample rate the graph renders at when no device dictates one.
pub const GRAPH_SAMPLE_RATE: u32 = 44_100;

/// Default smoothing time constant for frequency-like parameters.
pub const FREQ_SMOOTHING: f32 = 0.05;

/// Default smoothing time constant for gain-like parameters.
pub const GAIN_SMOOTHING: f32 = 0.1;

/// Length of the pre-rendered noise buffer in samples.
const NOISE_BUFFER_LEN: usize = 16_384;

/// A parameter target shared between the control and render threads.
///
/// The control side writes, the render side reads; neither ever blocks.
/// A time constant of zero means "snap on the next sample".
#[derive(Debug)]
pub struct ParamTarget {
    target: AtomicU32,
    time_constant: AtomicU32,
}

impl ParamTarget {
    /// Create a shared parameter with an initial value.
    #[must_use]
    pub fn new(initial: f32) -> Arc<Self> {
        Arc::new(Self {
            target: AtomicU32::new(initial.to_bits()),
            time_constant: AtomicU32::new(0f32.to_bits()),
        })
    }

    /// Set the parameter immediately (snaps on the next rendered sample).
    pub fn set_immediate(&self, value: f32) {
        self.time_constant.store(0f32.to_bits(), Ordering::Relaxed);
        self.target.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Set the parameter target with an exponential-approach time constant.
    pub fn set_smoothed(&self, value: f32, time_constant_secs: f32) {
        self.time_constant
            .store(time_constant_secs.max(0.0).to_bits(), Ordering::Relaxed);
        self.target.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Current target value.
    #[must_use]
    pub fn target(&self) -> f32 {
        f32::from_bits(self.target.load(Ordering::Relaxed))
    }

    /// Current time constant in seconds.
    #[must_use]
    pub fn time_constant(&self) -> f32 {
        f32::from_bits(self.time_constant.load(Ordering::Relaxed))
    }
}

/// Render-side view of a [`ParamTarget`] holding the smoothing state.
#[derive(Debug)]
struct SmoothedParam {
    shared: Arc<ParamTarget>,
    current: f32,
    cached_tc: f32,
    alpha: f32,
    dt: f32,
}

impl SmoothedParam {
    fn new(shared: Arc<ParamTarget>, sample_rate: u32) -> Self {
        let current = shared.target();
        Self {
            shared,
            current,
            cached_tc: 0.0,
            alpha: 1.0,
            dt: 1.0 / sample_rate.max(1) as f32,
        }
    }

    /// Advance one sample toward the target and return the current value.
    fn next(&mut self) -> f32 {
        let target = self.shared.target();
        let tc = self.shared.time_constant();
        if tc <= f32::EPSILON {
            self.current = target;
        } else {
            if (tc - self.cached_tc).abs() > f32::EPSILON {
                self.alpha = 1.0 - (-self.dt / tc).exp();
                self.cached_tc = tc;
            }
            self.current += (target - self.current) * self.alpha;
        }
        self.current
    }
}

/// Oscillator waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    /// Pure sine.
    Sine,
    /// Sawtooth — harmonically rich, the core engine timbre.
    #[default]
    Sawtooth,
    /// Triangle.
    Triangle,
}

/// Oscillator node with a smoothed frequency parameter.
#[derive(Debug)]
struct Oscillator {
    waveform: Waveform,
    frequency: SmoothedParam,
    phase: f32,
    inv_sample_rate: f32,
}

impl Oscillator {
    fn new(waveform: Waveform, frequency: Arc<ParamTarget>, sample_rate: u32) -> Self {
        Self {
            waveform,
            frequency: SmoothedParam::new(frequency, sample_rate),
            phase: 0.0,
            inv_sample_rate: 1.0 / sample_rate.max(1) as f32,
        }
    }

    fn next(&mut self) -> f32 {
        let freq = self.frequency.next().max(0.0);
        self.phase += freq * self.inv_sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        match self.waveform {
            Waveform::Sine => (TAU * self.phase).sin(),
            Waveform::Sawtooth => 2.0 * self.phase - 1.0,
            Waveform::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            },
        }
    }
}

/// Buffered white-noise node.
///
/// Noise is pre-rendered into a wrapping buffer at construction so the
/// render path never calls into the RNG.
#[derive(Debug)]
struct NoiseGen {
    buffer: Vec<f32>,
    pos: usize,
}

impl NoiseGen {
    fn new(seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let buffer = (0..NOISE_BUFFER_LEN).map(|_| rng.f32() * 2.0 - 1.0).collect();
        Self { buffer, pos: 0 }
    }

    fn next(&mut self) -> f32 {
        let sample = self.buffer[self.pos];
        self.pos = (self.pos + 1) % self.buffer.len();
        sample
    }
}

/// One-pole lowpass with a swept (smoothed) cutoff.
#[derive(Debug)]
struct OnePoleLowpass {
    cutoff: SmoothedParam,
    state: f32,
    inv_sample_rate: f32,
}

impl OnePoleLowpass {
    fn new(cutoff: Arc<ParamTarget>, sample_rate: u32) -> Self {
        Self {
            cutoff: SmoothedParam::new(cutoff, sample_rate),
            state: 0.0,
            inv_sample_rate: 1.0 / sample_rate.max(1) as f32,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let fc = self.cutoff.next().max(0.0);
        let alpha = 1.0 - (-TAU * fc * self.inv_sample_rate).exp();
        self.state += (input - self.state) * alpha;
        self.state
    }
}

/// Soft limiter to prevent harsh digital clipping.
///
/// Values in [-1, 1] pass through unchanged; values outside are
/// compressed toward ±2 asymptotically.
#[must_use]
pub fn soft_clip(x: f32) -> f32 {
    if x.abs() <= 1.0 {
        x
    } else {
        x.signum() * (1.0 + (x.abs() - 1.0).tanh())
    }
}

/// Constant-power pan gains (left, right) for a pan position in [-1, 1].
#[must_use]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Control surface for an [`EngineVoiceChain`].
///
/// All fields are shared parameter targets; the engine synthesizer
/// writes them every control tick.
#[derive(Debug)]
pub struct EngineVoiceParams {
    /// Idle-layer oscillator frequency in Hz.
    pub idle_freq: Arc<ParamTarget>,
    /// Rev-layer oscillator frequency in Hz.
    pub rev_freq: Arc<ParamTarget>,
    /// Exhaust-noise lowpass cutoff in Hz.
    pub cutoff: Arc<ParamTarget>,
    /// Idle-layer gain.
    pub idle_gain: Arc<ParamTarget>,
    /// Rev-layer gain.
    pub rev_gain: Arc<ParamTarget>,
    /// Exhaust-noise gain.
    pub exhaust_gain: Arc<ParamTarget>,
    /// Post-limiter voice gain.
    pub voice_gain: Arc<ParamTarget>,
    stopped: AtomicBool,
}

impl EngineVoiceParams {
    /// Create the control surface with all gains silent.
    #[must_use]
    pub fn new() -> Self {
        Self {
            idle_freq: ParamTarget::new(80.0),
            rev_freq: ParamTarget::new(120.0),
            cutoff: ParamTarget::new(1000.0),
            idle_gain: ParamTarget::new(0.0),
            rev_gain: ParamTarget::new(0.0),
            exhaust_gain: ParamTarget::new(0.0),
            voice_gain: ParamTarget::new(0.0),
            stopped: AtomicBool::new(false),
        }
    }

    /// Permanently stop the voice (idempotent).
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    /// Whether the voice has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

impl Default for EngineVoiceParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed engine-voice topology rendered on the audio thread.
///
/// Runs endlessly until its control surface is stopped; the sink it plays
/// on mixes it with everything else.
pub struct EngineVoiceChain {
    idle_osc: Oscillator,
    rev_osc: Oscillator,
    noise: NoiseGen,
    lowpass: OnePoleLowpass,
    idle_gain: SmoothedParam,
    rev_gain: SmoothedParam,
    exhaust_gain: SmoothedParam,
    voice_gain: SmoothedParam,
    params: Arc<EngineVoiceParams>,
    sample_rate: u32,
}

impl std::fmt::Debug for EngineVoiceChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineVoiceChain")
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

impl EngineVoiceChain {
    /// Build the fixed topology against a shared control surface.
    #[must_use]
    pub fn new(params: Arc<EngineVoiceParams>, sample_rate: u32, noise_seed: u64) -> Self {
        Self {
            idle_osc: Oscillator::new(Waveform::Sawtooth, params.idle_freq.clone(), sample_rate),
            rev_osc: Oscillator::new(Waveform::Sawtooth, params.rev_freq.clone(), sample_rate),
            noise: NoiseGen::new(noise_seed),
            lowpass: OnePoleLowpass::new(params.cutoff.clone(), sample_rate),
            idle_gain: SmoothedParam::new(params.idle_gain.clone(), sample_rate),
            rev_gain: SmoothedParam::new(params.rev_gain.clone(), sample_rate),
            exhaust_gain: SmoothedParam::new(params.exhaust_gain.clone(), sample_rate),
            voice_gain: SmoothedParam::new(params.voice_gain.clone(), sample_rate),
            params,
            sample_rate,
        }
    }

    fn render(&mut self) -> f32 {
        let idle = self.idle_osc.next() * self.idle_gain.next();
        let rev = self.rev_osc.next() * self.rev_gain.next();
        let exhaust = self.lowpass.process(self.noise.next()) * self.exhaust_gain.next();
        soft_clip(idle + rev + exhaust) * self.voice_gain.next()
    }
}

impl Iterator for EngineVoiceChain {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.params.is_stopped() {
            return None;
        }
        Some(self.render())
    }
}

impl Source for EngineVoiceChain {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Control surface for a [`BufferVoice`].
#[derive(Debug)]
pub struct BufferVoiceControl {
    /// Linear gain.
    pub gain: Arc<ParamTarget>,
    /// Pan position in [-1, 1] (constant-power).
    pub pan: Arc<ParamTarget>,
    /// Playback rate multiplier (doppler pitch).
    pub rate: Arc<ParamTarget>,
    stopped: AtomicBool,
    finished: AtomicBool,
}

impl BufferVoiceControl {
    /// Create the control surface with unity gain, centered pan and
    /// normal rate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gain: ParamTarget::new(1.0),
            pan: ParamTarget::new(0.0),
            rate: ParamTarget::new(1.0),
            stopped: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// Stop playback (idempotent).
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    /// Whether playback was explicitly stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Whether the voice ran to completion or was stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

impl Default for BufferVoiceControl {
    fn default() -> Self {
        Self::new()
    }
}

/// PCM playback voice with smoothed gain, pan and playback rate.
///
/// Always renders interleaved stereo at the buffer's native rate; mono
/// buffers are panned, stereo buffers keep their channels and apply pan
/// as a balance. A rate multiplier resamples via a linear-interpolated
/// playhead, which doubles as the doppler pitch control.
pub struct BufferVoice {
    buffer: AudioBuffer,
    control: Arc<BufferVoiceControl>,
    gain: SmoothedParam,
    pan: SmoothedParam,
    rate: SmoothedParam,
    playhead: f64,
    looping: bool,
    delay_frames: u64,
    pending_right: Option<f32>,
    done: bool,
}

impl std::fmt::Debug for BufferVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferVoice")
            .field("playhead", &self.playhead)
            .field("looping", &self.looping)
            .finish_non_exhaustive()
    }
}

impl BufferVoice {
    /// Create a playback voice over a shared control surface.
    #[must_use]
    pub fn new(buffer: AudioBuffer, control: Arc<BufferVoiceControl>, looping: bool) -> Self {
        let sample_rate = buffer.sample_rate;
        Self {
            buffer,
            gain: SmoothedParam::new(control.gain.clone(), sample_rate),
            pan: SmoothedParam::new(control.pan.clone(), sample_rate),
            rate: SmoothedParam::new(control.rate.clone(), sample_rate),
            control,
            playhead: 0.0,
            looping,
            delay_frames: 0,
            pending_right: None,
            done: false,
        }
    }

    /// Delay the first rendered frame by a duration (silence is emitted).
    #[must_use]
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.delay_frames = (delay.as_secs_f64() * f64::from(self.buffer.sample_rate)).round() as u64;
        self
    }

    /// Read one frame at the playhead with linear interpolation.
    fn read_frame(&self) -> (f32, f32) {
        let frames = self.buffer.frame_count();
        let channels = self.buffer.channels.max(1) as usize;
        let i0 = self.playhead as usize;
        let frac = (self.playhead - i0 as f64) as f32;
        let i1 = if i0 + 1 < frames {
            i0 + 1
        } else if self.looping {
            0
        } else {
            i0
        };

        let samples = &self.buffer.samples;
        let read = |frame: usize, ch: usize| samples[frame * channels + ch.min(channels - 1)];

        let l = read(i0, 0) + (read(i1, 0) - read(i0, 0)) * frac;
        let r = read(i0, 1) + (read(i1, 1) - read(i0, 1)) * frac;
        (l, r)
    }

    fn next_frame(&mut self) -> Option<(f32, f32)> {
        if self.done || self.control.is_stopped() {
            self.finish();
            return None;
        }
        if self.delay_frames > 0 {
            self.delay_frames -= 1;
            // Keep the smoothers ticking through the delay.
            self.gain.next();
            self.pan.next();
            self.rate.next();
            return Some((0.0, 0.0));
        }

        let frames = self.buffer.frame_count();
        if frames == 0 || self.playhead >= frames as f64 {
            self.finish();
            return None;
        }

        let (l, r) = self.read_frame();
        let gain = self.gain.next().max(0.0);
        let (pan_l, pan_r) = pan_gains(self.pan.next());
        let rate = self.rate.next().max(0.0);

        self.playhead += f64::from(rate);
        if self.playhead >= frames as f64 {
            if self.looping {
                self.playhead -= frames as f64;
            } else {
                self.done = true;
            }
        }

        Some((l * gain * pan_l, r * gain * pan_r))
    }

    fn finish(&mut self) {
        self.done = true;
        self.control.finished.store(true, Ordering::Relaxed);
    }
}

impl Iterator for BufferVoice {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if let Some(right) = self.pending_right.take() {
            return Some(right);
        }
        let (l, r) = self.next_frame()?;
        self.pending_right = Some(r);
        Some(l)
    }
}

impl Source for BufferVoice {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        if self.looping {
            None
        } else {
            Some(self.buffer.duration)
        }
    }
}
