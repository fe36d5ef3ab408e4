//! Audio engine context.
//!
//! [`AudioEngineContext`] owns the output device, the sound bank and the
//! mix buses. It is created explicitly by the host and passed to the
//! synthesizer and spatial engine; there is no global instance.
//!
//! When no output device is available (CI, dedicated servers) the context
//! runs *muted*: every control-layer operation keeps its full semantics,
//! nothing reaches a speaker.

use parking_lot::RwLock;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use tracing::{debug, info, warn};

use overdrive_common::SoundId;

use crate::assets::{AudioBuffer, BufferId, SoundBank};
use crate::error::{AudioError, AudioResult};
use crate::graph::GRAPH_SAMPLE_RATE;

/// Audio output configuration.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Render sample rate in Hz.
    pub sample_rate: u32,
    /// Whether a missing output device is tolerated (muted mode) or an
    /// error.
    pub allow_muted: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: GRAPH_SAMPLE_RATE,
            allow_muted: true,
        }
    }
}

/// Mix bus volumes, all clamped to [0, 1].
///
/// Bus changes are folded into per-voice gain targets at control rate,
/// so they pick up the voices' smoothing for free.
#[derive(Debug, Clone, Copy)]
pub struct MixBuses {
    master: f32,
    effects: f32,
    engine: f32,
}

impl MixBuses {
    /// All buses at full volume.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            master: 1.0,
            effects: 1.0,
            engine: 1.0,
        }
    }

    /// Master bus volume.
    #[must_use]
    pub const fn master(&self) -> f32 {
        self.master
    }

    /// Effects bus volume (spatial one-shots and loops).
    #[must_use]
    pub const fn effects(&self) -> f32 {
        self.effects
    }

    /// Engine bus volume (synthesized engine voices).
    #[must_use]
    pub const fn engine(&self) -> f32 {
        self.engine
    }

    /// Set the master bus volume.
    pub fn set_master(&mut self, volume: f32) {
        self.master = volume.clamp(0.0, 1.0);
    }

    /// Set the effects bus volume.
    pub fn set_effects(&mut self, volume: f32) {
        self.effects = volume.clamp(0.0, 1.0);
    }

    /// Set the engine bus volume.
    pub fn set_engine(&mut self, volume: f32) {
        self.engine = volume.clamp(0.0, 1.0);
    }

    /// Combined effects-path gain (effects × master).
    #[must_use]
    pub fn effective_effects(&self) -> f32 {
        self.effects * self.master
    }

    /// Combined engine-path gain (engine × master).
    #[must_use]
    pub fn effective_engine(&self) -> f32 {
        self.engine * self.master
    }
}

impl Default for MixBuses {
    fn default() -> Self {
        Self::new()
    }
}

/// Output device wrapper.
///
/// Holds the rodio stream alive for the lifetime of the context. `None`
/// means muted operation.
struct AudioDevice {
    // The stream must stay alive or all sinks go silent.
    _stream: Option<OutputStream>,
    handle: Option<OutputStreamHandle>,
    sample_rate: u32,
}

impl std::fmt::Debug for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDevice")
            .field("muted", &self.handle.is_none())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl AudioDevice {
    fn open(config: &AudioConfig) -> AudioResult<Self> {
        match OutputStream::try_default() {
            Ok((stream, handle)) => {
                info!("Audio device initialized at {} Hz", config.sample_rate);
                Ok(Self {
                    _stream: Some(stream),
                    handle: Some(handle),
                    sample_rate: config.sample_rate,
                })
            },
            Err(e) if config.allow_muted => {
                warn!("No audio device available, running muted: {e}");
                Ok(Self {
                    _stream: None,
                    handle: None,
                    sample_rate: config.sample_rate,
                })
            },
            Err(e) => Err(AudioError::DeviceInit(e.to_string())),
        }
    }

    fn is_muted(&self) -> bool {
        self.handle.is_none()
    }

    /// Start a source playing on its own detached sink.
    ///
    /// Returns `false` in muted mode. Voices are stopped through their
    /// own control surfaces, so the sink does not need to be retained.
    fn play<S>(&self, source: S) -> bool
    where
        S: Source<Item = f32> + Send + 'static,
    {
        let Some(handle) = &self.handle else {
            return false;
        };
        match Sink::try_new(handle) {
            Ok(sink) => {
                sink.append(source);
                sink.detach();
                true
            },
            Err(e) => {
                warn!("Failed to create audio sink: {e}");
                false
            },
        }
    }
}

/// Explicit audio engine context.
///
/// Owns the device, sound bank and mix buses. Thread-safe; the
/// synthesizer and spatial engine borrow it per call.
#[derive(Debug)]
pub struct AudioEngineContext {
    device: AudioDevice,
    bank: RwLock<SoundBank>,
    buses: RwLock<MixBuses>,
    config: AudioConfig,
}

impl AudioEngineContext {
    /// Create a context, opening the default output device.
    ///
    /// With `allow_muted` set (the default), a missing device degrades to
    /// muted operation instead of failing.
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        let device = AudioDevice::open(&config)?;
        debug!("Created audio engine context (muted: {})", device.is_muted());
        Ok(Self {
            device,
            bank: RwLock::new(SoundBank::new()),
            buses: RwLock::new(MixBuses::new()),
            config,
        })
    }

    /// Create a muted context without touching any device. For tests and
    /// headless hosts.
    #[must_use]
    pub fn muted() -> Self {
        let config = AudioConfig::default();
        Self {
            device: AudioDevice {
                _stream: None,
                handle: None,
                sample_rate: config.sample_rate,
            },
            bank: RwLock::new(SoundBank::new()),
            buses: RwLock::new(MixBuses::new()),
            config,
        }
    }

    /// Whether the context has no output device.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.device.is_muted()
    }

    /// Render sample rate in Hz.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Register a decoded sound buffer under a symbolic ID.
    pub fn register_sound(
        &self,
        id: impl Into<SoundId>,
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
    ) -> Option<BufferId> {
        self.bank.write().register(id, samples, sample_rate, channels)
    }

    /// Whether a sound ID is registered.
    #[must_use]
    pub fn has_sound(&self, id: &SoundId) -> bool {
        self.bank.read().contains(id)
    }

    /// Look up a buffer by symbolic ID (cheap clone, samples are shared).
    pub fn buffer(&self, id: &SoundId) -> AudioResult<AudioBuffer> {
        self.bank
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AudioError::UnknownSound(id.clone()))
    }

    /// Remove a registered sound buffer.
    pub fn remove_sound(&self, id: &SoundId) -> Option<AudioBuffer> {
        self.bank.write().remove(id)
    }

    /// Snapshot of the mix bus volumes.
    #[must_use]
    pub fn buses(&self) -> MixBuses {
        *self.buses.read()
    }

    /// Set the master bus volume (clamped to [0, 1]).
    pub fn set_master_volume(&self, volume: f32) {
        self.buses.write().set_master(volume);
    }

    /// Set the effects bus volume (clamped to [0, 1]).
    pub fn set_effects_volume(&self, volume: f32) {
        self.buses.write().set_effects(volume);
    }

    /// Set the engine bus volume (clamped to [0, 1]).
    pub fn set_engine_volume(&self, volume: f32) {
        self.buses.write().set_engine(volume);
    }

    /// Start a source playing. Returns `false` in muted mode; the caller
    /// keeps its control surface either way.
    pub fn play<S>(&self, source: S) -> bool
    where
        S: Source<Item = f32> + Send + 'static,
    {
        self.device.play(source)
    }
}
