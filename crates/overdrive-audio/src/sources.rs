//! Spatial source pool and per-tick spatial update.
//!
//! [`SpatialAudioEngine`] owns every positioned source in a fixed-capacity
//! slot pool; handles are index + generation pairs so a freed slot can be
//! reused without stale handles resolving to the new occupant. The
//! per-tick [`SpatialAudioEngine::update`] recomputes doppler, occlusion,
//! zone gain and distance attenuation for each playing source and pushes
//! the results into the voices as smoothed parameter writes.

use std::sync::Arc;

use glam::Vec3;
use tracing::{debug, warn};

use overdrive_common::{EntityId, ListenerPose, SoundId};

use crate::context::AudioEngineContext;
use crate::error::{AudioError, AudioResult};
use crate::graph::{BufferVoice, BufferVoiceControl, FREQ_SMOOTHING, GAIN_SMOOTHING};
use crate::spatial::{
    doppler_shift, environmental_gain, occlusion_factor, pan_position, AttenuationModel,
    AudioZone, RayHit, SceneGeometry, DEFAULT_DOPPLER_FACTOR,
};

/// Fixed number of concurrent spatial source slots.
pub const MAX_SPATIAL_SOURCES: usize = 32;

/// Handle to a pooled spatial source.
///
/// Becomes stale once the source is stopped or ends; stale handles fail
/// with [`AudioError::StaleHandle`] instead of touching a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle {
    index: u32,
    generation: u32,
}

/// Creation options for a spatial source.
#[derive(Debug, Clone, Copy)]
pub struct SpatialSourceOptions {
    /// Base volume before spatial attenuation.
    pub volume: f32,
    /// Loop playback until stopped.
    pub looping: bool,
    /// Static pitch multiplier, combined with doppler.
    pub pitch: f32,
    /// Distance at which attenuation begins.
    pub ref_distance: f32,
    /// Distance past which attenuation stops increasing.
    pub max_distance: f32,
    /// Attenuation rolloff factor.
    pub rolloff: f32,
    /// Distance attenuation model.
    pub attenuation: AttenuationModel,
    /// Doppler scaling factor.
    pub doppler_factor: f32,
    /// Initial velocity, used until position updates supply one.
    pub initial_velocity: Vec3,
    /// Gameplay entity this source belongs to, for bulk control when the
    /// emitter goes away.
    pub emitter: Option<EntityId>,
}

impl SpatialSourceOptions {
    /// Sets the base volume.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.max(0.0);
        self
    }

    /// Enables looping.
    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Sets the static pitch multiplier.
    #[must_use]
    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch.max(0.0);
        self
    }

    /// Sets the distance attenuation shape.
    #[must_use]
    pub fn with_attenuation(
        mut self,
        model: AttenuationModel,
        ref_distance: f32,
        max_distance: f32,
        rolloff: f32,
    ) -> Self {
        self.attenuation = model;
        self.ref_distance = ref_distance;
        self.max_distance = max_distance;
        self.rolloff = rolloff;
        self
    }

    /// Sets the initial velocity.
    #[must_use]
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.initial_velocity = velocity;
        self
    }

    /// Tags the source with the gameplay entity that emits it.
    #[must_use]
    pub fn with_emitter(mut self, emitter: EntityId) -> Self {
        self.emitter = Some(emitter);
        self
    }
}

impl Default for SpatialSourceOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            looping: false,
            pitch: 1.0,
            ref_distance: 1.0,
            max_distance: 100.0,
            rolloff: 1.0,
            attenuation: AttenuationModel::Inverse,
            doppler_factor: DEFAULT_DOPPLER_FACTOR,
            initial_velocity: Vec3::ZERO,
            emitter: None,
        }
    }
}

/// Derived per-source factors, recomputed every tick. Exposed for
/// diagnostics and tests; playback reads them only through the voice
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceFactors {
    /// Folded geometry occlusion factor.
    pub occlusion: f32,
    /// Reserved partial-blocker factor, currently always 1.0.
    pub obstruction: f32,
    /// Combined environmental zone gain.
    pub environmental: f32,
    /// Distance attenuation gain.
    pub distance: f32,
}

impl Default for SourceFactors {
    fn default() -> Self {
        Self {
            occlusion: 1.0,
            obstruction: 1.0,
            environmental: 1.0,
            distance: 1.0,
        }
    }
}

/// A pooled positioned source.
#[derive(Debug)]
struct SpatialSource {
    position: Vec3,
    last_position: Vec3,
    velocity: Vec3,
    options: SpatialSourceOptions,
    control: Arc<BufferVoiceControl>,
    /// Voice waiting to be handed to the device on `play`.
    pending_voice: Option<BufferVoice>,
    playing: bool,
    /// Seconds of playback remaining before natural end (delay +
    /// duration); drives eviction when the device never drains the voice.
    remaining: f32,
    factors: SourceFactors,
}

#[derive(Debug)]
struct SourceSlot {
    generation: u32,
    entry: Option<SpatialSource>,
}

/// Fixed-capacity spatial audio engine.
///
/// Single-threaded by design: `update` is called once per simulation
/// tick from the game loop and never blocks.
#[derive(Debug)]
pub struct SpatialAudioEngine {
    context: Arc<AudioEngineContext>,
    slots: Vec<SourceSlot>,
    active: usize,
    listener: Option<ListenerPose>,
    zones: Vec<AudioZone>,
    hits_scratch: Vec<RayHit>,
}

impl SpatialAudioEngine {
    /// Create an engine bound to a context, with all slots free.
    #[must_use]
    pub fn new(context: Arc<AudioEngineContext>) -> Self {
        let slots = (0..MAX_SPATIAL_SOURCES)
            .map(|_| SourceSlot {
                generation: 1,
                entry: None,
            })
            .collect();
        Self {
            context,
            slots,
            active: 0,
            listener: None,
            zones: Vec::new(),
            hits_scratch: Vec::new(),
        }
    }

    /// Number of live sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.active
    }

    /// Update the listener pose for subsequent ticks.
    pub fn set_listener(&mut self, pose: ListenerPose) {
        self.listener = Some(pose);
    }

    /// Current listener pose, if one has been set.
    #[must_use]
    pub fn listener(&self) -> Option<ListenerPose> {
        self.listener
    }

    /// Add an environmental zone.
    pub fn add_zone(&mut self, zone: AudioZone) {
        self.zones.push(zone);
    }

    /// Remove all environmental zones.
    pub fn clear_zones(&mut self) {
        self.zones.clear();
    }

    /// Registered zones.
    #[must_use]
    pub fn zones(&self) -> &[AudioZone] {
        &self.zones
    }

    /// Allocate a source for a registered sound at a position.
    ///
    /// Fails if the sound is unknown or every slot is occupied; no
    /// partial state is left behind on failure.
    pub fn create_source(
        &mut self,
        sound: &SoundId,
        position: Vec3,
        options: SpatialSourceOptions,
    ) -> AudioResult<SourceHandle> {
        let buffer = self.context.buffer(sound)?;

        let index = self
            .slots
            .iter()
            .position(|slot| slot.entry.is_none())
            .ok_or(AudioError::PoolExhausted {
                capacity: MAX_SPATIAL_SOURCES,
            })?;

        let control = Arc::new(BufferVoiceControl::new());
        control.gain.set_immediate(0.0);
        control.rate.set_immediate(options.pitch);

        let duration = buffer.duration.as_secs_f32();
        let voice = BufferVoice::new(buffer, control.clone(), options.looping);

        let slot = &mut self.slots[index];
        slot.entry = Some(SpatialSource {
            position,
            last_position: position,
            velocity: options.initial_velocity,
            options,
            control,
            pending_voice: Some(voice),
            playing: false,
            remaining: duration,
            factors: SourceFactors::default(),
        });
        self.active += 1;

        debug!("Created spatial source '{sound}' in slot {index}");
        Ok(SourceHandle {
            index: index as u32,
            generation: slot.generation,
        })
    }

    /// Start playback, optionally delayed. No-op if already playing.
    pub fn play(&mut self, handle: SourceHandle, delay_seconds: f32) -> AudioResult<()> {
        let muted = self.context.is_muted();
        let source = self.resolve_mut(handle)?;
        if source.playing {
            return Ok(());
        }
        source.playing = true;
        source.remaining += delay_seconds.max(0.0);

        if let Some(voice) = source.pending_voice.take() {
            let voice =
                voice.with_start_delay(std::time::Duration::from_secs_f32(delay_seconds.max(0.0)));
            if !self.context.play(voice) && !muted {
                warn!("Spatial voice failed to reach the device");
            }
        }
        Ok(())
    }

    /// Stop and evict a source. Idempotent; stale handles are ignored.
    pub fn stop(&mut self, handle: SourceHandle) {
        if let Ok(source) = self.resolve_mut(handle) {
            source.control.stop();
            self.free_slot(handle.index as usize);
        }
    }

    /// Whether a handle refers to a live, playing source.
    #[must_use]
    pub fn is_playing(&self, handle: SourceHandle) -> bool {
        self.resolve(handle).is_ok_and(|s| s.playing)
    }

    /// Derived spatial factors for a live source.
    pub fn source_factors(&self, handle: SourceHandle) -> AudioResult<SourceFactors> {
        self.resolve(handle).map(|s| s.factors)
    }

    /// Current position of a live source.
    pub fn source_position(&self, handle: SourceHandle) -> AudioResult<Vec3> {
        self.resolve(handle).map(|s| s.position)
    }

    /// Current (supplied or inferred) velocity of a live source.
    pub fn source_velocity(&self, handle: SourceHandle) -> AudioResult<Vec3> {
        self.resolve(handle).map(|s| s.velocity)
    }

    /// Emitter tag of a live source, if it was created with one.
    pub fn source_emitter(&self, handle: SourceHandle) -> AudioResult<Option<EntityId>> {
        self.resolve(handle).map(|s| s.options.emitter)
    }

    /// Stop every source tagged with an emitter. Used when the gameplay
    /// object goes away; returns how many sources were evicted.
    pub fn stop_emitter(&mut self, emitter: EntityId) -> usize {
        let mut stopped = 0;
        for index in 0..self.slots.len() {
            if let Some(source) = &self.slots[index].entry {
                if source.options.emitter == Some(emitter) {
                    source.control.stop();
                    self.free_slot(index);
                    stopped += 1;
                }
            }
        }
        stopped
    }

    /// Move a source. When `velocity` is absent it is inferred as the
    /// one-tick finite difference of positions, which makes it sensitive
    /// to call frequency — a known approximation.
    pub fn update_position(
        &mut self,
        handle: SourceHandle,
        position: Vec3,
        velocity: Option<Vec3>,
    ) -> AudioResult<()> {
        let source = self.resolve_mut(handle)?;
        source.last_position = source.position;
        source.position = position;
        source.velocity = velocity.unwrap_or(position - source.last_position);
        Ok(())
    }

    /// Per-tick spatial update.
    ///
    /// No-op without a listener or active sources. Pure arithmetic plus
    /// one bounded raycast per playing source; allocation-free after the
    /// first tick.
    pub fn update(&mut self, dt: f32, geometry: &dyn SceneGeometry) {
        let Some(listener) = self.listener else {
            return;
        };
        if self.active == 0 {
            return;
        }

        let buses = self.context.buses();
        let effects_gain = buses.effective_effects();

        for index in 0..self.slots.len() {
            let Some(source) = self.slots[index].entry.as_mut() else {
                continue;
            };
            if !source.playing {
                continue;
            }

            // Natural-end eviction: either the render side drained the
            // voice, or (muted / loop-less timing) the clock ran out.
            if !source.options.looping {
                source.remaining -= dt;
            }
            if source.control.is_finished()
                || (!source.options.looping && source.remaining <= 0.0)
            {
                source.control.stop();
                self.free_slot(index);
                continue;
            }

            let distance = listener.position.distance(source.position);

            // Doppler, combined with the static pitch.
            let shift = doppler_shift(
                source.position,
                source.velocity,
                listener.position,
                source.options.doppler_factor,
            );
            source
                .control
                .rate
                .set_smoothed(shift * source.options.pitch, FREQ_SMOOTHING);

            // Geometry hits between listener and source.
            self.hits_scratch.clear();
            geometry.raycast(listener.position, source.position, &mut self.hits_scratch);
            source.factors.occlusion = occlusion_factor(&self.hits_scratch);
            source.factors.obstruction = 1.0;

            source.factors.environmental = environmental_gain(&self.zones, source.position);
            source.factors.distance = source.options.attenuation.gain(
                distance,
                source.options.ref_distance,
                source.options.max_distance,
                source.options.rolloff,
            );

            let gain = source.options.volume
                * source.factors.distance
                * source.factors.occlusion
                * source.factors.obstruction
                * source.factors.environmental
                * effects_gain;
            source.control.gain.set_smoothed(gain.max(0.0), GAIN_SMOOTHING);

            // Position is already smooth from physics; pan snaps.
            source
                .control
                .pan
                .set_immediate(pan_position(&listener, source.position));
        }
    }

    /// Stop everything and free all slots.
    pub fn stop_all(&mut self) {
        for index in 0..self.slots.len() {
            if let Some(source) = &self.slots[index].entry {
                source.control.stop();
                self.free_slot(index);
            }
        }
    }

    fn resolve(&self, handle: SourceHandle) -> AudioResult<&SpatialSource> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(AudioError::StaleHandle)
    }

    fn resolve_mut(&mut self, handle: SourceHandle) -> AudioResult<&mut SpatialSource> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(AudioError::StaleHandle)
    }

    /// Free a slot and bump its generation so old handles go stale.
    fn free_slot(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if slot.entry.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.active -= 1;
        }
    }
}
