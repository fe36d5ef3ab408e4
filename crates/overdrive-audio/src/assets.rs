//! Sound asset store.
//!
//! Maps symbolic sound identifiers (e.g. `"engine_start"`,
//! `"explosion_small"`) to decoded PCM buffers. Decoding and file I/O
//! happen upstream in the asset pipeline; this store only holds
//! ready-to-play sample data and is queried read-only during playback.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use overdrive_common::SoundId;
use tracing::{debug, warn};

/// Maximum number of registered sound buffers.
pub const MAX_SOUND_BUFFERS: usize = 256;

/// Audio buffer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u32);

impl BufferId {
    /// Create a new buffer ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID.
    #[must_use]
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

/// Decoded PCM audio, shared cheaply between the control layer and
/// playing voices.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Unique buffer identifier.
    pub id: BufferId,
    /// Sample data (interleaved if stereo).
    pub samples: Arc<Vec<f32>>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Duration of the audio.
    pub duration: Duration,
}

impl AudioBuffer {
    /// Create a new audio buffer from samples.
    #[must_use]
    pub fn new(id: BufferId, samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        let duration_secs = frames as f64 / f64::from(sample_rate.max(1));

        Self {
            id,
            samples: Arc::new(samples),
            sample_rate,
            channels,
            duration: Duration::from_secs_f64(duration_secs),
        }
    }

    /// Get the number of frames (samples per channel).
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Get the size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

/// Read-only store of decoded sound assets keyed by symbolic ID.
#[derive(Debug, Default)]
pub struct SoundBank {
    buffers: AHashMap<SoundId, AudioBuffer>,
    next_id: u32,
    total_size: usize,
}

impl SoundBank {
    /// Create an empty sound bank.
    #[must_use]
    pub fn new() -> Self {
        debug!("Created sound bank");
        Self::default()
    }

    /// Register a decoded buffer under a symbolic ID.
    ///
    /// Returns the buffer ID, or `None` if the bank is full. Re-registering
    /// an existing ID replaces the previous buffer.
    pub fn register(
        &mut self,
        id: impl Into<SoundId>,
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
    ) -> Option<BufferId> {
        let id = id.into();
        if self.buffers.len() >= MAX_SOUND_BUFFERS && !self.buffers.contains_key(&id) {
            warn!("Sound bank full, cannot register {id}");
            return None;
        }

        let buffer_id = BufferId::new(self.next_id);
        self.next_id += 1;

        let buffer = AudioBuffer::new(buffer_id, samples, sample_rate, channels);
        self.total_size += buffer.size_bytes();
        if let Some(old) = self.buffers.insert(id, buffer) {
            self.total_size -= old.size_bytes();
        }

        Some(buffer_id)
    }

    /// Look up a buffer by symbolic ID.
    #[must_use]
    pub fn get(&self, id: &SoundId) -> Option<&AudioBuffer> {
        self.buffers.get(id)
    }

    /// Check whether a sound ID is registered.
    #[must_use]
    pub fn contains(&self, id: &SoundId) -> bool {
        self.buffers.contains_key(id)
    }

    /// Remove a registered buffer.
    pub fn remove(&mut self, id: &SoundId) -> Option<AudioBuffer> {
        let removed = self.buffers.remove(id);
        if let Some(buffer) = &removed {
            self.total_size -= buffer.size_bytes();
        }
        removed
    }

    /// Number of registered buffers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.buffers.len()
    }

    /// Total registered size in bytes.
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.total_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_duration() {
        let samples = vec![0.0f32; 44_100 * 2]; // 1 second stereo
        let buffer = AudioBuffer::new(BufferId::new(0), samples, 44_100, 2);

        assert_eq!(buffer.frame_count(), 44_100);
        assert!(buffer.duration >= Duration::from_millis(999));
        assert!(buffer.duration <= Duration::from_millis(1001));
    }

    #[test]
    fn test_bank_register_and_get() {
        let mut bank = SoundBank::new();
        let id = bank.register("engine_start", vec![0.0f32; 100], 44_100, 1);
        assert!(id.is_some());

        assert!(bank.contains(&SoundId::new("engine_start")));
        assert!(bank.get(&SoundId::new("engine_start")).is_some());
        assert!(bank.get(&SoundId::new("missing")).is_none());
        assert_eq!(bank.count(), 1);
    }

    #[test]
    fn test_bank_replace_updates_size() {
        let mut bank = SoundBank::new();
        bank.register("thud", vec![0.0f32; 100], 44_100, 1);
        let before = bank.total_size();
        bank.register("thud", vec![0.0f32; 50], 44_100, 1);
        assert!(bank.total_size() < before);
        assert_eq!(bank.count(), 1);
    }

    #[test]
    fn test_bank_remove() {
        let mut bank = SoundBank::new();
        bank.register("thud", vec![0.0f32; 100], 44_100, 1);
        assert!(bank.remove(&SoundId::new("thud")).is_some());
        assert_eq!(bank.count(), 0);
        assert_eq!(bank.total_size(), 0);
    }
}
