//! # Overdrive Audio
//!
//! Vehicle engine synthesis and 3D spatial audio for Project Overdrive.
//!
//! This crate provides the real-time audio control layer:
//! - Procedural engine sound (oscillator + noise layers cross-faded by
//!   RPM and throttle) with a startup/running/stopping lifecycle
//! - Positioned spatial sources with doppler, geometry occlusion,
//!   environmental zones and distance attenuation
//! - A write-only audio graph bridging the 60 Hz control domain and the
//!   sample-rate render domain through smoothed parameter targets
//! - A sound bank of decoded PCM assets keyed by symbolic ID
//!
//! ## Architecture
//!
//! Everything hangs off an explicitly constructed [`AudioEngineContext`]
//! owned by the host application; there is no global audio state. The
//! [`EngineSynthesizer`] and [`SpatialAudioEngine`] are driven once per
//! simulation tick by the game loop and never block: the only bridge to
//! the render thread is atomic parameter writes, applied there as
//! exponential ramps so control-rate changes stay click-free.
//!
//! ## Failure model
//!
//! Audio never takes down the host. Missing assets drop the cue, invalid
//! lifecycle transitions return failure flags, out-of-range inputs are
//! clamped, and a missing output device degrades to muted operation with
//! full control-layer semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod assets;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod sources;
pub mod spatial;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::assets::*;
    pub use crate::context::*;
    pub use crate::engine::*;
    pub use crate::error::*;
    pub use crate::graph::*;
    pub use crate::sources::*;
    pub use crate::spatial::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use overdrive_common::prelude::*;
    use std::sync::Arc;

    // End-to-end smoke test over a muted context: engine running while a
    // spatial cue plays through a wall.
    #[test]
    fn test_engine_and_spatial_together() {
        let context = Arc::new(AudioEngineContext::muted());
        context.register_sound("explosion_small", vec![0.1f32; 44_100], 44_100, 1);

        let mut engine = EngineSynthesizer::new(context.clone());
        let mut spatial = SpatialAudioEngine::new(context);
        spatial.set_listener(ListenerPose::at(Vec3::ZERO));

        engine.start("sports").expect("engine should start");
        let cue = spatial
            .create_source(
                &SoundId::new("explosion_small"),
                Vec3::new(10.0, 0.0, 0.0),
                SpatialSourceOptions::default().with_looping(true),
            )
            .expect("source should allocate");
        spatial.play(cue, 0.0).expect("source should play");

        let kinematics = VehicleKinematics::at(Vec3::ZERO);
        for _ in 0..120 {
            engine.update(1.0 / 60.0, &kinematics);
            spatial.update(1.0 / 60.0, &EmptyScene);
        }

        assert!(engine.phase().is_active());
        assert!(spatial.is_playing(cue));
    }
}
