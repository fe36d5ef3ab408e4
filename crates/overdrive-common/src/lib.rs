//! # Overdrive Common
//!
//! Common types and shared abstractions for Project Overdrive.
//!
//! This crate provides foundational types used across Overdrive subsystems:
//! - ID types (`EntityId`, `SoundId`)
//! - Kinematic value types exchanged with the game-state provider

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod ids;
pub mod kinematics;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::kinematics::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_generation() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_sound_id_roundtrip() {
        let id = SoundId::new("engine_start");
        assert_eq!(id.as_str(), "engine_start");
    }
}
