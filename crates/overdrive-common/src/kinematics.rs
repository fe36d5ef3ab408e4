//! Kinematic value types exchanged with the game-state provider.
//!
//! The audio layer never reflects on gameplay objects directly; the
//! game-state provider copies the relevant state into these plain value
//! structs once per simulation tick.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Per-tick kinematic state of a vehicle, as supplied by the game-state
/// provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleKinematics {
    /// World position of the vehicle (engine emission point).
    pub position: Vec3,
    /// Velocity in world units per second.
    pub velocity: Vec3,
    /// Scalar speed in world units per second.
    pub speed: f32,
}

impl VehicleKinematics {
    /// Creates kinematics for a stationary vehicle at a position.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            speed: 0.0,
        }
    }

    /// Sets the velocity, deriving the scalar speed.
    #[must_use]
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self.speed = velocity.length();
        self
    }
}

impl Default for VehicleKinematics {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

/// Listener pose, updated once per tick from the camera/observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListenerPose {
    /// World position of the listener.
    pub position: Vec3,
    /// Facing direction (normalized).
    pub forward: Vec3,
    /// Up vector (normalized).
    pub up: Vec3,
}

impl ListenerPose {
    /// Creates a listener pose at a position with explicit orientation.
    ///
    /// Direction vectors are normalized; degenerate inputs fall back to
    /// the default orientation axis.
    #[must_use]
    pub fn new(position: Vec3, forward: Vec3, up: Vec3) -> Self {
        Self {
            position,
            forward: forward.try_normalize().unwrap_or(Vec3::NEG_Z),
            up: up.try_normalize().unwrap_or(Vec3::Y),
        }
    }

    /// Creates a listener at a position with the default orientation
    /// (facing -Z, +Y up).
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }

    /// Returns the listener's right vector (forward x up).
    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up)
    }
}

impl Default for ListenerPose {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}
