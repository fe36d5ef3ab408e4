//! ID types for entities and sound assets.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Global counter for entity IDs.
static ENTITY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an entity in the game world.
///
/// Used to correlate sound sources with the gameplay objects that emit
/// them (vehicles, impacts, creatures).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new unique entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(ENTITY_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an entity ID from a raw value (for deserialization).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(0);

    /// Checks if this is a valid (non-null) entity ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbolic identifier for a sound asset (e.g. `"engine_start"`,
/// `"explosion_small"`).
///
/// Sound IDs are cheap to clone; static cue names borrow, dynamically
/// composed names allocate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SoundId(Cow<'static, str>);

impl SoundId {
    /// Creates a sound ID from a static cue name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a sound ID from an owned string.
    #[must_use]
    pub fn from_string(name: String) -> Self {
        Self(Cow::Owned(name))
    }

    /// Returns the cue name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for SoundId {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SoundId {
    fn from(name: String) -> Self {
        Self::from_string(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_null() {
        assert!(!EntityId::NULL.is_valid());
        assert!(EntityId::new().is_valid());
    }

    #[test]
    fn test_entity_id_from_raw() {
        let id = EntityId::from_raw(42);
        assert_eq!(id.raw(), 42);
    }

    #[test]
    fn test_sound_id_equality() {
        let a = SoundId::new("backfire");
        let b = SoundId::from_string("backfire".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn test_sound_id_display() {
        let id = SoundId::new("gear_click");
        assert_eq!(format!("{id}"), "gear_click");
    }
}
