//! Spatial audio math: distance attenuation, doppler, occlusion,
//! environmental zones and stereo panning.
//!
//! Everything here is pure arithmetic over positions and velocities; the
//! per-tick driver lives in [`crate::sources`]. All models are cheap
//! perceptual approximations, not physically-based acoustics.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use overdrive_common::ListenerPose;

/// Speed of sound in m/s at sea level.
pub const SPEED_OF_SOUND: f32 = 343.0;

/// Default doppler scaling factor.
pub const DEFAULT_DOPPLER_FACTOR: f32 = 1.0;

/// Doppler pitch shift bounds.
pub const DOPPLER_PITCH_MIN: f32 = 0.5;
/// Doppler pitch shift bounds.
pub const DOPPLER_PITCH_MAX: f32 = 2.0;

/// Minimum combined occlusion factor; blocked sources are never fully
/// silent.
pub const OCCLUSION_FLOOR: f32 = 0.1;

/// Distance attenuation model for spatial sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum AttenuationModel {
    /// No distance attenuation.
    None,
    /// Linear falloff from reference to max distance.
    Linear,
    /// Inverse distance falloff (natural sounding).
    #[default]
    Inverse,
    /// Exponential falloff.
    Exponential,
}

impl AttenuationModel {
    /// Calculate the gain for a distance given reference distance, max
    /// distance and rolloff factor.
    #[must_use]
    pub fn gain(&self, distance: f32, ref_distance: f32, max_distance: f32, rolloff: f32) -> f32 {
        let ref_distance = ref_distance.max(0.001);
        let distance = distance.clamp(ref_distance, max_distance.max(ref_distance));

        match self {
            Self::None => 1.0,
            Self::Linear => {
                let range = (max_distance - ref_distance).max(0.001);
                (1.0 - rolloff * (distance - ref_distance) / range).clamp(0.0, 1.0)
            },
            Self::Inverse => {
                ref_distance / (ref_distance + rolloff * (distance - ref_distance))
            },
            Self::Exponential => (distance / ref_distance).powf(-rolloff),
        }
    }
}

/// Doppler pitch shift for a moving source and a stationary listener.
///
/// The listener-velocity term is deliberately omitted; in practice the
/// observer is the camera and its motion reads as world motion, not
/// pitch. Result is clamped to [0.5, 2.0] so extreme closing speeds
/// never produce absurd pitches.
#[must_use]
pub fn doppler_shift(
    source_position: Vec3,
    source_velocity: Vec3,
    listener_position: Vec3,
    doppler_factor: f32,
) -> f32 {
    let Some(to_listener) = (listener_position - source_position).try_normalize() else {
        return 1.0;
    };
    // Positive when the source closes on the listener.
    let closing_speed = source_velocity.dot(to_listener) * doppler_factor;
    let denominator = SPEED_OF_SOUND - closing_speed;
    if denominator <= f32::EPSILON {
        // Source at or beyond the speed of sound toward the listener.
        return DOPPLER_PITCH_MAX;
    }
    (SPEED_OF_SOUND / denominator).clamp(DOPPLER_PITCH_MIN, DOPPLER_PITCH_MAX)
}

/// Stereo pan position in [-1, 1] for a source relative to the listener.
///
/// Projection of the direction to the source onto the listener's right
/// vector; sources straight ahead or coincident pan center.
#[must_use]
pub fn pan_position(listener: &ListenerPose, source_position: Vec3) -> f32 {
    let Some(dir) = (source_position - listener.position).try_normalize() else {
        return 0.0;
    };
    dir.dot(listener.right()).clamp(-1.0, 1.0)
}

/// Material tag returned by scene geometry raycasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceMaterial {
    /// Solid wall, heavy attenuation.
    Wall,
    /// Glass, light attenuation.
    Glass,
    /// Vegetation.
    Foliage,
    /// Sheet metal, fences, vehicle bodies.
    Metal,
    /// Anything else.
    Other,
}

impl SurfaceMaterial {
    /// Per-hit attenuation multiplier. Only walls and glass are special;
    /// every other tag uses the generic partial blocker value.
    #[must_use]
    pub const fn attenuation(&self) -> f32 {
        match self {
            Self::Wall => 0.3,
            Self::Glass => 0.7,
            Self::Foliage | Self::Metal | Self::Other => 0.8,
        }
    }
}

/// A single ray intersection against scene geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance from the ray origin to the hit.
    pub distance: f32,
    /// Material of the surface that was hit.
    pub material: SurfaceMaterial,
}

/// Ray-intersectable scene geometry supplied by the game layer.
///
/// Implementations append every intersection of the segment `from → to`
/// into `hits` (order does not matter). The scratch vector is reused
/// across ticks to keep the update loop allocation-free.
pub trait SceneGeometry {
    /// Collect all hits along the segment between two points.
    fn raycast(&self, from: Vec3, to: Vec3, hits: &mut Vec<RayHit>);
}

/// Geometry with nothing in it; every path is clear.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScene;

impl SceneGeometry for EmptyScene {
    fn raycast(&self, _from: Vec3, _to: Vec3, _hits: &mut Vec<RayHit>) {}
}

/// Axis-aligned occluder box with a material tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OccluderBox {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
    /// Material reported on hit.
    pub material: SurfaceMaterial,
}

impl OccluderBox {
    /// Create an occluder box from corner points.
    #[must_use]
    pub fn new(min: Vec3, max: Vec3, material: SurfaceMaterial) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
            material,
        }
    }

    /// Slab-method segment intersection. Returns the entry distance if
    /// the segment crosses the box.
    fn intersect_segment(&self, from: Vec3, to: Vec3) -> Option<f32> {
        let delta = to - from;
        let length = delta.length();
        if length <= f32::EPSILON {
            return None;
        }
        let dir = delta / length;

        let mut t_min: f32 = 0.0;
        let mut t_max: f32 = length;
        for axis in 0..3 {
            let d = dir[axis];
            if d.abs() < 1e-8 {
                if from[axis] < self.min[axis] || from[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (self.min[axis] - from[axis]) * inv;
            let mut t1 = (self.max[axis] - from[axis]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

/// Simple scene made of axis-aligned occluder boxes.
#[derive(Debug, Clone, Default)]
pub struct BoxScene {
    occluders: Vec<OccluderBox>,
}

impl BoxScene {
    /// Create an empty box scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an occluder box.
    pub fn add(&mut self, occluder: OccluderBox) {
        self.occluders.push(occluder);
    }

    /// Number of occluders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.occluders.len()
    }

    /// Whether the scene has no occluders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occluders.is_empty()
    }
}

impl SceneGeometry for BoxScene {
    fn raycast(&self, from: Vec3, to: Vec3, hits: &mut Vec<RayHit>) {
        for occluder in &self.occluders {
            if let Some(distance) = occluder.intersect_segment(from, to) {
                hits.push(RayHit {
                    distance,
                    material: occluder.material,
                });
            }
        }
    }
}

/// Fold per-material multipliers across all hits on the listener→source
/// path. No hits means no attenuation; the result is floored so blocked
/// sources stay faintly audible.
#[must_use]
pub fn occlusion_factor(hits: &[RayHit]) -> f32 {
    if hits.is_empty() {
        return 1.0;
    }
    let folded: f32 = hits.iter().map(|h| h.material.attenuation()).product();
    folded.max(OCCLUSION_FLOOR)
}

/// Environmental zone effect type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneEffect {
    /// Boosts gain slightly (reflective space).
    Reverb,
    /// Cuts gain (absorptive space, e.g. underwater or dense interior).
    Muffle,
    /// Small gain boost (hard canyon-like space).
    Echo,
}

impl ZoneEffect {
    /// Gain multiplier contributed at a given influence in [0, 1].
    #[must_use]
    pub fn gain_factor(&self, influence: f32) -> f32 {
        match self {
            Self::Reverb => 1.0 + 0.2 * influence,
            Self::Muffle => 1.0 - 0.5 * influence,
            Self::Echo => 1.0 + 0.1 * influence,
        }
    }
}

/// Static environmental region that colors sources inside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioZone {
    /// Zone center.
    pub center: Vec3,
    /// Zone radius; influence falls linearly to zero at the edge.
    pub radius: f32,
    /// Effect applied to sources inside the zone.
    pub effect: ZoneEffect,
    /// Effect intensity scale, normally 1.0.
    pub intensity: f32,
}

impl AudioZone {
    /// Create a zone with full intensity.
    #[must_use]
    pub fn new(center: Vec3, radius: f32, effect: ZoneEffect) -> Self {
        Self {
            center,
            radius,
            effect,
            intensity: 1.0,
        }
    }

    /// Sets the intensity scale.
    #[must_use]
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity.max(0.0);
        self
    }

    /// Influence on a position: `1 − distance/radius`, scaled by
    /// intensity. `None` when the position is outside the zone.
    #[must_use]
    pub fn influence(&self, position: Vec3) -> Option<f32> {
        if self.radius <= 0.0 {
            return None;
        }
        let distance = position.distance(self.center);
        if distance >= self.radius {
            return None;
        }
        Some((1.0 - distance / self.radius) * self.intensity)
    }
}

/// Combined multiplicative gain of every zone containing a position.
/// Zones out of range contribute no factor.
#[must_use]
pub fn environmental_gain(zones: &[AudioZone], position: Vec3) -> f32 {
    zones
        .iter()
        .filter_map(|zone| zone.influence(position).map(|i| zone.effect.gain_factor(i)))
        .product::<f32>()
        .max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_attenuation_none() {
        let gain = AttenuationModel::None.gain(500.0, 1.0, 100.0, 1.0);
        assert!((gain - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_attenuation_inverse_decreases() {
        let model = AttenuationModel::Inverse;
        let near = model.gain(1.0, 1.0, 100.0, 1.0);
        let mid = model.gain(10.0, 1.0, 100.0, 1.0);
        let far = model.gain(100.0, 1.0, 100.0, 1.0);
        assert!((near - 1.0).abs() < EPSILON);
        assert!(mid < near);
        assert!(far < mid);
        assert!(far > 0.0);
    }

    #[test]
    fn test_attenuation_clamps_below_reference() {
        // Inside the reference distance there is no attenuation.
        let gain = AttenuationModel::Inverse.gain(0.1, 1.0, 100.0, 1.0);
        assert!((gain - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_attenuation_linear_reaches_zero() {
        let gain = AttenuationModel::Linear.gain(100.0, 1.0, 100.0, 1.0);
        assert!(gain.abs() < EPSILON);
    }

    #[test]
    fn test_doppler_approaching_raises_pitch() {
        // Source at +X moving toward the origin listener.
        let shift = doppler_shift(
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::new(-30.0, 0.0, 0.0),
            Vec3::ZERO,
            DEFAULT_DOPPLER_FACTOR,
        );
        assert!(shift > 1.0);
        assert!(shift <= DOPPLER_PITCH_MAX);
    }

    #[test]
    fn test_doppler_receding_lowers_pitch() {
        let shift = doppler_shift(
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::ZERO,
            DEFAULT_DOPPLER_FACTOR,
        );
        assert!(shift < 1.0);
        assert!(shift >= DOPPLER_PITCH_MIN);
    }

    #[test]
    fn test_doppler_stationary_is_unity() {
        let shift = doppler_shift(
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::ZERO,
            Vec3::ZERO,
            DEFAULT_DOPPLER_FACTOR,
        );
        assert!((shift - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_doppler_coincident_is_unity() {
        let shift = doppler_shift(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0), Vec3::ZERO, 1.0);
        assert!((shift - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_doppler_supersonic_clamps_high() {
        let shift = doppler_shift(
            Vec3::new(500.0, 0.0, 0.0),
            Vec3::new(-400.0, 0.0, 0.0),
            Vec3::ZERO,
            DEFAULT_DOPPLER_FACTOR,
        );
        assert!((shift - DOPPLER_PITCH_MAX).abs() < EPSILON);
    }

    proptest! {
        #[test]
        fn test_doppler_always_in_bounds(
            vx in -2000.0f32..2000.0,
            vy in -2000.0f32..2000.0,
            vz in -2000.0f32..2000.0,
            px in -100.0f32..100.0,
            factor in 0.0f32..4.0,
        ) {
            let shift = doppler_shift(
                Vec3::new(px, 1.0, 0.0),
                Vec3::new(vx, vy, vz),
                Vec3::ZERO,
                factor,
            );
            prop_assert!((DOPPLER_PITCH_MIN..=DOPPLER_PITCH_MAX).contains(&shift));
        }
    }

    #[test]
    fn test_pan_follows_listener_right() {
        let listener = ListenerPose::at(Vec3::ZERO); // facing -Z, right = +X
        assert!((pan_position(&listener, Vec3::new(10.0, 0.0, 0.0)) - 1.0).abs() < EPSILON);
        assert!((pan_position(&listener, Vec3::new(-10.0, 0.0, 0.0)) + 1.0).abs() < EPSILON);
        assert!(pan_position(&listener, Vec3::new(0.0, 0.0, -10.0)).abs() < EPSILON);
    }

    #[test]
    fn test_pan_coincident_is_center() {
        let listener = ListenerPose::at(Vec3::ZERO);
        assert!(pan_position(&listener, Vec3::ZERO).abs() < EPSILON);
    }

    #[test]
    fn test_occlusion_clear_path() {
        assert!((occlusion_factor(&[]) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_occlusion_wall_below_glass() {
        let wall = occlusion_factor(&[RayHit {
            distance: 1.0,
            material: SurfaceMaterial::Wall,
        }]);
        let glass = occlusion_factor(&[RayHit {
            distance: 1.0,
            material: SurfaceMaterial::Glass,
        }]);
        assert!(wall < glass);
        assert!((wall - 0.3).abs() < EPSILON);
        assert!((glass - 0.7).abs() < EPSILON);
    }

    #[test]
    fn test_occlusion_floors_at_minimum() {
        let hits = vec![
            RayHit { distance: 1.0, material: SurfaceMaterial::Wall },
            RayHit { distance: 2.0, material: SurfaceMaterial::Wall },
            RayHit { distance: 3.0, material: SurfaceMaterial::Wall },
        ];
        assert!((occlusion_factor(&hits) - OCCLUSION_FLOOR).abs() < EPSILON);
    }

    #[test]
    fn test_box_scene_raycast() {
        let mut scene = BoxScene::new();
        scene.add(OccluderBox::new(
            Vec3::new(4.0, -1.0, -1.0),
            Vec3::new(6.0, 1.0, 1.0),
            SurfaceMaterial::Wall,
        ));

        let mut hits = Vec::new();
        scene.raycast(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), &mut hits);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].material, SurfaceMaterial::Wall);
        assert!((hits[0].distance - 4.0).abs() < EPSILON);

        // Segment stops short of the box.
        hits.clear();
        scene.raycast(Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), &mut hits);
        assert!(hits.is_empty());

        // Segment misses laterally.
        hits.clear();
        scene.raycast(
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::new(10.0, 5.0, 0.0),
            &mut hits,
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn test_zone_influence_falloff() {
        let zone = AudioZone::new(Vec3::ZERO, 10.0, ZoneEffect::Reverb);
        assert!((zone.influence(Vec3::ZERO).unwrap() - 1.0).abs() < EPSILON);
        assert!((zone.influence(Vec3::new(5.0, 0.0, 0.0)).unwrap() - 0.5).abs() < EPSILON);
        assert!(zone.influence(Vec3::new(10.0, 0.0, 0.0)).is_none());
        assert!(zone.influence(Vec3::new(50.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_zone_stacking_is_multiplicative() {
        // Two reverb zones with influences 0.5 and 0.3 at the origin.
        let zones = vec![
            AudioZone::new(Vec3::ZERO, 10.0, ZoneEffect::Reverb),
            AudioZone::new(Vec3::new(0.0, 0.0, 7.0), 10.0, ZoneEffect::Reverb),
        ];
        let gain = environmental_gain(&zones, Vec3::new(5.0, 0.0, 0.0));
        // influence_a = 1 - 5/10 = 0.5
        // influence_b = 1 - sqrt(74)/10 ≈ 0.1398
        let expected = (1.0 + 0.2 * 0.5) * (1.0 + 0.2 * (1.0 - 74.0f32.sqrt() / 10.0));
        assert!((gain - expected).abs() < 1e-3);
    }

    #[test]
    fn test_zone_stacking_reference_values() {
        let gain = [0.5f32, 0.3]
            .iter()
            .map(|i| ZoneEffect::Reverb.gain_factor(*i))
            .product::<f32>();
        assert!((gain - 1.166).abs() < 1e-3);
    }

    #[test]
    fn test_zone_muffle_cuts_gain() {
        let zones = vec![AudioZone::new(Vec3::ZERO, 10.0, ZoneEffect::Muffle)];
        let gain = environmental_gain(&zones, Vec3::ZERO);
        assert!((gain - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_no_zones_unity_gain() {
        assert!((environmental_gain(&[], Vec3::ZERO) - 1.0).abs() < EPSILON);
    }
}
