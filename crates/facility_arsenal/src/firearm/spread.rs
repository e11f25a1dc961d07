//! Spread cone
//!
//! cone = base × ads × attachments + bloom + movement, × airborne
//! Отклонение: случайный pitch/yaw offset внутри cone (deterministic RNG).

use bevy::prelude::*;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::tuning::SpreadTuning;
use crate::host::{view_direction, PlayerState};

/// Cone half-angle in degrees for the next shot.
pub fn cone_degrees(tuning: &SpreadTuning, state: &PlayerState, recent_shots: u32, attachment_multiplier: f32) -> f32 {
    let ads = if state.sneaking { tuning.ads_multiplier } else { 1.0 };
    let bloom = recent_shots.min(tuning.bloom_max_shots) as f32 * tuning.bloom_per_shot;
    let movement = state.horizontal_speed() * tuning.move_per_speed;

    let cone = tuning.base * ads * attachment_multiplier + bloom + movement;
    if state.on_ground {
        cone
    } else {
        cone * tuning.airborne_multiplier
    }
}

/// View direction deviated by a random offset within `cone` degrees.
pub fn deviate(rotation: Vec2, cone: f32, rng: &mut ChaCha8Rng) -> Vec3 {
    if cone <= 0.0 {
        return view_direction(rotation);
    }
    let pitch = rng.gen_range(-cone..=cone);
    let yaw = rng.gen_range(-cone..=cone);
    view_direction(Vec2::new((rotation.x + pitch).clamp(-90.0, 90.0), rotation.y + yaw))
}
