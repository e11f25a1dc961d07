//! Plunge attack impact
//!
//! Урон и shake растут с глубиной падения (start_height - landing height).
//! Глубина ≥ `heavy_depth` → heavy sound/particle.

use bevy::prelude::*;

use super::tuning::PlungeTuning;
use crate::host::DamageCause;
use crate::item::ItemContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlungeGrade {
    Plain,
    Heavy,
}

impl PlungeGrade {
    pub fn of(depth: f32, tuning: &PlungeTuning) -> Self {
        if depth >= tuning.heavy_depth {
            PlungeGrade::Heavy
        } else {
            PlungeGrade::Plain
        }
    }
}

/// Start-use qualifies for a plunge: airborne and looking down far enough.
pub fn can_plunge(tuning: &PlungeTuning, on_ground: bool, pitch: f32) -> bool {
    !on_ground && pitch >= tuning.min_pitch
}

pub fn impact_damage(tuning: &PlungeTuning, depth: f32) -> f32 {
    tuning.base_damage + depth.max(0.0) * tuning.damage_per_block
}

/// Land the plunge at `at`. Returns how many entities were damaged.
pub fn land(ctx: &mut ItemContext, tuning: &PlungeTuning, at: Vec3, depth: f32) -> (PlungeGrade, usize) {
    let grade = PlungeGrade::of(depth, tuning);
    let damage = impact_damage(tuning, depth);

    let mut hits = 0;
    for target in ctx.host.entities_near(at, tuning.radius) {
        if target == ctx.player {
            continue;
        }
        if let Ok(true) = ctx
            .host
            .apply_damage(target, damage, DamageCause::Impact, Some(ctx.player))
        {
            hits += 1;
        }
    }

    let (sound, particle) = match grade {
        PlungeGrade::Heavy => (&tuning.heavy_sound, &tuning.heavy_particle),
        PlungeGrade::Plain => (&tuning.plain_sound, &tuning.plain_particle),
    };
    ctx.play_sound_at(sound, at);
    ctx.particle(particle, at);
    ctx.shake(depth.max(0.0) * tuning.shake_per_block, 0.3);

    (grade, hits)
}
