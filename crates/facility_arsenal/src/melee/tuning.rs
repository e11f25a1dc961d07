//! Charge blade tuning
//!
//! Одна `ChargeBlade` FSM; storm katana и breaker greatsword отличаются только
//! данными: триггер lock-on, наличие plunge и slash wave.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::projectile::BeamTuning;

/// What keeps a lock-on alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockTrigger {
    /// Use re-pressed during the slash and held
    Use,
    /// Sneak held
    Sneak,
}

/// Uncharged swing from Idle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwingTuning {
    pub damage: f32,
    pub range: f32,
    pub cooldown_ticks: u32,
    pub sound: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockTuning {
    pub trigger: LockTrigger,
    pub range: f32,
    /// Distance kept between player and the first target
    pub offset: f32,
    pub max_targets: usize,
    pub tick_damage: f32,
    pub crit_damage: f32,
    pub crit_interval: u32,
    pub crit_sound: String,
    pub shake_chance: f32,
    pub shake_intensity: f32,
    pub particle_chance: f32,
    pub particle: String,
    pub blowoff_horizontal: f32,
    pub blowoff_vertical: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlungeTuning {
    /// Degrees; pitch > 0 = взгляд вниз
    pub min_pitch: f32,
    pub windup_ticks: u32,
    pub windup_sound: String,
    pub fall_impulse: f32,
    pub max_fall_ticks: u32,
    pub impact_ticks: u32,
    pub radius: f32,
    pub base_damage: f32,
    pub damage_per_block: f32,
    pub shake_per_block: f32,
    pub heavy_depth: f32,
    pub heavy_sound: String,
    pub heavy_particle: String,
    pub plain_sound: String,
    pub plain_particle: String,
}

/// Durability cost per damaging action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DurabilityCosts {
    pub swing: u32,
    pub slash: u32,
    pub lock_tick: u32,
    pub plunge: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BladeTuning {
    pub item_type_id: String,
    pub name: String,
    pub swing: SwingTuning,

    // === Charge ===
    pub charge_threshold: u32,
    pub charge_cue_interval: u32,
    pub charge_sound: String,
    pub ready_sound: String,

    // === Slash ===
    pub dash_tick: u32,
    pub dash_horizontal: f32,
    pub dash_vertical: f32,
    pub air_impulse: f32,
    pub slash_range: f32,
    pub slash_radius: f32,
    pub slash_damage: f32,
    pub damage_window: u32,
    pub redo_window: u32,
    pub recovery_ticks: u32,
    pub slash_sound: String,
    pub cooldown_channel: String,
    #[serde(default)]
    pub slash_wave: Option<BeamTuning>,

    #[serde(default)]
    pub lock: Option<LockTuning>,
    #[serde(default)]
    pub plunge: Option<PlungeTuning>,
    pub costs: DurabilityCosts,
}

fn invalid(item: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        item: item.to_string(),
        reason: reason.to_string(),
    }
}

impl BladeTuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let item = self.item_type_id.as_str();
        if self.charge_threshold == 0 {
            return Err(invalid(item, "charge_threshold must be non-zero"));
        }
        if self.damage_window == 0 {
            return Err(invalid(item, "damage_window must be non-zero"));
        }
        if self.slash_radius <= 0.0 || self.swing.range <= 0.0 {
            return Err(invalid(item, "swing and slash volumes must be positive"));
        }
        if let Some(lock) = &self.lock {
            if lock.crit_interval == 0 || lock.max_targets == 0 {
                return Err(invalid(item, "lock-on needs crit_interval and max_targets"));
            }
        }
        if let Some(plunge) = &self.plunge {
            if plunge.heavy_depth <= 0.0 || plunge.max_fall_ticks == 0 {
                return Err(invalid(item, "plunge needs heavy_depth and max_fall_ticks"));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Presets
    // ========================================================================

    /// Fast blade, lock-on while use is held.
    pub fn storm_katana() -> Self {
        Self {
            item_type_id: "arsenal:storm_katana".into(),
            name: "Storm katana".into(),
            swing: SwingTuning {
                damage: 6.0,
                range: 3.0,
                cooldown_ticks: 8,
                sound: "arsenal.katana.swing".into(),
            },
            charge_threshold: 10,
            charge_cue_interval: 4,
            charge_sound: "arsenal.katana.charge".into(),
            ready_sound: "arsenal.katana.ready".into(),
            dash_tick: 2,
            dash_horizontal: 1.6,
            dash_vertical: 0.2,
            air_impulse: 0.8,
            slash_range: 4.0,
            slash_radius: 2.0,
            slash_damage: 10.0,
            damage_window: 3,
            redo_window: 6,
            recovery_ticks: 10,
            slash_sound: "arsenal.katana.slash".into(),
            cooldown_channel: "arsenal:katana".into(),
            slash_wave: None,
            lock: Some(LockTuning {
                trigger: LockTrigger::Use,
                range: 8.0,
                offset: 1.5,
                max_targets: 3,
                tick_damage: 0.5,
                crit_damage: 3.0,
                crit_interval: 10,
                crit_sound: "arsenal.katana.crit".into(),
                shake_chance: 0.25,
                shake_intensity: 0.1,
                particle_chance: 0.5,
                particle: "arsenal:storm_spark".into(),
                blowoff_horizontal: 1.2,
                blowoff_vertical: 0.5,
            }),
            plunge: None,
            costs: DurabilityCosts {
                swing: 1,
                slash: 2,
                lock_tick: 1,
                plunge: 0,
            },
        }
    }

    /// Heavy blade: sneak lock-on, plunge, slash wave.
    pub fn breaker_greatsword() -> Self {
        Self {
            item_type_id: "arsenal:breaker_greatsword".into(),
            name: "Breaker greatsword".into(),
            swing: SwingTuning {
                damage: 9.0,
                range: 3.5,
                cooldown_ticks: 14,
                sound: "arsenal.greatsword.swing".into(),
            },
            charge_threshold: 16,
            charge_cue_interval: 5,
            charge_sound: "arsenal.greatsword.charge".into(),
            ready_sound: "arsenal.greatsword.ready".into(),
            dash_tick: 4,
            dash_horizontal: 1.0,
            dash_vertical: 0.3,
            air_impulse: 0.5,
            slash_range: 4.5,
            slash_radius: 2.5,
            slash_damage: 16.0,
            damage_window: 4,
            redo_window: 4,
            recovery_ticks: 16,
            slash_sound: "arsenal.greatsword.slash".into(),
            cooldown_channel: "arsenal:greatsword".into(),
            slash_wave: Some(BeamTuning {
                kind: "arsenal:slash_wave".into(),
                speed: 1.5,
                point_blank: 1.0,
                damage: 8.0,
                splash_radius: 2.0,
                splash_damage: 4.0,
                lifetime_ticks: 12,
                impact_particle: "arsenal:wave_burst".into(),
            }),
            lock: Some(LockTuning {
                trigger: LockTrigger::Sneak,
                range: 6.0,
                offset: 2.0,
                max_targets: 2,
                tick_damage: 1.0,
                crit_damage: 6.0,
                crit_interval: 15,
                crit_sound: "arsenal.greatsword.crit".into(),
                shake_chance: 0.4,
                shake_intensity: 0.2,
                particle_chance: 0.3,
                particle: "arsenal:ember".into(),
                blowoff_horizontal: 2.0,
                blowoff_vertical: 0.8,
            }),
            plunge: Some(PlungeTuning {
                min_pitch: 45.0,
                windup_ticks: 4,
                windup_sound: "arsenal.greatsword.plunge_windup".into(),
                fall_impulse: 1.5,
                max_fall_ticks: 60,
                impact_ticks: 8,
                radius: 3.5,
                base_damage: 8.0,
                damage_per_block: 2.0,
                shake_per_block: 0.05,
                heavy_depth: 6.0,
                heavy_sound: "arsenal.greatsword.plunge_heavy".into(),
                heavy_particle: "arsenal:crater".into(),
                plain_sound: "arsenal.greatsword.plunge".into(),
                plain_particle: "arsenal:dust".into(),
            }),
            costs: DurabilityCosts {
                swing: 1,
                slash: 3,
                lock_tick: 1,
                plunge: 4,
            },
        }
    }

    pub fn presets() -> Vec<Self> {
        vec![Self::storm_katana(), Self::breaker_greatsword()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for tuning in BladeTuning::presets() {
            tuning.validate().unwrap();
        }
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut tuning = BladeTuning::storm_katana();
        tuning.charge_threshold = 0;
        assert!(tuning.validate().is_err());
    }
}
