//! Firearm tuning - data-driven варианты одного FSM
//!
//! Одна реализация `Firearm`, варианты отличаются только данными:
//! - `FireAction` (semi / auto / bolt)
//! - `Delivery` (физический снаряд / луч)
//! - reload scripts, spread, attachments
//!
//! Пресеты: carbine (auto), marksman rifle (bolt), pulse pistol (semi, beam).
//! Значения баланса - произвольный content.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::projectile::{BeamTuning, DamageModel};

/// One cue inside a tick-indexed script.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptCue {
    pub tick: u32,
    #[serde(default)]
    pub sound: Option<String>,
    /// Camera shake intensity (0 = нет)
    #[serde(default)]
    pub shake: f32,
}

impl ScriptCue {
    pub fn sound(tick: u32, sound: &str) -> Self {
        Self {
            tick,
            sound: Some(sound.to_string()),
            shake: 0.0,
        }
    }

    pub fn with_shake(mut self, shake: f32) -> Self {
        self.shake = shake;
        self
    }
}

/// Tick-indexed script (reload, bolt cycle).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReloadScript {
    /// Total ticks; на `duration` → Idle
    pub duration: u32,
    /// Тик, на котором патроны переходят в магазин
    pub load_tick: u32,
    #[serde(default)]
    pub cues: Vec<ScriptCue>,
}

impl ReloadScript {
    pub fn cues_at(&self, tick: u32) -> impl Iterator<Item = &ScriptCue> {
        self.cues.iter().filter(move |c| c.tick == tick)
    }

    fn validate(&self, item: &str, what: &str) -> Result<(), ConfigError> {
        if self.duration == 0 {
            return Err(invalid(item, format!("{what} duration must be non-zero")));
        }
        if self.load_tick >= self.duration {
            return Err(invalid(
                item,
                format!("{what} load_tick {} outside duration {}", self.load_tick, self.duration),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FireAction {
    SemiAuto,
    /// Keeps firing while use is held
    Automatic,
    /// After each shot (rounds left) → bolt cycle script
    BoltAction { cycle: ReloadScript },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Delivery {
    Projectile {
        kind: String,
        /// Blocks per tick
        speed: f32,
        damage: DamageModel,
        pierce: u32,
    },
    Beam(BeamTuning),
}

/// Spread cone (degrees).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpreadTuning {
    pub base: f32,
    /// Множитель при ADS (sneaking)
    pub ads_multiplier: f32,
    pub bloom_per_shot: f32,
    pub bloom_max_shots: u32,
    /// Bloom спадает на один выстрел за столько тиков без стрельбы
    pub bloom_decay_ticks: u32,
    /// Degrees per block/tick of horizontal speed
    pub move_per_speed: f32,
    pub airborne_multiplier: f32,
}

/// Sight or muzzle attachment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttachmentTuning {
    pub id: String,
    pub label: String,
    pub spread_multiplier: f32,
    /// Заменяет fire sound (suppressor)
    #[serde(default)]
    pub fire_sound: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FirearmTuning {
    pub item_type_id: String,
    pub name: String,
    pub magazine_type: String,
    pub ammo_type: String,
    pub magazine_capacity: u32,
    pub pickup_ticks: u32,
    /// Ticks in `Fire` before the next state
    pub fire_interval: u32,
    pub action: FireAction,
    pub delivery: Delivery,
    pub spread: SpreadTuning,
    pub fire_sound: String,
    pub empty_sound: String,
    pub reload: ReloadScript,
    pub tactical_reload: ReloadScript,
    /// Ping-pong cooldown channels
    pub cooldown_channels: [String; 2],
    #[serde(default)]
    pub sights: Vec<AttachmentTuning>,
    #[serde(default)]
    pub muzzles: Vec<AttachmentTuning>,
}

fn invalid(item: &str, reason: String) -> ConfigError {
    ConfigError::Invalid {
        item: item.to_string(),
        reason,
    }
}

impl FirearmTuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let item = self.item_type_id.as_str();
        if self.magazine_capacity == 0 {
            return Err(invalid(item, "magazine capacity must be non-zero".into()));
        }
        if self.fire_interval == 0 {
            return Err(invalid(item, "fire_interval must be non-zero".into()));
        }
        self.reload.validate(item, "reload")?;
        self.tactical_reload.validate(item, "tactical reload")?;
        if self.tactical_reload.duration >= self.reload.duration {
            return Err(invalid(
                item,
                format!(
                    "tactical reload ({}) must be shorter than full reload ({})",
                    self.tactical_reload.duration, self.reload.duration
                ),
            ));
        }
        if let FireAction::BoltAction { cycle } = &self.action {
            cycle.validate(item, "bolt cycle")?;
        }
        if self.cooldown_channels[0] == self.cooldown_channels[1] {
            return Err(invalid(item, "cooldown channels must differ".into()));
        }
        Ok(())
    }

    pub fn sight(&self, id: &str) -> Option<&AttachmentTuning> {
        self.sights.iter().find(|s| s.id == id)
    }

    pub fn muzzle(&self, id: &str) -> Option<&AttachmentTuning> {
        self.muzzles.iter().find(|m| m.id == id)
    }

    // ========================================================================
    // Presets
    // ========================================================================

    /// Automatic carbine (projectile, 20 rounds)
    pub fn carbine() -> Self {
        Self {
            item_type_id: "arsenal:carbine".into(),
            name: "Carbine".into(),
            magazine_type: "arsenal:carbine_magazine".into(),
            ammo_type: "arsenal:rifle_round".into(),
            magazine_capacity: 20,
            pickup_ticks: 8,
            fire_interval: 2,
            action: FireAction::Automatic,
            delivery: Delivery::Projectile {
                kind: "arsenal:bullet".into(),
                speed: 6.0,
                damage: DamageModel::Falloff {
                    base: 5.0,
                    start: 24.0,
                    per_block: 0.1,
                    floor: 2.0,
                },
                pierce: 1,
            },
            spread: SpreadTuning {
                base: 1.5,
                ads_multiplier: 0.4,
                bloom_per_shot: 0.35,
                bloom_max_shots: 10,
                bloom_decay_ticks: 3,
                move_per_speed: 6.0,
                airborne_multiplier: 2.0,
            },
            fire_sound: "arsenal.carbine.fire".into(),
            empty_sound: "arsenal.generic.dry_fire".into(),
            reload: ReloadScript {
                duration: 40,
                load_tick: 30,
                cues: vec![
                    ScriptCue::sound(0, "arsenal.carbine.mag_out"),
                    ScriptCue::sound(22, "arsenal.carbine.mag_in").with_shake(0.05),
                    ScriptCue::sound(34, "arsenal.carbine.charge"),
                ],
            },
            tactical_reload: ReloadScript {
                duration: 28,
                load_tick: 20,
                cues: vec![
                    ScriptCue::sound(0, "arsenal.carbine.mag_out"),
                    ScriptCue::sound(18, "arsenal.carbine.mag_in").with_shake(0.05),
                ],
            },
            cooldown_channels: ["arsenal:carbine_a".into(), "arsenal:carbine_b".into()],
            sights: vec![
                AttachmentTuning {
                    id: "red_dot".into(),
                    label: "Red dot".into(),
                    spread_multiplier: 0.8,
                    fire_sound: None,
                },
                AttachmentTuning {
                    id: "holo".into(),
                    label: "Holographic".into(),
                    spread_multiplier: 0.7,
                    fire_sound: None,
                },
            ],
            muzzles: vec![AttachmentTuning {
                id: "suppressor".into(),
                label: "Suppressor".into(),
                spread_multiplier: 0.9,
                fire_sound: Some("arsenal.carbine.fire_suppressed".into()),
            }],
        }
    }

    /// Bolt-action marksman rifle (projectile, 5 rounds, pierce)
    pub fn marksman_rifle() -> Self {
        Self {
            item_type_id: "arsenal:marksman_rifle".into(),
            name: "Marksman rifle".into(),
            magazine_type: "arsenal:marksman_magazine".into(),
            ammo_type: "arsenal:heavy_round".into(),
            magazine_capacity: 5,
            pickup_ticks: 12,
            fire_interval: 3,
            action: FireAction::BoltAction {
                cycle: ReloadScript {
                    duration: 14,
                    load_tick: 7,
                    cues: vec![
                        ScriptCue::sound(2, "arsenal.marksman.bolt_open"),
                        ScriptCue::sound(9, "arsenal.marksman.bolt_close"),
                    ],
                },
            },
            delivery: Delivery::Projectile {
                kind: "arsenal:heavy_bullet".into(),
                speed: 12.0,
                damage: DamageModel::Flat(16.0),
                pierce: 2,
            },
            spread: SpreadTuning {
                base: 3.0,
                ads_multiplier: 0.05,
                bloom_per_shot: 1.0,
                bloom_max_shots: 3,
                bloom_decay_ticks: 10,
                move_per_speed: 12.0,
                airborne_multiplier: 3.0,
            },
            fire_sound: "arsenal.marksman.fire".into(),
            empty_sound: "arsenal.generic.dry_fire".into(),
            reload: ReloadScript {
                duration: 60,
                load_tick: 45,
                cues: vec![
                    ScriptCue::sound(0, "arsenal.marksman.mag_out"),
                    ScriptCue::sound(35, "arsenal.marksman.mag_in").with_shake(0.08),
                    ScriptCue::sound(50, "arsenal.marksman.bolt_close"),
                ],
            },
            tactical_reload: ReloadScript {
                duration: 44,
                load_tick: 32,
                cues: vec![
                    ScriptCue::sound(0, "arsenal.marksman.mag_out"),
                    ScriptCue::sound(28, "arsenal.marksman.mag_in").with_shake(0.08),
                ],
            },
            cooldown_channels: ["arsenal:marksman_a".into(), "arsenal:marksman_b".into()],
            sights: vec![AttachmentTuning {
                id: "scope".into(),
                label: "Long scope".into(),
                spread_multiplier: 0.3,
                fire_sound: None,
            }],
            muzzles: Vec::new(),
        }
    }

    /// Semi-automatic pulse pistol (beam, 12 cells)
    pub fn pulse_pistol() -> Self {
        Self {
            item_type_id: "arsenal:pulse_pistol".into(),
            name: "Pulse pistol".into(),
            magazine_type: "arsenal:pulse_cell_pack".into(),
            ammo_type: "arsenal:pulse_cell".into(),
            magazine_capacity: 12,
            pickup_ticks: 5,
            fire_interval: 4,
            action: FireAction::SemiAuto,
            delivery: Delivery::Beam(BeamTuning {
                kind: "arsenal:pulse_beam".into(),
                speed: 4.0,
                point_blank: 1.5,
                damage: 7.0,
                splash_radius: 2.5,
                splash_damage: 3.0,
                lifetime_ticks: 10,
                impact_particle: "arsenal:pulse_burst".into(),
            }),
            spread: SpreadTuning {
                base: 0.8,
                ads_multiplier: 0.6,
                bloom_per_shot: 0.5,
                bloom_max_shots: 4,
                bloom_decay_ticks: 4,
                move_per_speed: 4.0,
                airborne_multiplier: 1.5,
            },
            fire_sound: "arsenal.pulse.fire".into(),
            empty_sound: "arsenal.pulse.depleted".into(),
            reload: ReloadScript {
                duration: 30,
                load_tick: 20,
                cues: vec![
                    ScriptCue::sound(0, "arsenal.pulse.eject"),
                    ScriptCue::sound(18, "arsenal.pulse.insert"),
                ],
            },
            tactical_reload: ReloadScript {
                duration: 22,
                load_tick: 14,
                cues: vec![ScriptCue::sound(0, "arsenal.pulse.eject")],
            },
            cooldown_channels: ["arsenal:pulse_a".into(), "arsenal:pulse_b".into()],
            sights: Vec::new(),
            muzzles: Vec::new(),
        }
    }

    /// All built-in firearm presets.
    pub fn presets() -> Vec<Self> {
        vec![Self::carbine(), Self::marksman_rifle(), Self::pulse_pistol()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for tuning in FirearmTuning::presets() {
            tuning.validate().unwrap();
        }
    }

    #[test]
    fn test_tactical_must_be_shorter() {
        let mut tuning = FirearmTuning::carbine();
        tuning.tactical_reload.duration = tuning.reload.duration;
        tuning.tactical_reload.load_tick = 1;

        let err = tuning.validate().unwrap_err();
        assert!(err.to_string().contains("tactical reload"));
    }

    #[test]
    fn test_load_tick_inside_script() {
        let mut tuning = FirearmTuning::pulse_pistol();
        tuning.reload.load_tick = tuning.reload.duration;
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_cues_at() {
        let carbine = FirearmTuning::carbine();
        let cues: Vec<_> = carbine.reload.cues_at(22).collect();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].shake, 0.05);
        assert_eq!(carbine.reload.cues_at(5).count(), 0);
    }
}
