//! Lock-on payload
//!
//! Создаётся на dash tick, если lock trigger зажат и на луче есть цели.
//! Пока держится:
//! - игрок и все captured entities телепортируются на свои lock позиции каждый тик
//! - captured получают tick damage, каждые `crit_interval` тиков crit
//! - shake/particle cues с вероятностью (deterministic RNG)
//!
//! Цель выпадает из набора: мертва, исчезла, помечена ignore-capture.
//! `release` применяет blow-off ровно один раз.

use bevy::prelude::*;
use std::collections::BTreeMap;

use super::tuning::LockTuning;
use crate::error::ItemResult;
use crate::host::{DamageCause, HostEntity, ItemHost, PlayerState, PropertyValue};
use crate::item::ItemContext;
use crate::logger;

/// Entity property: `Bool(true)` → never captured / dropped from a lock.
pub const IGNORE_CAPTURE_KEY: &str = "arsenal:ignore_capture";

/// Active lock-on.
#[derive(Clone, Debug, PartialEq)]
pub struct LockOn {
    pub captured: Vec<HostEntity>,
    pub player_lock_loc: Vec3,
    pub player_lock_rot: Vec2,
    pub entity_lock_loc: BTreeMap<HostEntity, Vec3>,
    pub next_crit_tick: u64,
    released: bool,
}

fn capturable(host: &dyn ItemHost, entity: HostEntity) -> bool {
    host.entity_alive(entity)
        && host.entity_property(entity, IGNORE_CAPTURE_KEY) != Some(PropertyValue::Bool(true))
}

impl LockOn {
    /// Capture `targets` (nearest first). `None` if nothing is capturable.
    pub fn engage(
        ctx: &mut ItemContext,
        tuning: &LockTuning,
        state: &PlayerState,
        targets: &[HostEntity],
    ) -> ItemResult<Option<Self>> {
        let captured: Vec<HostEntity> = targets
            .iter()
            .copied()
            .filter(|t| capturable(&*ctx.host, *t))
            .take(tuning.max_targets)
            .collect();
        let Some(first) = captured.first().copied() else {
            return Ok(None);
        };

        let entity_lock_loc: BTreeMap<HostEntity, Vec3> = captured
            .iter()
            .filter_map(|t| ctx.host.entity_location(*t).map(|loc| (*t, loc)))
            .collect();
        let Some(anchor) = entity_lock_loc.get(&first).copied() else {
            return Ok(None);
        };

        let view = state.view_direction();
        let flat = Vec3::new(view.x, 0.0, view.z).normalize_or(Vec3::Z);
        let player_lock_loc = anchor - flat * tuning.offset;

        ctx.host.teleport(ctx.player, player_lock_loc, Some(state.rotation))?;
        logger::log(&format!(
            "🔒 {:?}: lock-on {} target(s), anchor {:?}",
            ctx.player,
            captured.len(),
            first
        ));

        Ok(Some(Self {
            captured,
            player_lock_loc,
            player_lock_rot: state.rotation,
            entity_lock_loc,
            next_crit_tick: ctx.tick + tuning.crit_interval as u64,
            released: false,
        }))
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Drop dead, gone and ignore-marked targets. Returns how many remain.
    pub fn prune(&mut self, host: &dyn ItemHost) -> usize {
        self.captured.retain(|t| capturable(host, *t));
        let captured = &self.captured;
        self.entity_lock_loc.retain(|t, _| captured.contains(t));
        self.captured.len()
    }

    /// One held tick: pin everyone in place, apply tick/crit damage, cues.
    /// Returns the damage dealt per target this tick.
    pub fn hold(&mut self, ctx: &mut ItemContext, tuning: &LockTuning) -> ItemResult<f32> {
        ctx.host
            .teleport(ctx.player, self.player_lock_loc, Some(self.player_lock_rot))?;

        let crit = ctx.tick >= self.next_crit_tick;
        if crit {
            self.next_crit_tick += tuning.crit_interval as u64;
            ctx.play_sound(&tuning.crit_sound);
        }
        let damage = if crit { tuning.crit_damage } else { tuning.tick_damage };

        for target in self.captured.clone() {
            let Some(lock_loc) = self.entity_lock_loc.get(&target).copied() else {
                continue;
            };
            // Цель могла исчезнуть между prune и этим вызовом - не ошибка
            if ctx.host.teleport(target, lock_loc, None).is_err() {
                continue;
            }
            let _ = ctx
                .host
                .apply_damage(target, damage, DamageCause::Melee, Some(ctx.player));
            if ctx.roll(tuning.particle_chance) {
                ctx.particle(&tuning.particle, lock_loc + Vec3::Y);
            }
        }
        if ctx.roll(tuning.shake_chance) {
            ctx.shake(tuning.shake_intensity, 0.1);
        }
        Ok(damage)
    }

    /// Blow-off impulse on remaining targets. Runs once; later calls return false.
    pub fn release(&mut self, ctx: &mut ItemContext, tuning: &LockTuning) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        for target in &self.captured {
            let Some(loc) = ctx.host.entity_location(*target) else {
                continue;
            };
            let away = loc - self.player_lock_loc;
            let direction = Vec2::new(away.x, away.z).normalize_or(Vec2::Y);
            if let Err(err) =
                ctx.host
                    .apply_knockback(*target, direction, tuning.blowoff_horizontal, tuning.blowoff_vertical)
            {
                logger::log(&format!("⚠️ Blow-off on {:?} failed: {}", target, err));
            }
        }
        logger::log(&format!(
            "🔓 {:?}: lock-on released ({} target(s))",
            ctx.player,
            self.captured.len()
        ));
        true
    }
}
