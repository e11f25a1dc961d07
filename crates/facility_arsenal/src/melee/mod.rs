//! Melee charge-weapon state machine
//!
//! # States
//!
//! ```text
//! Idle ──swing──▶ sweep (attack-rate cooldown)
//! Idle ──start-use──▶ Charging ──release < threshold──▶ Idle (no cost)
//!                              └─release ≥ threshold──▶ Slashing
//! Slashing: dash_tick → impulse + ray hit-test
//!   ├─ lock trigger held + targets → lock-on (hold every tick until release / empty)
//!   └─ иначе damage_window → redo_window (start-use = новый slash)
//! Slashing ──▶ Idle (+ recovery cooldown)
//! Idle ──start-use airborne, pitched down──▶ PlungeWindup → PlungeFall → PlungeImpact → Idle
//! ```
//!
//! Durability копится в `DurabilityLedger`, settle на Idle тике.
//! Exit Slashing всегда отпускает lock-on (blow-off ровно один раз).

use bevy::prelude::*;
use std::sync::Arc;

use crate::error::ItemResult;
use crate::host::{DamageCause, HostEntity, ItemSnapshot, PlayerState};
use crate::item::{AdvancedItem, ItemBinding, ItemContext, ItemKey};
use crate::logger;
use crate::projectile::{ray_targets, BeamShot};

pub mod durability;
pub mod lockon;
pub mod plunge;
pub mod tuning;

pub use durability::{DurabilityLedger, Settlement};
pub use lockon::{LockOn, IGNORE_CAPTURE_KEY};
pub use plunge::PlungeGrade;
pub use tuning::{BladeTuning, DurabilityCosts, LockTrigger, LockTuning, PlungeTuning, SwingTuning};

#[derive(Clone, Debug, PartialEq)]
pub enum BladeState {
    Idle,
    Charging {
        elapsed: u32,
    },
    Slashing {
        elapsed: u32,
        /// Tick (since slash start) of the dash and hit-test
        slash_tick: u32,
        lockon: Option<LockOn>,
    },
    PlungeWindup {
        elapsed: u32,
    },
    PlungeFall {
        elapsed: u32,
        start_height: f32,
    },
    PlungeImpact {
        elapsed: u32,
        depth: f32,
    },
}

impl BladeState {
    pub fn is_idle(&self) -> bool {
        matches!(self, BladeState::Idle)
    }

    pub fn lockon(&self) -> Option<&LockOn> {
        match self {
            BladeState::Slashing { lockon, .. } => lockon.as_ref(),
            _ => None,
        }
    }
}

/// Runtime charge-blade instance.
pub struct ChargeBlade {
    key: ItemKey,
    tuning: Arc<BladeTuning>,
    state: BladeState,
    ledger: DurabilityLedger,
    use_held: bool,
    redo_requested: bool,
    /// Entities damaged during the current slash window
    struck: Vec<HostEntity>,
    attack_ready_at: u64,
    exhausted: bool,
    blowoffs: u32,
}

impl ChargeBlade {
    pub fn new(binding: &ItemBinding, tuning: Arc<BladeTuning>) -> Self {
        Self {
            key: binding.key.clone(),
            exhausted: binding
                .snapshot
                .durability
                .is_some_and(|d| d.is_exhausted()),
            tuning,
            state: BladeState::Idle,
            ledger: DurabilityLedger::default(),
            use_held: false,
            redo_requested: false,
            struck: Vec::new(),
            attack_ready_at: 0,
            blowoffs: 0,
        }
    }

    pub fn state(&self) -> &BladeState {
        &self.state
    }

    pub fn ledger(&self) -> &DurabilityLedger {
        &self.ledger
    }

    pub fn tuning(&self) -> &BladeTuning {
        &self.tuning
    }

    /// How many lock-ons were released (blow-off applied).
    pub fn blowoffs(&self) -> u32 {
        self.blowoffs
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn transition(&mut self, ctx: &mut ItemContext, next: BladeState) -> ItemResult<()> {
        let old = std::mem::replace(&mut self.state, BladeState::Idle);
        self.exit(ctx, old);
        self.state = next;
        self.enter(ctx)
    }

    fn exit(&mut self, ctx: &mut ItemContext, old: BladeState) {
        match old {
            BladeState::Slashing { lockon, .. } => {
                if let (Some(mut lock), Some(tuning)) = (lockon, self.tuning.lock.as_ref()) {
                    if lock.release(ctx, tuning) {
                        self.blowoffs += 1;
                    }
                }
                self.struck.clear();
                self.start_recovery(ctx);
            }
            BladeState::PlungeImpact { .. } => self.start_recovery(ctx),
            BladeState::Idle
            | BladeState::Charging { .. }
            | BladeState::PlungeWindup { .. }
            | BladeState::PlungeFall { .. } => {}
        }
    }

    fn enter(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        let tuning = self.tuning.clone();
        match &self.state {
            BladeState::Charging { .. } => ctx.play_sound(&tuning.charge_sound),
            BladeState::Slashing { .. } => {
                self.struck.clear();
                self.redo_requested = false;
                ctx.play_sound(&tuning.slash_sound);
            }
            BladeState::PlungeWindup { .. } => {
                if let Some(plunge) = &tuning.plunge {
                    ctx.play_sound(&plunge.windup_sound);
                }
            }
            BladeState::PlungeFall { .. } => {
                if let Some(plunge) = &tuning.plunge {
                    ctx.host
                        .apply_impulse(ctx.player, Vec3::NEG_Y * plunge.fall_impulse)?;
                }
            }
            BladeState::PlungeImpact { depth, .. } => {
                let depth = *depth;
                if let Some(plunge) = &tuning.plunge {
                    let at = ctx.player_state()?.location;
                    let (grade, hits) = plunge::land(ctx, plunge, at, depth);
                    self.ledger.add(tuning.costs.plunge);
                    logger::log(&format!(
                        "💥 {:?}: plunge {:?} depth {:.1}, {} hit(s)",
                        ctx.player, grade, depth, hits
                    ));
                }
            }
            BladeState::Idle => {}
        }
        Ok(())
    }

    fn start_recovery(&mut self, ctx: &mut ItemContext) {
        let recovery = self.tuning.recovery_ticks;
        self.attack_ready_at = ctx.tick + recovery as u64;
        ctx.cooldown(&self.tuning.cooldown_channel, recovery);
    }

    fn lock_trigger_held(&self, trigger: LockTrigger, state: &PlayerState) -> bool {
        match trigger {
            LockTrigger::Use => self.use_held,
            LockTrigger::Sneak => state.sneaking,
        }
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Entities inside a sphere in front of the player.
    fn volume_targets(ctx: &ItemContext, state: &PlayerState, range: f32, radius: f32) -> Vec<HostEntity> {
        let center = state.eye_location() + state.view_direction() * (range * 0.5);
        ctx.host
            .entities_near(center, radius)
            .into_iter()
            .filter(|t| *t != ctx.player)
            .collect()
    }

    fn swing(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        if ctx.tick < self.attack_ready_at || self.exhausted {
            return Ok(());
        }
        let state = ctx.player_state()?;
        let swing = &self.tuning.swing;
        let targets = Self::volume_targets(ctx, &state, swing.range, swing.range * 0.5);

        let mut hits = 0;
        for target in targets {
            if let Ok(true) = ctx
                .host
                .apply_damage(target, swing.damage, DamageCause::Melee, Some(ctx.player))
            {
                hits += 1;
            }
        }
        if hits > 0 {
            self.ledger.add(self.tuning.costs.swing);
        }
        ctx.play_sound(&swing.sound);
        self.attack_ready_at = ctx.tick + swing.cooldown_ticks as u64;
        ctx.cooldown(&self.tuning.cooldown_channel, swing.cooldown_ticks);
        Ok(())
    }

    /// Dash impulse: knockback-style on the ground, direct impulse in the air.
    fn dash(&self, ctx: &mut ItemContext, state: &PlayerState) -> ItemResult<()> {
        let view = state.view_direction();
        if state.on_ground {
            ctx.host.apply_knockback(
                ctx.player,
                Vec2::new(view.x, view.z),
                self.tuning.dash_horizontal,
                self.tuning.dash_vertical,
            )?;
        } else {
            ctx.host
                .apply_impulse(ctx.player, view * self.tuning.air_impulse)?;
        }
        Ok(())
    }

    /// Dash tick: impulse, ray hit-test, maybe lock-on, maybe slash wave.
    fn strike(&mut self, ctx: &mut ItemContext) -> ItemResult<Option<LockOn>> {
        let tuning = self.tuning.clone();
        let state = ctx.player_state()?;
        self.dash(ctx, &state)?;
        self.ledger.add(tuning.costs.slash);

        if let Some(lock) = &tuning.lock {
            if self.lock_trigger_held(lock.trigger, &state) {
                let targets = ray_targets(
                    &*ctx.host,
                    state.eye_location(),
                    state.view_direction(),
                    lock.range,
                    ctx.player,
                );
                if let Some(lockon) = LockOn::engage(ctx, lock, &state, &targets)? {
                    return Ok(Some(lockon));
                }
            }
        }

        if let Some(wave) = &tuning.slash_wave {
            ctx.dispatch.fire_beam(
                ctx.host,
                BeamShot {
                    shooter: ctx.player,
                    origin: state.eye_location(),
                    direction: state.view_direction(),
                    tuning: wave,
                },
                ctx.tick,
            )?;
        }
        Ok(None)
    }

    fn sweep_slash(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        let state = ctx.player_state()?;
        let targets = Self::volume_targets(ctx, &state, self.tuning.slash_range, self.tuning.slash_radius);
        for target in targets {
            if self.struck.contains(&target) {
                continue;
            }
            self.struck.push(target);
            let _ = ctx.host.apply_damage(
                target,
                self.tuning.slash_damage,
                DamageCause::Melee,
                Some(ctx.player),
            );
        }
        Ok(())
    }

    /// Ошибка посреди slash: выходим через `exit`, чтобы lock-on отпустил цели.
    fn tick_slash(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        let result = self.advance_slash(ctx);
        if let Err(err) = &result {
            if matches!(self.state, BladeState::Slashing { .. }) {
                logger::log(&format!("⚠️ {}: slash aborted: {}", self.tuning.name, err));
                let _ = self.transition(ctx, BladeState::Idle);
            }
        }
        result
    }

    /// `self.state` всегда держит актуальный `LockOn` перед каждым `?`.
    fn advance_slash(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        let BladeState::Slashing {
            elapsed,
            slash_tick,
            mut lockon,
        } = self.state.clone()
        else {
            return Ok(());
        };

        if elapsed == slash_tick {
            lockon = self.strike(ctx)?;
            self.state = BladeState::Slashing {
                elapsed,
                slash_tick,
                lockon: lockon.clone(),
            };
        }

        // === Lock-on path ===
        if let Some(mut lock) = lockon {
            let Some(lock_tuning) = self.tuning.lock.clone() else {
                return self.transition(ctx, BladeState::Idle);
            };
            let state = ctx.player_state()?;
            let keep = elapsed == slash_tick
                || (self.lock_trigger_held(lock_tuning.trigger, &state) && lock.prune(&*ctx.host) > 0);

            if !keep {
                self.state = BladeState::Slashing {
                    elapsed,
                    slash_tick,
                    lockon: Some(lock),
                };
                return self.transition(ctx, BladeState::Idle);
            }

            let holding = elapsed > slash_tick;
            let held = if holding {
                lock.hold(ctx, &lock_tuning).map(|_| ())
            } else {
                Ok(())
            };
            self.state = BladeState::Slashing {
                elapsed: elapsed + 1,
                slash_tick,
                lockon: Some(lock),
            };
            held?;
            if holding {
                self.ledger.add(self.tuning.costs.lock_tick);
            }
            return Ok(());
        }

        // === Plain slash ===
        let window_end = slash_tick + self.tuning.damage_window;
        let redo_end = window_end + self.tuning.redo_window;
        self.state = BladeState::Slashing {
            elapsed: elapsed + 1,
            slash_tick,
            lockon: None,
        };

        if elapsed >= slash_tick && elapsed < window_end {
            self.sweep_slash(ctx)?;
        } else if elapsed >= window_end && elapsed < redo_end && self.redo_requested {
            return self.transition(
                ctx,
                BladeState::Slashing {
                    elapsed: 0,
                    slash_tick,
                    lockon: None,
                },
            );
        }

        if elapsed + 1 >= redo_end {
            self.transition(ctx, BladeState::Idle)?;
        }
        Ok(())
    }

    fn tick_plunge(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        let Some(plunge) = self.tuning.plunge.clone() else {
            return self.transition(ctx, BladeState::Idle);
        };
        match self.state.clone() {
            BladeState::PlungeWindup { elapsed } => {
                if elapsed + 1 >= plunge.windup_ticks {
                    let start_height = ctx.player_state()?.location.y;
                    self.transition(
                        ctx,
                        BladeState::PlungeFall {
                            elapsed: 0,
                            start_height,
                        },
                    )?;
                } else {
                    self.state = BladeState::PlungeWindup { elapsed: elapsed + 1 };
                }
            }
            BladeState::PlungeFall {
                elapsed,
                start_height,
            } => {
                let state = ctx.player_state()?;
                if state.on_ground || elapsed + 1 >= plunge.max_fall_ticks {
                    let depth = (start_height - state.location.y).max(0.0);
                    self.transition(ctx, BladeState::PlungeImpact { elapsed: 0, depth })?;
                } else {
                    self.state = BladeState::PlungeFall {
                        elapsed: elapsed + 1,
                        start_height,
                    };
                }
            }
            BladeState::PlungeImpact { elapsed, depth } => {
                if elapsed + 1 >= plunge.impact_ticks {
                    self.transition(ctx, BladeState::Idle)?;
                } else {
                    self.state = BladeState::PlungeImpact {
                        elapsed: elapsed + 1,
                        depth,
                    };
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn settle(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        let settlement = self.ledger.settle(
            ctx.host,
            ctx.player,
            self.key.slot as usize,
            &self.key.type_id,
        )?;
        if let Settlement::Written { exhausted: true, .. } = settlement {
            self.exhausted = true;
            ctx.status(&format!("{} needs repair", self.tuning.name));
        }
        Ok(())
    }
}

impl AdvancedItem for ChargeBlade {
    fn key(&self) -> &ItemKey {
        &self.key
    }

    fn is_usable(&self, _ctx: &ItemContext) -> bool {
        !self.exhausted
    }

    fn on_tick(&mut self, ctx: &mut ItemContext, snapshot: &ItemSnapshot) -> ItemResult<()> {
        let exhausted = snapshot.durability.is_some_and(|d| d.is_exhausted());
        if exhausted && !self.exhausted {
            ctx.status(&format!("{} needs repair", self.tuning.name));
        }
        self.exhausted = exhausted;

        match self.state.clone() {
            BladeState::Idle => self.settle(ctx)?,
            BladeState::Charging { elapsed } => {
                let elapsed = elapsed + 1;
                let tuning = self.tuning.clone();
                if elapsed == tuning.charge_threshold {
                    ctx.play_sound(&tuning.ready_sound);
                } else if tuning.charge_cue_interval > 0
                    && elapsed < tuning.charge_threshold
                    && elapsed % tuning.charge_cue_interval == 0
                {
                    ctx.play_sound(&tuning.charge_sound);
                }
                self.state = BladeState::Charging { elapsed };
            }
            BladeState::Slashing { .. } => self.tick_slash(ctx)?,
            BladeState::PlungeWindup { .. }
            | BladeState::PlungeFall { .. }
            | BladeState::PlungeImpact { .. } => self.tick_plunge(ctx)?,
        }
        Ok(())
    }

    fn on_start_use(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        self.use_held = true;
        if self.exhausted {
            ctx.status(&format!("{} needs repair", self.tuning.name));
            return Ok(());
        }

        match &self.state {
            BladeState::Idle => {
                let state = ctx.player_state()?;
                if let Some(plunge) = &self.tuning.plunge {
                    if plunge::can_plunge(plunge, state.on_ground, state.rotation.x) {
                        return self.transition(ctx, BladeState::PlungeWindup { elapsed: 0 });
                    }
                }
                if ctx.tick < self.attack_ready_at {
                    return Ok(());
                }
                self.transition(ctx, BladeState::Charging { elapsed: 0 })
            }
            BladeState::Slashing {
                elapsed,
                slash_tick,
                lockon: None,
            } if elapsed > slash_tick => {
                self.redo_requested = true;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_stop_use(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        self.use_held = false;
        if let BladeState::Charging { elapsed } = self.state {
            if elapsed < self.tuning.charge_threshold {
                // Не дозарядили - без стоимости
                return self.transition(ctx, BladeState::Idle);
            }
            let slash_tick = self.tuning.dash_tick;
            return self.transition(
                ctx,
                BladeState::Slashing {
                    elapsed: 0,
                    slash_tick,
                    lockon: None,
                },
            );
        }
        Ok(())
    }

    fn on_swing(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        if self.state.is_idle() {
            self.swing(ctx)?;
        }
        Ok(())
    }

    fn on_hit_entity(&mut self, _ctx: &mut ItemContext, _target: HostEntity) -> ItemResult<()> {
        // Vanilla удар host уже нанёс, оплачиваем прочностью
        self.ledger.add(self.tuning.costs.swing);
        Ok(())
    }

    fn on_remove(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        let old = std::mem::replace(&mut self.state, BladeState::Idle);
        self.exit(ctx, old);
        self.use_held = false;
        ctx.cooldown(&self.tuning.cooldown_channel, 0);
        if let Err(err) = self.settle(ctx) {
            logger::log(&format!("⚠️ {}: durability not settled on remove: {}", self.tuning.name, err));
        }
        Ok(())
    }

    fn label(&self) -> String {
        self.tuning.name.clone()
    }
}

#[cfg(test)]
mod melee_tests;
