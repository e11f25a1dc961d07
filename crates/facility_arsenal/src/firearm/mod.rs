//! Firearm state machine
//!
//! # States
//!
//! ```text
//! Pickup(n) ──n ticks──▶ Idle
//! Idle ──start-use, ammo──▶ Fire ──fire_interval──▶ Idle
//!                                                 ├▶ Fire      (automatic, held, ammo)
//!                                                 └▶ BoltCycle (bolt action, ammo left)
//! Idle ──start-use, empty + spare──▶ Reload(full)
//! Idle ──swing, partial + spare──▶ Reload(tactical)
//! Idle ──sneak + swing──▶ attachment bench (form)
//! Reload / BoltCycle ──duration──▶ Idle
//! ```
//!
//! Переходы только через `transition`: exit(old) → enter(new).
//! - exit Fire: batched запись магазина
//! - exit Reload/BoltCycle: cooldown channels обнуляются
//! - enter Fire: расход патрона + выстрел
//!
//! Magazine резолвится лениво в Idle; внешние изменения слота → fresh resolve.

use std::sync::Arc;

use crate::ammo::MagazineContext;
use crate::error::{ItemError, ItemResult};
use crate::host::ItemSnapshot;
use crate::item::{AdvancedItem, ItemBinding, ItemContext, ItemKey};
use crate::logger;
use crate::projectile::{BeamShot, ProjectileShot};

pub mod bench;
pub mod spread;
pub mod tuning;

pub use bench::AttachmentBench;
pub use tuning::{
    AttachmentTuning, Delivery, FireAction, FirearmTuning, ReloadScript, ScriptCue, SpreadTuning,
};

/// Item property: installed sight id.
pub const SIGHT_KEY: &str = "arsenal:sight";
/// Item property: installed muzzle id.
pub const MUZZLE_KEY: &str = "arsenal:muzzle";

/// Снаряд спавнится чуть впереди глаз, чтобы не задеть стрелка.
const MUZZLE_OFFSET: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirearmState {
    Pickup { ticks_left: u32 },
    Idle,
    Fire { step: u32 },
    Reload { tick: u32, tactical: bool },
    BoltCycle { tick: u32 },
}

/// Attachments read from the item at construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attachments {
    pub sight: Option<String>,
    pub muzzle: Option<String>,
}

impl Attachments {
    pub fn read(item: &ItemSnapshot) -> Self {
        let text = |key: &str| {
            item.property(key)
                .and_then(|v| v.as_text())
                .map(str::to_string)
        };
        Self {
            sight: text(SIGHT_KEY),
            muzzle: text(MUZZLE_KEY),
        }
    }

    /// Sight работает только в ADS, muzzle всегда.
    fn spread_multiplier(&self, tuning: &FirearmTuning, ads: bool) -> f32 {
        let sight = self
            .sight
            .as_deref()
            .filter(|_| ads)
            .and_then(|id| tuning.sight(id))
            .map_or(1.0, |s| s.spread_multiplier);
        let muzzle = self
            .muzzle
            .as_deref()
            .and_then(|id| tuning.muzzle(id))
            .map_or(1.0, |m| m.spread_multiplier);
        sight * muzzle
    }

    fn fire_sound<'t>(&self, tuning: &'t FirearmTuning) -> &'t str {
        self.muzzle
            .as_deref()
            .and_then(|id| tuning.muzzle(id))
            .and_then(|m| m.fire_sound.as_deref())
            .unwrap_or(&tuning.fire_sound)
    }
}

/// Runtime firearm instance (one per wielding session).
pub struct Firearm {
    key: ItemKey,
    tuning: Arc<FirearmTuning>,
    attachments: Attachments,
    state: FirearmState,
    magazine: Option<MagazineContext>,
    trigger_held: bool,
    /// Recent shots (bloom), спадает в Idle
    bloom: u32,
    bloom_idle: u32,
    /// Active ping-pong cooldown channel (0/1)
    channel: usize,
    status_interval: u32,
    ticks: u64,
    reload_attempts: u32,
    shots_fired: u32,
}

impl Firearm {
    pub fn new(binding: &ItemBinding, tuning: Arc<FirearmTuning>, status_interval: u32) -> Self {
        let state = if tuning.pickup_ticks > 0 {
            FirearmState::Pickup {
                ticks_left: tuning.pickup_ticks,
            }
        } else {
            FirearmState::Idle
        };
        Self {
            key: binding.key.clone(),
            attachments: Attachments::read(&binding.snapshot),
            tuning,
            state,
            magazine: None,
            trigger_held: false,
            bloom: 0,
            bloom_idle: 0,
            channel: 0,
            status_interval,
            ticks: 0,
            reload_attempts: 0,
            shots_fired: 0,
        }
    }

    pub fn state(&self) -> FirearmState {
        self.state
    }

    pub fn tuning(&self) -> &FirearmTuning {
        &self.tuning
    }

    pub fn magazine(&self) -> Option<&MagazineContext> {
        self.magazine.as_ref()
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    pub fn reload_attempts(&self) -> u32 {
        self.reload_attempts
    }

    pub fn shots_fired(&self) -> u32 {
        self.shots_fired
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn transition(&mut self, ctx: &mut ItemContext, next: FirearmState) -> ItemResult<()> {
        let old = self.state;
        self.exit(ctx, old);
        self.state = next;
        self.enter(ctx, next)
    }

    fn exit(&mut self, ctx: &mut ItemContext, old: FirearmState) {
        match old {
            FirearmState::Fire { .. } => self.flush_magazine(ctx),
            FirearmState::Reload { .. } | FirearmState::BoltCycle { .. } => self.clear_cooldowns(ctx),
            FirearmState::Pickup { .. } | FirearmState::Idle => {}
        }
    }

    fn enter(&mut self, ctx: &mut ItemContext, new: FirearmState) -> ItemResult<()> {
        match new {
            FirearmState::Fire { .. } => self.fire_shot(ctx),
            FirearmState::Reload { tactical, .. } => {
                self.reload_attempts += 1;
                let duration = if tactical {
                    self.tuning.tactical_reload.duration
                } else {
                    self.tuning.reload.duration
                };
                self.set_cooldowns(ctx, duration);
                logger::log(&format!(
                    "🔄 {:?}: {} {} reload",
                    ctx.player,
                    self.tuning.name,
                    if tactical { "tactical" } else { "full" }
                ));
                Ok(())
            }
            FirearmState::BoltCycle { .. } => {
                if let FireAction::BoltAction { cycle } = &self.tuning.action {
                    let duration = cycle.duration;
                    self.set_cooldowns(ctx, duration);
                }
                Ok(())
            }
            FirearmState::Pickup { .. } | FirearmState::Idle => Ok(()),
        }
    }

    // ========================================================================
    // Magazine
    // ========================================================================

    /// Keep the cached magazine if still valid, otherwise rescan.
    fn refresh_magazine(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        let valid = self
            .magazine
            .as_ref()
            .is_some_and(|m| m.is_valid(&*ctx.host, ctx.player));
        if !valid {
            let capacity = self.tuning.magazine_capacity;
            self.magazine = MagazineContext::resolve(
                &*ctx.host,
                ctx.player,
                &self.tuning.magazine_type,
                &self.tuning.ammo_type,
            )?
            .filter(|magazine| {
                // Магазин другой ёмкости не подходит к этому оружию
                let fits = magazine.max_capacity() == capacity;
                if !fits {
                    logger::log(&format!(
                        "⚠️ {}: magazine in slot {} holds {}, expected {}",
                        self.tuning.name,
                        magazine.slot(),
                        magazine.max_capacity(),
                        capacity
                    ));
                }
                fits
            });
        }
        Ok(())
    }

    fn flush_magazine(&mut self, ctx: &mut ItemContext) {
        let Some(magazine) = self.magazine.as_mut() else {
            return;
        };
        if let Err(err) = magazine.apply(ctx.host, ctx.player) {
            logger::log(&format!("⚠️ {}: magazine write dropped: {}", self.tuning.name, err));
            self.magazine = None;
        }
    }

    fn spare(&self, ctx: &ItemContext) -> u32 {
        self.magazine
            .as_ref()
            .map_or(0, |m| m.spare(&*ctx.host, ctx.player))
    }

    // ========================================================================
    // Cooldown channels
    // ========================================================================

    /// Ping-pong: активный канал получает ticks, второй обнуляется.
    fn set_cooldowns(&mut self, ctx: &mut ItemContext, ticks: u32) {
        let [a, b] = &self.tuning.cooldown_channels;
        let (active, other) = if self.channel == 0 { (a, b) } else { (b, a) };
        ctx.cooldown(active, ticks);
        ctx.cooldown(other, 0);
        self.channel ^= 1;
    }

    fn clear_cooldowns(&self, ctx: &mut ItemContext) {
        for channel in &self.tuning.cooldown_channels {
            ctx.cooldown(channel, 0);
        }
    }

    // ========================================================================
    // Actions
    // ========================================================================

    fn fire_shot(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        let tuning = self.tuning.clone();
        let state = ctx.player_state()?;

        let magazine = self
            .magazine
            .as_mut()
            .ok_or_else(|| ItemError::InvalidState(format!("{} fired without a magazine", tuning.name)))?;
        if magazine.consume(1) == 0 {
            return Err(ItemError::InvalidState(format!("{} fired on an empty magazine", tuning.name)));
        }

        let multiplier = self.attachments.spread_multiplier(&tuning, state.sneaking);
        let cone = spread::cone_degrees(&tuning.spread, &state, self.bloom, multiplier);
        let direction = spread::deviate(state.rotation, cone, ctx.rng);
        let origin = state.eye_location();

        match &tuning.delivery {
            Delivery::Projectile {
                kind,
                speed,
                damage,
                pierce,
            } => {
                ctx.dispatch.fire_projectile(
                    ctx.host,
                    ProjectileShot {
                        shooter: ctx.player,
                        kind: kind.clone(),
                        origin: origin + direction * MUZZLE_OFFSET,
                        velocity: direction * *speed,
                        damage: damage.clone(),
                        pierce: *pierce,
                    },
                    ctx.tick,
                )?;
            }
            Delivery::Beam(beam) => {
                ctx.dispatch.fire_beam(
                    ctx.host,
                    BeamShot {
                        shooter: ctx.player,
                        origin,
                        direction,
                        tuning: beam,
                    },
                    ctx.tick,
                )?;
            }
        }

        ctx.play_sound_at(self.attachments.fire_sound(&tuning), origin);
        self.set_cooldowns(ctx, tuning.fire_interval);
        self.bloom = (self.bloom + 1).min(tuning.spread.bloom_max_shots);
        self.bloom_idle = 0;
        self.shots_fired += 1;
        Ok(())
    }

    fn pull_trigger(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        self.refresh_magazine(ctx)?;
        let Some(magazine) = &self.magazine else {
            ctx.status(&format!("{}: no magazine", self.tuning.name));
            ctx.play_sound(&self.tuning.empty_sound);
            return Ok(());
        };

        if magazine.remaining() > 0 {
            self.transition(ctx, FirearmState::Fire { step: 0 })
        } else if self.spare(ctx) > 0 {
            self.transition(
                ctx,
                FirearmState::Reload {
                    tick: 0,
                    tactical: false,
                },
            )
        } else {
            ctx.play_sound(&self.tuning.empty_sound);
            Ok(())
        }
    }

    /// Reload gesture: tactical when the magazine still has rounds.
    fn reload_gesture(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        self.refresh_magazine(ctx)?;
        let Some(magazine) = &self.magazine else {
            ctx.status(&format!("{}: no magazine", self.tuning.name));
            return Ok(());
        };
        if magazine.is_full() || self.spare(ctx) == 0 {
            return Ok(());
        }
        let tactical = magazine.remaining() > 0;
        self.transition(ctx, FirearmState::Reload { tick: 0, tactical })
    }

    fn open_bench(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        if ctx.forms.is_pending_for(ctx.player) {
            return Ok(());
        }
        let slot = self.key.slot as usize;
        let item = ctx
            .host
            .inventory_item(ctx.player, slot)
            .ok_or_else(|| ItemError::StaleHandle(format!("{} left slot {}", self.key.type_id, slot)))?;
        let bench = AttachmentBench::new(ctx.player, slot, &item, &self.tuning);
        if !bench.has_options() {
            ctx.status(&format!("{}: no attachments", self.tuning.name));
            return Ok(());
        }
        let request = bench.request();
        ctx.forms.open(ctx.host, ctx.player, request, Box::new(bench))?;
        Ok(())
    }

    fn after_fire(&self, ctx: &ItemContext) -> FirearmState {
        let remaining = self
            .magazine
            .as_ref()
            .filter(|m| m.is_valid(&*ctx.host, ctx.player))
            .map_or(0, |m| m.remaining());
        match &self.tuning.action {
            FireAction::Automatic if self.trigger_held && remaining > 0 => FirearmState::Fire { step: 0 },
            FireAction::BoltAction { .. } if remaining > 0 => FirearmState::BoltCycle { tick: 0 },
            _ => FirearmState::Idle,
        }
    }

    // ========================================================================
    // Scripts
    // ========================================================================

    fn abort_reload(&mut self, ctx: &mut ItemContext, reason: &str) -> ItemResult<()> {
        logger::log(&format!("⛔ {:?}: {} reload aborted: {}", ctx.player, self.tuning.name, reason));
        self.transition(ctx, FirearmState::Idle)?;
        self.magazine = None;
        Ok(())
    }

    fn play_cues(ctx: &mut ItemContext, script: &ReloadScript, tick: u32) {
        for cue in script.cues_at(tick) {
            if let Some(sound) = &cue.sound {
                ctx.play_sound(sound);
            }
            if cue.shake > 0.0 {
                ctx.shake(cue.shake, 0.2);
            }
        }
    }

    fn tick_reload(&mut self, ctx: &mut ItemContext, tick: u32, tactical: bool) -> ItemResult<()> {
        let tuning = self.tuning.clone();
        let script = if tactical {
            &tuning.tactical_reload
        } else {
            &tuning.reload
        };

        let still_there = self
            .magazine
            .as_ref()
            .is_some_and(|m| m.is_valid(&*ctx.host, ctx.player));
        if !still_there {
            return self.abort_reload(ctx, "magazine left its slot");
        }
        let empty = self.magazine.as_ref().is_some_and(|m| m.remaining() == 0);
        if empty && self.spare(ctx) == 0 {
            return self.abort_reload(ctx, "out of ammo");
        }

        Self::play_cues(ctx, script, tick);

        if tick == script.load_tick {
            if let Some(magazine) = self.magazine.as_mut() {
                let loaded = magazine.load_from_inventory(ctx.host, ctx.player)?;
                logger::log(&format!(
                    "📥 {:?}: {} +{} ({}/{})",
                    ctx.player,
                    tuning.name,
                    loaded,
                    magazine.remaining(),
                    magazine.max_capacity()
                ));
            }
        }

        let next = tick + 1;
        if next >= script.duration {
            self.transition(ctx, FirearmState::Idle)
        } else {
            self.state = FirearmState::Reload { tick: next, tactical };
            Ok(())
        }
    }

    fn tick_bolt(&mut self, ctx: &mut ItemContext, tick: u32) -> ItemResult<()> {
        let tuning = self.tuning.clone();
        let FireAction::BoltAction { cycle } = &tuning.action else {
            return self.transition(ctx, FirearmState::Idle);
        };

        Self::play_cues(ctx, cycle, tick);

        let next = tick + 1;
        if next >= cycle.duration {
            self.transition(ctx, FirearmState::Idle)
        } else {
            self.state = FirearmState::BoltCycle { tick: next };
            Ok(())
        }
    }

    fn decay_bloom(&mut self) {
        if self.bloom == 0 {
            return;
        }
        self.bloom_idle += 1;
        if self.bloom_idle >= self.tuning.spread.bloom_decay_ticks.max(1) {
            self.bloom -= 1;
            self.bloom_idle = 0;
        }
    }

    fn status_text(&self, ctx: &ItemContext) -> String {
        match &self.magazine {
            Some(magazine) => format!(
                "{} {}/{} [{}]",
                self.tuning.name,
                magazine.remaining(),
                magazine.max_capacity(),
                self.spare(ctx)
            ),
            None => format!("{}: no magazine", self.tuning.name),
        }
    }
}

impl AdvancedItem for Firearm {
    fn key(&self) -> &ItemKey {
        &self.key
    }

    fn is_usable(&self, _ctx: &ItemContext) -> bool {
        !matches!(self.state, FirearmState::Pickup { .. })
    }

    fn on_tick(&mut self, ctx: &mut ItemContext, _snapshot: &ItemSnapshot) -> ItemResult<()> {
        self.ticks += 1;

        match self.state {
            FirearmState::Pickup { ticks_left } => {
                if ticks_left <= 1 {
                    self.transition(ctx, FirearmState::Idle)?;
                } else {
                    self.state = FirearmState::Pickup {
                        ticks_left: ticks_left - 1,
                    };
                }
            }
            FirearmState::Idle => {
                self.decay_bloom();
                self.refresh_magazine(ctx)?;
            }
            FirearmState::Fire { step } => {
                let step = step + 1;
                if step >= self.tuning.fire_interval {
                    let next = self.after_fire(ctx);
                    self.transition(ctx, next)?;
                } else {
                    self.state = FirearmState::Fire { step };
                }
            }
            FirearmState::Reload { tick, tactical } => self.tick_reload(ctx, tick, tactical)?,
            FirearmState::BoltCycle { tick } => self.tick_bolt(ctx, tick)?,
        }

        if self.status_interval > 0 && self.ticks % self.status_interval as u64 == 0 {
            let text = self.status_text(ctx);
            ctx.status(&text);
        }
        Ok(())
    }

    fn on_start_use(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        self.trigger_held = true;
        match self.state {
            FirearmState::Idle => self.pull_trigger(ctx),
            _ => Ok(()),
        }
    }

    fn on_stop_use(&mut self, _ctx: &mut ItemContext) -> ItemResult<()> {
        self.trigger_held = false;
        Ok(())
    }

    fn on_swing(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        if self.state != FirearmState::Idle {
            return Ok(());
        }
        if ctx.player_state()?.sneaking {
            self.open_bench(ctx)
        } else {
            self.reload_gesture(ctx)
        }
    }

    fn on_remove(&mut self, ctx: &mut ItemContext) -> ItemResult<()> {
        self.trigger_held = false;
        let old = self.state;
        self.exit(ctx, old);
        self.state = FirearmState::Idle;
        self.clear_cooldowns(ctx);
        Ok(())
    }

    fn label(&self) -> String {
        self.tuning.name.clone()
    }
}

#[cfg(test)]
mod firearm_tests;
