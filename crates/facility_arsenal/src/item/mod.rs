//! AdvancedItem contract
//!
//! # Архитектура
//!
//! Host даёт только snapshot предмета в руке (раз в тик) + дискретные события.
//! Поверх этого `AdvancedItem` - маленькая программа с памятью:
//! - Identity: `ItemKey{slot, type_id, edit_stamp}`, сравнивается по value каждый тик
//! - Lifecycle: create → on_tick* (+ события) → on_remove (ровно один раз)
//! - Все callbacks возвращают `ItemResult<()>`, session manager решает, что делать с ошибкой
//!
//! `ItemContext` - всё, что callback может трогать за один вызов (host, RNG,
//! projectile dispatch, pending forms). Cosmetic helpers глотают ошибки host'а.

use bevy::prelude::*;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::error::{ItemError, ItemResult};
use crate::forms::PendingForms;
use crate::host::{HostEntity, ItemHost, ItemSnapshot, PlayerState};
use crate::logger::{self, LogLevel};
use crate::projectile::ProjectileDispatch;

pub mod registry;

pub use registry::{ItemBinding, ItemFactory, ProfileRegistry, WeaponProfile};

// ============================================================================
// Identity
// ============================================================================

/// What the player is holding this tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Wielded {
    pub slot: u8,
    pub item: Option<ItemSnapshot>,
}

/// Composite identity of a wielded item.
///
/// Предметы не имеют стабильного id: "тот же предмет" = тот же слот, тот же
/// тип и тот же edit stamp (bench/attachments бампают stamp).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub slot: u8,
    pub type_id: String,
    pub edit_stamp: Option<i64>,
}

impl ItemKey {
    pub fn of(slot: u8, item: &ItemSnapshot) -> Self {
        Self {
            slot,
            type_id: item.type_id.clone(),
            edit_stamp: item.edit_stamp(),
        }
    }

    pub fn matches(&self, wielded: &Wielded) -> bool {
        match &wielded.item {
            Some(item) => *self == ItemKey::of(wielded.slot, item),
            None => false,
        }
    }
}

// ============================================================================
// ItemContext
// ============================================================================

/// Everything one callback may touch.
pub struct ItemContext<'a> {
    pub host: &'a mut dyn ItemHost,
    pub rng: &'a mut ChaCha8Rng,
    pub dispatch: &'a mut ProjectileDispatch,
    pub forms: &'a mut PendingForms,
    pub player: HostEntity,
    pub tick: u64,
}

impl<'a> ItemContext<'a> {
    pub fn player_state(&self) -> ItemResult<PlayerState> {
        self.host
            .player_state(self.player)
            .ok_or(ItemError::PlayerGone(self.player))
    }

    /// Sound at the player's eyes.
    pub fn play_sound(&mut self, sound: &str) {
        let at = self
            .host
            .player_state(self.player)
            .map(|s| s.eye_location())
            .unwrap_or(Vec3::ZERO);
        self.play_sound_at(sound, at);
    }

    pub fn play_sound_at(&mut self, sound: &str, at: Vec3) {
        if let Err(err) = self.host.play_sound(sound, at) {
            swallowed("sound", sound, &err);
        }
    }

    pub fn particle(&mut self, particle: &str, at: Vec3) {
        if let Err(err) = self.host.spawn_particle(particle, at) {
            swallowed("particle", particle, &err);
        }
    }

    pub fn shake(&mut self, intensity: f32, seconds: f32) {
        if let Err(err) = self.host.camera_shake(self.player, intensity, seconds) {
            swallowed("shake", "camera", &err);
        }
    }

    pub fn status(&mut self, text: &str) {
        if let Err(err) = self.host.show_status(self.player, text) {
            swallowed("status", text, &err);
        }
    }

    pub fn cooldown(&mut self, category: &str, ticks: u32) {
        if let Err(err) = self.host.set_cooldown(self.player, category, ticks) {
            swallowed("cooldown", category, &err);
        }
    }

    /// Bernoulli roll on the deterministic RNG.
    pub fn roll(&mut self, chance: f32) -> bool {
        chance > 0.0 && self.rng.gen::<f32>() < chance
    }
}

fn swallowed(kind: &str, what: &str, err: &dyn std::fmt::Display) {
    logger::log_with_level(
        LogLevel::Debug,
        &format!("🔇 {} `{}` dropped: {}", kind, what, err),
    );
}

// ============================================================================
// AdvancedItem
// ============================================================================

/// Stateful behavior of one wielded item.
///
/// Session manager гарантирует:
/// - `on_start_use` / `on_stop_use` строго чередуются
/// - `on_remove` вызывается ровно один раз, после него instance дропается
pub trait AdvancedItem: Send + Sync {
    /// Identity captured at construction.
    fn key(&self) -> &ItemKey;

    /// Still the same item in hand?
    fn is_valid(&self, wielded: &Wielded) -> bool {
        self.key().matches(wielded)
    }

    /// Start-use is dropped when this is false.
    fn is_usable(&self, _ctx: &ItemContext) -> bool {
        true
    }

    /// Advance exactly one tick.
    fn on_tick(&mut self, ctx: &mut ItemContext, snapshot: &ItemSnapshot) -> ItemResult<()>;

    fn on_start_use(&mut self, _ctx: &mut ItemContext) -> ItemResult<()> {
        Ok(())
    }

    fn on_stop_use(&mut self, _ctx: &mut ItemContext) -> ItemResult<()> {
        Ok(())
    }

    fn on_swing(&mut self, _ctx: &mut ItemContext) -> ItemResult<()> {
        Ok(())
    }

    fn on_hit_entity(&mut self, _ctx: &mut ItemContext, _target: HostEntity) -> ItemResult<()> {
        Ok(())
    }

    fn on_hit_block(&mut self, _ctx: &mut ItemContext, _block: IVec3) -> ItemResult<()> {
        Ok(())
    }

    /// Cleanup: release held targets, zero cooldowns.
    fn on_remove(&mut self, _ctx: &mut ItemContext) -> ItemResult<()> {
        Ok(())
    }

    /// Short name for logs.
    fn label(&self) -> String {
        self.key().type_id.clone()
    }
}
