//! Per-player session manager
//!
//! # Architecture
//!
//! Host даёт только snapshot предмета в руке раз в тик. Session manager решает,
//! продолжает ли этот snapshot живой instance или это новый предмет:
//!
//! ```text
//! tick:
//!   departed players → teardown
//!   per player:
//!     dead → teardown, skip
//!     no session / faulted / !is_valid → teardown → factory (если профиль есть)
//!     session → on_tick(snapshot), tick_counter += 1
//! ```
//!
//! Teardown сначала удаляет запись, потом вызывает `on_stop_use`/`on_remove`,
//! поэтому повторный teardown (смерть + disconnect в одном тике) - no-op.

use bevy::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

use crate::error::{ItemError, ItemResult};
use crate::forms::PendingForms;
use crate::host::{HostEntity, ItemHost};
use crate::item::{AdvancedItem, ItemBinding, ItemContext, ProfileRegistry, Wielded};
use crate::logger;
use crate::projectile::ProjectileDispatch;

pub mod events;
pub mod systems;

pub use events::{ItemInput, ItemInputKind, PlayerLeft};
pub use systems::*;

pub const DEFAULT_FAULT_STREAK_LIMIT: u32 = 3;

// ============================================================================
// Engine borrows
// ============================================================================

/// Mutable engine resources for one system run.
pub struct EngineRefs<'a> {
    pub host: &'a mut dyn ItemHost,
    pub rng: &'a mut ChaCha8Rng,
    pub dispatch: &'a mut ProjectileDispatch,
    pub forms: &'a mut PendingForms,
}

impl<'a> EngineRefs<'a> {
    /// Callback context for `player` at the host's current tick.
    pub fn context(&mut self, player: HostEntity) -> ItemContext<'_> {
        let tick = self.host.current_tick();
        ItemContext {
            host: &mut *self.host,
            rng: &mut *self.rng,
            dispatch: &mut *self.dispatch,
            forms: &mut *self.forms,
            player,
            tick,
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

pub struct PlayerSession {
    pub profile_id: String,
    pub instance: Box<dyn AdvancedItem>,
    pub hotbar_slot: u8,
    pub tick_counter: u64,
    /// Open start-use … stop-use interval
    pub using: bool,
    pub faulted: bool,
    pub recoverable_streak: u32,
}

/// What one `SessionManager::tick` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionTickReport {
    pub created: usize,
    pub torn_down: usize,
    pub ticked: usize,
}

/// Resource: zero or one session per player.
#[derive(Resource)]
pub struct SessionManager {
    sessions: HashMap<HostEntity, PlayerSession>,
    fault_streak_limit: u32,
    created: u64,
    teardowns: u64,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_FAULT_STREAK_LIMIT)
    }
}

impl SessionManager {
    pub fn new(fault_streak_limit: u32) -> Self {
        Self {
            sessions: HashMap::new(),
            fault_streak_limit: fault_streak_limit.max(1),
            created: 0,
            teardowns: 0,
        }
    }

    pub fn session(&self, player: HostEntity) -> Option<&PlayerSession> {
        self.sessions.get(&player)
    }

    pub fn has_session(&self, player: HostEntity) -> bool {
        self.sessions.contains_key(&player)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Instances created since startup.
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Teardowns that actually ran `on_remove`.
    pub fn teardowns(&self) -> u64 {
        self.teardowns
    }

    /// One simulation tick for every connected player.
    pub fn tick(&mut self, registry: &ProfileRegistry, engine: &mut EngineRefs) -> SessionTickReport {
        let mut report = SessionTickReport::default();
        let players = engine.host.players();

        let mut departed: Vec<HostEntity> = self
            .sessions
            .keys()
            .filter(|p| !players.contains(p))
            .copied()
            .collect();
        departed.sort();
        for player in departed {
            if self.teardown(player, engine, "disconnected") {
                report.torn_down += 1;
            }
        }

        for player in players {
            self.tick_player(player, registry, engine, &mut report);
        }
        report
    }

    fn tick_player(
        &mut self,
        player: HostEntity,
        registry: &ProfileRegistry,
        engine: &mut EngineRefs,
        report: &mut SessionTickReport,
    ) {
        let Some(state) = engine.host.player_state(player) else {
            return;
        };

        // Смерть проверяем до создания: мёртвый игрок не получает instance
        if !state.is_alive() {
            if self.teardown(player, engine, "player died") {
                report.torn_down += 1;
            }
            return;
        }

        let wielded = Wielded {
            slot: state.selected_slot,
            item: engine
                .host
                .inventory_item(player, state.selected_slot as usize),
        };

        let live = self
            .sessions
            .get(&player)
            .is_some_and(|s| !s.faulted && s.instance.is_valid(&wielded));
        if !live {
            let reason = if self.sessions.get(&player).is_some_and(|s| s.faulted) {
                "faulted"
            } else {
                "item changed"
            };
            if self.teardown(player, engine, reason) {
                report.torn_down += 1;
            }
            if self.create(player, &wielded, registry, engine) {
                report.created += 1;
            }
        }

        let Some(snapshot) = wielded.item else {
            return;
        };
        let limit = self.fault_streak_limit;
        let Some(session) = self.sessions.get_mut(&player) else {
            return;
        };
        let result = session
            .instance
            .on_tick(&mut engine.context(player), &snapshot);
        session.tick_counter += 1;
        report.ticked += 1;

        match result {
            Ok(()) => session.recoverable_streak = 0,
            Err(err) if err.is_recoverable() => {
                session.recoverable_streak += 1;
                logger::log_warning(&format!(
                    "⚠️ {:?} {}: {} (streak {}/{})",
                    player,
                    session.instance.label(),
                    err,
                    session.recoverable_streak,
                    limit
                ));
                if session.recoverable_streak >= limit {
                    session.faulted = true;
                    logger::log_error(&format!(
                        "❌ {:?} {}: faulted after {} failing ticks",
                        player,
                        session.instance.label(),
                        limit
                    ));
                }
            }
            Err(err) => Self::fault(player, session, &err),
        }
    }

    fn fault(player: HostEntity, session: &mut PlayerSession, err: &ItemError) {
        session.faulted = true;
        logger::log_error(&format!(
            "❌ {:?} {}: faulted: {}",
            player,
            session.instance.label(),
            err
        ));
    }

    fn create(
        &mut self,
        player: HostEntity,
        wielded: &Wielded,
        registry: &ProfileRegistry,
        engine: &mut EngineRefs,
    ) -> bool {
        let Some(item) = &wielded.item else {
            return false;
        };
        let Some(profile) = registry.get(&item.type_id) else {
            return false;
        };

        let binding = ItemBinding::new(wielded.slot, item.clone());
        let instance = match profile.create(&binding, &mut engine.context(player)) {
            Ok(instance) => instance,
            Err(err) => {
                logger::log_error(&format!(
                    "❌ {:?}: factory for `{}` failed: {}",
                    player, profile.item_type_id, err
                ));
                return false;
            }
        };

        logger::log(&format!(
            "🗡️ {:?}: session `{}` created (slot {})",
            player, profile.item_type_id, wielded.slot
        ));
        self.sessions.insert(
            player,
            PlayerSession {
                profile_id: profile.item_type_id.clone(),
                instance,
                hotbar_slot: wielded.slot,
                tick_counter: 0,
                using: false,
                faulted: false,
                recoverable_streak: 0,
            },
        );
        self.created += 1;
        true
    }

    /// Remove the player's session and run its cleanup. Returns false if there
    /// was nothing to tear down.
    pub fn teardown(&mut self, player: HostEntity, engine: &mut EngineRefs, reason: &str) -> bool {
        let Some(mut session) = self.sessions.remove(&player) else {
            return false;
        };
        self.teardowns += 1;

        let mut ctx = engine.context(player);
        if session.using {
            if let Err(err) = session.instance.on_stop_use(&mut ctx) {
                logger::log_warning(&format!("⚠️ {:?}: stop-use on teardown failed: {}", player, err));
            }
        }
        if let Err(err) = session.instance.on_remove(&mut ctx) {
            logger::log_warning(&format!("⚠️ {:?}: on_remove failed: {}", player, err));
        }

        logger::log(&format!(
            "🧹 {:?}: session `{}` removed after {} ticks ({})",
            player, session.profile_id, session.tick_counter, reason
        ));
        true
    }

    /// Deliver a discrete input to the player's instance. Returns whether it
    /// reached the instance.
    pub fn route(&mut self, input: &ItemInput, engine: &mut EngineRefs) -> bool {
        let Some(session) = self.sessions.get_mut(&input.player) else {
            return false;
        };
        if session.faulted {
            return false;
        }

        // Инстанс мог устареть после последнего тика (смена слота до события)
        let Some(state) = engine.host.player_state(input.player) else {
            return false;
        };
        let wielded = Wielded {
            slot: state.selected_slot,
            item: engine
                .host
                .inventory_item(input.player, state.selected_slot as usize),
        };
        if !state.is_alive() || !session.instance.is_valid(&wielded) {
            return false;
        }

        let mut ctx = engine.context(input.player);
        let result: ItemResult<()> = match input.kind {
            ItemInputKind::StartUse => {
                if session.using || !session.instance.is_usable(&ctx) {
                    return false;
                }
                session.using = true;
                session.instance.on_start_use(&mut ctx)
            }
            ItemInputKind::StopUse => {
                if !session.using {
                    return false;
                }
                session.using = false;
                session.instance.on_stop_use(&mut ctx)
            }
            ItemInputKind::Swing => session.instance.on_swing(&mut ctx),
            ItemInputKind::HitEntity(target) => session.instance.on_hit_entity(&mut ctx, target),
            ItemInputKind::HitBlock(block) => session.instance.on_hit_block(&mut ctx, block),
        };

        match result {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => {
                logger::log_info(&format!("⚠️ {:?} {:?} skipped: {}", input.player, input.kind, err));
            }
            Err(err) => Self::fault(input.player, session, &err),
        }
        true
    }
}
