//! FixedUpdate systems (generic over the host)
//!
//! Порядок (см. `ArsenalPlugin`):
//! 1. handle_departures - PlayerLeft → teardown
//! 2. route_item_inputs - ItemInput → instance (до on_tick этого тика)
//! 3. tick_sessions - revalidate / create / on_tick
//! 4. resolve_projectile_impacts - ProjectileImpact → dispatch
//! 5. expire_projectiles - beam timeouts + потерянные снаряды
//! 6. poll_forms - deferred continuations

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;

use super::{EngineRefs, ItemInput, PlayerLeft, SessionManager};
use crate::forms::PendingForms;
use crate::host::{HostWorld, ItemHost};
use crate::item::ProfileRegistry;
use crate::logger;
use crate::projectile::{ImpactResolution, ProjectileDispatch, ProjectileImpact};
use crate::DeterministicRng;

/// Engine resources borrowed together by every system.
#[derive(SystemParam)]
pub struct EngineParams<'w, H: ItemHost + 'static> {
    host: ResMut<'w, HostWorld<H>>,
    rng: ResMut<'w, DeterministicRng>,
    dispatch: ResMut<'w, ProjectileDispatch>,
    forms: ResMut<'w, PendingForms>,
}

impl<H: ItemHost + 'static> EngineParams<'_, H> {
    pub fn refs(&mut self) -> EngineRefs<'_> {
        EngineRefs {
            host: &mut self.host.0,
            rng: &mut self.rng.rng,
            dispatch: &mut *self.dispatch,
            forms: &mut *self.forms,
        }
    }
}

pub fn handle_departures<H: ItemHost + 'static>(
    mut events: EventReader<PlayerLeft>,
    mut sessions: ResMut<SessionManager>,
    mut engine: EngineParams<H>,
) {
    let mut refs = engine.refs();
    for event in events.read() {
        sessions.teardown(event.player, &mut refs, "player left");
    }
}

pub fn route_item_inputs<H: ItemHost + 'static>(
    mut events: EventReader<ItemInput>,
    mut sessions: ResMut<SessionManager>,
    mut engine: EngineParams<H>,
) {
    let mut refs = engine.refs();
    for input in events.read() {
        if !sessions.route(input, &mut refs) {
            logger::log_with_level(
                logger::LogLevel::Debug,
                &format!("🔕 {:?} {:?} dropped", input.player, input.kind),
            );
        }
    }
}

pub fn tick_sessions<H: ItemHost + 'static>(
    registry: Res<ProfileRegistry>,
    mut sessions: ResMut<SessionManager>,
    mut engine: EngineParams<H>,
) {
    let mut refs = engine.refs();
    sessions.tick(&registry, &mut refs);
}

pub fn resolve_projectile_impacts<H: ItemHost + 'static>(
    mut events: EventReader<ProjectileImpact>,
    mut engine: EngineParams<H>,
) {
    let EngineRefs { host, dispatch, .. } = engine.refs();
    for impact in events.read() {
        if dispatch.resolve_impact(host, impact) == ImpactResolution::Unknown {
            logger::log_with_level(
                logger::LogLevel::Debug,
                &format!("🔕 Impact of untracked {:?} ignored", impact.projectile),
            );
        }
    }
}

pub fn expire_projectiles<H: ItemHost + 'static>(mut engine: EngineParams<H>) {
    let EngineRefs { host, dispatch, .. } = engine.refs();
    let tick = host.current_tick();
    dispatch.sweep(host, tick);
}

pub fn poll_forms<H: ItemHost + 'static>(mut engine: EngineParams<H>) {
    let EngineRefs { host, forms, .. } = engine.refs();
    forms.poll(host);
}
