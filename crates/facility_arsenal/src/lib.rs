//! Facility Arsenal - stateful item-behavior engine
//!
//! Host (игровой сервер) даёт add-on'у только snapshot предмета в руке раз в
//! тик и несколько дискретных событий. Поверх этого engine держит per-player
//! instance оружия с памятью: firearm (magazine/reload FSM) и charge blade
//! (charge → slash → lock-on / plunge).
//!
//! АРХИТЕКТУРА:
//! - Bevy ECS = tick loop + resources (sessions, registry, dispatch, forms)
//! - `ItemHost` = весь мир (инвентари, entities, блоки) живёт в host'е
//! - `SandboxWorld` = in-memory host для headless binary и тестов

use bevy::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::marker::PhantomData;

// Публичные модули
pub mod ammo;
pub mod config;
pub mod content;
pub mod error;
pub mod firearm;
pub mod forms;
pub mod host;
pub mod item;
pub mod logger;
pub mod melee;
pub mod projectile;
pub mod session;

#[cfg(test)]
pub(crate) mod test_rig;

// Re-export основных типов
pub use ammo::MagazineContext;
pub use config::ArsenalConfig;
pub use content::register_arsenal;
pub use error::{ConfigError, HostError, ItemError, ItemResult, RegistryError};
pub use firearm::{Firearm, FirearmState, FirearmTuning};
pub use forms::{FormContinuation, PendingForms, WorldHandle};
pub use host::{HostEntity, HostWorld, ItemHost, ItemSnapshot, PlayerState, SandboxWorld};
pub use item::{AdvancedItem, ItemBinding, ItemContext, ItemKey, ProfileRegistry, WeaponProfile, Wielded};
pub use logger::{init_logger, log, log_error, log_info, log_warning, CaptureSink, LogLevel, LogSink};
pub use melee::{BladeState, BladeTuning, ChargeBlade, LockOn};
pub use projectile::{ImpactTarget, ProjectileDispatch, ProjectileImpact};
pub use session::{EngineRefs, ItemInput, ItemInputKind, PlayerLeft, SessionManager};

/// Главный plugin engine'а.
///
/// `HostWorld<H>` вставляет вызывающий код (host не имеет `Default`).
///
/// Порядок FixedUpdate (строго последовательно):
/// 1. handle_departures - PlayerLeft → teardown
/// 2. route_item_inputs - дискретные события до on_tick этого тика
/// 3. tick_sessions - revalidate / create / on_tick
/// 4. resolve_projectile_impacts - ProjectileImpact → ровно одно разрешение
/// 5. expire_projectiles - beam timeouts, потерянные снаряды
/// 6. poll_forms - deferred form continuations
pub struct ArsenalPlugin<H: ItemHost + 'static> {
    pub config: ArsenalConfig,
    _host: PhantomData<fn() -> H>,
}

impl<H: ItemHost + 'static> ArsenalPlugin<H> {
    pub fn new(config: ArsenalConfig) -> Self {
        Self {
            config,
            _host: PhantomData,
        }
    }
}

impl<H: ItemHost + 'static> Default for ArsenalPlugin<H> {
    fn default() -> Self {
        Self::new(ArsenalConfig::default())
    }
}

impl<H: ItemHost + 'static> Plugin for ArsenalPlugin<H> {
    fn build(&self, app: &mut App) {
        let config = &self.config;
        if let Some(level) = LogLevel::parse(&config.log_level) {
            logger::set_log_level(level);
        }

        let mut registry = ProfileRegistry::default();
        if let Err(err) = register_arsenal(&mut registry, config) {
            log_error(&format!("❌ Arsenal registration failed: {}", err));
        }

        app
            // Fixed timestep = host tick rate
            .insert_resource(Time::<Fixed>::from_hz(config.tick_hz))
            // Детерминистичный RNG (spread, lock-on cues)
            .insert_resource(DeterministicRng::new(config.rng_seed))
            .insert_resource(SessionManager::new(config.fault_streak_limit))
            .insert_resource(registry)
            .insert_resource(config.clone())
            .init_resource::<ProjectileDispatch>()
            .init_resource::<PendingForms>()
            // Host → engine events
            .add_event::<ItemInput>()
            .add_event::<PlayerLeft>()
            .add_event::<ProjectileImpact>()
            .add_systems(
                FixedUpdate,
                (
                    session::handle_departures::<H>,
                    session::route_item_inputs::<H>,
                    session::tick_sessions::<H>,
                    session::resolve_projectile_impacts::<H>,
                    session::expire_projectiles::<H>,
                    session::poll_forms::<H>,
                )
                    .chain(), // Последовательное выполнение
            );
    }
}

/// Детерминистичный RNG resource (seeded)
#[derive(Resource)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

/// Создаёт minimal Bevy App с `SandboxWorld` host'ом и встроенным арсеналом
pub fn create_headless_app(seed: u64) -> App {
    let config = ArsenalConfig {
        rng_seed: seed,
        ..ArsenalConfig::default()
    };
    create_sandbox_app(config, SandboxWorld::new())
}

/// Headless App поверх готового `SandboxWorld` (сценарии, интеграционные тесты)
pub fn create_sandbox_app(config: ArsenalConfig, world: SandboxWorld) -> App {
    let mut app = App::new();
    init_logger();
    app.add_plugins(MinimalPlugins)
        .insert_resource(HostWorld(world))
        .add_plugins(ArsenalPlugin::<SandboxWorld>::new(config));

    app
}

/// Один host тик для `SandboxWorld`: FixedUpdate chain, затем движение
/// снарядов (collisions → `ProjectileImpact` на следующий тик) и часы мира.
pub fn step_sandbox(app: &mut App) {
    app.world_mut().run_schedule(FixedUpdate);

    let impacts = {
        let mut host = app.world_mut().resource_mut::<HostWorld<SandboxWorld>>();
        let impacts = host.0.step_projectiles();
        host.0.advance_tick();
        impacts
    };
    if !impacts.is_empty() {
        app.world_mut().send_event_batch(impacts);
    }
}
