//! Host boundary - синхронный world/entity/item API игрового хоста
//!
//! # Архитектура
//!
//! Add-on не владеет миром: всё состояние (инвентари, entities, блоки)
//! живёт в host'е и доступно только через `ItemHost`.
//! - Предметы - value snapshots (`ItemSnapshot`), без стабильного handle
//! - Entities - transient id (`HostEntity`), могут исчезнуть между тиками
//! - Все вызовы синхронные, single-threaded (один tick callback)
//!
//! `SandboxWorld` - in-memory реализация для headless binary и тестов.

use bevy::prelude::*;
use std::collections::BTreeMap;

use crate::error::HostError;

pub mod sandbox;

pub use sandbox::{SandboxWorld, WorldEvent};

/// Item property holding the external edit stamp (attachments bench).
pub const EDIT_STAMP_KEY: &str = "arsenal:edited_at";

/// Player eye height above feet (blocks).
pub const EYE_HEIGHT: f32 = 1.62;

/// Hotbar = первые 9 слотов инвентаря.
pub const HOTBAR_SIZE: u8 = 9;

// ============================================================================
// Identifiers & values
// ============================================================================

/// Transient host entity id (players, mobs, projectiles).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostEntity(pub u64);

/// Small typed value stored on an item or entity.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Durability component: `damage` растёт от 0 до `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Durability {
    pub damage: u32,
    pub max: u32,
}

impl Durability {
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.damage)
    }

    pub fn is_exhausted(&self) -> bool {
        self.damage >= self.max
    }
}

/// Value snapshot of an item stack, delivered anew every tick.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemSnapshot {
    pub type_id: String,
    pub amount: u32,
    pub durability: Option<Durability>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ItemSnapshot {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            amount: 1,
            durability: None,
            properties: BTreeMap::new(),
        }
    }

    /// Stackable item (ammo, materials).
    pub fn stack(type_id: impl Into<String>, amount: u32) -> Self {
        Self {
            amount,
            ..Self::new(type_id)
        }
    }

    /// Tool/magazine with durability component.
    pub fn with_durability(mut self, damage: u32, max: u32) -> Self {
        self.durability = Some(Durability { damage, max });
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.properties.insert(key.into(), value);
    }

    /// Edit stamp written by external modifications (attachments).
    pub fn edit_stamp(&self) -> Option<i64> {
        self.property(EDIT_STAMP_KEY)
            .and_then(PropertyValue::as_number)
            .map(|n| n as i64)
    }
}

/// Режим игры: creative/spectator не платят durability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameMode {
    Survival,
    Adventure,
    Creative,
    Spectator,
}

impl GameMode {
    pub fn is_cost_exempt(&self) -> bool {
        matches!(self, GameMode::Creative | GameMode::Spectator)
    }
}

/// Player state snapshot for one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    /// Feet position
    pub location: Vec3,
    /// (pitch, yaw) в градусах; pitch > 0 = смотрим вниз
    pub rotation: Vec2,
    pub velocity: Vec3,
    pub health: f32,
    pub on_ground: bool,
    pub sneaking: bool,
    pub game_mode: GameMode,
    pub selected_slot: u8,
}

impl PlayerState {
    pub fn eye_location(&self) -> Vec3 {
        self.location + Vec3::Y * EYE_HEIGHT
    }

    pub fn view_direction(&self) -> Vec3 {
        view_direction(self.rotation)
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn horizontal_speed(&self) -> f32 {
        Vec2::new(self.velocity.x, self.velocity.z).length()
    }
}

/// View direction from (pitch, yaw) degrees. yaw 0 = +Z.
pub fn view_direction(rotation: Vec2) -> Vec3 {
    let pitch = rotation.x.to_radians();
    let yaw = rotation.y.to_radians();
    Vec3::new(
        -yaw.sin() * pitch.cos(),
        -pitch.sin(),
        yaw.cos() * pitch.cos(),
    )
}

/// Entity hit by a ray cast (sorted by distance).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityHit {
    pub entity: HostEntity,
    pub distance: f32,
    pub point: Vec3,
}

/// Block hit by a ray cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockHit {
    pub block: IVec3,
    pub distance: f32,
    pub point: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DamageCause {
    Melee,
    Projectile,
    Beam,
    Impact,
}

// ============================================================================
// Forms
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormTicket(pub u64);

/// Modal action form (layout is the host's business).
#[derive(Clone, Debug, PartialEq)]
pub struct FormRequest {
    pub title: String,
    pub body: String,
    pub buttons: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FormResponse {
    Button(usize),
    Dismissed,
}

/// Результат опроса формы на текущем тике.
#[derive(Clone, Debug, PartialEq)]
pub enum FormPoll {
    Pending,
    Ready(FormResponse),
    /// Player disconnected or host dropped the form
    Gone,
}

// ============================================================================
// ItemHost
// ============================================================================

/// Synchronous host API consumed by the item engine.
///
/// Ошибки side-effect вызовов (sound, particle, shake, status) оружие глотает,
/// мутации мира (inventory, damage, teleport) пробрасывает через `?`.
pub trait ItemHost: Send + Sync {
    fn current_tick(&self) -> u64;

    // === Players ===
    fn players(&self) -> Vec<HostEntity>;
    fn player_state(&self, player: HostEntity) -> Option<PlayerState>;

    // === Inventory ===
    fn inventory_size(&self, player: HostEntity) -> usize;
    fn inventory_item(&self, player: HostEntity, slot: usize) -> Option<ItemSnapshot>;
    fn set_inventory_item(
        &mut self,
        player: HostEntity,
        slot: usize,
        item: Option<ItemSnapshot>,
    ) -> Result<(), HostError>;

    /// Item in the selected hotbar slot.
    fn selected_item(&self, player: HostEntity) -> Option<ItemSnapshot> {
        let state = self.player_state(player)?;
        self.inventory_item(player, state.selected_slot as usize)
    }

    // === Entities ===
    fn entity_alive(&self, entity: HostEntity) -> bool;
    fn entity_location(&self, entity: HostEntity) -> Option<Vec3>;
    fn entity_property(&self, entity: HostEntity, key: &str) -> Option<PropertyValue>;
    fn set_entity_property(
        &mut self,
        entity: HostEntity,
        key: &str,
        value: Option<PropertyValue>,
    ) -> Result<(), HostError>;

    // === Queries ===
    fn entities_near(&self, center: Vec3, radius: f32) -> Vec<HostEntity>;
    fn raycast_entities(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Vec<EntityHit>;
    fn raycast_block(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<BlockHit>;
    fn block_type(&self, block: IVec3) -> Option<String>;

    // === World mutation ===
    fn apply_damage(
        &mut self,
        target: HostEntity,
        amount: f32,
        cause: DamageCause,
        source: Option<HostEntity>,
    ) -> Result<bool, HostError>;
    fn apply_impulse(&mut self, entity: HostEntity, impulse: Vec3) -> Result<(), HostError>;
    fn apply_knockback(
        &mut self,
        entity: HostEntity,
        direction: Vec2,
        horizontal: f32,
        vertical: f32,
    ) -> Result<(), HostError>;
    fn teleport(
        &mut self,
        entity: HostEntity,
        location: Vec3,
        rotation: Option<Vec2>,
    ) -> Result<(), HostError>;
    fn spawn_entity(
        &mut self,
        kind: &str,
        location: Vec3,
        velocity: Vec3,
        owner: Option<HostEntity>,
    ) -> Result<HostEntity, HostError>;
    fn remove_entity(&mut self, entity: HostEntity) -> Result<(), HostError>;

    // === Cosmetic side effects ===
    fn play_sound(&mut self, sound: &str, location: Vec3) -> Result<(), HostError>;
    fn spawn_particle(&mut self, particle: &str, location: Vec3) -> Result<(), HostError>;
    fn camera_shake(&mut self, player: HostEntity, intensity: f32, seconds: f32) -> Result<(), HostError>;
    fn show_status(&mut self, player: HostEntity, text: &str) -> Result<(), HostError>;
    fn set_cooldown(&mut self, player: HostEntity, category: &str, ticks: u32) -> Result<(), HostError>;

    // === Forms ===
    fn show_form(&mut self, player: HostEntity, form: FormRequest) -> Result<FormTicket, HostError>;
    fn poll_form(&mut self, ticket: FormTicket) -> FormPoll;
}

/// Resource: the host world the engine drives.
#[derive(Resource)]
pub struct HostWorld<H: ItemHost + 'static>(pub H);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_direction_level() {
        let dir = view_direction(Vec2::new(0.0, 0.0));
        assert!((dir - Vec3::Z).length() < 1e-5);

        let down = view_direction(Vec2::new(90.0, 0.0));
        assert!((down - Vec3::NEG_Y).length() < 1e-5);
    }

    #[test]
    fn test_edit_stamp() {
        let item = ItemSnapshot::new("arsenal:carbine");
        assert_eq!(item.edit_stamp(), None);

        let stamped = item.with_property(EDIT_STAMP_KEY, PropertyValue::Number(120.0));
        assert_eq!(stamped.edit_stamp(), Some(120));
    }

    #[test]
    fn test_durability() {
        let d = Durability { damage: 18, max: 20 };
        assert_eq!(d.remaining(), 2);
        assert!(!d.is_exhausted());
        assert!(Durability { damage: 20, max: 20 }.is_exhausted());
    }

    #[test]
    fn test_cost_exempt() {
        assert!(GameMode::Creative.is_cost_exempt());
        assert!(!GameMode::Survival.is_cost_exempt());
    }
}
