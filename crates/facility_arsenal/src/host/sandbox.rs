//! SandboxWorld - in-memory host для headless симуляции и тестов
//!
//! Моделирует ровно столько мира, сколько нужно item engine:
//! - players (inventory 36 слотов, hotbar 0-8, sneaking, game mode)
//! - mobs/projectiles как точки со сферой попадания
//! - solid blocks (HashMap)
//! - формы с ручным ответом (`answer_form`)
//!
//! Все side effects пишутся в `journal` - тесты проверяют его вместо рендера.

use bevy::prelude::*;
use std::collections::{BTreeMap, HashMap};

use super::{
    BlockHit, DamageCause, EntityHit, FormPoll, FormRequest, FormResponse, FormTicket, GameMode,
    HostEntity, ItemHost, ItemSnapshot, PlayerState, PropertyValue,
};
use crate::error::HostError;
use crate::projectile::{ImpactTarget, ProjectileImpact};

/// Player inventory size (hotbar + main).
pub const INVENTORY_SIZE: usize = 36;

/// Hit sphere центр над ногами entity.
const BODY_CENTER: f32 = 0.9;
/// Hit sphere radius.
const BODY_RADIUS: f32 = 0.9;
/// Шаг ray-march по блокам.
const BLOCK_STEP: f32 = 0.1;

/// Side effect recorded by the sandbox.
#[derive(Clone, Debug, PartialEq)]
pub enum WorldEvent {
    Sound { sound: String, at: Vec3 },
    Particle { particle: String, at: Vec3 },
    Damage {
        target: HostEntity,
        amount: f32,
        cause: DamageCause,
        source: Option<HostEntity>,
    },
    Impulse { entity: HostEntity, impulse: Vec3 },
    Knockback {
        entity: HostEntity,
        direction: Vec2,
        horizontal: f32,
        vertical: f32,
    },
    Teleport { entity: HostEntity, to: Vec3 },
    Spawned { entity: HostEntity, kind: String },
    Removed { entity: HostEntity },
    CameraShake { player: HostEntity, intensity: f32 },
    Status { player: HostEntity, text: String },
    Cooldown {
        player: HostEntity,
        category: String,
        ticks: u32,
    },
    FormShown { player: HostEntity, ticket: FormTicket },
}

#[derive(Clone, Debug)]
struct SandboxPlayer {
    inventory: Vec<Option<ItemSnapshot>>,
    selected_slot: u8,
    sneaking: bool,
    game_mode: GameMode,
}

#[derive(Clone, Debug)]
struct SandboxEntity {
    kind: String,
    location: Vec3,
    rotation: Vec2,
    velocity: Vec3,
    health: f32,
    on_ground: bool,
    owner: Option<HostEntity>,
    properties: BTreeMap<String, PropertyValue>,
    player: Option<SandboxPlayer>,
}

impl SandboxEntity {
    fn center(&self) -> Vec3 {
        self.location + Vec3::Y * BODY_CENTER
    }

    /// Projectiles (owned entities) не участвуют в hit queries.
    fn is_hittable(&self) -> bool {
        self.owner.is_none() && self.health > 0.0
    }
}

#[derive(Clone, Debug)]
struct SandboxForm {
    player: HostEntity,
    request: FormRequest,
    answer: Option<FormResponse>,
}

/// In-memory `ItemHost`.
#[derive(Clone, Debug, Default)]
pub struct SandboxWorld {
    tick: u64,
    next_id: u64,
    next_form: u64,
    entities: BTreeMap<HostEntity, SandboxEntity>,
    blocks: HashMap<IVec3, String>,
    forms: BTreeMap<FormTicket, SandboxForm>,
    cooldowns: BTreeMap<(HostEntity, String), u32>,
    journal: Vec<WorldEvent>,
    /// Все cosmetic вызовы падают с `HostError::Rejected` (проверка устойчивости)
    pub fail_cosmetics: bool,
}

impl SandboxWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> HostEntity {
        self.next_id += 1;
        HostEntity(self.next_id)
    }

    // ========================================================================
    // Scripting API (tests / headless scenario)
    // ========================================================================

    pub fn spawn_player(&mut self, location: Vec3) -> HostEntity {
        let id = self.allocate();
        self.entities.insert(
            id,
            SandboxEntity {
                kind: "minecraft:player".to_string(),
                location,
                rotation: Vec2::ZERO,
                velocity: Vec3::ZERO,
                health: 20.0,
                on_ground: true,
                owner: None,
                properties: BTreeMap::new(),
                player: Some(SandboxPlayer {
                    inventory: vec![None; INVENTORY_SIZE],
                    selected_slot: 0,
                    sneaking: false,
                    game_mode: GameMode::Survival,
                }),
            },
        );
        id
    }

    pub fn spawn_mob(&mut self, kind: &str, location: Vec3, health: f32) -> HostEntity {
        let id = self.allocate();
        self.entities.insert(
            id,
            SandboxEntity {
                kind: kind.to_string(),
                location,
                rotation: Vec2::ZERO,
                velocity: Vec3::ZERO,
                health,
                on_ground: true,
                owner: None,
                properties: BTreeMap::new(),
                player: None,
            },
        );
        id
    }

    fn player_mut(&mut self, player: HostEntity) -> Option<&mut SandboxPlayer> {
        self.entities.get_mut(&player)?.player.as_mut()
    }

    pub fn give(&mut self, player: HostEntity, slot: usize, item: ItemSnapshot) {
        if let Some(p) = self.player_mut(player) {
            if slot < p.inventory.len() {
                p.inventory[slot] = Some(item);
            }
        }
    }

    pub fn take(&mut self, player: HostEntity, slot: usize) -> Option<ItemSnapshot> {
        let p = self.player_mut(player)?;
        p.inventory.get_mut(slot)?.take()
    }

    pub fn item(&self, player: HostEntity, slot: usize) -> Option<&ItemSnapshot> {
        self.entities
            .get(&player)?
            .player
            .as_ref()?
            .inventory
            .get(slot)?
            .as_ref()
    }

    pub fn select_slot(&mut self, player: HostEntity, slot: u8) {
        if let Some(p) = self.player_mut(player) {
            p.selected_slot = slot;
        }
    }

    pub fn set_sneaking(&mut self, player: HostEntity, sneaking: bool) {
        if let Some(p) = self.player_mut(player) {
            p.sneaking = sneaking;
        }
    }

    pub fn set_game_mode(&mut self, player: HostEntity, mode: GameMode) {
        if let Some(p) = self.player_mut(player) {
            p.game_mode = mode;
        }
    }

    pub fn set_on_ground(&mut self, entity: HostEntity, on_ground: bool) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.on_ground = on_ground;
        }
    }

    pub fn set_rotation(&mut self, entity: HostEntity, rotation: Vec2) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.rotation = rotation;
        }
    }

    pub fn set_location(&mut self, entity: HostEntity, location: Vec3) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.location = location;
        }
    }

    pub fn set_velocity(&mut self, entity: HostEntity, velocity: Vec3) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.velocity = velocity;
        }
    }

    pub fn set_health(&mut self, entity: HostEntity, health: f32) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.health = health;
        }
    }

    pub fn kill(&mut self, entity: HostEntity) {
        self.set_health(entity, 0.0);
    }

    pub fn mark(&mut self, entity: HostEntity, key: &str, value: PropertyValue) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.properties.insert(key.to_string(), value);
        }
    }

    /// Player leaves: entity и его формы исчезают.
    pub fn disconnect(&mut self, player: HostEntity) {
        self.entities.remove(&player);
    }

    pub fn place_block(&mut self, block: IVec3, kind: &str) {
        self.blocks.insert(block, kind.to_string());
    }

    pub fn clear_block(&mut self, block: IVec3) {
        self.blocks.remove(&block);
    }

    pub fn answer_form(&mut self, ticket: FormTicket, response: FormResponse) {
        if let Some(form) = self.forms.get_mut(&ticket) {
            form.answer = Some(response);
        }
    }

    pub fn open_forms(&self, player: HostEntity) -> Vec<FormTicket> {
        self.forms
            .iter()
            .filter(|(_, f)| f.player == player)
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn form_request(&self, ticket: FormTicket) -> Option<&FormRequest> {
        self.forms.get(&ticket).map(|f| &f.request)
    }

    pub fn health(&self, entity: HostEntity) -> Option<f32> {
        self.entities.get(&entity).map(|e| e.health)
    }

    pub fn location(&self, entity: HostEntity) -> Option<Vec3> {
        self.entities.get(&entity).map(|e| e.location)
    }

    /// Entity type id (`minecraft:player` для игроков).
    pub fn kind(&self, entity: HostEntity) -> Option<&str> {
        self.entities.get(&entity).map(|e| e.kind.as_str())
    }

    pub fn velocity(&self, entity: HostEntity) -> Option<Vec3> {
        self.entities.get(&entity).map(|e| e.velocity)
    }

    pub fn exists(&self, entity: HostEntity) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn cooldown(&self, player: HostEntity, category: &str) -> u32 {
        self.cooldowns
            .get(&(player, category.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn journal(&self) -> &[WorldEvent] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    pub fn count(&self, predicate: impl Fn(&WorldEvent) -> bool) -> usize {
        self.journal.iter().filter(|e| predicate(e)).count()
    }

    pub fn sounds(&self, sound: &str) -> usize {
        self.count(|e| matches!(e, WorldEvent::Sound { sound: s, .. } if s == sound))
    }

    /// Advance world clock (cooldowns тикают вниз).
    pub fn advance_tick(&mut self) {
        self.tick += 1;
        for ticks in self.cooldowns.values_mut() {
            *ticks = ticks.saturating_sub(1);
        }
    }

    /// Move owned entities (projectiles/beams) along their velocity and report
    /// the first collision of each one. Entities are not removed here.
    pub fn step_projectiles(&mut self) -> Vec<ProjectileImpact> {
        let moving: Vec<(HostEntity, Vec3, Vec3, Option<HostEntity>)> = self
            .entities
            .iter()
            .filter(|(_, e)| e.owner.is_some() && e.velocity != Vec3::ZERO)
            .map(|(id, e)| (*id, e.location, e.velocity, e.owner))
            .collect();

        let mut impacts = Vec::new();
        for (id, from, velocity, owner) in moving {
            let distance = velocity.length();
            let direction = velocity / distance;

            let block = self.raycast_block(from, direction, distance);
            let entity = self
                .raycast_entities(from, direction, distance)
                .into_iter()
                .find(|hit| Some(hit.entity) != owner && hit.entity != id);

            let impact = match (block, entity) {
                (Some(b), Some(e)) if e.distance < b.distance => Some(ProjectileImpact {
                    projectile: id,
                    target: ImpactTarget::Entity(e.entity),
                    location: e.point,
                }),
                (Some(b), _) => Some(ProjectileImpact {
                    projectile: id,
                    target: ImpactTarget::Block(b.block),
                    location: b.point,
                }),
                (None, Some(e)) => Some(ProjectileImpact {
                    projectile: id,
                    target: ImpactTarget::Entity(e.entity),
                    location: e.point,
                }),
                (None, None) => None,
            };

            if let Some(entity) = self.entities.get_mut(&id) {
                entity.location = impact.as_ref().map(|i| i.location).unwrap_or(from + velocity);
            }
            impacts.extend(impact);
        }
        impacts
    }

    fn cosmetic(&mut self, event: WorldEvent) -> Result<(), HostError> {
        if self.fail_cosmetics {
            return Err(HostError::Rejected("cosmetics disabled".to_string()));
        }
        self.journal.push(event);
        Ok(())
    }
}

/// Ray vs sphere: distance along the ray, if it passes within `radius`.
fn ray_sphere(origin: Vec3, direction: Vec3, max_distance: f32, center: Vec3, radius: f32) -> Option<f32> {
    let along = (center - origin).dot(direction);
    if along < 0.0 || along > max_distance + radius {
        return None;
    }
    let closest = origin + direction * along;
    if closest.distance(center) > radius {
        return None;
    }
    Some(along.min(max_distance))
}

impl ItemHost for SandboxWorld {
    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn players(&self) -> Vec<HostEntity> {
        self.entities
            .iter()
            .filter(|(_, e)| e.player.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    fn player_state(&self, player: HostEntity) -> Option<PlayerState> {
        let entity = self.entities.get(&player)?;
        let p = entity.player.as_ref()?;
        Some(PlayerState {
            location: entity.location,
            rotation: entity.rotation,
            velocity: entity.velocity,
            health: entity.health,
            on_ground: entity.on_ground,
            sneaking: p.sneaking,
            game_mode: p.game_mode,
            selected_slot: p.selected_slot,
        })
    }

    fn inventory_size(&self, player: HostEntity) -> usize {
        self.entities
            .get(&player)
            .and_then(|e| e.player.as_ref())
            .map(|p| p.inventory.len())
            .unwrap_or(0)
    }

    fn inventory_item(&self, player: HostEntity, slot: usize) -> Option<ItemSnapshot> {
        self.item(player, slot).cloned()
    }

    fn set_inventory_item(
        &mut self,
        player: HostEntity,
        slot: usize,
        item: Option<ItemSnapshot>,
    ) -> Result<(), HostError> {
        let p = self
            .player_mut(player)
            .ok_or(HostError::NoSuchEntity(player))?;
        let cell = p
            .inventory
            .get_mut(slot)
            .ok_or(HostError::SlotOutOfRange { slot })?;
        *cell = item.filter(|i| i.amount > 0);
        Ok(())
    }

    fn entity_alive(&self, entity: HostEntity) -> bool {
        self.entities.get(&entity).is_some_and(|e| e.health > 0.0)
    }

    fn entity_location(&self, entity: HostEntity) -> Option<Vec3> {
        self.location(entity)
    }

    fn entity_property(&self, entity: HostEntity, key: &str) -> Option<PropertyValue> {
        self.entities.get(&entity)?.properties.get(key).cloned()
    }

    fn set_entity_property(
        &mut self,
        entity: HostEntity,
        key: &str,
        value: Option<PropertyValue>,
    ) -> Result<(), HostError> {
        let e = self
            .entities
            .get_mut(&entity)
            .ok_or(HostError::NoSuchEntity(entity))?;
        match value {
            Some(v) => {
                e.properties.insert(key.to_string(), v);
            }
            None => {
                e.properties.remove(key);
            }
        }
        Ok(())
    }

    fn entities_near(&self, center: Vec3, radius: f32) -> Vec<HostEntity> {
        self.entities
            .iter()
            .filter(|(_, e)| e.is_hittable() && e.center().distance(center) <= radius)
            .map(|(id, _)| *id)
            .collect()
    }

    fn raycast_entities(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Vec<EntityHit> {
        let direction = direction.normalize_or_zero();
        let mut hits: Vec<EntityHit> = self
            .entities
            .iter()
            .filter(|(_, e)| e.is_hittable())
            .filter_map(|(id, e)| {
                let distance = ray_sphere(origin, direction, max_distance, e.center(), BODY_RADIUS)?;
                Some(EntityHit {
                    entity: *id,
                    distance,
                    point: origin + direction * distance,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn raycast_block(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<BlockHit> {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO || self.blocks.is_empty() {
            return None;
        }
        let mut travelled = 0.0;
        while travelled <= max_distance {
            let point = origin + direction * travelled;
            let block = point.floor().as_ivec3();
            if self.blocks.contains_key(&block) {
                return Some(BlockHit {
                    block,
                    distance: travelled,
                    point,
                });
            }
            travelled += BLOCK_STEP;
        }
        None
    }

    fn block_type(&self, block: IVec3) -> Option<String> {
        self.blocks.get(&block).cloned()
    }

    fn apply_damage(
        &mut self,
        target: HostEntity,
        amount: f32,
        cause: DamageCause,
        source: Option<HostEntity>,
    ) -> Result<bool, HostError> {
        let entity = self
            .entities
            .get_mut(&target)
            .ok_or(HostError::NoSuchEntity(target))?;
        if entity.health <= 0.0 {
            return Ok(false);
        }
        entity.health -= amount;
        let died = entity.health <= 0.0;
        let is_player = entity.player.is_some();

        self.journal.push(WorldEvent::Damage {
            target,
            amount,
            cause,
            source,
        });

        // Мобы деспавнятся сразу, игрок остаётся с health <= 0
        if died && !is_player {
            self.entities.remove(&target);
            self.journal.push(WorldEvent::Removed { entity: target });
        }
        Ok(true)
    }

    fn apply_impulse(&mut self, entity: HostEntity, impulse: Vec3) -> Result<(), HostError> {
        let e = self
            .entities
            .get_mut(&entity)
            .ok_or(HostError::NoSuchEntity(entity))?;
        e.velocity += impulse;
        self.journal.push(WorldEvent::Impulse { entity, impulse });
        Ok(())
    }

    fn apply_knockback(
        &mut self,
        entity: HostEntity,
        direction: Vec2,
        horizontal: f32,
        vertical: f32,
    ) -> Result<(), HostError> {
        let e = self
            .entities
            .get_mut(&entity)
            .ok_or(HostError::NoSuchEntity(entity))?;
        let flat = direction.normalize_or_zero() * horizontal;
        e.velocity = Vec3::new(flat.x, vertical, flat.y);
        self.journal.push(WorldEvent::Knockback {
            entity,
            direction,
            horizontal,
            vertical,
        });
        Ok(())
    }

    fn teleport(
        &mut self,
        entity: HostEntity,
        location: Vec3,
        rotation: Option<Vec2>,
    ) -> Result<(), HostError> {
        let e = self
            .entities
            .get_mut(&entity)
            .ok_or(HostError::NoSuchEntity(entity))?;
        e.location = location;
        e.velocity = Vec3::ZERO;
        if let Some(rotation) = rotation {
            e.rotation = rotation;
        }
        self.journal.push(WorldEvent::Teleport { entity, to: location });
        Ok(())
    }

    fn spawn_entity(
        &mut self,
        kind: &str,
        location: Vec3,
        velocity: Vec3,
        owner: Option<HostEntity>,
    ) -> Result<HostEntity, HostError> {
        let id = self.allocate();
        self.entities.insert(
            id,
            SandboxEntity {
                kind: kind.to_string(),
                location,
                rotation: Vec2::ZERO,
                velocity,
                health: 1.0,
                on_ground: false,
                owner,
                properties: BTreeMap::new(),
                player: None,
            },
        );
        self.journal.push(WorldEvent::Spawned {
            entity: id,
            kind: kind.to_string(),
        });
        Ok(id)
    }

    fn remove_entity(&mut self, entity: HostEntity) -> Result<(), HostError> {
        self.entities
            .remove(&entity)
            .ok_or(HostError::NoSuchEntity(entity))?;
        self.journal.push(WorldEvent::Removed { entity });
        Ok(())
    }

    fn play_sound(&mut self, sound: &str, location: Vec3) -> Result<(), HostError> {
        self.cosmetic(WorldEvent::Sound {
            sound: sound.to_string(),
            at: location,
        })
    }

    fn spawn_particle(&mut self, particle: &str, location: Vec3) -> Result<(), HostError> {
        self.cosmetic(WorldEvent::Particle {
            particle: particle.to_string(),
            at: location,
        })
    }

    fn camera_shake(&mut self, player: HostEntity, intensity: f32, _seconds: f32) -> Result<(), HostError> {
        if !self.entities.contains_key(&player) {
            return Err(HostError::NoSuchEntity(player));
        }
        self.cosmetic(WorldEvent::CameraShake { player, intensity })
    }

    fn show_status(&mut self, player: HostEntity, text: &str) -> Result<(), HostError> {
        if !self.entities.contains_key(&player) {
            return Err(HostError::NoSuchEntity(player));
        }
        self.cosmetic(WorldEvent::Status {
            player,
            text: text.to_string(),
        })
    }

    fn set_cooldown(&mut self, player: HostEntity, category: &str, ticks: u32) -> Result<(), HostError> {
        if !self.entities.contains_key(&player) {
            return Err(HostError::NoSuchEntity(player));
        }
        self.cooldowns.insert((player, category.to_string()), ticks);
        self.journal.push(WorldEvent::Cooldown {
            player,
            category: category.to_string(),
            ticks,
        });
        Ok(())
    }

    fn show_form(&mut self, player: HostEntity, form: FormRequest) -> Result<FormTicket, HostError> {
        if !self.entities.contains_key(&player) {
            return Err(HostError::NoSuchEntity(player));
        }
        self.next_form += 1;
        let ticket = FormTicket(self.next_form);
        self.forms.insert(
            ticket,
            SandboxForm {
                player,
                request: form,
                answer: None,
            },
        );
        self.journal.push(WorldEvent::FormShown { player, ticket });
        Ok(ticket)
    }

    fn poll_form(&mut self, ticket: FormTicket) -> FormPoll {
        let Some(form) = self.forms.get(&ticket) else {
            return FormPoll::Gone;
        };
        if !self.entities.contains_key(&form.player) {
            self.forms.remove(&ticket);
            return FormPoll::Gone;
        }
        match form.answer.clone() {
            Some(answer) => {
                self.forms.remove(&ticket);
                FormPoll::Ready(answer)
            }
            None => FormPoll::Pending,
        }
    }
}
