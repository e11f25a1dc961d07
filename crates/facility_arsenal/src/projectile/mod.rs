//! Projectile / Beam dispatch
//!
//! # Architecture
//! - Host владеет физикой снаряда (spawn, полёт, collision detection)
//! - Dispatch хранит payload по transient id снаряда: shooter, damage model, hits budget
//! - Host сообщает `ProjectileImpact` → `resolve_impact` применяет урон ровно один раз
//!
//! Beam (см. `beam.rs`) - мгновенный или короткоживущий луч с splash по таймауту.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ItemResult;
use crate::host::{DamageCause, HostEntity, ItemHost};

pub mod beam;

pub use beam::{BeamOutcome, BeamShot, BeamTuning};

/// Снаряд без collision за это время считается потерянным (host его уже убрал).
pub const PROJECTILE_MAX_AGE_TICKS: u64 = 200;

/// Event: host reported a projectile/beam collision (Host → engine).
#[derive(Event, Clone, Debug, PartialEq)]
pub struct ProjectileImpact {
    pub projectile: HostEntity,
    pub target: ImpactTarget,
    pub location: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImpactTarget {
    Entity(HostEntity),
    Block(IVec3),
}

/// Damage as a function of travelled distance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DamageModel {
    Flat(f32),
    /// Full `base` up to `start` blocks, then minus `per_block`, never below `floor`
    Falloff {
        base: f32,
        start: f32,
        per_block: f32,
        floor: f32,
    },
}

impl DamageModel {
    pub fn at_distance(&self, distance: f32) -> f32 {
        match *self {
            DamageModel::Flat(damage) => damage,
            DamageModel::Falloff {
                base,
                start,
                per_block,
                floor,
            } => {
                let beyond = (distance - start).max(0.0);
                (base - beyond * per_block).max(floor)
            }
        }
    }
}

/// Physical projectile request.
#[derive(Clone, Debug)]
pub struct ProjectileShot {
    pub shooter: HostEntity,
    pub kind: String,
    pub origin: Vec3,
    pub velocity: Vec3,
    pub damage: DamageModel,
    /// How many entities the projectile may pass through (1 = stops at first)
    pub pierce: u32,
}

#[derive(Clone, Debug)]
struct ProjectilePayload {
    shooter: HostEntity,
    origin: Vec3,
    damage: DamageModel,
    hits_left: u32,
    struck: Vec<HostEntity>,
    resolved: bool,
    spawned_tick: u64,
}

/// Outcome of one reported collision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImpactResolution {
    /// Not a tracked projectile (foreign entity or already cleaned up)
    Unknown,
    /// Marker already set: impact ignored
    AlreadyResolved,
    /// Collision with the shooter or an entity this projectile already struck
    Ignored,
    Hit {
        target: HostEntity,
        damage: f32,
        removed: bool,
    },
    Block {
        removed: bool,
    },
}

/// Resource: payloads of all in-flight projectiles and beams.
#[derive(Resource, Default)]
pub struct ProjectileDispatch {
    projectiles: BTreeMap<HostEntity, ProjectilePayload>,
    beams: BTreeMap<HostEntity, beam::BeamPayload>,
}

impl ProjectileDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.projectiles.len() + self.beams.len()
    }

    pub fn is_tracked(&self, entity: HostEntity) -> bool {
        self.projectiles.contains_key(&entity) || self.beams.contains_key(&entity)
    }

    /// Spawn a physical projectile and attach its payload.
    pub fn fire_projectile(
        &mut self,
        host: &mut dyn ItemHost,
        shot: ProjectileShot,
        tick: u64,
    ) -> ItemResult<HostEntity> {
        let entity = host.spawn_entity(&shot.kind, shot.origin, shot.velocity, Some(shot.shooter))?;
        self.projectiles.insert(
            entity,
            ProjectilePayload {
                shooter: shot.shooter,
                origin: shot.origin,
                damage: shot.damage,
                hits_left: shot.pierce.max(1),
                struck: Vec::new(),
                resolved: false,
                spawned_tick: tick,
            },
        );
        Ok(entity)
    }

    /// Resolve a host-reported collision exactly once.
    pub fn resolve_impact(&mut self, host: &mut dyn ItemHost, impact: &ProjectileImpact) -> ImpactResolution {
        if self.beams.contains_key(&impact.projectile) {
            return self.resolve_beam_impact(host, impact);
        }

        let Some(payload) = self.projectiles.get_mut(&impact.projectile) else {
            return ImpactResolution::Unknown;
        };
        if payload.resolved {
            return ImpactResolution::AlreadyResolved;
        }

        let resolution = match impact.target {
            ImpactTarget::Block(_) => {
                payload.resolved = true;
                ImpactResolution::Block { removed: false }
            }
            ImpactTarget::Entity(target) => {
                if target == payload.shooter || payload.struck.contains(&target) {
                    return ImpactResolution::Ignored;
                }
                let damage = payload
                    .damage
                    .at_distance(payload.origin.distance(impact.location));
                payload.struck.push(target);
                payload.hits_left = payload.hits_left.saturating_sub(1);
                if payload.hits_left == 0 {
                    payload.resolved = true;
                }
                if let Err(err) = host.apply_damage(target, damage, DamageCause::Projectile, Some(payload.shooter)) {
                    crate::logger::log(&format!(
                        "⚠️ Projectile {:?}: damage to {:?} failed: {}",
                        impact.projectile, target, err
                    ));
                }
                ImpactResolution::Hit {
                    target,
                    damage,
                    removed: false,
                }
            }
        };

        let resolved = payload.resolved;
        let removed = resolved && self.retire_projectile(host, impact.projectile);
        match resolution {
            ImpactResolution::Hit { target, damage, .. } => ImpactResolution::Hit {
                target,
                damage,
                removed,
            },
            ImpactResolution::Block { .. } => ImpactResolution::Block { removed },
            other => other,
        }
    }

    /// Remove the host entity; payload stays (marked) if the host refuses.
    fn retire_projectile(&mut self, host: &mut dyn ItemHost, projectile: HostEntity) -> bool {
        match host.remove_entity(projectile) {
            Ok(()) => {
                self.projectiles.remove(&projectile);
                true
            }
            Err(err) => {
                crate::logger::log(&format!(
                    "⚠️ Projectile {:?} resolved but not removed: {}",
                    projectile, err
                ));
                false
            }
        }
    }

    /// Per-tick maintenance: beam timeouts (splash) and lost projectiles.
    pub fn sweep(&mut self, host: &mut dyn ItemHost, tick: u64) -> usize {
        let expired_beams = self.expire_beams(host, tick);

        let stale: Vec<HostEntity> = self
            .projectiles
            .iter()
            .filter(|(id, p)| {
                tick.saturating_sub(p.spawned_tick) > PROJECTILE_MAX_AGE_TICKS
                    || (p.resolved && host.entity_location(**id).is_none())
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.projectiles.remove(id);
            if host.entity_location(*id).is_some() {
                let _ = host.remove_entity(*id);
            }
        }

        expired_beams + stale.len()
    }
}

/// Apply splash damage around `center`, scaled by distance (min 25%).
pub fn splash(
    host: &mut dyn ItemHost,
    shooter: HostEntity,
    center: Vec3,
    radius: f32,
    damage: f32,
    cause: DamageCause,
) -> usize {
    if radius <= 0.0 || damage <= 0.0 {
        return 0;
    }
    let mut applied = 0;
    for target in host.entities_near(center, radius) {
        if target == shooter {
            continue;
        }
        let distance = host
            .entity_location(target)
            .map(|l| l.distance(center))
            .unwrap_or(radius);
        let scale = (1.0 - distance / radius).max(0.25);
        if let Ok(true) = host.apply_damage(target, damage * scale, cause, Some(shooter)) {
            applied += 1;
        }
    }
    applied
}

/// Entities along a ray (nearest first), stopping at the first solid block.
pub fn ray_targets(
    host: &dyn ItemHost,
    origin: Vec3,
    direction: Vec3,
    range: f32,
    exclude: HostEntity,
) -> Vec<HostEntity> {
    let wall = host
        .raycast_block(origin, direction, range)
        .map(|b| b.distance)
        .unwrap_or(f32::MAX);
    host.raycast_entities(origin, direction, range)
        .into_iter()
        .filter(|hit| hit.entity != exclude && hit.distance < wall)
        .map(|hit| hit.entity)
        .collect()
}
