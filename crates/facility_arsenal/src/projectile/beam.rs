//! Beam delivery - мгновенный луч или короткоживущий видимый снаряд
//!
//! 1. Блок вплотную перед origin (`point_blank`) → resolve сразу, splash в точке блока
//! 2. Иначе spawn beam entity:
//!    - host collision → прямой урон (entity) или splash (block)
//!    - нет collision до `expires_at` → splash в последней позиции

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::{splash, ImpactResolution, ImpactTarget, ProjectileDispatch, ProjectileImpact};
use crate::error::ItemResult;
use crate::host::{DamageCause, HostEntity, ItemHost};

/// Beam tuning (part of weapon config).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeamTuning {
    /// Host entity kind for the visible beam
    pub kind: String,
    /// Blocks per tick
    pub speed: f32,
    pub point_blank: f32,
    pub damage: f32,
    pub splash_radius: f32,
    pub splash_damage: f32,
    pub lifetime_ticks: u32,
    pub impact_particle: String,
}

/// Beam request.
#[derive(Clone, Debug)]
pub struct BeamShot<'a> {
    pub shooter: HostEntity,
    pub origin: Vec3,
    pub direction: Vec3,
    pub tuning: &'a BeamTuning,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BeamOutcome {
    /// Resolved against a block right in front of the origin
    Immediate { block: IVec3, at: Vec3 },
    InFlight(HostEntity),
}

#[derive(Clone, Debug)]
pub(crate) struct BeamPayload {
    shooter: HostEntity,
    damage: f32,
    splash_radius: f32,
    splash_damage: f32,
    expires_at: u64,
    last_location: Vec3,
    impact_particle: String,
    resolved: bool,
}

impl ProjectileDispatch {
    pub fn fire_beam(&mut self, host: &mut dyn ItemHost, shot: BeamShot<'_>, tick: u64) -> ItemResult<BeamOutcome> {
        let direction = shot.direction.normalize_or_zero();
        let tuning = shot.tuning;

        if let Some(block) = host.raycast_block(shot.origin, direction, tuning.point_blank) {
            splash(
                host,
                shot.shooter,
                block.point,
                tuning.splash_radius,
                tuning.splash_damage,
                DamageCause::Beam,
            );
            let _ = host.spawn_particle(&tuning.impact_particle, block.point);
            return Ok(BeamOutcome::Immediate {
                block: block.block,
                at: block.point,
            });
        }

        let entity = host.spawn_entity(
            &tuning.kind,
            shot.origin,
            direction * tuning.speed,
            Some(shot.shooter),
        )?;
        self.beams.insert(
            entity,
            BeamPayload {
                shooter: shot.shooter,
                damage: tuning.damage,
                splash_radius: tuning.splash_radius,
                splash_damage: tuning.splash_damage,
                expires_at: tick + tuning.lifetime_ticks as u64,
                last_location: shot.origin,
                impact_particle: tuning.impact_particle.clone(),
                resolved: false,
            },
        );
        Ok(BeamOutcome::InFlight(entity))
    }

    pub(super) fn resolve_beam_impact(
        &mut self,
        host: &mut dyn ItemHost,
        impact: &ProjectileImpact,
    ) -> ImpactResolution {
        let Some(payload) = self.beams.get_mut(&impact.projectile) else {
            return ImpactResolution::Unknown;
        };
        if payload.resolved {
            return ImpactResolution::AlreadyResolved;
        }

        let resolution = match impact.target {
            ImpactTarget::Entity(target) if target == payload.shooter => {
                return ImpactResolution::Ignored;
            }
            ImpactTarget::Entity(target) => {
                payload.resolved = true;
                let _ = host.apply_damage(target, payload.damage, DamageCause::Beam, Some(payload.shooter));
                ImpactResolution::Hit {
                    target,
                    damage: payload.damage,
                    removed: false,
                }
            }
            ImpactTarget::Block(_) => {
                payload.resolved = true;
                splash(
                    host,
                    payload.shooter,
                    impact.location,
                    payload.splash_radius,
                    payload.splash_damage,
                    DamageCause::Beam,
                );
                ImpactResolution::Block { removed: false }
            }
        };
        let _ = host.spawn_particle(&payload.impact_particle, impact.location);

        let removed = host.remove_entity(impact.projectile).is_ok();
        if removed {
            self.beams.remove(&impact.projectile);
        }
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

    /// Timeout: beams without collision splash at their last location.
    pub fn expire_beams(&mut self, host: &mut dyn ItemHost, tick: u64) -> usize {
        // Host может убрать entity раньше таймаута - splash идёт по последней
        // известной позиции, а не по origin
        for (id, payload) in self.beams.iter_mut() {
            if let Some(location) = host.entity_location(*id) {
                payload.last_location = location;
            }
        }

        let due: Vec<HostEntity> = self
            .beams
            .iter()
            .filter(|(_, b)| b.resolved || tick >= b.expires_at)
            .map(|(id, _)| *id)
            .collect();

        for id in &due {
            let Some(payload) = self.beams.remove(id) else {
                continue;
            };
            let location = host.entity_location(*id).unwrap_or(payload.last_location);
            if !payload.resolved {
                splash(
                    host,
                    payload.shooter,
                    location,
                    payload.splash_radius,
                    payload.splash_damage,
                    DamageCause::Beam,
                );
                let _ = host.spawn_particle(&payload.impact_particle, location);
            }
            if host.entity_location(*id).is_some() {
                let _ = host.remove_entity(*id);
            }
        }
        due.len()
    }
}
