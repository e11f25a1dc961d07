//! Test rig: SandboxWorld + engine resources без Bevy App.

use bevy::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::ItemResult;
use crate::forms::PendingForms;
use crate::host::{HostEntity, ItemHost, ItemSnapshot, SandboxWorld};
use crate::item::{AdvancedItem, ItemBinding, ItemContext};
use crate::projectile::ProjectileDispatch;
use crate::session::EngineRefs;

pub(crate) struct Rig {
    pub world: SandboxWorld,
    pub rng: ChaCha8Rng,
    pub dispatch: ProjectileDispatch,
    pub forms: PendingForms,
    pub player: HostEntity,
}

impl Rig {
    pub fn new() -> Self {
        let mut world = SandboxWorld::new();
        let player = world.spawn_player(Vec3::ZERO);
        Self {
            world,
            rng: ChaCha8Rng::seed_from_u64(42),
            dispatch: ProjectileDispatch::new(),
            forms: PendingForms::default(),
            player,
        }
    }

    pub fn ctx(&mut self) -> ItemContext<'_> {
        let tick = self.world.current_tick();
        ItemContext {
            host: &mut self.world,
            rng: &mut self.rng,
            dispatch: &mut self.dispatch,
            forms: &mut self.forms,
            player: self.player,
            tick,
        }
    }

    pub fn engine(&mut self) -> EngineRefs<'_> {
        EngineRefs {
            host: &mut self.world,
            rng: &mut self.rng,
            dispatch: &mut self.dispatch,
            forms: &mut self.forms,
        }
    }

    pub fn give(&mut self, slot: usize, item: ItemSnapshot) {
        self.world.give(self.player, slot, item);
    }

    pub fn binding(&self, slot: u8) -> ItemBinding {
        let item = self
            .world
            .item(self.player, slot as usize)
            .cloned()
            .unwrap_or_else(|| ItemSnapshot::new("arsenal:missing"));
        ItemBinding::new(slot, item)
    }

    /// One tick of `item`, then the world clock advances.
    pub fn tick(&mut self, item: &mut dyn AdvancedItem) -> ItemResult<()> {
        let snapshot = self
            .world
            .selected_item(self.player)
            .unwrap_or_else(|| ItemSnapshot::new("minecraft:air"));
        let result = item.on_tick(&mut self.ctx(), &snapshot);
        self.world.advance_tick();
        result
    }

    pub fn ticks(&mut self, item: &mut dyn AdvancedItem, n: usize) {
        for _ in 0..n {
            self.tick(item).unwrap();
        }
    }
}
