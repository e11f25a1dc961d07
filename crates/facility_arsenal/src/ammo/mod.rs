//! Magazine / Ammo context
//!
//! Магазин - обычный предмет в инвентаре с durability компонентом:
//! - `expended` = durability damage (сколько патронов потрачено)
//! - `remaining = max - expended`
//!
//! Запись в host батчится: `consume`/`replenish` только помечают dirty,
//! `apply()` пишет предмет один раз. Контекст никогда не "чинится" - если слот
//! изменился снаружи, `is_valid` вернёт false и оружие сделает fresh resolve.
//!
//! Запасные патроны - stackable предметы `ammo_type` в любом слоте инвентаря.

use crate::error::{ItemError, ItemResult};
use crate::host::{HostEntity, ItemHost};

/// Resolved magazine in a player's inventory.
#[derive(Clone, Debug, PartialEq)]
pub struct MagazineContext {
    source_slot: usize,
    magazine_type: String,
    ammo_type: String,
    remaining: u32,
    expended: u32,
    max_capacity: u32,
    /// Durability damage как его видит host (последнее прочитанное/записанное)
    written: u32,
    dirty: bool,
}

impl MagazineContext {
    /// Scan the inventory for the first slot holding `magazine_type`.
    ///
    /// `Ok(None)` - магазина нет (status "no magazine").
    /// `Err(MissingComponent)` - предмет есть, но без durability (битый конфиг).
    pub fn resolve(
        host: &dyn ItemHost,
        player: HostEntity,
        magazine_type: &str,
        ammo_type: &str,
    ) -> ItemResult<Option<Self>> {
        let size = host.inventory_size(player);
        for slot in 0..size {
            let Some(item) = host.inventory_item(player, slot) else {
                continue;
            };
            if item.type_id != magazine_type {
                continue;
            }
            let durability = item
                .durability
                .ok_or_else(|| ItemError::missing(magazine_type, "durability"))?;
            let expended = durability.damage.min(durability.max);
            return Ok(Some(Self {
                source_slot: slot,
                magazine_type: magazine_type.to_string(),
                ammo_type: ammo_type.to_string(),
                remaining: durability.max - expended,
                expended,
                max_capacity: durability.max,
                written: durability.damage,
                dirty: false,
            }));
        }
        Ok(None)
    }

    pub fn slot(&self) -> usize {
        self.source_slot
    }

    pub fn magazine_type(&self) -> &str {
        &self.magazine_type
    }

    pub fn ammo_type(&self) -> &str {
        &self.ammo_type
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn expended(&self) -> u32 {
        self.expended
    }

    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    pub fn is_full(&self) -> bool {
        self.expended == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Spend up to `n` rounds. Returns how many were actually spent.
    pub fn consume(&mut self, n: u32) -> u32 {
        let spent = n.min(self.remaining);
        if spent == 0 {
            return 0;
        }
        self.remaining -= spent;
        self.expended += spent;
        self.dirty = true;
        spent
    }

    /// Load up to `n` rounds. Returns how many fit.
    pub fn replenish(&mut self, n: u32) -> u32 {
        let loaded = n.min(self.expended);
        if loaded == 0 {
            return 0;
        }
        self.remaining += loaded;
        self.expended -= loaded;
        self.dirty = true;
        loaded
    }

    /// Still the same magazine: same type in the slot, durability untouched
    /// since our last write.
    pub fn is_valid(&self, host: &dyn ItemHost, player: HostEntity) -> bool {
        let Some(item) = host.inventory_item(player, self.source_slot) else {
            return false;
        };
        item.type_id == self.magazine_type
            && item.durability.is_some_and(|d| d.damage == self.written)
    }

    /// Write pending changes to the host (one item write), clear dirty.
    pub fn apply(&mut self, host: &mut dyn ItemHost, player: HostEntity) -> ItemResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut item = host
            .inventory_item(player, self.source_slot)
            .filter(|item| item.type_id == self.magazine_type)
            .ok_or_else(|| {
                ItemError::StaleHandle(format!(
                    "magazine {} left slot {}",
                    self.magazine_type, self.source_slot
                ))
            })?;
        let durability = item
            .durability
            .as_mut()
            .ok_or_else(|| ItemError::missing(self.magazine_type.clone(), "durability"))?;
        durability.damage = self.expended;

        host.set_inventory_item(player, self.source_slot, Some(item))?;
        self.written = self.expended;
        self.dirty = false;
        Ok(())
    }

    /// Spare rounds for this magazine anywhere in the inventory.
    pub fn spare(&self, host: &dyn ItemHost, player: HostEntity) -> u32 {
        count_ammo(host, player, &self.ammo_type)
    }

    /// Move spare rounds into the magazine (up to capacity). Applies the write.
    pub fn load_from_inventory(&mut self, host: &mut dyn ItemHost, player: HostEntity) -> ItemResult<u32> {
        let wanted = self.expended;
        if wanted == 0 {
            return Ok(0);
        }
        let taken = take_ammo(host, player, &self.ammo_type, wanted)?;
        let loaded = self.replenish(taken);
        self.apply(host, player)?;
        Ok(loaded)
    }
}

/// Total rounds of `ammo_type` across all inventory stacks.
pub fn count_ammo(host: &dyn ItemHost, player: HostEntity, ammo_type: &str) -> u32 {
    (0..host.inventory_size(player))
        .filter_map(|slot| host.inventory_item(player, slot))
        .filter(|item| item.type_id == ammo_type)
        .map(|item| item.amount)
        .sum()
}

/// Remove up to `n` rounds from ammo stacks, lowest slot first.
/// Returns how many were removed.
pub fn take_ammo(host: &mut dyn ItemHost, player: HostEntity, ammo_type: &str, n: u32) -> ItemResult<u32> {
    let mut taken = 0;
    for slot in 0..host.inventory_size(player) {
        if taken == n {
            break;
        }
        let Some(mut stack) = host.inventory_item(player, slot) else {
            continue;
        };
        if stack.type_id != ammo_type {
            continue;
        }
        let grab = (n - taken).min(stack.amount);
        stack.amount -= grab;
        taken += grab;
        let remaining = (stack.amount > 0).then_some(stack);
        host.set_inventory_item(player, slot, remaining)?;
    }
    Ok(taken)
}
