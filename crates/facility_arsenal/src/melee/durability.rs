//! Durability ledger
//!
//! Урон по прочности копится в ledger, а не пишется на каждый удар:
//! - settle на Idle тике → одна запись предмета
//! - cost-exempt режим (creative/spectator) → ledger сбрасывается без записи

use crate::error::{ItemError, ItemResult};
use crate::host::{HostEntity, ItemHost};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Nothing,
    /// Cost-exempt game mode
    Discarded(u32),
    Written { cost: u32, exhausted: bool },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DurabilityLedger {
    pending: u32,
}

impl DurabilityLedger {
    pub fn add(&mut self, cost: u32) {
        self.pending = self.pending.saturating_add(cost);
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Write pending cost onto the item in `slot`; the ledger is zeroed either way.
    pub fn settle(
        &mut self,
        host: &mut dyn ItemHost,
        player: HostEntity,
        slot: usize,
        type_id: &str,
    ) -> ItemResult<Settlement> {
        if self.pending == 0 {
            return Ok(Settlement::Nothing);
        }
        let cost = std::mem::take(&mut self.pending);

        let state = host.player_state(player).ok_or(ItemError::PlayerGone(player))?;
        if state.game_mode.is_cost_exempt() {
            return Ok(Settlement::Discarded(cost));
        }

        let mut item = host
            .inventory_item(player, slot)
            .filter(|item| item.type_id == type_id)
            .ok_or_else(|| ItemError::StaleHandle(format!("{} left slot {}", type_id, slot)))?;
        let durability = item
            .durability
            .as_mut()
            .ok_or_else(|| ItemError::missing(type_id, "durability"))?;
        durability.damage = (durability.damage + cost).min(durability.max);
        let exhausted = durability.is_exhausted();

        host.set_inventory_item(player, slot, Some(item))?;
        Ok(Settlement::Written { cost, exhausted })
    }
}
