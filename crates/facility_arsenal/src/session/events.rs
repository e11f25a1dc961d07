//! Session input events (Host → engine)
//!
//! # Flow
//! - Host adapter пишет `ItemInput` на каждое дискретное действие игрока
//! - `route_item_inputs` доставляет их текущему instance до `on_tick`
//! - `PlayerLeft` - немедленный teardown (disconnect)

use bevy::prelude::*;

use crate::host::HostEntity;

/// Discrete item action reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemInputKind {
    StartUse,
    StopUse,
    Swing,
    HitEntity(HostEntity),
    HitBlock(IVec3),
}

#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemInput {
    pub player: HostEntity,
    pub kind: ItemInputKind,
}

impl ItemInput {
    pub fn new(player: HostEntity, kind: ItemInputKind) -> Self {
        Self { player, kind }
    }
}

/// Player disconnected.
#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerLeft {
    pub player: HostEntity,
}
