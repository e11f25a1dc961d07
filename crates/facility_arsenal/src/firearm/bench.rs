//! Attachment bench - deferred form на sneak + swing
//!
//! Форма захватывает слот оружия как `WorldHandle::InventorySlot`
//! (type + edit stamp). Если к моменту ответа предмет переложили или
//! изменили - continuation abort'ится, ничего не пишем.
//!
//! На ответ: пишем attachment property и бампаем edit stamp →
//! session manager видит другой `ItemKey` и пересоздаёт instance,
//! новый instance читает attachments в конструкторе.

use crate::error::{ItemError, ItemResult};
use crate::forms::{FormContinuation, WorldHandle};
use crate::host::{FormRequest, HostEntity, ItemHost, ItemSnapshot, PropertyValue, EDIT_STAMP_KEY};
use crate::logger;

use super::tuning::FirearmTuning;
use super::{MUZZLE_KEY, SIGHT_KEY};

#[derive(Clone, Debug, PartialEq)]
struct BenchOption {
    property: &'static str,
    /// None = remove the attachment
    value: Option<String>,
    label: String,
}

/// Pending attachment edit for one firearm slot.
#[derive(Clone, Debug)]
pub struct AttachmentBench {
    player: HostEntity,
    slot: usize,
    type_id: String,
    edit_stamp: Option<i64>,
    weapon_name: String,
    options: Vec<BenchOption>,
}

impl AttachmentBench {
    pub fn new(player: HostEntity, slot: usize, item: &ItemSnapshot, tuning: &FirearmTuning) -> Self {
        let mut options = Vec::new();
        if !tuning.sights.is_empty() {
            options.push(BenchOption {
                property: SIGHT_KEY,
                value: None,
                label: "Remove sight".into(),
            });
            options.extend(tuning.sights.iter().map(|s| BenchOption {
                property: SIGHT_KEY,
                value: Some(s.id.clone()),
                label: format!("Sight: {}", s.label),
            }));
        }
        if !tuning.muzzles.is_empty() {
            options.push(BenchOption {
                property: MUZZLE_KEY,
                value: None,
                label: "Remove muzzle".into(),
            });
            options.extend(tuning.muzzles.iter().map(|m| BenchOption {
                property: MUZZLE_KEY,
                value: Some(m.id.clone()),
                label: format!("Muzzle: {}", m.label),
            }));
        }

        Self {
            player,
            slot,
            type_id: item.type_id.clone(),
            edit_stamp: item.edit_stamp(),
            weapon_name: tuning.name.clone(),
            options,
        }
    }

    pub fn has_options(&self) -> bool {
        !self.options.is_empty()
    }

    pub fn request(&self) -> FormRequest {
        FormRequest {
            title: format!("{}: attachments", self.weapon_name),
            body: "Choose a modification".into(),
            buttons: self.options.iter().map(|o| o.label.clone()).collect(),
        }
    }
}

impl FormContinuation for AttachmentBench {
    fn handles(&self) -> Vec<WorldHandle> {
        vec![
            WorldHandle::Entity(self.player),
            WorldHandle::InventorySlot {
                player: self.player,
                slot: self.slot,
                type_id: self.type_id.clone(),
                edit_stamp: self.edit_stamp,
            },
        ]
    }

    fn resume(self: Box<Self>, host: &mut dyn ItemHost, player: HostEntity, button: usize) -> ItemResult<()> {
        let option = self
            .options
            .get(button)
            .ok_or_else(|| ItemError::InvalidState(format!("bench button {} out of range", button)))?;
        let mut item = host
            .inventory_item(player, self.slot)
            .ok_or_else(|| ItemError::StaleHandle(format!("slot {} emptied", self.slot)))?;

        match &option.value {
            Some(value) => item.set_property(option.property, PropertyValue::Text(value.clone())),
            None => {
                item.properties.remove(option.property);
            }
        }
        // Stamp строго растёт, даже если тик не сменился
        let stamp = (host.current_tick() as i64).max(self.edit_stamp.map_or(0, |s| s + 1));
        item.set_property(EDIT_STAMP_KEY, PropertyValue::Number(stamp as f64));

        host.set_inventory_item(player, self.slot, Some(item))?;
        logger::log(&format!(
            "🔧 {:?}: {} → {} (stamp {})",
            player, self.weapon_name, option.label, stamp
        ));
        Ok(())
    }

    fn label(&self) -> &str {
        "attachment bench"
    }
}
