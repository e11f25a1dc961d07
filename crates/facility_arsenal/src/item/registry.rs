//! WeaponProfile registry
//!
//! Статический mapping `item_type_id → factory`. Регистрация один раз при
//! старте (см. `content.rs`), повторная регистрация - ошибка.

use bevy::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use super::{AdvancedItem, ItemContext, ItemKey};
use crate::error::{ItemResult, RegistryError};
use crate::host::ItemSnapshot;

/// What the factory receives: the wielded item and its identity.
#[derive(Clone, Debug)]
pub struct ItemBinding {
    pub key: ItemKey,
    pub snapshot: ItemSnapshot,
}

impl ItemBinding {
    pub fn new(slot: u8, snapshot: ItemSnapshot) -> Self {
        Self {
            key: ItemKey::of(slot, &snapshot),
            snapshot,
        }
    }
}

pub type ItemFactory =
    Arc<dyn Fn(&ItemBinding, &mut ItemContext) -> ItemResult<Box<dyn AdvancedItem>> + Send + Sync>;

/// Immutable profile: item type → instance factory.
#[derive(Clone)]
pub struct WeaponProfile {
    pub item_type_id: String,
    pub factory: ItemFactory,
}

impl WeaponProfile {
    pub fn create(&self, binding: &ItemBinding, ctx: &mut ItemContext) -> ItemResult<Box<dyn AdvancedItem>> {
        (self.factory)(binding, ctx)
    }
}

impl std::fmt::Debug for WeaponProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeaponProfile")
            .field("item_type_id", &self.item_type_id)
            .finish_non_exhaustive()
    }
}

/// Resource: all registered profiles.
#[derive(Resource, Default, Debug)]
pub struct ProfileRegistry {
    profiles: HashMap<String, WeaponProfile>,
}

impl ProfileRegistry {
    pub fn register<F>(&mut self, item_type_id: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&ItemBinding, &mut ItemContext) -> ItemResult<Box<dyn AdvancedItem>> + Send + Sync + 'static,
    {
        let item_type_id = item_type_id.into();
        if self.profiles.contains_key(&item_type_id) {
            return Err(RegistryError::Duplicate(item_type_id));
        }
        self.profiles.insert(
            item_type_id.clone(),
            WeaponProfile {
                item_type_id,
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    pub fn get(&self, item_type_id: &str) -> Option<&WeaponProfile> {
        self.profiles.get(item_type_id)
    }

    pub fn contains(&self, item_type_id: &str) -> bool {
        self.profiles.contains_key(item_type_id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Sorted ids (для логов)
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ItemError;

    fn refuse(_: &ItemBinding, _: &mut ItemContext) -> ItemResult<Box<dyn AdvancedItem>> {
        Err(ItemError::InvalidState("test factory".into()))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ProfileRegistry::default();
        registry.register("arsenal:carbine", refuse).unwrap();

        assert!(registry.contains("arsenal:carbine"));
        assert_eq!(registry.get("arsenal:carbine").unwrap().item_type_id, "arsenal:carbine");
        assert!(registry.get("arsenal:unknown").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ProfileRegistry::default();
        registry.register("arsenal:carbine", refuse).unwrap();

        assert_eq!(
            registry.register("arsenal:carbine", refuse),
            Err(RegistryError::Duplicate("arsenal:carbine".into()))
        );
        assert_eq!(registry.len(), 1);
    }
}
