//! Built-in weapon profiles
//!
//! Каждая запись tuning-таблицы → один `WeaponProfile`. Tuning шарится между
//! instance'ами через `Arc`, factory только копирует указатель.

use std::sync::Arc;

use crate::config::ArsenalConfig;
use crate::error::RegistryError;
use crate::firearm::Firearm;
use crate::item::{AdvancedItem, ItemBinding, ItemContext, ProfileRegistry};
use crate::logger;
use crate::melee::ChargeBlade;

/// Register every firearm and blade from `config`.
pub fn register_arsenal(registry: &mut ProfileRegistry, config: &ArsenalConfig) -> Result<(), RegistryError> {
    for tuning in &config.firearms {
        let tuning = Arc::new(tuning.clone());
        let status_interval = config.status_interval;
        let id = tuning.item_type_id.clone();
        registry.register(id, move |binding: &ItemBinding, _ctx: &mut ItemContext| {
            Ok(Box::new(Firearm::new(binding, tuning.clone(), status_interval)) as Box<dyn AdvancedItem>)
        })?;
    }

    for tuning in &config.blades {
        let tuning = Arc::new(tuning.clone());
        let id = tuning.item_type_id.clone();
        registry.register(id, move |binding: &ItemBinding, _ctx: &mut ItemContext| {
            Ok(Box::new(ChargeBlade::new(binding, tuning.clone())) as Box<dyn AdvancedItem>)
        })?;
    }

    logger::log_info(&format!(
        "🗃️ Arsenal registered: {}",
        registry.ids().join(", ")
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ItemSnapshot;
    use crate::test_rig::Rig;

    #[test]
    fn test_registers_all_presets() {
        let mut registry = ProfileRegistry::default();
        register_arsenal(&mut registry, &ArsenalConfig::default()).unwrap();

        assert_eq!(
            registry.ids(),
            vec![
                "arsenal:breaker_greatsword",
                "arsenal:carbine",
                "arsenal:marksman_rifle",
                "arsenal:pulse_pistol",
                "arsenal:storm_katana",
            ]
        );
    }

    #[test]
    fn test_second_registration_fails() {
        let mut registry = ProfileRegistry::default();
        let config = ArsenalConfig::default();
        register_arsenal(&mut registry, &config).unwrap();
        assert!(matches!(
            register_arsenal(&mut registry, &config),
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[test]
    fn test_factory_builds_labelled_instance() {
        let mut registry = ProfileRegistry::default();
        register_arsenal(&mut registry, &ArsenalConfig::default()).unwrap();

        let mut rig = Rig::new();
        let binding = ItemBinding::new(0, ItemSnapshot::new("arsenal:storm_katana"));
        let instance = registry
            .get("arsenal:storm_katana")
            .unwrap()
            .create(&binding, &mut rig.ctx())
            .unwrap();
        assert_eq!(instance.label(), "Storm katana");
        assert_eq!(instance.key(), &binding.key);
    }
}
