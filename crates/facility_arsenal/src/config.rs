//! Arsenal configuration (RON)
//!
//! Все поля опциональны: отсутствующие берутся из `Default` (встроенные пресеты).
//!
//! ```ron
//! (
//!     tick_hz: 20.0,
//!     rng_seed: 7,
//!     fault_streak_limit: 3,
//! )
//! ```

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::ConfigError;
use crate::firearm::FirearmTuning;
use crate::melee::BladeTuning;

#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArsenalConfig {
    /// FixedUpdate rate (host tick rate)
    pub tick_hz: f64,
    pub rng_seed: u64,
    /// Consecutive recoverable failures before a session is faulted
    pub fault_streak_limit: u32,
    /// Firearm status text period (ticks, 0 = off)
    pub status_interval: u32,
    /// debug / info / warning / error
    pub log_level: String,
    pub firearms: Vec<FirearmTuning>,
    pub blades: Vec<BladeTuning>,
}

impl Default for ArsenalConfig {
    fn default() -> Self {
        Self {
            tick_hz: 20.0,
            rng_seed: 42,
            fault_streak_limit: 3,
            status_interval: 10,
            log_level: "info".to_string(),
            firearms: FirearmTuning::presets(),
            blades: BladeTuning::presets(),
        }
    }
}

fn invalid(item: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        item: item.to_string(),
        reason: reason.into(),
    }
}

impl ArsenalConfig {
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_hz > 0.0) {
            return Err(invalid("config", "tick_hz must be positive"));
        }
        if self.fault_streak_limit == 0 {
            return Err(invalid("config", "fault_streak_limit must be non-zero"));
        }
        if crate::logger::LogLevel::parse(&self.log_level).is_none() {
            return Err(invalid("config", format!("unknown log level `{}`", self.log_level)));
        }

        let mut seen = HashSet::new();
        for firearm in &self.firearms {
            firearm.validate()?;
            if !seen.insert(firearm.item_type_id.as_str()) {
                return Err(invalid(&firearm.item_type_id, "item type configured twice"));
            }
        }
        for blade in &self.blades {
            blade.validate()?;
            if !seen.insert(blade.item_type_id.as_str()) {
                return Err(invalid(&blade.item_type_id, "item type configured twice"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ArsenalConfig::default();
        config.validate().unwrap();
        assert_eq!(config.firearms.len(), 3);
        assert_eq!(config.blades.len(), 2);
    }

    #[test]
    fn test_partial_ron_keeps_presets() {
        let config = ArsenalConfig::from_ron_str("(tick_hz: 40.0, rng_seed: 7)").unwrap();
        assert_eq!(config.tick_hz, 40.0);
        assert_eq!(config.rng_seed, 7);
        assert_eq!(config.fault_streak_limit, 3);
        assert_eq!(config.firearms, FirearmTuning::presets());
    }

    #[test]
    fn test_round_trip_through_ron() {
        let config = ArsenalConfig::default();
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        assert_eq!(ArsenalConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_tuning_rejected() {
        let mut config = ArsenalConfig::default();
        config.firearms[0].tactical_reload.duration = 99;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_duplicate_item_rejected() {
        let mut config = ArsenalConfig::default();
        config.blades.push(BladeTuning::storm_katana());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            ArsenalConfig::from_ron_str("(tick_hz: \"fast\")"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ArsenalConfig::load("/nonexistent/arsenal.ron"),
            Err(ConfigError::Io(_))
        ));
    }
}
