//! Error types
//!
//! Таксономия:
//! - `ItemError` - ошибки callback'ов оружия (recoverable vs fatal для session)
//! - `HostError` - отказ host API (нет entity, слот вне диапазона, reject)
//! - `RegistryError` - повторная регистрация профиля
//! - `ConfigError` - чтение/парсинг/валидация RON конфига

use crate::host::HostEntity;
use thiserror::Error;

/// Error returned by the host boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("entity {0:?} does not exist")]
    NoSuchEntity(HostEntity),

    #[error("inventory slot {slot} is out of range")]
    SlotOutOfRange { slot: usize },

    #[error("host rejected the call: {0}")]
    Rejected(String),
}

/// Error raised from an `AdvancedItem` callback.
#[derive(Debug, Error)]
pub enum ItemError {
    /// Expected durability/ammo component missing (configuration defect).
    #[error("item `{item}` is missing its {component} component")]
    MissingComponent {
        item: String,
        component: &'static str,
    },

    /// Captured world handle no longer valid.
    #[error("stale handle: {0}")]
    StaleHandle(String),

    #[error("player {0:?} is no longer present")]
    PlayerGone(HostEntity),

    #[error("host call failed: {0}")]
    Host(#[from] HostError),

    #[error("invalid weapon state: {0}")]
    InvalidState(String),
}

impl ItemError {
    /// Recoverable errors skip the action for one tick; the session survives
    /// unless they repeat every tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ItemError::MissingComponent { .. } | ItemError::StaleHandle(_)
        )
    }

    pub fn missing(item: impl Into<String>, component: &'static str) -> Self {
        ItemError::MissingComponent {
            item: item.into(),
            component,
        }
    }
}

pub type ItemResult<T> = Result<T, ItemError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("weapon profile `{0}` is already registered")]
    Duplicate(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config RON: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("invalid tuning for `{item}`: {reason}")]
    Invalid { item: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(ItemError::missing("arsenal:carbine", "magazine").is_recoverable());
        assert!(ItemError::StaleHandle("slot 3".into()).is_recoverable());
        assert!(!ItemError::PlayerGone(HostEntity(7)).is_recoverable());
        assert!(!ItemError::Host(HostError::Rejected("nope".into())).is_recoverable());
    }

    #[test]
    fn test_messages() {
        let err = ItemError::missing("arsenal:storm_katana", "durability");
        assert_eq!(
            err.to_string(),
            "item `arsenal:storm_katana` is missing its durability component"
        );
        assert_eq!(
            RegistryError::Duplicate("x".into()).to_string(),
            "weapon profile `x` is already registered"
        );
    }
}
