//! Error type for engine operations.

use idle_core::{ResourceKind, ValidationError};
use thiserror::Error;

/// Recoverable, per-request failures. None of them is fatal to the engine.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("player not found: {0}")]
    PlayerNotFound(String),
    #[error("player already registered: {0}")]
    PlayerAlreadyExists(String),
    #[error("player name must not be empty")]
    InvalidName,
    /// Balances must strictly exceed the cost; `resource` is the first one short.
    #[error("cannot upgrade {factory} factory: need more than {cost} {resource}, have {available}")]
    InsufficientResources {
        factory: ResourceKind,
        resource: ResourceKind,
        cost: i64,
        available: i64,
    },
    #[error("cannot upgrade {0} factory, another upgrade in progress")]
    UpgradeInProgress(ResourceKind),
    #[error("{resource} factory is already at top level {level}")]
    MaxLevelReached { resource: ResourceKind, level: u32 },
    /// The factory became busy after payment was taken; the payment was refunded.
    #[error("{0} factory upgrade was started concurrently, payment refunded")]
    UpgradeRaceLost(ResourceKind),
    #[error("{resource} schedule has no level {level}")]
    MissingLevel { resource: ResourceKind, level: u32 },
    #[error(transparent)]
    InvalidConfig(#[from] ValidationError),
}

impl EngineError {
    /// Whether repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientResources { .. }
                | EngineError::UpgradeInProgress(_)
                | EngineError::UpgradeRaceLost(_)
        )
    }
}
