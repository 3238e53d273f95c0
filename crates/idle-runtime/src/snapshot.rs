//! Read-only views handed to callers such as a dashboard endpoint.

use chrono::{DateTime, Utc};
use idle_core::{Cost, ResourceKind};
use serde::Serialize;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UpgradeSnapshot {
    pub in_progress: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finishes_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FactorySnapshot {
    pub level: u32,
    pub production_amount: i64,
    #[serde(rename = "production_interval_ms", with = "idle_core::duration_ms")]
    pub production_interval: Duration,
    pub upgrade: UpgradeSnapshot,
    /// `None` once the factory is at its top level.
    pub next_upgrade_cost: Option<Cost>,
    /// Estimated wait at current rates; `None` when never affordable or maxed out.
    pub affordable_in_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PossessionSnapshot {
    pub balance: i64,
    pub factory: FactorySnapshot,
}

/// Balances and factory state of one player at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub name: String,
    pub iron: PossessionSnapshot,
    pub copper: PossessionSnapshot,
    pub gold: PossessionSnapshot,
}

impl PlayerSnapshot {
    pub fn possession(&self, kind: ResourceKind) -> &PossessionSnapshot {
        match kind {
            ResourceKind::Iron => &self.iron,
            ResourceKind::Copper => &self.copper,
            ResourceKind::Gold => &self.gold,
        }
    }
}
