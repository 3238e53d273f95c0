//! Players: three wallet/factory pairs and the upgrade payment protocol.

use crate::error::EngineError;
use crate::factory::{Factory, UpgradeWindow};
use crate::lifecycle::Lifecycle;
use crate::snapshot::{FactorySnapshot, PlayerSnapshot, PossessionSnapshot, UpgradeSnapshot};
use crate::wallet::Wallets;
use idle_core::{Cost, LevelTable, ResourceKind};
use idle_econ::{can_afford, time_to_afford, ProductionRate};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug)]
struct Factories {
    iron: Factory,
    copper: Factory,
    gold: Factory,
}

/// A registered player. Background tasks live exactly as long as the player:
/// they stop on [`Player::shutdown`] or when the player is dropped.
#[derive(Debug)]
pub struct Player {
    name: String,
    wallets: Wallets,
    factories: Factories,
    lifecycle: Lifecycle,
    upgrade_turn: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Player {
    /// Create the player and start its three production loops.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(name: impl Into<String>, table: Arc<LevelTable>) -> Result<Self, EngineError> {
        let lifecycle = Lifecycle::new();
        let factory = |kind| Factory::new(kind, Arc::clone(&table), lifecycle.subscribe());
        let factories = Factories {
            iron: factory(ResourceKind::Iron)?,
            copper: factory(ResourceKind::Copper)?,
            gold: factory(ResourceKind::Gold)?,
        };
        let player = Self {
            name: name.into(),
            wallets: Wallets::new(),
            factories,
            lifecycle,
            upgrade_turn: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(Vec::with_capacity(ResourceKind::ALL.len())),
        };
        let handles: Vec<_> = ResourceKind::ALL
            .into_iter()
            .map(|kind| {
                player
                    .factory(kind)
                    .spawn_production(Arc::clone(player.wallets.get(kind)))
            })
            .collect();
        player
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);
        Ok(player)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wallets(&self) -> &Wallets {
        &self.wallets
    }

    pub fn factory(&self, kind: ResourceKind) -> &Factory {
        match kind {
            ResourceKind::Iron => &self.factories.iron,
            ResourceKind::Copper => &self.factories.copper,
            ResourceKind::Gold => &self.factories.gold,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.lifecycle.is_stopped()
    }

    /// Signal every production loop and pending upgrade timer to stop.
    pub fn shutdown(&self) {
        self.lifecycle.stop();
    }

    /// Wait until the production loops have exited after [`Player::shutdown`].
    pub async fn join(&self) {
        let handles: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(err) = handle.await {
                debug!(player = %self.name, %err, "production task ended abnormally");
            }
        }
    }

    /// Pay for and start an upgrade of the `kind` factory.
    ///
    /// The affordability check, the debit and the state transition run as one
    /// turn per player, so two requests can never both spend the same balance.
    pub async fn request_upgrade(&self, kind: ResourceKind) -> Result<UpgradeWindow, EngineError> {
        let _turn = self.upgrade_turn.lock().await;
        let factory = self.factory(kind);
        let status = factory.status();
        if status.is_upgrading() {
            debug!(player = %self.name, resource = %kind, "upgrade rejected: busy");
            return Err(EngineError::UpgradeInProgress(kind));
        }
        let cost = status.next_upgrade_cost().ok_or(EngineError::MaxLevelReached {
            resource: kind,
            level: status.level,
        })?;
        let balances = self.wallets.balances();
        if !can_afford(&balances, &cost) {
            let short = ResourceKind::ALL
                .into_iter()
                .find(|&k| balances.get(k) <= cost.get(k))
                .unwrap_or(kind);
            debug!(player = %self.name, resource = %kind, ?balances, ?cost, "upgrade rejected: unaffordable");
            return Err(EngineError::InsufficientResources {
                factory: kind,
                resource: short,
                cost: cost.get(short),
                available: balances.get(short),
            });
        }
        // Widens the gap between the check and the debit under test.
        #[cfg(test)]
        tokio::task::yield_now().await;
        let window = pay_for_upgrade(&self.wallets, factory, cost)?;
        info!(player = %self.name, resource = %kind, level = status.level, ?cost, "upgrade paid");
        Ok(window)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let balances = self.wallets.balances();
        let statuses = ResourceKind::ALL.map(|k| self.factory(k).status());
        let rates = statuses.map(|s| ProductionRate {
            amount: s.params.amount,
            interval: s.params.interval,
        });
        let possession = |kind: ResourceKind| {
            let status = statuses[kind as usize];
            let next_upgrade_cost = status.next_upgrade_cost();
            // No new upgrade can start before the running one completes.
            let affordable_in_ms = next_upgrade_cost
                .filter(|_| !status.is_upgrading())
                .and_then(|cost| time_to_afford(&balances, &cost, &rates).ok().flatten())
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
            PossessionSnapshot {
                balance: balances.get(kind),
                factory: FactorySnapshot {
                    level: status.level,
                    production_amount: status.params.amount,
                    production_interval: status.params.interval,
                    upgrade: UpgradeSnapshot {
                        in_progress: status.is_upgrading(),
                        started_at: status.upgrade.map(|w| w.started_at),
                        finishes_at: status.upgrade.map(|w| w.finishes_at),
                    },
                    next_upgrade_cost,
                    affordable_in_ms,
                },
            }
        };
        PlayerSnapshot {
            name: self.name.clone(),
            iron: possession(ResourceKind::Iron),
            copper: possession(ResourceKind::Copper),
            gold: possession(ResourceKind::Gold),
        }
    }
}

/// Debit `cost` eagerly, then start the upgrade; refund if the factory turned
/// out to be busy already.
pub(crate) fn pay_for_upgrade(
    wallets: &Wallets,
    factory: &Factory,
    cost: Cost,
) -> Result<UpgradeWindow, EngineError> {
    let payment = wallets.reserve(cost);
    match factory.begin_upgrade() {
        Ok(window) => {
            payment.commit();
            Ok(window)
        }
        Err(EngineError::UpgradeInProgress(kind)) => {
            drop(payment);
            debug!(resource = %kind, "upgrade race lost, payment refunded");
            Err(EngineError::UpgradeRaceLost(kind))
        }
        Err(err) => Err(err),
    }
}
