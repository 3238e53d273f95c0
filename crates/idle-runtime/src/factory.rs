//! Resource factories: the production ticker and the upgrade state machine.
//!
//! A factory is `Idle` or `Upgrading`. `begin_upgrade` moves it to
//! `Upgrading` under a factory-scoped mutex and arms a completion timer; the
//! timer bumps the level by exactly one, publishes the new parameters and
//! returns the factory to `Idle`. The production loop watches the published
//! parameters and rebuilds its ticker whenever they change.

use crate::error::EngineError;
use crate::lifecycle;
use crate::wallet::Wallet;
use chrono::{DateTime, Utc};
use idle_core::{Cost, LevelEntry, LevelTable, ResourceKind};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{info, trace, warn};

/// Wall-clock window of an in-flight upgrade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct UpgradeWindow {
    pub started_at: DateTime<Utc>,
    pub finishes_at: DateTime<Utc>,
}

/// Consistent copy of a factory's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FactoryStatus {
    pub kind: ResourceKind,
    pub level: u32,
    pub max_level: u32,
    pub params: LevelEntry,
    pub upgrade: Option<UpgradeWindow>,
}

impl FactoryStatus {
    pub fn is_upgrading(&self) -> bool {
        self.upgrade.is_some()
    }

    /// Cost of the next upgrade, `None` on the top level.
    pub fn next_upgrade_cost(&self) -> Option<Cost> {
        (self.level < self.max_level).then_some(self.params.upgrade_cost)
    }
}

#[derive(Debug)]
struct FactoryState {
    level: u32,
    params: LevelEntry,
    upgrade: Option<UpgradeWindow>,
}

#[derive(Debug)]
struct FactoryInner {
    kind: ResourceKind,
    table: Arc<LevelTable>,
    state: Mutex<FactoryState>,
    params: watch::Sender<LevelEntry>,
    shutdown: watch::Receiver<bool>,
}

/// Handle to one resource factory. Clones share the same factory.
#[derive(Clone, Debug)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

impl Factory {
    /// Create a level-1 factory; its tasks stop once `shutdown` fires.
    pub(crate) fn new(
        kind: ResourceKind,
        table: Arc<LevelTable>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, EngineError> {
        let params = *table
            .entry_for(kind, 1)
            .ok_or(EngineError::MissingLevel { resource: kind, level: 1 })?;
        let (tx, _) = watch::channel(params);
        Ok(Self {
            inner: Arc::new(FactoryInner {
                kind,
                table,
                state: Mutex::new(FactoryState {
                    level: 1,
                    params,
                    upgrade: None,
                }),
                params: tx,
                shutdown,
            }),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.kind
    }

    // The guarded state is never left half-updated, so a poisoned lock is still usable.
    fn state(&self) -> MutexGuard<'_, FactoryState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> FactoryStatus {
        let state = self.state();
        FactoryStatus {
            kind: self.inner.kind,
            level: state.level,
            max_level: self.inner.table.schedule(self.inner.kind).max_level(),
            params: state.params,
            upgrade: state.upgrade,
        }
    }

    /// Move from `Idle` to `Upgrading` and arm the completion timer.
    ///
    /// Only the flag transition is guarded here; paying for the upgrade is the
    /// caller's business. Must be called from within a tokio runtime.
    pub fn begin_upgrade(&self) -> Result<UpgradeWindow, EngineError> {
        let kind = self.inner.kind;
        let mut state = self.state();
        if state.upgrade.is_some() {
            return Err(EngineError::UpgradeInProgress(kind));
        }
        if self.inner.table.schedule(kind).is_top(state.level) {
            return Err(EngineError::MaxLevelReached {
                resource: kind,
                level: state.level,
            });
        }
        let duration = state.params.upgrade_duration;
        let started_at = Utc::now();
        let finishes_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| started_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let window = UpgradeWindow {
            started_at,
            finishes_at,
        };
        state.upgrade = Some(window);
        let level = state.level;
        drop(state);

        info!(resource = %kind, level, ?duration, "factory upgrade started");
        let factory = self.clone();
        let mut shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(duration) => factory.complete_upgrade(),
                _ = lifecycle::stopped(&mut shutdown) => {}
            }
        });
        Ok(window)
    }

    fn complete_upgrade(&self) {
        let kind = self.inner.kind;
        let mut state = self.state();
        let next = state.level + 1;
        match self.inner.table.entry_for(kind, next) {
            Some(entry) => {
                state.level = next;
                state.params = *entry;
            }
            None => warn!(resource = %kind, level = next, "no parameters for next level"),
        }
        state.upgrade = None;
        let (level, params) = (state.level, state.params);
        drop(state);
        self.inner.params.send_replace(params);
        info!(resource = %kind, level, amount = params.amount, "factory upgrade complete");
    }

    /// Spawn the production loop crediting `wallet` on every tick.
    ///
    /// Each ticker uses the parameters current when it was built; an upgrade
    /// completion replaces it with one running at the new level's rate.
    pub(crate) fn spawn_production(&self, wallet: Arc<Wallet>) -> JoinHandle<()> {
        let kind = self.inner.kind;
        let mut params = self.inner.params.subscribe();
        let mut shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let entry = *params.borrow_and_update();
                let mut ticker = interval_at(Instant::now() + entry.interval, entry.interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let balance = wallet.credit(entry.amount);
                            trace!(resource = %kind, amount = entry.amount, balance, "production tick");
                        }
                        changed = params.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            break;
                        }
                        _ = lifecycle::stopped(&mut shutdown) => return,
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;
    use std::time::Duration;

    fn iron(life: &Lifecycle) -> Factory {
        Factory::new(ResourceKind::Iron, Arc::new(LevelTable::default()), life.subscribe()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn second_begin_is_rejected_while_upgrading() {
        let life = Lifecycle::new();
        let f = iron(&life);
        let window = f.begin_upgrade().unwrap();
        assert_eq!(window.finishes_at - window.started_at, chrono::Duration::seconds(15));
        assert_eq!(f.begin_upgrade(), Err(EngineError::UpgradeInProgress(ResourceKind::Iron)));
        assert_eq!(f.begin_upgrade(), Err(EngineError::UpgradeInProgress(ResourceKind::Iron)));
        assert!(f.status().is_upgrading());

        sleep(Duration::from_millis(15_100)).await;
        let status = f.status();
        assert_eq!(status.level, 2);
        assert!(!status.is_upgrading());
        assert_eq!(status.params.amount, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn upgrade_does_not_finish_early() {
        let life = Lifecycle::new();
        let f = iron(&life);
        f.begin_upgrade().unwrap();
        sleep(Duration::from_millis(14_900)).await;
        assert_eq!(f.status().level, 1);
        assert!(f.status().is_upgrading());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_begins_yield_exactly_one_upgrade() {
        let life = Lifecycle::new();
        let f = iron(&life);
        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let f = f.clone();
                tokio::spawn(async move { f.begin_upgrade() })
            })
            .collect();
        let mut ok = 0;
        for a in attempts {
            match a.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e, EngineError::UpgradeInProgress(ResourceKind::Iron)),
            }
        }
        assert_eq!(ok, 1);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(f.status().level, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn levels_climb_one_at_a_time_until_top() {
        let life = Lifecycle::new();
        let f = iron(&life);
        let mut seen = vec![f.status().level];
        while f.status().next_upgrade_cost().is_some() {
            f.begin_upgrade().unwrap();
            sleep(Duration::from_secs(121)).await;
            seen.push(f.status().level);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            f.begin_upgrade(),
            Err(EngineError::MaxLevelReached {
                resource: ResourceKind::Iron,
                level: 5
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn production_credits_every_interval() {
        let life = Lifecycle::new();
        let f = iron(&life);
        let wallet = Arc::new(Wallet::new());
        let _task = f.spawn_production(Arc::clone(&wallet));
        sleep(Duration::from_millis(10_500)).await;
        assert_eq!(wallet.balance(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn production_switches_rate_after_upgrade() {
        let life = Lifecycle::new();
        let f = iron(&life);
        let wallet = Arc::new(Wallet::new());
        let _task = f.spawn_production(Arc::clone(&wallet));
        f.begin_upgrade().unwrap();
        sleep(Duration::from_millis(15_500)).await;
        assert_eq!(f.status().level, 2);
        let before = wallet.balance();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(wallet.balance() - before, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_production_and_pending_upgrade() {
        let life = Lifecycle::new();
        let f = iron(&life);
        let wallet = Arc::new(Wallet::new());
        let task = f.spawn_production(Arc::clone(&wallet));
        f.begin_upgrade().unwrap();
        sleep(Duration::from_millis(2_500)).await;
        life.stop();
        task.await.unwrap();
        let frozen = wallet.balance();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(wallet.balance(), frozen);
        assert_eq!(f.status().level, 1);
    }
}
