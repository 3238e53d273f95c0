//! Per-resource balances and the eager payment used by upgrades.

use idle_core::{Balances, Cost, ResourceKind};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A single balance. Every mutation is one atomic add, so production credits
/// and upgrade debits running on different tasks never lose an update.
#[derive(Debug, Default)]
pub struct Wallet {
    balance: AtomicI64,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> i64 {
        self.balance.load(Ordering::SeqCst)
    }

    /// Adds `amount` and returns the new balance.
    pub fn credit(&self, amount: i64) -> i64 {
        self.balance.fetch_add(amount, Ordering::SeqCst) + amount
    }

    /// Subtracts `amount` and returns the new balance.
    pub fn debit(&self, amount: i64) -> i64 {
        self.balance.fetch_sub(amount, Ordering::SeqCst) - amount
    }
}

/// The iron, copper and gold wallets of one player.
#[derive(Debug, Default)]
pub struct Wallets {
    iron: Arc<Wallet>,
    copper: Arc<Wallet>,
    gold: Arc<Wallet>,
}

impl Wallets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ResourceKind) -> &Arc<Wallet> {
        match kind {
            ResourceKind::Iron => &self.iron,
            ResourceKind::Copper => &self.copper,
            ResourceKind::Gold => &self.gold,
        }
    }

    pub fn balances(&self) -> Balances {
        Balances::new(self.iron.balance(), self.copper.balance(), self.gold.balance())
    }

    /// Debit `cost` from all three wallets right away.
    ///
    /// The debit only becomes final through [`Reservation::commit`]; dropping
    /// the reservation credits the exact amounts back.
    pub fn reserve(&self, cost: Cost) -> Reservation<'_> {
        for kind in ResourceKind::ALL {
            self.get(kind).debit(cost.get(kind));
        }
        Reservation {
            wallets: self,
            cost,
            committed: false,
        }
    }
}

/// Payment taken ahead of an upgrade that has not been confirmed yet.
#[must_use = "dropping a reservation refunds it"]
#[derive(Debug)]
pub struct Reservation<'a> {
    wallets: &'a Wallets,
    cost: Cost,
    committed: bool,
}

impl Reservation<'_> {
    pub fn cost(&self) -> Cost {
        self.cost
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for kind in ResourceKind::ALL {
            self.wallets.get(kind).credit(self.cost.get(kind));
        }
        debug!(cost = ?self.cost, "refunded uncommitted upgrade payment");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_and_debit_return_new_balance() {
        let w = Wallet::new();
        assert_eq!(w.credit(10), 10);
        assert_eq!(w.debit(4), 6);
        assert_eq!(w.balance(), 6);
    }

    #[test]
    fn dropped_reservation_restores_balances() {
        let wallets = Wallets::new();
        wallets.get(ResourceKind::Iron).credit(500);
        wallets.get(ResourceKind::Copper).credit(200);
        wallets.get(ResourceKind::Gold).credit(3);
        let before = wallets.balances();
        {
            let r = wallets.reserve(Cost::new(300, 100, 1));
            assert_eq!(r.cost(), Cost::new(300, 100, 1));
            assert_eq!(wallets.balances(), Balances::new(200, 100, 2));
        }
        assert_eq!(wallets.balances(), before);
    }

    #[test]
    fn committed_reservation_is_final() {
        let wallets = Wallets::new();
        wallets.get(ResourceKind::Iron).credit(500);
        wallets.get(ResourceKind::Copper).credit(200);
        wallets.get(ResourceKind::Gold).credit(3);
        wallets.reserve(Cost::new(300, 100, 1)).commit();
        assert_eq!(wallets.balances(), Balances::new(200, 100, 2));
    }

    #[test]
    fn concurrent_credits_are_not_lost() {
        let wallet = Arc::new(Wallet::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let w = Arc::clone(&wallet);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        w.credit(3);
                        w.debit(1);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(wallet.balance(), 8 * 1_000 * 2);
    }
}
