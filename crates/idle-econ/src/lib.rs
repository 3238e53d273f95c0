#![deny(warnings)]

//! Upgrade economics: affordability and cost helpers for the idle engine.
//!
//! This module provides pure utilities for:
//! - The strict affordability predicate used before every upgrade
//! - Resource shortfall and estimated time until an upgrade is affordable
//! - Cumulative cost of climbing several levels of a schedule

use idle_core::{Balances, Cost, LevelSchedule, ResourceKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors produced by economic helpers.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Production rates need a positive interval and a non-negative amount.
    #[error("invalid production rate for {0}")]
    InvalidRate(ResourceKind),
}

/// Steady production of one resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRate {
    pub amount: i64,
    #[serde(rename = "interval_ms", with = "idle_core::duration_ms")]
    pub interval: Duration,
}

/// True when every balance strictly exceeds the matching cost.
///
/// Exact balances do not qualify: `{300, 100, 1}` cannot pay `{300, 100, 1}`.
pub fn can_afford(balances: &Balances, cost: &Cost) -> bool {
    ResourceKind::ALL
        .iter()
        .all(|&k| balances.get(k) > cost.get(k))
}

/// Additional units of each resource needed before [`can_afford`] holds.
pub fn shortfall(balances: &Balances, cost: &Cost) -> Cost {
    let missing = |k: ResourceKind| {
        cost.get(k)
            .saturating_add(1)
            .saturating_sub(balances.get(k))
            .max(0)
    };
    Cost::new(
        missing(ResourceKind::Iron),
        missing(ResourceKind::Copper),
        missing(ResourceKind::Gold),
    )
}

/// Estimated wait until `cost` becomes affordable at the given rates.
///
/// `rates` is indexed in [`ResourceKind::ALL`] order. Returns `Some(ZERO)` when
/// already affordable and `None` when a missing resource is never produced.
/// Ticks are whole: a resource needing 25 units at 10 per second waits 3 s.
pub fn time_to_afford(
    balances: &Balances,
    cost: &Cost,
    rates: &[ProductionRate; 3],
) -> Result<Option<Duration>, EconError> {
    let missing = shortfall(balances, cost);
    let mut wait = Duration::ZERO;
    for (kind, rate) in ResourceKind::ALL.into_iter().zip(rates) {
        if rate.interval.is_zero() || rate.amount < 0 {
            return Err(EconError::InvalidRate(kind));
        }
        let need = missing.get(kind);
        if need == 0 {
            continue;
        }
        if rate.amount == 0 {
            return Ok(None);
        }
        let ticks = need / rate.amount + i64::from(need % rate.amount != 0);
        let ticks = match u32::try_from(ticks) {
            Ok(t) => t,
            Err(_) => return Ok(None),
        };
        match rate.interval.checked_mul(ticks) {
            Some(d) => wait = wait.max(d),
            None => return Ok(None),
        }
    }
    Ok(Some(wait))
}

/// Total price of upgrading from level `from` up to level `to`.
///
/// Returns `None` when either level lies outside the schedule or `to < from`.
pub fn cumulative_cost(schedule: &LevelSchedule, from: u32, to: u32) -> Option<Cost> {
    if from == 0 || to < from || to > schedule.max_level() {
        return None;
    }
    let climbed = schedule.entries().get(from as usize - 1..to as usize - 1)?;
    Some(climbed.iter().fold(Cost::ZERO, |total, e| total + e.upgrade_cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use idle_core::LevelTable;
    use proptest::prelude::*;

    fn per_sec(amount: i64) -> ProductionRate {
        ProductionRate {
            amount,
            interval: Duration::from_secs(1),
        }
    }

    #[test]
    fn exact_balances_cannot_afford() {
        let cost = Cost::new(300, 100, 1);
        assert!(!can_afford(&Balances::new(300, 100, 1), &cost));
        assert!(can_afford(&Balances::new(301, 101, 2), &cost));
        assert!(!can_afford(&Balances::new(301, 101, 1), &cost));
    }

    #[test]
    fn zero_cost_needs_positive_balances() {
        assert!(!can_afford(&Balances::new(0, 5, 5), &Cost::ZERO));
        assert!(can_afford(&Balances::new(1, 1, 1), &Cost::ZERO));
    }

    #[test]
    fn shortfall_counts_strict_margin() {
        let cost = Cost::new(300, 100, 1);
        assert_eq!(shortfall(&Balances::new(300, 50, 5), &cost), Cost::new(1, 51, 0));
        assert_eq!(shortfall(&Balances::new(301, 101, 2), &cost), Cost::ZERO);
    }

    #[test]
    fn time_to_afford_takes_slowest_resource() {
        let cost = Cost::new(300, 100, 1);
        let rates = [per_sec(10), per_sec(3), ProductionRate { amount: 2, interval: Duration::from_secs(60) }];
        let eta = time_to_afford(&Balances::new(0, 0, 0), &cost, &rates).unwrap();
        // iron needs 31 ticks, copper 34, gold 1 minute
        assert_eq!(eta, Some(Duration::from_secs(60)));
        let eta = time_to_afford(&Balances::new(0, 0, 5), &cost, &rates).unwrap();
        assert_eq!(eta, Some(Duration::from_secs(34)));
        let now = time_to_afford(&Balances::new(400, 400, 5), &cost, &rates).unwrap();
        assert_eq!(now, Some(Duration::ZERO));
    }

    #[test]
    fn time_to_afford_without_production() {
        let cost = Cost::new(10, 0, 0);
        let rates = [per_sec(0), per_sec(1), per_sec(1)];
        assert_eq!(time_to_afford(&Balances::new(0, 1, 1), &cost, &rates), Ok(None));
        let bad = [per_sec(1), ProductionRate { amount: 1, interval: Duration::ZERO }, per_sec(1)];
        assert_eq!(
            time_to_afford(&Balances::new(0, 1, 1), &cost, &bad),
            Err(EconError::InvalidRate(ResourceKind::Copper))
        );
    }

    #[test]
    fn cumulative_cost_over_builtin_iron() {
        let table = LevelTable::default();
        let iron = table.schedule(ResourceKind::Iron);
        assert_eq!(cumulative_cost(iron, 1, 1), Some(Cost::ZERO));
        assert_eq!(cumulative_cost(iron, 1, 3), Some(Cost::new(1100, 350, 3)));
        assert_eq!(cumulative_cost(iron, 1, 5), Some(Cost::new(5700, 1850, 15)));
        assert_eq!(cumulative_cost(iron, 0, 2), None);
        assert_eq!(cumulative_cost(iron, 3, 2), None);
        assert_eq!(cumulative_cost(iron, 1, 6), None);
    }

    #[test]
    fn huge_costs_do_not_overflow() {
        let cost = Cost::new(i64::MAX, 0, 0);
        let b = Balances::new(-5, 1, 1);
        assert_eq!(shortfall(&b, &cost), Cost::new(i64::MAX, 0, 0));
        let rates = [per_sec(i64::MAX), per_sec(1), per_sec(1)];
        assert_eq!(time_to_afford(&b, &cost, &rates), Ok(Some(Duration::from_secs(1))));
        let slow = [per_sec(1), per_sec(1), per_sec(1)];
        assert_eq!(time_to_afford(&b, &cost, &slow), Ok(None));
    }

    proptest! {
        #[test]
        fn affordable_iff_no_shortfall(i in 0i64..5_000, c in 0i64..5_000, g in 0i64..50,
                                       ci in 0i64..5_000, cc in 0i64..5_000, cg in 0i64..50) {
            let b = Balances::new(i, c, g);
            let cost = Cost::new(ci, cc, cg);
            prop_assert_eq!(can_afford(&b, &cost), shortfall(&b, &cost).is_zero());
        }

        #[test]
        fn waiting_the_estimate_makes_it_affordable(i in 0i64..2_000, c in 0i64..2_000, g in 0i64..20,
                                                    ri in 1i64..50, rc in 1i64..50, rg in 1i64..5) {
            let cost = Cost::new(800, 250, 2);
            let rates = [per_sec(ri), per_sec(rc), per_sec(rg)];
            let b = Balances::new(i, c, g);
            let eta = time_to_afford(&b, &cost, &rates).unwrap().unwrap();
            let secs = eta.as_secs() as i64;
            let later = Balances::new(i + secs * ri, c + secs * rc, g + secs * rg);
            prop_assert!(can_afford(&later, &cost));
        }
    }
}
