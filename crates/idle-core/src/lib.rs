#![deny(warnings)]

//! Core domain models and invariants for the idle foundry engine.
//!
//! This crate defines the serializable types shared by the engine: resource
//! kinds, upgrade costs, per-level factory parameters and the engine
//! configuration, with validation helpers that guarantee the level tables are
//! well formed before any factory starts producing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::ops::Add;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// The three resources every player produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Iron, the bulk resource.
    Iron,
    /// Copper, the mid-tier resource.
    Copper,
    /// Gold, the scarce resource.
    Gold,
}

impl ResourceKind {
    /// All resource kinds in display order.
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Iron, ResourceKind::Copper, ResourceKind::Gold];

    /// Lowercase name used on the wire and in config files.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Iron => "iron",
            ResourceKind::Copper => "copper",
            ResourceKind::Gold => "gold",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iron" => Ok(ResourceKind::Iron),
            "copper" => Ok(ResourceKind::Copper),
            "gold" => Ok(ResourceKind::Gold),
            _ => Err(ValidationError::UnknownResource(s.to_string())),
        }
    }
}

/// Amount of each resource required to start an upgrade.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cost {
    pub iron: i64,
    pub copper: i64,
    pub gold: i64,
}

impl Cost {
    /// The zero cost; marks the top level of a schedule.
    pub const ZERO: Cost = Cost {
        iron: 0,
        copper: 0,
        gold: 0,
    };

    pub const fn new(iron: i64, copper: i64, gold: i64) -> Self {
        Self { iron, copper, gold }
    }

    pub fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Iron => self.iron,
            ResourceKind::Copper => self.copper,
            ResourceKind::Gold => self.gold,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Cost::ZERO
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost {
            iron: self.iron.saturating_add(rhs.iron),
            copper: self.copper.saturating_add(rhs.copper),
            gold: self.gold.saturating_add(rhs.gold),
        }
    }
}

/// Point-in-time view of a player's three balances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub iron: i64,
    pub copper: i64,
    pub gold: i64,
}

impl Balances {
    pub const fn new(iron: i64, copper: i64, gold: i64) -> Self {
        Self { iron, copper, gold }
    }

    pub fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Iron => self.iron,
            ResourceKind::Copper => self.copper,
            ResourceKind::Gold => self.gold,
        }
    }
}

/// Serde adapter storing a [`Duration`] as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Factory parameters for a single level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelEntry {
    /// Units credited to the wallet on every production tick (>= 0).
    pub amount: i64,
    /// Time between production ticks (> 0).
    #[serde(rename = "interval_ms", with = "duration_ms")]
    pub interval: Duration,
    /// How long an upgrade started at this level takes.
    #[serde(rename = "upgrade_duration_ms", with = "duration_ms")]
    pub upgrade_duration: Duration,
    /// Price of upgrading from this level to the next; zero on the top level.
    #[serde(default)]
    pub upgrade_cost: Cost,
}

/// Contiguous per-level parameters for one resource, starting at level 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelSchedule {
    entries: Vec<LevelEntry>,
}

impl LevelSchedule {
    pub fn new(entries: Vec<LevelEntry>) -> Self {
        Self { entries }
    }

    /// Parameters for `level`, or `None` outside `1..=max_level()`.
    pub fn entry(&self, level: u32) -> Option<&LevelEntry> {
        let idx = usize::try_from(level).ok()?.checked_sub(1)?;
        self.entries.get(idx)
    }

    pub fn max_level(&self) -> u32 {
        u32::try_from(self.entries.len()).unwrap_or(u32::MAX)
    }

    /// True when `level` cannot be upgraded any further.
    pub fn is_top(&self, level: u32) -> bool {
        level >= self.max_level()
    }

    pub fn entries(&self) -> &[LevelEntry] {
        &self.entries
    }
}

fn level(amount: i64, interval_secs: u64, upgrade_secs: u64, cost: Cost) -> LevelEntry {
    LevelEntry {
        amount,
        interval: Duration::from_secs(interval_secs),
        upgrade_duration: Duration::from_secs(upgrade_secs),
        upgrade_cost: cost,
    }
}

/// Level schedules for all three resources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelTable {
    pub iron: LevelSchedule,
    pub copper: LevelSchedule,
    pub gold: LevelSchedule,
}

impl Default for LevelTable {
    fn default() -> Self {
        Self {
            iron: LevelSchedule::new(vec![
                level(10, 1, 15, Cost::new(300, 100, 1)),
                level(20, 1, 30, Cost::new(800, 250, 2)),
                level(40, 1, 60, Cost::new(1600, 500, 4)),
                level(80, 1, 90, Cost::new(3000, 1000, 8)),
                level(150, 1, 120, Cost::ZERO),
            ]),
            copper: LevelSchedule::new(vec![
                level(3, 1, 15, Cost::new(200, 70, 0)),
                level(7, 1, 30, Cost::new(400, 150, 0)),
                level(14, 1, 60, Cost::new(800, 300, 0)),
                level(30, 1, 90, Cost::new(1600, 600, 0)),
                level(60, 1, 120, Cost::ZERO),
            ]),
            gold: LevelSchedule::new(vec![
                level(2, 60, 15, Cost::new(0, 100, 2)),
                level(3, 60, 30, Cost::new(0, 200, 4)),
                level(4, 60, 60, Cost::new(0, 400, 8)),
                level(6, 60, 90, Cost::new(0, 800, 16)),
                level(8, 60, 120, Cost::ZERO),
            ]),
        }
    }
}

impl LevelTable {
    pub fn schedule(&self, kind: ResourceKind) -> &LevelSchedule {
        match kind {
            ResourceKind::Iron => &self.iron,
            ResourceKind::Copper => &self.copper,
            ResourceKind::Gold => &self.gold,
        }
    }

    /// Lookup `level` for `kind`; levels outside the schedule yield `None`.
    pub fn entry_for(&self, kind: ResourceKind, level: u32) -> Option<&LevelEntry> {
        self.schedule(kind).entry(level)
    }

    /// Copy of the table with every interval and upgrade duration divided by
    /// `factor`, never shorter than one millisecond.
    pub fn accelerated(&self, factor: u32) -> LevelTable {
        let factor = factor.max(1);
        let speed_up = |d: Duration| (d / factor).max(Duration::from_millis(1));
        let scale = |s: &LevelSchedule| {
            LevelSchedule::new(
                s.entries
                    .iter()
                    .map(|e| LevelEntry {
                        interval: speed_up(e.interval),
                        upgrade_duration: speed_up(e.upgrade_duration),
                        ..*e
                    })
                    .collect(),
            )
        };
        LevelTable {
            iron: scale(&self.iron),
            copper: scale(&self.copper),
            gold: scale(&self.gold),
        }
    }
}

/// What the registry does when a name is registered twice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Refuse the second registration.
    #[default]
    Reject,
    /// Shut the existing player down and register a fresh one.
    Replace,
}

/// Engine configuration, usually loaded from YAML.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub on_duplicate: DuplicatePolicy,
    pub levels: LevelTable,
}

impl EngineConfig {
    /// Parse and validate a YAML document; omitted fields keep their defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = serde_yaml::from_str(text)?;
        validate_level_table(&cfg.levels)?;
        Ok(cfg)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        let cfg = Self::from_yaml_str(&text)?;
        info!(path = %path.as_ref().display(), on_duplicate = ?cfg.on_duplicate, "loaded engine config");
        Ok(cfg)
    }
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Resource name is not one of iron, copper or gold.
    #[error("unknown resource type: {0}")]
    UnknownResource(String),
    /// A schedule has no levels at all.
    #[error("{0} schedule has no levels")]
    EmptySchedule(ResourceKind),
    /// Production interval must be strictly positive.
    #[error("{kind} level {level}: production interval must be > 0")]
    NonPositiveInterval { kind: ResourceKind, level: u32 },
    /// Production amounts and costs must be non-negative.
    #[error("{kind} level {level}: negative amount or cost")]
    NegativeValue { kind: ResourceKind, level: u32 },
    /// The top level must carry the zero cost sentinel.
    #[error("{kind} level {level}: top level must have zero upgrade cost")]
    TopLevelCost { kind: ResourceKind, level: u32 },
}

/// Errors raised while loading an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid yaml: {0}")]
    Parse(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

/// Validate one resource schedule.
pub fn validate_schedule(kind: ResourceKind, schedule: &LevelSchedule) -> Result<(), ValidationError> {
    if schedule.entries.is_empty() {
        return Err(ValidationError::EmptySchedule(kind));
    }
    for (lvl, e) in (1u32..).zip(&schedule.entries) {
        if e.interval.is_zero() {
            return Err(ValidationError::NonPositiveInterval { kind, level: lvl });
        }
        let c = &e.upgrade_cost;
        if e.amount < 0 || c.iron < 0 || c.copper < 0 || c.gold < 0 {
            return Err(ValidationError::NegativeValue { kind, level: lvl });
        }
        if schedule.is_top(lvl) && !c.is_zero() {
            return Err(ValidationError::TopLevelCost { kind, level: lvl });
        }
    }
    Ok(())
}

/// Validate every schedule in the table.
pub fn validate_level_table(table: &LevelTable) -> Result<(), ValidationError> {
    for kind in ResourceKind::ALL {
        validate_schedule(kind, table.schedule(kind))?;
    }
    Ok(())
}
