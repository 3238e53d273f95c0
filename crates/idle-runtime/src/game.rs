//! The registry mapping player names to running players.

use crate::error::EngineError;
use crate::factory::UpgradeWindow;
use crate::player::Player;
use crate::snapshot::PlayerSnapshot;
use idle_core::{validate_level_table, DuplicatePolicy, EngineConfig, LevelTable, ResourceKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Entry point of the engine: registration, lookup and upgrade requests.
#[derive(Debug)]
pub struct Game {
    table: Arc<LevelTable>,
    on_duplicate: DuplicatePolicy,
    players: RwLock<HashMap<String, Arc<Player>>>,
}

impl Game {
    /// Build an engine from a configuration; the level table is validated first.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        validate_level_table(&config.levels)?;
        Ok(Self {
            table: Arc::new(config.levels),
            on_duplicate: config.on_duplicate,
            players: RwLock::new(HashMap::new()),
        })
    }

    pub fn levels(&self) -> &LevelTable {
        &self.table
    }

    /// Create a player and start its production loops.
    ///
    /// Surrounding whitespace is not part of a name; every method below
    /// treats `" alice "` and `"alice"` as the same player.
    pub async fn register(&self, name: &str) -> Result<(), EngineError> {
        let name = player_key(name);
        if name.is_empty() {
            return Err(EngineError::InvalidName);
        }
        let mut players = self.players.write().await;
        if players.contains_key(name) && self.on_duplicate == DuplicatePolicy::Reject {
            return Err(EngineError::PlayerAlreadyExists(name.to_string()));
        }
        let player = Arc::new(Player::start(name, Arc::clone(&self.table))?);
        if let Some(previous) = players.insert(name.to_string(), player) {
            previous.shutdown();
            warn!(player = %name, "replaced existing player");
        } else {
            info!(player = %name, "player registered");
        }
        Ok(())
    }

    /// Stop a player's tasks and forget it.
    pub async fn deregister(&self, name: &str) -> Result<(), EngineError> {
        let name = player_key(name);
        let removed = self.players.write().await.remove(name);
        let player = removed.ok_or_else(|| EngineError::PlayerNotFound(name.to_string()))?;
        player.shutdown();
        info!(player = %name, "player deregistered");
        Ok(())
    }

    pub async fn player(&self, name: &str) -> Result<Arc<Player>, EngineError> {
        let name = player_key(name);
        self.players
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::PlayerNotFound(name.to_string()))
    }

    pub async fn lookup(&self, name: &str) -> Result<PlayerSnapshot, EngineError> {
        Ok(self.player(name).await?.snapshot())
    }

    pub async fn request_upgrade(
        &self,
        name: &str,
        kind: ResourceKind,
    ) -> Result<UpgradeWindow, EngineError> {
        let player = self.player(name).await?;
        player.request_upgrade(kind).await
    }

    /// Registered names in sorted order.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.players.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop every player, e.g. when the host process is exiting.
    pub async fn shutdown(&self) {
        let players: Vec<_> = self.players.write().await.drain().map(|(_, p)| p).collect();
        for p in &players {
            p.shutdown();
        }
        for p in &players {
            p.join().await;
        }
        info!(count = players.len(), "engine stopped");
    }
}

fn player_key(name: &str) -> &str {
    name.trim()
}
