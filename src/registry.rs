//! Registry mapping game-type tags to trackers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::game::{GameInfo, GameType, Tracker};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown game type: {0}")]
    UnknownGame(String),
}

/// Thread-safe tracker lookup, keyed by game type.
///
/// Registration normally happens once at startup, but lookups from the
/// poller and command handlers may race a late registration; the map is
/// behind a reader/writer lock so that is safe.
pub struct Registry {
    trackers: RwLock<HashMap<GameType, Arc<dyn Tracker>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            trackers: RwLock::new(HashMap::new()),
        }
    }

    /// Add a tracker. A second registration for the same game replaces the
    /// first.
    pub fn register(&self, tracker: Arc<dyn Tracker>) {
        let mut trackers = self.trackers.write().unwrap_or_else(|e| e.into_inner());
        trackers.insert(tracker.game_type(), tracker);
    }

    /// Look up a tracker by its storage tag.
    pub fn get(&self, tag: &str) -> Result<Arc<dyn Tracker>, RegistryError> {
        let game: GameType = tag
            .parse()
            .map_err(|_| RegistryError::UnknownGame(tag.to_string()))?;
        let trackers = self.trackers.read().unwrap_or_else(|e| e.into_inner());
        trackers
            .get(&game)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownGame(tag.to_string()))
    }

    /// Display information for every registered game. Iteration order is not
    /// significant; callers must not depend on it.
    pub fn list(&self) -> Vec<GameInfo> {
        let trackers = self.trackers.read().unwrap_or_else(|e| e.into_inner());
        trackers
            .values()
            .map(|t| GameInfo {
                game_type: t.game_type(),
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
