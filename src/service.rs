//! Platform-agnostic subscription command flows.
//!
//! The chat layer (slash commands, interactions) lives outside this crate;
//! it calls these flows and translates the typed outcomes into user-facing
//! text. Dedup rules: a player already tracked for a game is reused, and a
//! guild subscribes to a player at most once.

use std::sync::Arc;

use thiserror::Error;

use crate::game::{GameInfo, TrackerError};
use crate::registry::{Registry, RegistryError};
use crate::storage::{NewPlayer, Repository, StoreError, TrackedPlayer};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    UnknownGame(#[from] RegistryError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a registration request.
#[derive(Debug)]
pub enum RegisterOutcome {
    /// The guild now tracks this player.
    Registered(TrackedPlayer),
    /// This guild was already subscribed to this player.
    AlreadySubscribed(TrackedPlayer),
}

/// Result of an unregistration request.
#[derive(Debug, PartialEq, Eq)]
pub enum UnregisterOutcome {
    Unsubscribed,
    /// The player is tracked, but not by this guild.
    NotSubscribed,
    /// No such player is tracked for this game at all.
    NotRegistered,
}

pub struct SubscriptionService {
    repo: Arc<dyn Repository>,
    registry: Arc<Registry>,
}

impl SubscriptionService {
    pub fn new(repo: Arc<dyn Repository>, registry: Arc<Registry>) -> Self {
        Self { repo, registry }
    }

    /// Track a player for a guild.
    ///
    /// Validates the identifier, resolves it upstream, reuses an existing
    /// player row when present (creating one with a best-effort baseline
    /// state otherwise), and adds the guild subscription.
    pub async fn register(
        &self,
        game_tag: &str,
        player_input: &str,
        guild_id: &str,
        requested_by: &str,
    ) -> Result<RegisterOutcome, CommandError> {
        let tracker = self.registry.get(game_tag)?;
        tracker.validate_player_id(player_input)?;
        let info = tracker.resolve_player(player_input).await?;

        let game = info.game_type.as_str();
        let player = match self.repo.find_player(&info.external_id, game).await? {
            Some(existing) => existing,
            None => {
                // Baseline the current state at registration so the first
                // poll does not replay the player's existing history. A
                // fetch failure here is fine: the poller stores the baseline
                // on first observation instead.
                let last_state = match tracker.current_state(&info.external_id).await {
                    Ok(state) => state,
                    Err(e) => {
                        log::warn!("no initial state for {}: {e}", info.display_name);
                        String::new()
                    }
                };
                self.repo
                    .create_player(NewPlayer {
                        external_id: info.external_id.clone(),
                        display_name: info.display_name.clone(),
                        game: game.to_string(),
                        last_state,
                    })
                    .await?
            }
        };

        let added = self
            .repo
            .add_subscription(player.id, guild_id, requested_by)
            .await?;
        if added {
            Ok(RegisterOutcome::Registered(player))
        } else {
            Ok(RegisterOutcome::AlreadySubscribed(player))
        }
    }

    /// Stop tracking a player for a guild. The player row itself is left in
    /// place; pruning rows with no remaining subscriptions is a persistence
    /// concern outside this flow.
    pub async fn unregister(
        &self,
        game_tag: &str,
        player_input: &str,
        guild_id: &str,
    ) -> Result<UnregisterOutcome, CommandError> {
        let tracker = self.registry.get(game_tag)?;
        tracker.validate_player_id(player_input)?;

        let game = tracker.game_type().as_str();
        let Some(player) = self
            .repo
            .find_player_by_name(player_input.trim(), game)
            .await?
        else {
            return Ok(UnregisterOutcome::NotRegistered);
        };

        if self.repo.remove_subscription(player.id, guild_id).await? {
            Ok(UnregisterOutcome::Unsubscribed)
        } else {
            Ok(UnregisterOutcome::NotSubscribed)
        }
    }

    /// Choose the channel that receives this guild's notifications.
    pub async fn set_notification_channel(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<(), CommandError> {
        self.repo.upsert_guild_settings(guild_id, channel_id).await?;
        Ok(())
    }

    /// Players tracked by a guild.
    pub async fn players_in_guild(
        &self,
        guild_id: &str,
    ) -> Result<Vec<TrackedPlayer>, CommandError> {
        Ok(self.repo.players_in_guild(guild_id).await?)
    }

    /// All games a player can be registered for.
    pub fn list_games(&self) -> Vec<GameInfo> {
        self.registry.list()
    }
}
