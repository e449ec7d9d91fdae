//! MapleStory tracker.
//!
//! MapleStory has no match feed, so the state string encodes the progression
//! counters themselves: `lv:{level}:exp:{exp}`. Any level-up or experience
//! gain produces a new string and therefore a notification.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::game::{
    GameType, Notification, NotificationField, PlayerInfo, Tracker, TrackerError,
};

use client::{CharacterBasic, NexonClient};

const COLOR_MAPLE: u32 = 0xFF9900;
const COLOR_DEGRADED: u32 = 0xFF0000;

/// Nexon caps character names at 12 characters.
const MAX_NAME_CHARS: usize = 12;

pub struct MapleStoryTracker {
    client: NexonClient,
}

impl MapleStoryTracker {
    pub fn new(api_key: &str, request_spacing: Duration, throttle_backoff: Duration) -> Self {
        Self {
            client: NexonClient::new(api_key, request_spacing, throttle_backoff),
        }
    }
}

#[async_trait]
impl Tracker for MapleStoryTracker {
    fn name(&self) -> &str {
        "MapleStory"
    }

    fn game_type(&self) -> GameType {
        GameType::Maplestory
    }

    fn description(&self) -> &str {
        "Tracks character level and experience for MapleStory"
    }

    fn validate_player_id(&self, input: &str) -> Result<(), TrackerError> {
        validate_character_name(input)
    }

    async fn resolve_player(&self, input: &str) -> Result<PlayerInfo, TrackerError> {
        validate_character_name(input)?;
        let name = input.trim();

        let ocid = self.client.character_ocid(name).await.map_err(|e| {
            if e.is_not_found() {
                TrackerError::NotFound(name.to_string())
            } else {
                TrackerError::Upstream(e)
            }
        })?;
        if ocid.ocid.is_empty() {
            return Err(TrackerError::NotFound(name.to_string()));
        }

        // Fetch basic info to confirm the character and get the exact name.
        let basic = self.client.character_basic(&ocid.ocid).await?;

        Ok(PlayerInfo {
            external_id: ocid.ocid,
            display_name: basic.character_name,
            game_type: GameType::Maplestory,
        })
    }

    async fn current_state(&self, external_id: &str) -> Result<String, TrackerError> {
        let basic = self.client.character_basic(external_id).await?;
        Ok(progress_state(basic.character_level, basic.character_exp))
    }

    async fn build_notification(
        &self,
        external_id: &str,
        display_name: &str,
        state: &str,
    ) -> Result<Notification, TrackerError> {
        match self.client.character_basic(external_id).await {
            Ok(basic) => Ok(progress_notification(display_name, &basic)),
            Err(e) => {
                log::warn!("character {display_name} no longer fetchable: {e}");
                Ok(degraded_notification(display_name, state))
            }
        }
    }
}

fn validate_character_name(input: &str) -> Result<(), TrackerError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(TrackerError::InvalidFormat(
            "character name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(TrackerError::InvalidFormat(format!(
            "character name is too long (max {MAX_NAME_CHARS} characters)"
        )));
    }
    Ok(())
}

/// Deterministic state encoding: changes whenever level or exp changes.
fn progress_state(level: i64, exp: i64) -> String {
    format!("lv:{level}:exp:{exp}")
}

fn progress_notification(player_name: &str, basic: &CharacterBasic) -> Notification {
    Notification {
        title: "MapleStory Character Update".to_string(),
        description: String::new(),
        color: COLOR_MAPLE,
        author_name: player_name.to_string(),
        fields: vec![
            NotificationField::inline("Level", basic.character_level.to_string()),
            NotificationField::inline("Experience", format!("{}%", basic.character_exp_rate)),
        ],
        footer: "MapleStory".to_string(),
        timestamp: Some(Utc::now()),
    }
}

fn degraded_notification(player_name: &str, state: &str) -> Notification {
    Notification {
        title: "MapleStory Character Update".to_string(),
        description: "Progress detected, but character data could not be fetched.".to_string(),
        color: COLOR_DEGRADED,
        author_name: player_name.to_string(),
        fields: Vec::new(),
        footer: state.to_string(),
        timestamp: None,
    }
}
