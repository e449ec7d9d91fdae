//! League of Legends tracker.
//!
//! State string is the latest Match-V5 match id; a change means a new match
//! finished. The notification re-fetches the match detail to render result,
//! KDA, and economy stats.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;

use crate::game::{
    GameType, Notification, NotificationField, PlayerInfo, Tracker, TrackerError,
};

use client::{queue_name, Match, Participant, RiotClient};

/// Accent colors for win/loss embeds.
const COLOR_VICTORY: u32 = 0x2ECC71;
const COLOR_DEFEAT: u32 = 0xE74C3C;
const COLOR_DEGRADED: u32 = 0xFF0000;

pub struct LolTracker {
    client: RiotClient,
}

impl LolTracker {
    pub fn new(api_key: &str, request_spacing: Duration, throttle_backoff: Duration) -> Self {
        Self {
            client: RiotClient::new(api_key, request_spacing, throttle_backoff),
        }
    }
}

#[async_trait]
impl Tracker for LolTracker {
    fn name(&self) -> &str {
        "League of Legends"
    }

    fn game_type(&self) -> GameType {
        GameType::Lol
    }

    fn description(&self) -> &str {
        "Tracks match results for League of Legends summoners"
    }

    fn validate_player_id(&self, input: &str) -> Result<(), TrackerError> {
        split_riot_id(input).map(|_| ())
    }

    async fn resolve_player(&self, input: &str) -> Result<PlayerInfo, TrackerError> {
        let (game_name, tag_line) = split_riot_id(input)?;
        let account = self
            .client
            .account_by_riot_id(&game_name, &tag_line)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    TrackerError::NotFound(input.to_string())
                } else {
                    TrackerError::Upstream(e)
                }
            })?;

        Ok(PlayerInfo {
            external_id: account.puuid,
            display_name: format!("{}#{}", account.game_name, account.tag_line),
            game_type: GameType::Lol,
        })
    }

    async fn current_state(&self, external_id: &str) -> Result<String, TrackerError> {
        let ids = self.client.match_ids_by_puuid(external_id, 1).await?;
        // No match history yet is "nothing observable", not an error.
        Ok(ids.into_iter().next().unwrap_or_default())
    }

    async fn build_notification(
        &self,
        external_id: &str,
        display_name: &str,
        state: &str,
    ) -> Result<Notification, TrackerError> {
        let m = match self.client.match_by_id(state).await {
            Ok(m) => m,
            Err(e) => {
                log::warn!("match {state} no longer fetchable: {e}");
                return Ok(degraded_notification(
                    display_name,
                    state,
                    "match data could not be fetched",
                ));
            }
        };

        match m.find_participant(external_id) {
            Some(p) => Ok(match_notification(display_name, &m, p)),
            None => Ok(degraded_notification(
                display_name,
                state,
                "player missing from match data",
            )),
        }
    }
}

/// Split `Name#Tag` into its parts, rejecting anything else.
fn split_riot_id(input: &str) -> Result<(String, String), TrackerError> {
    let mut parts = input.splitn(2, '#');
    let game_name = parts.next().unwrap_or_default().trim();
    let tag_line = parts.next().map(str::trim);

    match tag_line {
        Some(tag) if !game_name.is_empty() && !tag.is_empty() => {
            Ok((game_name.to_string(), tag.to_string()))
        }
        Some(_) => Err(TrackerError::InvalidFormat(
            "game name and tag line cannot be empty".to_string(),
        )),
        None => Err(TrackerError::InvalidFormat(
            "must be GameName#TagLine (e.g. Faker#KR1)".to_string(),
        )),
    }
}

/// Render the full win/loss embed for a finished match.
fn match_notification(player_name: &str, m: &Match, p: &Participant) -> Notification {
    let (title, color) = if p.win {
        ("Victory".to_string(), COLOR_VICTORY)
    } else {
        ("Defeat".to_string(), COLOR_DEFEAT)
    };

    let kda = (p.kills + p.assists) as f64 / p.deaths.max(1) as f64;
    let cs = p.total_minions_killed + p.neutral_minions_killed;
    let cs_per_min = cs as f64 / (m.info.game_duration as f64 / 60.0);
    let duration = format!("{}:{:02}", m.info.game_duration / 60, m.info.game_duration % 60);

    Notification {
        title,
        description: format!("**{}** | {}", p.champion_name, queue_name(m.info.queue_id)),
        color,
        author_name: player_name.to_string(),
        fields: vec![
            NotificationField::inline(
                "KDA",
                format!("{} / {} / {} ({:.2})", p.kills, p.deaths, p.assists, kda),
            ),
            NotificationField::inline("CS", format!("{} ({:.1}/min)", cs, cs_per_min)),
            NotificationField::inline("Damage", format_thousands(p.total_damage_dealt_to_champions)),
            NotificationField::inline("Gold", format_thousands(p.gold_earned)),
            NotificationField::inline("Vision", p.vision_score.to_string()),
            NotificationField::inline("Duration", duration),
        ],
        footer: format!("Match ID: {}", m.metadata.match_id),
        timestamp: DateTime::from_timestamp_millis(m.info.game_end_timestamp),
    }
}

/// Placeholder embed when match detail is gone or malformed. Keeps fan-out
/// alive for the remaining subscribers.
fn degraded_notification(player_name: &str, state: &str, reason: &str) -> Notification {
    Notification {
        title: "Match Result".to_string(),
        description: format!("New match detected, but {reason}."),
        color: COLOR_DEGRADED,
        author_name: player_name.to_string(),
        fields: Vec::new(),
        footer: format!("Match ID: {state}"),
        timestamp: None,
    }
}

/// Format large numbers with a thousands separator.
fn format_thousands(n: i64) -> String {
    if n < 1000 {
        return n.to_string();
    }
    format!("{},{:03}", n / 1000, n % 1000)
}
