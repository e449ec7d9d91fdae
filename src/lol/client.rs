//! Riot Games API client (Account-V1 + Match-V5).

use std::time::Duration;

use serde::Deserialize;

use crate::api::{path_escape, ApiClient, ApiError};

/// Regional routing host for Asia (Korea).
const REGIONAL_BASE_URL: &str = "https://asia.api.riotgames.com";

/// A Riot account from the Account-V1 API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub puuid: String,
    pub game_name: String,
    pub tag_line: String,
}

/// Match data from the Match-V5 API.
#[derive(Debug, Clone, Deserialize)]
pub struct Match {
    pub metadata: MatchMetadata,
    pub info: MatchInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    pub match_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    /// Seconds.
    pub game_duration: i64,
    pub queue_id: i64,
    /// Unix milliseconds.
    #[serde(default)]
    pub game_end_timestamp: i64,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub puuid: String,
    #[serde(default)]
    pub riot_id_game_name: String,
    #[serde(default)]
    pub riot_id_tagline: String,
    #[serde(default)]
    pub champion_name: String,
    pub win: bool,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    #[serde(default)]
    pub total_minions_killed: i64,
    #[serde(default)]
    pub neutral_minions_killed: i64,
    #[serde(default)]
    pub gold_earned: i64,
    #[serde(default)]
    pub total_damage_dealt_to_champions: i64,
    #[serde(default)]
    pub vision_score: i64,
}

impl Match {
    /// Find a participant by PUUID.
    pub fn find_participant(&self, puuid: &str) -> Option<&Participant> {
        self.info.participants.iter().find(|p| p.puuid == puuid)
    }
}

/// Rate-limited Riot API client.
pub struct RiotClient {
    api: ApiClient,
    api_key: String,
    base_url: String,
}

impl RiotClient {
    pub fn new(api_key: &str, request_spacing: Duration, throttle_backoff: Duration) -> Self {
        Self {
            api: ApiClient::new(request_spacing, throttle_backoff, decode_riot_error),
            api_key: api_key.to_string(),
            base_url: REGIONAL_BASE_URL.to_string(),
        }
    }

    /// Look up an account by Riot ID (game name + tag line).
    pub async fn account_by_riot_id(
        &self,
        game_name: &str,
        tag_line: &str,
    ) -> Result<Account, ApiError> {
        let url = format!(
            "{}/riot/account/v1/accounts/by-riot-id/{}/{}",
            self.base_url,
            path_escape(game_name),
            path_escape(tag_line)
        );
        self.get(&url).await
    }

    /// Recent match ids for a player, newest first.
    pub async fn match_ids_by_puuid(
        &self,
        puuid: &str,
        count: usize,
    ) -> Result<Vec<String>, ApiError> {
        let count = count.clamp(1, 100);
        let url = format!(
            "{}/lol/match/v5/matches/by-puuid/{}/ids?count={}",
            self.base_url, puuid, count
        );
        self.get(&url).await
    }

    /// Detailed match data.
    pub async fn match_by_id(&self, match_id: &str) -> Result<Match, ApiError> {
        let url = format!("{}/lol/match/v5/matches/{}", self.base_url, match_id);
        self.get(&url).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.api
            .get_json(url, &[("X-Riot-Token", self.api_key.as_str())])
            .await
    }
}

/// Riot error bodies look like `{"status":{"message":"...","status_code":404}}`.
fn decode_riot_error(_status: u16, body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("status")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

/// Human-readable queue name for a Match-V5 queue id.
pub fn queue_name(queue_id: i64) -> &'static str {
    match queue_id {
        420 => "Ranked Solo/Duo",
        440 => "Ranked Flex",
        400 => "Normal Draft",
        430 => "Normal Blind",
        450 => "ARAM",
        900 => "URF",
        1020 => "One for All",
        1300 => "Nexus Blitz",
        1400 => "Ultimate Spellbook",
        1700 => "Arena",
        _ => "Custom Game",
    }
}
