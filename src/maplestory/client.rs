//! Nexon Open API client (MapleStory character endpoints).

use std::time::Duration;

use serde::Deserialize;

use crate::api::{path_escape, ApiClient, ApiError};

const BASE_URL: &str = "https://open.api.nexon.com";

/// Response from `/maplestory/v1/id`.
#[derive(Debug, Clone, Deserialize)]
pub struct CharacterOcid {
    #[serde(default)]
    pub ocid: String,
}

/// Response from `/maplestory/v1/character/basic`.
#[derive(Debug, Clone, Deserialize)]
pub struct CharacterBasic {
    pub character_name: String,
    pub character_level: i64,
    pub character_exp: i64,
    #[serde(default)]
    pub character_exp_rate: String,
}

/// Rate-limited Nexon Open API client.
pub struct NexonClient {
    api: ApiClient,
    api_key: String,
    base_url: String,
}

impl NexonClient {
    pub fn new(api_key: &str, request_spacing: Duration, throttle_backoff: Duration) -> Self {
        Self {
            api: ApiClient::new(request_spacing, throttle_backoff, decode_nexon_error),
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Fetch the OCID for a character name.
    pub async fn character_ocid(&self, character_name: &str) -> Result<CharacterOcid, ApiError> {
        let url = format!(
            "{}/maplestory/v1/id?character_name={}",
            self.base_url,
            path_escape(character_name)
        );
        self.get(&url).await
    }

    /// Fetch basic character information by OCID.
    pub async fn character_basic(&self, ocid: &str) -> Result<CharacterBasic, ApiError> {
        let url = format!(
            "{}/maplestory/v1/character/basic?ocid={}",
            self.base_url,
            path_escape(ocid)
        );
        self.get(&url).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.api
            .get_json(url, &[("x-nxopen-api-key", self.api_key.as_str())])
            .await
    }
}

/// Nexon error bodies look like `{"error":{"name":"OPENAPI00004","message":"..."}}`.
fn decode_nexon_error(_status: u16, body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let name = error.get("name")?.as_str()?;
    let message = error.get("message")?.as_str()?;
    Some(format!("{name}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nexon_error_body() {
        let body = r#"{"error":{"name":"OPENAPI00004","message":"Please input valid parameter"}}"#;
        assert_eq!(
            decode_nexon_error(400, body),
            Some("OPENAPI00004: Please input valid parameter".to_string())
        );
        assert_eq!(decode_nexon_error(400, r#"{"error":{}}"#), None);
        assert_eq!(decode_nexon_error(400, "<html>"), None);
    }

    #[test]
    fn test_character_basic_deserializes() {
        let body = r#"{
            "character_name": "도적",
            "character_level": 281,
            "character_exp": 123456789,
            "character_exp_rate": "42.195"
        }"#;
        let basic: CharacterBasic = serde_json::from_str(body).unwrap();
        assert_eq!(basic.character_name, "도적");
        assert_eq!(basic.character_level, 281);
        assert_eq!(basic.character_exp_rate, "42.195");
    }

    #[test]
    fn test_character_ocid_defaults_to_empty() {
        let ocid: CharacterOcid = serde_json::from_str("{}").unwrap();
        assert!(ocid.ocid.is_empty());
    }
}
