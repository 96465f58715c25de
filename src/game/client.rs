//! HTTP client for the Clash of Clans API

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::provider::GameDataProvider;
use super::types::{normalize_tag, LeagueGroup, PlayerSnapshot, WarDetail};
use crate::error::{BotError, Result};

const DEFAULT_BASE_URL: &str = "https://api.clashofclans.com/v1";

#[derive(Deserialize)]
struct ClanMembersResponse {
    items: Vec<PlayerSnapshot>,
}

#[derive(Clone)]
pub struct ClashClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ClashClient {
    pub fn new(token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
        }
    }

    /// Reads COC_API_TOKEN and optionally COC_API_BASE_URL (for proxies)
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("COC_API_TOKEN").ok()?;
        let mut client = Self::new(token);
        if let Ok(base_url) = std::env::var("COC_API_BASE_URL") {
            client.base_url = base_url.trim_end_matches('/').to_string();
        }
        Some(client)
    }

    /// GET a JSON document; 404 maps to `None`, any other failure is transient
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<T>().await?)),
            status => Err(BotError::Unavailable {
                message: format!("{} returned {}", path, status),
            }),
        }
    }
}

fn encode_tag(tag: &str) -> String {
    urlencoding::encode(&normalize_tag(tag)).into_owned()
}

#[async_trait]
impl GameDataProvider for ClashClient {
    async fn clan_members(&self, clan_tag: &str) -> Result<Vec<PlayerSnapshot>> {
        let path = format!("/clans/{}/members", encode_tag(clan_tag));
        self.get_json::<ClanMembersResponse>(&path)
            .await?
            .map(|response| response.items)
            .ok_or_else(|| BotError::Unavailable {
                message: format!("clan {} not found", clan_tag),
            })
    }

    async fn player(&self, tag: &str) -> Result<PlayerSnapshot> {
        let path = format!("/players/{}", encode_tag(tag));
        self.get_json(&path).await?.ok_or_else(|| BotError::NotFound {
            query: tag.to_string(),
        })
    }

    async fn current_war(&self, clan_tag: &str) -> Result<WarDetail> {
        let path = format!("/clans/{}/currentwar", encode_tag(clan_tag));
        self.get_json(&path)
            .await?
            .ok_or_else(|| BotError::Unavailable {
                message: format!("no war data for clan {}", clan_tag),
            })
    }

    async fn league_group(&self, clan_tag: &str) -> Result<Option<LeagueGroup>> {
        let path = format!("/clans/{}/currentwar/leaguegroup", encode_tag(clan_tag));
        self.get_json(&path).await
    }

    async fn league_war(&self, war_tag: &str) -> Result<WarDetail> {
        let path = format!("/clanwarleagues/wars/{}", encode_tag(war_tag));
        self.get_json(&path)
            .await?
            .ok_or_else(|| BotError::Unavailable {
                message: format!("league war {} not found", war_tag),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_tag() {
        assert_eq!(encode_tag("abc123"), "%23ABC123");
        assert_eq!(encode_tag("#2PP"), "%232PP");
    }

    #[test]
    fn test_parse_members_response() {
        let json = r##"{
            "items": [
                { "tag": "#A", "name": "One", "role": "leader", "townHallLevel": 16, "trophies": 5000 },
                { "tag": "#B", "name": "Two", "role": "member", "townHallLevel": 8, "trophies": 900 }
            ],
            "paging": { "cursors": {} }
        }"##;
        let response: ClanMembersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.items.len(), 2);
        assert!(response.items[1].heroes.is_empty());
    }
}
