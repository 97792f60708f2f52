use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::config::Config;
use crate::heartbeat::HeartbeatPayload;
use crate::models::{Alert, Playlist, Widget};

/// REST collaborators of the player.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// `None` when no playlist is assigned to the screen.
    async fn fetch_playlist(&self, screen_id: i64) -> Result<Option<Playlist>>;
    async fn fetch_widgets(&self, screen_id: i64) -> Result<Vec<Widget>>;
    async fn fetch_alerts(&self, screen_id: i64) -> Result<Vec<Alert>>;
    async fn mark_alert_expired(&self, alert_id: i64) -> Result<()>;
    async fn send_heartbeat(&self, heartbeat: &HeartbeatPayload) -> Result<()>;
}

pub struct HttpContentApi {
    client: Client,
    base_url: String,
    auth_token: String,
}

impl HttpContentApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url()?,
            auth_token: config.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!("GET {} failed: HTTP {}", url, response.status()));
        }

        let body = response
            .json::<Option<T>>()
            .await
            .map_err(|e| anyhow!("Failed to decode {}: {}", url, e))?;
        Ok(body)
    }
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn fetch_playlist(&self, screen_id: i64) -> Result<Option<Playlist>> {
        self.get_json(&format!("/screens/{}/playlist", screen_id))
            .await
    }

    async fn fetch_widgets(&self, screen_id: i64) -> Result<Vec<Widget>> {
        Ok(self
            .get_json(&format!("/screens/{}/widgets", screen_id))
            .await?
            .unwrap_or_default())
    }

    async fn fetch_alerts(&self, screen_id: i64) -> Result<Vec<Alert>> {
        Ok(self
            .get_json(&format!("/screens/{}/alerts", screen_id))
            .await?
            .unwrap_or_default())
    }

    async fn mark_alert_expired(&self, alert_id: i64) -> Result<()> {
        let url = self.url(&format!("/alerts/{}/expire", alert_id));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("POST {} failed: HTTP {}", url, response.status()));
        }
        Ok(())
    }

    async fn send_heartbeat(&self, heartbeat: &HeartbeatPayload) -> Result<()> {
        let url = self.url(&format!("/screens/{}/heartbeat", heartbeat.screen_id));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(heartbeat)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("POST {} failed: HTTP {}", url, response.status()));
        }
        Ok(())
    }
}
