use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    #[default]
    Log,
    Mpv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub screen_id: i64,
    pub server_url: String,
    /// Explicit REST base. Derived from `server_url` when absent.
    pub api_url: Option<String>,
    pub auth_token: String,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_item_duration")]
    pub default_item_duration_secs: u64,
    #[serde(default = "default_reload_retry")]
    pub reload_retry_secs: u64,
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_secs: u64,
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: u64,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub display: DisplayKind,
    #[serde(default = "default_mpv_socket")]
    pub mpv_socket_path: String,
    pub log_level: Option<String>,
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_item_duration() -> u64 {
    10
}

fn default_reload_retry() -> u64 {
    30
}

fn default_reconnect_initial() -> u64 {
    5
}

fn default_reconnect_max() -> u64 {
    300
}

fn default_mpv_socket() -> String {
    "/tmp/signage-mpv-socket".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(anyhow!("heartbeat_interval_secs must be greater than zero"));
        }
        if self.reload_retry_secs == 0 {
            return Err(anyhow!("reload_retry_secs must be greater than zero"));
        }
        if self.reconnect_initial_secs == 0 || self.reconnect_max_secs < self.reconnect_initial_secs {
            return Err(anyhow!(
                "reconnect_initial_secs must be non-zero and not exceed reconnect_max_secs"
            ));
        }
        Ok(())
    }

    /// REST base URL, e.g. `ws://host:8080/ws` becomes `http://host:8080`.
    pub fn api_base_url(&self) -> Result<String> {
        if let Some(api) = &self.api_url {
            return Ok(api.trim_end_matches('/').to_string());
        }

        let mut url = url::Url::parse(&self.server_url)
            .map_err(|e| anyhow!("Invalid server_url '{}': {}", self.server_url, e))?;
        let scheme = match url.scheme() {
            "ws" => "http",
            "wss" => "https",
            other => other,
        }
        .to_string();
        url.set_scheme(&scheme)
            .map_err(|_| anyhow!("Cannot map scheme of '{}'", self.server_url))?;

        let path = url.path().trim_end_matches('/');
        let base_path = path.strip_suffix("/ws").unwrap_or(path).to_string();
        url.set_path(&base_path);
        url.set_query(None);

        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn default_item_duration(&self) -> Duration {
        Duration::from_secs(self.default_item_duration_secs)
    }

    pub fn reload_retry(&self) -> Duration {
        Duration::from_secs(self.reload_retry_secs)
    }

    pub fn default_template() -> &'static str {
        r#"screen_id = 1
server_url = "ws://127.0.0.1:8080/ws"
# api_url = "http://127.0.0.1:8080"
auth_token = "change-me"
heartbeat_interval_secs = 60
default_item_duration_secs = 10
reload_retry_secs = 30
reconnect_initial_secs = 5
reconnect_max_secs = 300
preview = false
# "log" or "mpv"
display = "log"
mpv_socket_path = "/tmp/signage-mpv-socket"
# log_level = "signage_player=debug"
"#
    }
}
