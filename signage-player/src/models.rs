use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::layout::Layout;

pub const DEFAULT_ZONE: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Image,
    Video,
    Pdf,
    Webpage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub url: String,
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub id: i64,
    #[serde(default)]
    pub playlist_id: Option<i64>,
    #[serde(default)]
    pub content_id: Option<i64>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub custom_duration: Option<u64>,
    pub content: ContentItem,
}

impl PlaylistItem {
    /// Zone this item targets; unset or blank means "main".
    pub fn zone_name(&self) -> &str {
        match self.zone.as_deref().map(str::trim) {
            Some(zone) if !zone.is_empty() => zone,
            _ => DEFAULT_ZONE,
        }
    }

    pub fn effective_duration(&self, fallback: Duration) -> Duration {
        let secs = self
            .custom_duration
            .or(self.content.duration)
            .unwrap_or_else(|| fallback.as_secs());
        // A zero duration would spin the zone timer
        Duration::from_secs(secs.max(1))
    }

    pub fn is_video(&self) -> bool {
        self.content.content_type == ContentType::Video
    }

    pub fn references_content(&self, content_id: i64) -> bool {
        self.content_id.unwrap_or(self.content.id) == content_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub layout: Layout,
    /// JSON text or an already decoded object; parsed by the zone partitioner.
    #[serde(default)]
    pub custom_layout_config: Option<serde_json::Value>,
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
}

impl Playlist {
    /// Returns how many items were dropped.
    pub fn remove_item(&mut self, item_id: i64) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.id != item_id);
        before - self.items.len()
    }

    pub fn remove_content(&mut self, content_id: i64) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !item.references_content(content_id));
        before - self.items.len()
    }

    /// Placeholder loop shown by preview players when the playlist can't be fetched.
    pub fn demo() -> Self {
        let slide = |id: i64, order: i32, name: &str| PlaylistItem {
            id: -id,
            playlist_id: Some(0),
            content_id: Some(-id),
            order,
            zone: None,
            custom_duration: None,
            content: ContentItem {
                id: -id,
                name: Some(name.to_string()),
                content_type: ContentType::Image,
                url: format!("demo://{}", name.to_lowercase().replace(' ', "-")),
                duration: Some(10),
            },
        };

        Self {
            id: 0,
            name: Some("Demo".to_string()),
            layout: Layout::SingleZone,
            custom_layout_config: None,
            items: vec![slide(1, 0, "Welcome"), slide(2, 1, "Sample Content")],
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub message: String,
    /// Seconds; 0 means the alert stays until dismissed or deleted.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub is_fixed: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Alert {
    pub fn auto_expires(&self) -> bool {
        !self.is_fixed && self.duration > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetType {
    Clock,
    Weather,
    News,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WidgetPosition {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: i64,
    #[serde(rename = "type")]
    pub widget_type: WidgetType,
    #[serde(default)]
    pub position: WidgetPosition,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSettings {
    #[serde(default)]
    pub format_24h: bool,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_true")]
    pub show_date: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSettings {
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_units")]
    pub units: String,
}

fn default_units() -> String {
    "metric".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsSettings {
    #[serde(default)]
    pub feed_url: Option<String>,
    #[serde(default = "default_news_items")]
    pub max_items: u32,
}

fn default_news_items() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSettings {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub scrolling: bool,
}

/// Widget settings decoded according to the widget type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WidgetSettings {
    Clock(ClockSettings),
    Weather(WeatherSettings),
    News(NewsSettings),
    Text(TextSettings),
}

impl Widget {
    /// Unknown or malformed settings fall back to the type's defaults.
    pub fn parsed_settings(&self) -> WidgetSettings {
        let raw = match &self.settings {
            Some(serde_json::Value::String(text)) => match serde_json::from_str(text) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Widget {} has unparseable settings: {}", self.id, e);
                    serde_json::Value::Object(Default::default())
                }
            },
            Some(serde_json::Value::Null) | None => serde_json::Value::Object(Default::default()),
            Some(value) => value.clone(),
        };

        let parsed = match self.widget_type {
            WidgetType::Clock => serde_json::from_value(raw).map(WidgetSettings::Clock),
            WidgetType::Weather => serde_json::from_value(raw).map(WidgetSettings::Weather),
            WidgetType::News => serde_json::from_value(raw).map(WidgetSettings::News),
            WidgetType::Text => serde_json::from_value(raw).map(WidgetSettings::Text),
        };

        parsed.unwrap_or_else(|e| {
            tracing::warn!("Widget {} settings rejected, using defaults: {}", self.id, e);
            self.default_settings()
        })
    }

    fn default_settings(&self) -> WidgetSettings {
        match self.widget_type {
            WidgetType::Clock => WidgetSettings::Clock(ClockSettings {
                format_24h: false,
                timezone: None,
                show_date: true,
            }),
            WidgetType::Weather => WidgetSettings::Weather(WeatherSettings {
                location: String::new(),
                units: default_units(),
            }),
            WidgetType::News => WidgetSettings::News(NewsSettings {
                feed_url: None,
                max_items: default_news_items(),
            }),
            WidgetType::Text => WidgetSettings::Text(TextSettings {
                text: String::new(),
                scrolling: false,
            }),
        }
    }
}
