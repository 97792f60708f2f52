use serde::Serialize;

use crate::layout::{Layout, ZoneRect};
use crate::models::{Alert, ContentType, Playlist, Widget, WidgetPosition, WidgetSettings};
use crate::tracker::PlaybackTracker;

/// Everything a display needs to draw one state of the screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Frame {
    Loading,
    NoPlaylist,
    Error { message: String, retry_in_secs: u64 },
    Screen(ScreenComposition),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenComposition {
    pub playlist_id: i64,
    pub layout: Layout,
    pub zones: Vec<ZoneFrame>,
    /// Newest first. Any alert hides the zones entirely.
    pub alerts: Vec<AlertFrame>,
    pub widgets: Vec<WidgetFrame>,
    pub paused: bool,
}

impl ScreenComposition {
    pub fn content_occluded(&self) -> bool {
        !self.alerts.is_empty()
    }

    pub fn zone(&self, name: &str) -> Option<&ZoneFrame> {
        self.zones.iter().find(|z| z.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneFrame {
    pub name: String,
    pub rect: ZoneRect,
    pub content: ZoneContent,
    pub cycle: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneContent {
    Empty,
    Item {
        item_id: i64,
        content_id: i64,
        content_type: ContentType,
        url: String,
        name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertFrame {
    pub id: i64,
    pub title: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetFrame {
    pub id: i64,
    pub position: WidgetPosition,
    pub settings: WidgetSettings,
}

pub fn compose(
    playlist: &Playlist,
    tracker: &PlaybackTracker,
    alerts: &[&Alert],
    widgets: &[Widget],
) -> ScreenComposition {
    let zones = tracker
        .zones()
        .iter()
        .map(|zone| ZoneFrame {
            name: zone.name.clone(),
            rect: zone.rect,
            content: match zone.current() {
                Some(item) => ZoneContent::Item {
                    item_id: item.id,
                    content_id: item.content.id,
                    content_type: item.content.content_type,
                    url: item.content.url.clone(),
                    name: item.content.name.clone(),
                },
                None => ZoneContent::Empty,
            },
            cycle: zone.cycle(),
        })
        .collect();

    let alerts = alerts
        .iter()
        .map(|alert| AlertFrame {
            id: alert.id,
            title: alert.title.clone(),
            message: alert.message.clone(),
        })
        .collect();

    let widgets = widgets
        .iter()
        .filter(|w| w.is_enabled)
        .map(|w| WidgetFrame {
            id: w.id,
            position: w.position,
            settings: w.parsed_settings(),
        })
        .collect();

    ScreenComposition {
        playlist_id: playlist.id,
        layout: playlist.layout,
        zones,
        alerts,
        widgets,
        paused: tracker.is_paused(),
    }
}
