use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::models::ContentType;
use crate::mpv_client::MpvClient;
use crate::player::PlayerEvent;
use crate::render::{Frame, ZoneContent, ZoneFrame};

/// A surface frames are presented on.
pub trait Display: Send {
    fn present(&mut self, frame: &Frame);

    fn shutdown(&mut self) {}
}

/// Logs each frame that differs from the previous one.
pub struct LogDisplay {
    last: Option<Frame>,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self { last: None }
    }
}

impl Display for LogDisplay {
    fn present(&mut self, frame: &Frame) {
        if self.last.as_ref() == Some(frame) {
            return;
        }

        match frame {
            Frame::Loading => tracing::info!("Screen: loading"),
            Frame::NoPlaylist => tracing::info!("Screen: no playlist assigned"),
            Frame::Error {
                message,
                retry_in_secs,
            } => tracing::warn!("Screen: {} (retrying in {}s)", message, retry_in_secs),
            Frame::Screen(screen) => {
                if screen.content_occluded() {
                    let messages: Vec<&str> =
                        screen.alerts.iter().map(|a| a.message.as_str()).collect();
                    tracing::info!("Screen: alert overlay {:?}", messages);
                }
                for zone in &screen.zones {
                    match &zone.content {
                        ZoneContent::Item { item_id, url, .. } => {
                            tracing::info!("Zone '{}': item {} ({})", zone.name, item_id, url)
                        }
                        ZoneContent::Empty => tracing::info!("Zone '{}': empty", zone.name),
                    }
                }
            }
        }

        if let Ok(json) = serde_json::to_string(frame) {
            tracing::debug!(target: "signage_player::frame", "{}", json);
        }

        self.last = Some(frame.clone());
    }
}

/// Plays the first zone of the layout in an mpv instance.
///
/// mpv has no notion of regions, so only the primary zone is shown. Videos
/// are watched until mpv goes idle, which is reported back as the natural end
/// of the item.
pub struct MpvDisplay {
    mpv: Arc<MpvClient>,
    events: UnboundedSender<PlayerEvent>,
    /// (zone, cycle) currently loaded
    playing: Option<(String, u64)>,
    occluded: bool,
    watcher: Option<CancellationToken>,
    /// Item whose load failed and is covered by the fallback message.
    fallback_for: Option<i64>,
}

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const FALLBACK_TEXT: &str = "Content failed to load";
// Held until the next load replaces it
const FALLBACK_TEXT_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

impl MpvDisplay {
    pub fn new(mpv: MpvClient, events: UnboundedSender<PlayerEvent>) -> Self {
        Self {
            mpv: Arc::new(mpv),
            events,
            playing: None,
            occluded: false,
            watcher: None,
            fallback_for: None,
        }
    }

    fn stop_watcher(&mut self) {
        if let Some(token) = self.watcher.take() {
            token.cancel();
        }
    }

    fn load(&mut self, zone: &ZoneFrame) {
        self.stop_watcher();
        self.playing = Some((zone.name.clone(), zone.cycle));

        let ZoneContent::Item {
            item_id,
            content_type,
            url,
            ..
        } = &zone.content
        else {
            if let Err(e) = self.mpv.stop() {
                tracing::error!("Failed to stop playback: {}", e);
            }
            return;
        };

        tracing::info!("Loading item {} in zone '{}': {}", item_id, zone.name, url);
        if let Err(e) = self.mpv.play(url) {
            // The zone timer keeps running, so playback moves on by itself
            tracing::error!("Content failed to load: item {} ({}): {}", item_id, url, e);
            self.show_fallback(*item_id);
            return;
        }
        self.fallback_for = None;

        if *content_type == ContentType::Video {
            self.watch_video_end(zone.name.clone(), zone.cycle);
        }
    }

    /// Blanks whatever was showing and puts the failure message up instead.
    fn show_fallback(&mut self, item_id: i64) {
        if let Err(e) = self.mpv.stop() {
            tracing::warn!("Failed to clear mpv after load error: {}", e);
        }
        if let Err(e) = self.mpv.show_text(FALLBACK_TEXT, FALLBACK_TEXT_DURATION) {
            tracing::warn!("Failed to show fallback for item {}: {}", item_id, e);
        }
        self.fallback_for = Some(item_id);
    }

    fn watch_video_end(&mut self, zone: String, cycle: u64) {
        let token = CancellationToken::new();
        self.watcher = Some(token.clone());
        let mpv = self.mpv.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            // Give mpv time to leave the idle state for the new file
            let mut started = false;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                }

                match mpv.is_idle() {
                    Ok(false) => started = true,
                    Ok(true) if started => {
                        let _ = events.send(PlayerEvent::VideoEnded { zone, cycle });
                        return;
                    }
                    Ok(true) => {}
                    Err(e) => {
                        tracing::debug!("mpv idle check failed: {}", e);
                    }
                }
            }
        });
    }
}

impl Display for MpvDisplay {
    fn present(&mut self, frame: &Frame) {
        let Frame::Screen(screen) = frame else {
            if self.playing.take().is_some() {
                self.stop_watcher();
                if let Err(e) = self.mpv.stop() {
                    tracing::error!("Failed to stop playback: {}", e);
                }
            }
            return;
        };

        // Alerts occlude content: hold the video underneath until they clear
        let occluded = screen.content_occluded() || screen.paused;
        if occluded != self.occluded {
            let result = if occluded {
                self.mpv.pause()
            } else {
                self.mpv.resume()
            };
            if let Err(e) = result {
                tracing::warn!("Failed to toggle mpv pause: {}", e);
            }
            self.occluded = occluded;
        }

        let Some(primary) = screen.zones.first() else {
            return;
        };
        let current = (primary.name.clone(), primary.cycle);
        if self.playing.as_ref() != Some(&current) {
            self.load(primary);
        }
    }

    fn shutdown(&mut self) {
        self.stop_watcher();
        if let Err(e) = self.mpv.stop() {
            tracing::error!("Failed to stop playback: {}", e);
        }
    }
}
