use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::RwLock;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::api::ContentApi;
use crate::websocket_client::{ChannelHandle, ClientMessage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub screen_id: i64,
    pub timestamp: String,
    pub status: String,
    /// Zone name → playlist item id currently shown.
    pub current_items: BTreeMap<String, i64>,
    pub cpu_usage_percent: f64,
    pub memory_usage_mb: f64,
}

/// What the player loop last rendered, read by the heartbeat.
#[derive(Debug, Clone, Default)]
pub struct PlaybackReport {
    pub status: String,
    pub current_items: BTreeMap<String, i64>,
}

pub type SharedReport = Arc<RwLock<PlaybackReport>>;

pub struct HeartbeatManager {
    screen_id: i64,
    interval: Duration,
    channel: ChannelHandle,
    api: Arc<dyn ContentApi>,
    report: SharedReport,
    sys: System,
}

impl HeartbeatManager {
    pub fn new(
        screen_id: i64,
        interval: Duration,
        channel: ChannelHandle,
        api: Arc<dyn ContentApi>,
        report: SharedReport,
    ) -> Self {
        Self {
            screen_id,
            interval,
            channel,
            api,
            report,
            sys: System::new(),
        }
    }

    pub async fn start(mut self, cancel: CancellationToken) {
        let mut tick = interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => self.beat().await,
            }
        }

        tracing::debug!("Heartbeat stopped");
    }

    /// Sends over the realtime channel, or over HTTP when it is down.
    pub async fn beat(&mut self) {
        let heartbeat = self.collect_heartbeat_data().await;

        match self
            .channel
            .send(ClientMessage::PlayerHeartbeat(heartbeat.clone()))
        {
            Ok(()) => tracing::trace!("Heartbeat sent over realtime channel"),
            Err(e) => {
                tracing::debug!("{}, sending heartbeat over HTTP", e);
                if let Err(e) = self.api.send_heartbeat(&heartbeat).await {
                    tracing::warn!("Failed to send heartbeat: {}", e);
                }
            }
        }
    }

    async fn collect_heartbeat_data(&mut self) -> HeartbeatPayload {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();

        // Average CPU usage across all cores
        let cpu_usage = if !self.sys.cpus().is_empty() {
            self.sys.cpus().iter().map(|cpu| cpu.cpu_usage()).sum::<f32>()
                / self.sys.cpus().len() as f32
        } else {
            0.0
        } as f64;

        let memory_usage = (self.sys.used_memory() as f64) / (1024.0 * 1024.0); // Convert to MB

        let report = self.report.read().await.clone();

        HeartbeatPayload {
            screen_id: self.screen_id,
            timestamp: Utc::now().to_rfc3339(),
            status: if report.status.is_empty() {
                "online".to_string()
            } else {
                report.status
            },
            current_items: report.current_items,
            cpu_usage_percent: cpu_usage,
            memory_usage_mb: memory_usage,
        }
    }
}
