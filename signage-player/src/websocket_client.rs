use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::heartbeat::HeartbeatPayload;
use crate::models::Alert;
use crate::player::PlayerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackAction {
    Play,
    Pause,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRef {
    #[serde(default)]
    pub playlist_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDeleted {
    #[serde(default)]
    pub playlist_id: Option<i64>,
    #[serde(alias = "id")]
    pub item_id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDeleted {
    #[serde(default)]
    pub playlist_id: Option<i64>,
    pub content_id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistAssignment {
    #[serde(default)]
    pub screen_id: Option<i64>,
    #[serde(default)]
    pub playlist_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackControl {
    #[serde(default)]
    pub screen_id: Option<i64>,
    pub action: PlaybackAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRef {
    #[serde(alias = "id")]
    pub alert_id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenRef {
    #[serde(default)]
    pub screen_id: Option<i64>,
}

// Server → Player events
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    PlaylistContentUpdated(PlaylistRef),
    PlaylistItemDeleted(ItemDeleted),
    ContentDeletedFromPlaylist(ContentDeleted),
    PlaylistChange(PlaylistAssignment),
    ScreenPlaylistUpdated(PlaylistAssignment),
    PlaybackControl(PlaybackControl),
    Alert(Alert),
    AlertDeleted(AlertRef),
    AlertDismissed(AlertRef),
    WidgetsUpdated(ScreenRef),
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Event(RealtimeEvent),
    AuthRejected(String),
    Ignored(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct AuthResponse {
    success: bool,
    #[serde(default)]
    message: String,
}

impl ServerFrame {
    pub fn decode(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let data = envelope.data;

        let event = match envelope.kind.as_str() {
            "playlist-content-updated" => {
                RealtimeEvent::PlaylistContentUpdated(serde_json::from_value(data)?)
            }
            "playlist-item-deleted" => RealtimeEvent::PlaylistItemDeleted(serde_json::from_value(data)?),
            "content-deleted-from-playlist" => {
                RealtimeEvent::ContentDeletedFromPlaylist(serde_json::from_value(data)?)
            }
            "playlist-change" => RealtimeEvent::PlaylistChange(serde_json::from_value(data)?),
            "screen-playlist-updated" => {
                RealtimeEvent::ScreenPlaylistUpdated(serde_json::from_value(data)?)
            }
            "playback-control" => RealtimeEvent::PlaybackControl(serde_json::from_value(data)?),
            "alert" => {
                // Some publishers wrap the record as { "alert": { ... } }
                let record = match data.get("alert") {
                    Some(inner) => inner.clone(),
                    None => data,
                };
                RealtimeEvent::Alert(serde_json::from_value(record)?)
            }
            "alert-deleted" => RealtimeEvent::AlertDeleted(serde_json::from_value(data)?),
            "alert-dismissed" => RealtimeEvent::AlertDismissed(serde_json::from_value(data)?),
            "widgets-updated" => RealtimeEvent::WidgetsUpdated(serde_json::from_value(data)?),
            "auth-response" => {
                let response: AuthResponse = serde_json::from_value(data)?;
                return Ok(if response.success {
                    ServerFrame::Ignored(envelope.kind)
                } else {
                    ServerFrame::AuthRejected(response.message)
                });
            }
            _ => return Ok(ServerFrame::Ignored(envelope.kind)),
        };

        Ok(ServerFrame::Event(event))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    Screen(i64),
    Playlist(i64),
}

// Player → Server messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Authenticate { screen_id: i64, token: String },
    Subscribe { channel: Subscription },
    Unsubscribe { channel: Subscription },
    PlayerHeartbeat(HeartbeatPayload),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("realtime channel is not connected")]
    NotConnected,
    #[error("realtime channel has shut down")]
    Closed,
}

/// Cloneable handle on the realtime channel, shared by the player and the heartbeat.
#[derive(Clone)]
pub struct ChannelHandle {
    outbound: UnboundedSender<ClientMessage>,
    subscriptions: Arc<Mutex<BTreeSet<Subscription>>>,
    connected: Arc<AtomicBool>,
}

impl ChannelHandle {
    /// A handle with no connection behind it; the receiver sees everything sent.
    pub fn detached() -> (Self, UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            outbound: tx,
            subscriptions: Arc::new(Mutex::new(BTreeSet::new())),
            connected: Arc::new(AtomicBool::new(false)),
        };
        (handle, rx)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn send(&self, msg: ClientMessage) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        self.outbound.send(msg).map_err(|_| ChannelError::Closed)
    }

    /// Flips the handle online and returns the set the session must replay.
    ///
    /// Holding the subscription lock across both steps means a concurrent
    /// [`subscribe`](Self::subscribe) either lands in the returned set or is
    /// queued for the live session, never neither.
    pub(crate) fn mark_online(&self) -> Vec<Subscription> {
        let subs = self.subscriptions.lock();
        self.set_connected(true);
        subs.map(|subs| subs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remembered across reconnects; sent right away when connected.
    pub fn subscribe(&self, channel: Subscription) {
        let Ok(mut subs) = self.subscriptions.lock() else {
            return;
        };
        if subs.insert(channel.clone()) && self.is_connected() {
            let _ = self.outbound.send(ClientMessage::Subscribe { channel });
        }
    }

    pub fn unsubscribe(&self, channel: Subscription) {
        let Ok(mut subs) = self.subscriptions.lock() else {
            return;
        };
        if subs.remove(&channel) && self.is_connected() {
            let _ = self.outbound.send(ClientMessage::Unsubscribe { channel });
        }
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .lock()
            .map(|subs| subs.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub url: String,
    pub screen_id: i64,
    pub auth_token: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// Owns the connection task: connect → subscribe → run → disconnect.
pub struct RealtimeChannel {
    handle: ChannelHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RealtimeChannel {
    pub fn connect(settings: ChannelSettings, events: UnboundedSender<PlayerEvent>) -> Self {
        let (handle, outbound_rx) = ChannelHandle::detached();
        let cancel = CancellationToken::new();

        let mut client = WebSocketClient {
            settings,
            handle: handle.clone(),
            outbound_rx,
            events,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(async move { client.connect_and_run().await });

        Self {
            handle,
            cancel,
            task,
        }
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    pub async fn disconnect(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Realtime task ended abnormally: {}", e);
        }
        self.handle.set_connected(false);
        tracing::info!("Realtime channel disconnected");
    }
}

/// How a connection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    /// Never got a socket up, or shutdown interrupted the attempt.
    Failed,
    /// Ran and then closed; the server was reachable and accepted us.
    Ended,
    /// The server refused our credentials.
    Rejected,
}

/// Returns the wait before the next attempt and the delay to carry forward.
///
/// Only a session that ran normally resets the backoff. A rejected login keeps
/// growing it so a bad token doesn't turn into a tight reconnect loop.
fn backoff(delay: Duration, outcome: Session, initial: Duration, max: Duration) -> (Duration, Duration) {
    let wait = match outcome {
        Session::Ended => initial,
        Session::Failed | Session::Rejected => delay,
    };
    (wait, (wait * 2).min(max))
}

struct WebSocketClient {
    settings: ChannelSettings,
    handle: ChannelHandle,
    outbound_rx: UnboundedReceiver<ClientMessage>,
    events: UnboundedSender<PlayerEvent>,
    cancel: CancellationToken,
}

impl WebSocketClient {
    async fn connect_and_run(&mut self) {
        let mut delay = self.settings.initial_backoff;
        let mut sessions = 0u64;

        loop {
            let outcome = match self.connect(sessions > 0).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Realtime connection error: {}", e);
                    Session::Failed
                }
            };
            self.handle.set_connected(false);
            if outcome != Session::Failed {
                sessions += 1;
            }

            if self.cancel.is_cancelled() {
                return;
            }

            let (wait, next) = backoff(
                delay,
                outcome,
                self.settings.initial_backoff,
                self.settings.max_backoff,
            );
            tracing::info!("Reconnecting in {:?}...", wait);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.cancel.cancelled() => return,
            }
            delay = next;
        }
    }

    /// Runs one session until it closes, is rejected, or shutdown is requested.
    async fn connect(&mut self, is_reconnect: bool) -> Result<Session> {
        let url = &self.settings.url;
        tracing::info!("Connecting to realtime channel: {}", url);

        let (ws_stream, _) = tokio::select! {
            result = connect_async(url.as_str()) => result?,
            _ = self.cancel.cancelled() => return Ok(Session::Failed),
        };
        tracing::info!("WebSocket connection established");

        let (mut write, mut read) = ws_stream.split();

        let auth = ClientMessage::Authenticate {
            screen_id: self.settings.screen_id,
            token: self.settings.auth_token.clone(),
        };
        write.send(Message::Text(serde_json::to_string(&auth)?)).await?;

        // Not a resumable session: every held subscription is sent again.
        // Anything subscribed after the snapshot goes through the outbound queue.
        for channel in self.handle.mark_online() {
            let msg = ClientMessage::Subscribe { channel };
            write.send(Message::Text(serde_json::to_string(&msg)?)).await?;
        }

        if is_reconnect && self.events.send(PlayerEvent::ChannelReconnected).is_err() {
            return Err(anyhow!("Player loop has stopped"));
        }

        let mut outcome = Session::Ended;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                outbound = self.outbound_rx.recv() => {
                    let Some(msg) = outbound else { break };
                    let json = serde_json::to_string(&msg)?;
                    write.send(Message::Text(json)).await?;
                }
                inbound = read.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if !self.dispatch(&text)? {
                                outcome = Session::Rejected;
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Server closed connection");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {}", e);
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }

        self.handle.set_connected(false);
        Ok(outcome)
    }

    /// Returns false when the server rejected our credentials.
    fn dispatch(&self, text: &str) -> Result<bool> {
        match ServerFrame::decode(text) {
            Ok(ServerFrame::Event(event)) => {
                if self.events.send(PlayerEvent::Realtime(event)).is_err() {
                    return Err(anyhow!("Player loop has stopped"));
                }
            }
            Ok(ServerFrame::AuthRejected(message)) => {
                tracing::error!("Authentication failed: {}", message);
                return Ok(false);
            }
            Ok(ServerFrame::Ignored(kind)) => {
                tracing::trace!("Ignoring realtime message '{}'", kind);
            }
            Err(e) => {
                tracing::warn!("Dropping malformed realtime message: {}", e);
            }
        }
        Ok(true)
    }
}
