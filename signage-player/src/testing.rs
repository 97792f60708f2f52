//! In-memory collaborators for unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixListener;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::api::ContentApi;
use crate::display::Display;
use crate::heartbeat::HeartbeatPayload;
use crate::models::{Alert, Playlist, Widget};
use crate::render::Frame;

#[derive(Default)]
struct FakeState {
    playlist: Option<Playlist>,
    widgets: Vec<Widget>,
    alerts: Vec<Alert>,
    fail_playlist: bool,
    fail_alert_expiry: bool,
    playlist_fetches: usize,
    expired: Vec<i64>,
    heartbeats: Vec<HeartbeatPayload>,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_playlist(playlist: Playlist) -> Self {
        let api = Self::new();
        api.set_playlist(Some(playlist));
        api
    }

    pub fn set_playlist(&self, playlist: Option<Playlist>) {
        self.state.lock().unwrap().playlist = playlist;
    }

    pub fn update_playlist(&self, f: impl FnOnce(&mut Playlist)) {
        if let Some(playlist) = self.state.lock().unwrap().playlist.as_mut() {
            f(playlist);
        }
    }

    pub fn set_alerts(&self, alerts: Vec<Alert>) {
        self.state.lock().unwrap().alerts = alerts;
    }

    pub fn set_widgets(&self, widgets: Vec<Widget>) {
        self.state.lock().unwrap().widgets = widgets;
    }

    pub fn fail_playlist(&self, fail: bool) {
        self.state.lock().unwrap().fail_playlist = fail;
    }

    pub fn fail_alert_expiry(&self, fail: bool) {
        self.state.lock().unwrap().fail_alert_expiry = fail;
    }

    pub fn playlist_fetches(&self) -> usize {
        self.state.lock().unwrap().playlist_fetches
    }

    pub fn expired_alerts(&self) -> Vec<i64> {
        self.state.lock().unwrap().expired.clone()
    }

    pub fn heartbeats(&self) -> Vec<HeartbeatPayload> {
        self.state.lock().unwrap().heartbeats.clone()
    }
}

#[async_trait]
impl ContentApi for FakeApi {
    async fn fetch_playlist(&self, _screen_id: i64) -> Result<Option<Playlist>> {
        let mut state = self.state.lock().unwrap();
        state.playlist_fetches += 1;
        if state.fail_playlist {
            return Err(anyhow!("playlist service unavailable"));
        }
        Ok(state.playlist.clone())
    }

    async fn fetch_widgets(&self, _screen_id: i64) -> Result<Vec<Widget>> {
        Ok(self.state.lock().unwrap().widgets.clone())
    }

    async fn fetch_alerts(&self, _screen_id: i64) -> Result<Vec<Alert>> {
        Ok(self.state.lock().unwrap().alerts.clone())
    }

    async fn mark_alert_expired(&self, alert_id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_alert_expiry {
            return Err(anyhow!("alert service unavailable"));
        }
        state.expired.push(alert_id);
        Ok(())
    }

    async fn send_heartbeat(&self, heartbeat: &HeartbeatPayload) -> Result<()> {
        self.state.lock().unwrap().heartbeats.push(heartbeat.clone());
        Ok(())
    }
}

/// Keeps every frame it was asked to present.
#[derive(Clone, Default)]
pub struct RecordingDisplay {
    frames: Arc<Mutex<Vec<Frame>>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Frame> {
        self.frames.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl Display for RecordingDisplay {
    fn present(&mut self, frame: &Frame) {
        self.frames.lock().unwrap().push(frame.clone());
    }
}

/// mpv IPC stand-in: records each command and answers with `reply(command)`.
///
/// Serves one command per connection, the way `MpvClient` talks to mpv.
pub struct FakeMpv {
    path: String,
    commands: Arc<Mutex<Vec<Value>>>,
    _dir: tempfile::TempDir,
}

impl FakeMpv {
    pub fn start<F>(reply: F) -> Self
    where
        F: Fn(&Value) -> Vec<String> + Send + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mpv.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));

        let seen = commands.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    continue;
                }
                let sent: Value = serde_json::from_str(&line).unwrap();
                let command = sent["command"].clone();
                seen.lock().unwrap().push(command.clone());

                let mut writer = stream;
                for line in reply(&command) {
                    let _ = writer.write_all(line.as_bytes());
                    let _ = writer.write_all(b"\n");
                }
            }
        });

        Self {
            path: path.to_string_lossy().to_string(),
            commands,
            _dir: dir,
        }
    }

    pub fn path(&self) -> String {
        self.path.clone()
    }

    pub fn commands(&self) -> Vec<Value> {
        self.commands.lock().unwrap().clone()
    }

    /// Names of the commands received so far, e.g. `["loadfile", "stop"]`.
    pub fn command_names(&self) -> Vec<String> {
        self.commands()
            .iter()
            .filter_map(|c| c[0].as_str().map(str::to_string))
            .collect()
    }
}
