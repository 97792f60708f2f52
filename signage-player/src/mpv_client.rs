use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

const SOCKET_WAIT: Duration = Duration::from_secs(10);

/// Starts an idle, fullscreen mpv listening on `socket_path`.
pub fn spawn_mpv(socket_path: &str) -> Result<Child> {
    if Path::new(socket_path).exists() {
        let _ = std::fs::remove_file(socket_path);
    }

    let mut child = Command::new("mpv")
        .arg("--idle")
        .arg("--fullscreen")
        .arg("--force-window=yes")
        .arg("--keep-open=no")
        .arg("--image-display-duration=inf")
        .arg(format!("--input-ipc-server={}", socket_path))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let start = std::time::Instant::now();
    while start.elapsed() < SOCKET_WAIT {
        if Path::new(socket_path).exists() {
            return Ok(child);
        }
        if let Some(status) = child.try_wait()? {
            return Err(anyhow!("mpv exited during startup: {}", status));
        }
        thread::sleep(Duration::from_millis(100));
    }

    tracing::warn!(
        "mpv socket {} did not appear within {:?}",
        socket_path,
        SOCKET_WAIT
    );
    Ok(child)
}

/// JSON IPC client; one short-lived connection per command.
pub struct MpvClient {
    socket_path: String,
}

impl MpvClient {
    pub fn new(socket_path: String) -> Self {
        Self { socket_path }
    }

    pub fn play(&self, path: &str) -> Result<()> {
        self.expect_success(json!({
            "command": ["loadfile", path, "replace"]
        }))
    }

    /// On-screen message over whatever is showing, or over the blank window.
    pub fn show_text(&self, text: &str, duration: Duration) -> Result<()> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.expect_success(json!({
            "command": ["show-text", text, millis]
        }))
    }

    pub fn pause(&self) -> Result<()> {
        self.expect_success(json!({
            "command": ["set_property", "pause", true]
        }))
    }

    pub fn resume(&self) -> Result<()> {
        self.expect_success(json!({
            "command": ["set_property", "pause", false]
        }))
    }

    pub fn stop(&self) -> Result<()> {
        self.expect_success(json!({
            "command": ["stop"]
        }))
    }

    /// True once mpv has nothing loaded, e.g. after a file played to its end.
    pub fn is_idle(&self) -> Result<bool> {
        let response = self.send_command(json!({
            "command": ["get_property", "idle-active"]
        }))?;

        response["data"]
            .as_bool()
            .ok_or_else(|| anyhow!("Invalid idle-active response: {}", response))
    }

    fn expect_success(&self, cmd: Value) -> Result<()> {
        let response = self.send_command(cmd)?;
        match response["error"].as_str() {
            Some("success") | None => Ok(()),
            Some(error) => Err(anyhow!("mpv: {}", error)),
        }
    }

    pub fn send_command(&self, cmd: Value) -> Result<Value> {
        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.set_write_timeout(Some(Duration::from_secs(1)))?;
        stream.set_read_timeout(Some(Duration::from_secs(1)))?;

        let cmd_str = format!("{}\n", serde_json::to_string(&cmd)?);
        tracing::debug!(target: "signage_player::mpv_client", "Sending command: {}", cmd_str.trim());

        stream.write_all(cmd_str.as_bytes())?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        // mpv interleaves async events on the socket; skip to the reply
        loop {
            response.clear();
            if reader.read_line(&mut response)? == 0 {
                return Err(anyhow!("mpv closed the IPC socket"));
            }
            let value: Value = serde_json::from_str(&response)?;
            if value.get("event").is_none() {
                return Ok(value);
            }
        }
    }
}
