mod alerts;
mod api;
mod config;
mod display;
mod heartbeat;
mod layout;
mod models;
mod mpv_client;
mod player;
mod render;
#[cfg(test)]
mod testing;
mod timers;
mod tracker;
mod websocket_client;
mod zones;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::HttpContentApi;
use crate::config::{Config, DisplayKind};
use crate::display::{Display, LogDisplay, MpvDisplay};
use crate::mpv_client::{spawn_mpv, MpvClient};
use crate::player::{Player, PlayerEvent, PlayerSettings};
use crate::websocket_client::{ChannelSettings, RealtimeChannel};

const DEFAULT_CONFIG_PATH: &str = "player-config.toml";

#[derive(Parser)]
#[command(version, about = "Signage Player\nLicensed under AGPLv3", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Generate a default configuration template to stdout
    #[arg(long)]
    generate_config: bool,

    /// Override the screen id from the configuration file
    #[arg(long)]
    screen_id: Option<i64>,
}

fn run_onboarding() -> Result<()> {
    use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};

    println!("Welcome to Signage Player!");
    println!("It looks like this screen has no configuration yet.");
    println!("Let's get it connected.\n");

    let server_url: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Server WebSocket URL")
        .default("ws://127.0.0.1:8080/ws".to_string())
        .interact_text()?;

    let screen_id: i64 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Screen ID")
        .default(1)
        .interact_text()?;

    let auth_token: String = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Screen auth token")
        .interact()?;

    let use_mpv = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Play content with mpv?")
        .default(true)
        .interact()?;

    let config_content = format!(
        r#"screen_id = {}
server_url = "{}"
auth_token = "{}"
display = "{}"
"#,
        screen_id,
        server_url,
        auth_token,
        if use_mpv { "mpv" } else { "log" }
    );

    // Parse before writing so a bad answer doesn't leave a broken file behind
    let _: Config = toml::from_str(&config_content)?;

    println!("\nGenerating configuration file: {}", DEFAULT_CONFIG_PATH);
    std::fs::write(DEFAULT_CONFIG_PATH, &config_content)?;
    println!("Configuration saved successfully!");
    println!("----------------------------------------\n");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    if std::fs::metadata(&config_path).is_err() && cli.config.is_none() && console::user_attended()
    {
        if let Err(e) = run_onboarding() {
            eprintln!("Onboarding failed: {}", e);
            std::process::exit(1);
        }
    }

    if std::fs::metadata(&config_path).is_err() {
        eprintln!("Error: Configuration file '{}' not found.", config_path);
        eprintln!("Run with --generate-config to see a template.");
        std::process::exit(1);
    }

    let mut config = Config::load(&config_path)?;
    if let Some(screen_id) = cli.screen_id {
        config.screen_id = screen_id;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.generate_config {
        println!("{}", Config::default_template());
        return Ok(());
    }

    let config = load_config(&cli)?;

    let default_filter = config
        .log_level
        .clone()
        .unwrap_or_else(|| "signage_player=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Loaded configuration for screen {} (server {})",
        config.screen_id,
        config.server_url
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let channel = RealtimeChannel::connect(
        ChannelSettings {
            url: config.server_url.clone(),
            screen_id: config.screen_id,
            auth_token: config.auth_token.clone(),
            initial_backoff: Duration::from_secs(config.reconnect_initial_secs),
            max_backoff: Duration::from_secs(config.reconnect_max_secs),
        },
        events_tx.clone(),
    );

    let mut mpv_process = None;
    let display: Box<dyn Display> = match config.display {
        DisplayKind::Log => Box::new(LogDisplay::new()),
        DisplayKind::Mpv => {
            mpv_process = Some(spawn_mpv(&config.mpv_socket_path)?);
            tracing::info!("mpv started on {}", config.mpv_socket_path);
            Box::new(MpvDisplay::new(
                MpvClient::new(config.mpv_socket_path.clone()),
                events_tx.clone(),
            ))
        }
    };

    let api = Arc::new(HttpContentApi::new(&config)?);
    let player = Player::new(
        PlayerSettings::from_config(&config),
        api,
        channel.handle(),
        display,
        events_tx.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        tracing::info!("Ctrl-C received");
        let _ = events_tx.send(PlayerEvent::Shutdown);
    });

    player.run(events_rx).await;
    channel.disconnect().await;

    if let Some(mut child) = mpv_process {
        if let Err(e) = child.kill() {
            tracing::warn!("Failed to stop mpv: {}", e);
        }
        let _ = child.wait();
    }

    Ok(())
}
