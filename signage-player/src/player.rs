use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertOverlay;
use crate::api::ContentApi;
use crate::config::Config;
use crate::display::Display;
use crate::heartbeat::{HeartbeatManager, PlaybackReport, SharedReport};
use crate::models::{Playlist, Widget};
use crate::render::{compose, Frame};
use crate::timers::TimerSet;
use crate::tracker::PlaybackTracker;
use crate::websocket_client::{ChannelHandle, PlaybackAction, RealtimeEvent, Subscription};
use crate::zones::partition;

/// Everything the player loop reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Realtime(RealtimeEvent),
    ZoneElapsed { zone: String, generation: u64 },
    AlertElapsed { alert_id: i64, generation: u64 },
    VideoEnded { zone: String, cycle: u64 },
    RetryLoad { generation: u64 },
    ChannelReconnected,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub screen_id: i64,
    pub preview: bool,
    pub default_item_duration: Duration,
    pub reload_retry: Duration,
    pub heartbeat_interval: Duration,
}

impl PlayerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            screen_id: config.screen_id,
            preview: config.preview,
            default_item_duration: config.default_item_duration(),
            reload_retry: config.reload_retry(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Status {
    Loading,
    NoPlaylist,
    Error(String),
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Rebuild {
    Always,
    IfChanged,
}

/// Owns all playback state and applies events one at a time.
pub struct Player {
    settings: PlayerSettings,
    api: Arc<dyn ContentApi>,
    channel: ChannelHandle,
    display: Box<dyn Display>,
    events: UnboundedSender<PlayerEvent>,
    playlist: Option<Playlist>,
    subscribed_playlist: Option<i64>,
    tracker: PlaybackTracker,
    alerts: AlertOverlay,
    widgets: Vec<Widget>,
    status: Status,
    retry: TimerSet<()>,
    heartbeat: Option<CancellationToken>,
    report: SharedReport,
}

impl Player {
    pub fn new(
        settings: PlayerSettings,
        api: Arc<dyn ContentApi>,
        channel: ChannelHandle,
        display: Box<dyn Display>,
        events: UnboundedSender<PlayerEvent>,
    ) -> Self {
        let tracker = PlaybackTracker::new(settings.default_item_duration, events.clone());
        let alerts = AlertOverlay::new(api.clone(), settings.preview, events.clone());

        Self {
            settings,
            api,
            channel,
            display,
            events,
            playlist: None,
            subscribed_playlist: None,
            tracker,
            alerts,
            widgets: Vec::new(),
            status: Status::Loading,
            retry: TimerSet::new(),
            heartbeat: None,
            report: Arc::new(RwLock::new(PlaybackReport::default())),
        }
    }

    pub async fn run(mut self, mut events: UnboundedReceiver<PlayerEvent>) {
        self.start().await;

        while let Some(event) = events.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }

        tracing::info!("Player shutting down");
        self.teardown();
        self.display.shutdown();
    }

    pub async fn start(&mut self) {
        tracing::info!("Starting player for screen {}", self.settings.screen_id);
        self.channel
            .subscribe(Subscription::Screen(self.settings.screen_id));

        self.status = Status::Loading;
        self.render().await;

        self.start_heartbeat();
        self.load_all().await;
        self.render().await;
    }

    /// Applies one event and re-renders. Returns false once the player should stop.
    pub async fn handle_event(&mut self, event: PlayerEvent) -> bool {
        match event {
            PlayerEvent::Realtime(event) => self.on_realtime(event).await,
            PlayerEvent::ZoneElapsed { zone, generation } => {
                self.tracker.on_timer(&zone, generation);
            }
            PlayerEvent::AlertElapsed {
                alert_id,
                generation,
            } => {
                self.alerts.on_timer(alert_id, generation);
            }
            PlayerEvent::VideoEnded { zone, cycle } => {
                self.tracker.on_video_ended(&zone, cycle);
            }
            PlayerEvent::RetryLoad { generation } => {
                if self.retry.fire(&(), generation) {
                    tracing::info!("Retrying playlist load");
                    self.resync().await;
                }
            }
            PlayerEvent::ChannelReconnected => {
                tracing::info!("Realtime channel back, resyncing");
                self.resync().await;
            }
            PlayerEvent::Shutdown => return false,
        }

        self.render().await;
        true
    }

    async fn on_realtime(&mut self, event: RealtimeEvent) {
        tracing::debug!("Realtime event: {:?}", event);

        match event {
            RealtimeEvent::PlaylistContentUpdated(target) => {
                if self.targets_playlist(target.playlist_id) {
                    self.soft_refresh().await;
                }
            }
            RealtimeEvent::PlaylistItemDeleted(deleted) => {
                if self.targets_playlist(deleted.playlist_id) {
                    self.remove_locally(|playlist| playlist.remove_item(deleted.item_id));
                    self.soft_refresh().await;
                }
            }
            RealtimeEvent::ContentDeletedFromPlaylist(deleted) => {
                if self.targets_playlist(deleted.playlist_id) {
                    self.remove_locally(|playlist| playlist.remove_content(deleted.content_id));
                    self.soft_refresh().await;
                }
            }
            RealtimeEvent::PlaylistChange(assignment)
            | RealtimeEvent::ScreenPlaylistUpdated(assignment) => {
                if !self.targets_screen(assignment.screen_id) {
                    return;
                }
                let current = self.playlist.as_ref().map(|p| p.id);
                if assignment.playlist_id.is_some() && assignment.playlist_id == current {
                    self.soft_refresh().await;
                } else {
                    self.full_reload().await;
                }
            }
            RealtimeEvent::PlaybackControl(control) => {
                if !self.targets_screen(control.screen_id) {
                    return;
                }
                match control.action {
                    PlaybackAction::Play => self.tracker.resume(),
                    PlaybackAction::Pause => self.tracker.pause(),
                    PlaybackAction::Stop => self.tracker.stop(),
                }
            }
            RealtimeEvent::Alert(alert) => self.alerts.upsert(alert),
            RealtimeEvent::AlertDeleted(target) => {
                self.alerts.delete(target.alert_id);
            }
            RealtimeEvent::AlertDismissed(target) => {
                self.alerts.dismiss(target.alert_id);
            }
            RealtimeEvent::WidgetsUpdated(target) => {
                if self.targets_screen(target.screen_id) {
                    self.load_widgets().await;
                }
            }
        }
    }

    fn targets_screen(&self, screen_id: Option<i64>) -> bool {
        let matches = screen_id.map_or(true, |id| id == self.settings.screen_id);
        if !matches {
            tracing::trace!("Ignoring event for screen {:?}", screen_id);
        }
        matches
    }

    fn targets_playlist(&self, playlist_id: Option<i64>) -> bool {
        let Some(id) = playlist_id else {
            return true;
        };
        let matches = self.playlist.as_ref().is_some_and(|p| p.id == id);
        if !matches {
            tracing::trace!("Ignoring event for playlist {}", id);
        }
        matches
    }

    /// Rewinds every zone right away, then re-fetches and rebuilds.
    async fn soft_refresh(&mut self) {
        self.tracker.reset_indices();
        self.load_playlist(Rebuild::Always).await;
    }

    /// Drops deleted items before the re-fetch so they stop showing at once.
    fn remove_locally(&mut self, remove: impl FnOnce(&mut Playlist) -> usize) {
        let Some(mut playlist) = self.playlist.take() else {
            return;
        };
        let removed = remove(&mut playlist);
        if removed > 0 {
            tracing::info!("Removed {} item(s) from playlist {}", removed, playlist.id);
            self.install(playlist, Rebuild::Always);
        } else {
            self.playlist = Some(playlist);
        }
    }

    async fn full_reload(&mut self) {
        tracing::info!("Reloading screen {}", self.settings.screen_id);
        self.teardown();
        self.status = Status::Loading;
        self.render().await;

        self.start_heartbeat();
        self.load_all().await;
    }

    async fn load_all(&mut self) {
        self.load_playlist(Rebuild::Always).await;
        self.load_widgets().await;

        match self.api.fetch_alerts(self.settings.screen_id).await {
            Ok(alerts) => self.alerts.replace_all(alerts),
            Err(e) => tracing::warn!("Failed to fetch alerts: {}", e),
        }
    }

    /// Re-fetches everything, keeping playback where it is if nothing changed.
    async fn resync(&mut self) {
        self.load_playlist(Rebuild::IfChanged).await;
        self.load_widgets().await;

        match self.api.fetch_alerts(self.settings.screen_id).await {
            Ok(alerts) => self.alerts.sync(alerts),
            Err(e) => tracing::warn!("Failed to fetch alerts: {}", e),
        }
    }

    async fn load_playlist(&mut self, rebuild: Rebuild) {
        match self.api.fetch_playlist(self.settings.screen_id).await {
            Ok(Some(playlist)) => {
                self.retry.cancel_all();
                self.swap_subscription(Some(playlist.id));
                self.install(playlist, rebuild);
            }
            Ok(None) => {
                self.retry.cancel_all();
                if self.playlist.is_some() || self.status != Status::NoPlaylist {
                    tracing::info!("No playlist assigned to screen {}", self.settings.screen_id);
                }
                self.tracker.teardown();
                self.playlist = None;
                self.swap_subscription(None);
                self.status = Status::NoPlaylist;
            }
            Err(e) if self.playlist.is_some() => {
                tracing::warn!("Failed to refresh playlist, keeping the current one: {}", e);
                self.arm_retry();
            }
            Err(e) if self.settings.preview => {
                tracing::warn!("Failed to load playlist, showing demo content: {}", e);
                self.install(Playlist::demo(), Rebuild::Always);
                self.arm_retry();
            }
            Err(e) => {
                tracing::error!("Playlist could not be loaded: {}", e);
                self.tracker.teardown();
                self.status = Status::Error("Playlist could not be loaded".to_string());
                self.arm_retry();
            }
        }
    }

    fn install(&mut self, playlist: Playlist, rebuild: Rebuild) {
        if rebuild == Rebuild::IfChanged
            && self.status == Status::Playing
            && self.playlist.as_ref() == Some(&playlist)
        {
            tracing::debug!("Playlist {} unchanged", playlist.id);
            return;
        }

        let queues = partition(&playlist);
        self.tracker.rebuild(&queues);
        tracing::info!(
            "Playlist {} ready: {:?}{}, {} zone(s), {} item(s) scheduled",
            playlist.id,
            playlist.layout,
            if queues.degraded { " (degraded)" } else { "" },
            queues.zones.len(),
            queues.scheduled_len()
        );

        self.playlist = Some(playlist);
        self.status = Status::Playing;
    }

    async fn load_widgets(&mut self) {
        match self.api.fetch_widgets(self.settings.screen_id).await {
            Ok(widgets) => self.widgets = widgets,
            Err(e) => tracing::warn!("Failed to fetch widgets: {}", e),
        }
    }

    fn swap_subscription(&mut self, playlist_id: Option<i64>) {
        if self.subscribed_playlist == playlist_id {
            return;
        }
        if let Some(old) = self.subscribed_playlist.take() {
            self.channel.unsubscribe(Subscription::Playlist(old));
        }
        if let Some(id) = playlist_id {
            self.channel.subscribe(Subscription::Playlist(id));
        }
        self.subscribed_playlist = playlist_id;
    }

    fn arm_retry(&mut self) {
        self.retry
            .arm((), self.settings.reload_retry, &self.events, |generation| {
                PlayerEvent::RetryLoad { generation }
            });
    }

    fn start_heartbeat(&mut self) {
        if let Some(previous) = self.heartbeat.take() {
            previous.cancel();
        }

        let cancel = CancellationToken::new();
        let manager = HeartbeatManager::new(
            self.settings.screen_id,
            self.settings.heartbeat_interval,
            self.channel.clone(),
            self.api.clone(),
            self.report.clone(),
        );
        tokio::spawn(manager.start(cancel.clone()));
        self.heartbeat = Some(cancel);
    }

    /// Cancels every armed timer and forgets all screen state.
    fn teardown(&mut self) {
        self.tracker.teardown();
        self.alerts.clear();
        self.retry.cancel_all();
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.cancel();
        }
        self.playlist = None;
        self.widgets.clear();
    }

    fn frame(&self) -> Frame {
        match (&self.status, &self.playlist) {
            (Status::Loading, _) => Frame::Loading,
            (Status::Error(message), _) => Frame::Error {
                message: message.clone(),
                retry_in_secs: self.settings.reload_retry.as_secs(),
            },
            (Status::Playing, Some(playlist)) => Frame::Screen(compose(
                playlist,
                &self.tracker,
                &self.alerts.active(),
                &self.widgets,
            )),
            (Status::NoPlaylist, _) | (Status::Playing, None) => Frame::NoPlaylist,
        }
    }

    async fn render(&mut self) {
        let frame = self.frame();
        self.display.present(&frame);

        let status = match &self.status {
            Status::Loading => "loading",
            Status::NoPlaylist => "no_playlist",
            Status::Error(_) => "error",
            Status::Playing if self.tracker.is_paused() => "paused",
            Status::Playing => "playing",
        };
        let current_items: BTreeMap<String, i64> = self
            .tracker
            .zones()
            .iter()
            .filter_map(|zone| zone.current().map(|item| (zone.name.clone(), item.id)))
            .collect();

        let mut report = self.report.write().await;
        report.status = status.to_string();
        report.current_items = current_items;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;
    use crate::models::fixtures::{alert, item, playlist, video};
    use crate::models::{WidgetPosition, WidgetType};
    use crate::render::ZoneContent;
    use crate::testing::{FakeApi, RecordingDisplay};
    use crate::websocket_client::{
        AlertRef, ContentDeleted, ItemDeleted, PlaybackControl, PlaylistAssignment, PlaylistRef, ScreenRef,
    };
    use tokio::sync::mpsc;

    const SCREEN: i64 = 1;

    struct Harness {
        player: Player,
        rx: UnboundedReceiver<PlayerEvent>,
        api: Arc<FakeApi>,
        display: RecordingDisplay,
        channel: ChannelHandle,
    }

    fn settings(preview: bool) -> PlayerSettings {
        PlayerSettings {
            screen_id: SCREEN,
            preview,
            default_item_duration: Duration::from_secs(10),
            reload_retry: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(60),
        }
    }

    async fn started(api: FakeApi, preview: bool) -> Harness {
        let api = Arc::new(api);
        let display = RecordingDisplay::new();
        let (channel, _outbound) = ChannelHandle::detached();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut player = Player::new(
            settings(preview),
            api.clone(),
            channel.clone(),
            Box::new(display.clone()),
            tx,
        );
        player.start().await;

        Harness {
            player,
            rx,
            api,
            display,
            channel,
        }
    }

    impl Harness {
        async fn run_for(&mut self, secs: u64) {
            for _ in 0..secs {
                tokio::time::advance(Duration::from_secs(1)).await;
                for _ in 0..3 {
                    tokio::task::yield_now().await;
                }
                while let Ok(event) = self.rx.try_recv() {
                    self.player.handle_event(event).await;
                }
            }
        }

        async fn realtime(&mut self, event: RealtimeEvent) {
            self.player
                .handle_event(PlayerEvent::Realtime(event))
                .await;
        }

        fn screen(&self) -> crate::render::ScreenComposition {
            match self.display.last() {
                Some(Frame::Screen(screen)) => screen,
                other => panic!("expected a screen frame, got {:?}", other),
            }
        }

        fn showing(&self, zone: &str) -> Option<i64> {
            match &self.screen().zone(zone)?.content {
                ZoneContent::Item { item_id, .. } => Some(*item_id),
                ZoneContent::Empty => None,
            }
        }

        fn queue_ids(&self, zone: &str) -> Vec<i64> {
            self.player
                .tracker
                .zone(zone)
                .map(|z| z.queue.iter().map(|i| i.id).collect())
                .unwrap_or_default()
        }
    }

    fn three_items() -> Playlist {
        playlist(
            5,
            Layout::SingleZone,
            vec![item(1, "main", 0), item(2, "main", 1), item(3, "main", 2)],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_shows_playlist_and_subscribes() {
        let h = started(FakeApi::with_playlist(three_items()), false).await;

        assert_eq!(h.showing("main"), Some(1));
        assert_eq!(
            h.channel.subscriptions(),
            vec![Subscription::Screen(SCREEN), Subscription::Playlist(5)]
        );
        assert_eq!(h.player.tracker.pending_timers(), 1);

        let report = h.player.report.read().await.clone();
        assert_eq!(report.status, "playing");
        assert_eq!(report.current_items.get("main"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleting_an_item_mid_playback_rewinds() {
        let mut h = started(FakeApi::with_playlist(three_items()), false).await;
        h.run_for(20).await;
        assert_eq!(h.showing("main"), Some(3));

        h.api.update_playlist(|p| {
            p.remove_item(2);
        });
        h.realtime(RealtimeEvent::PlaylistItemDeleted(ItemDeleted {
            playlist_id: Some(5),
            item_id: 2,
        }))
        .await;

        assert_eq!(h.queue_ids("main"), vec![1, 3]);
        assert_eq!(h.player.tracker.current_index("main"), Some(0));
        assert_eq!(h.showing("main"), Some(1));
        assert_eq!(h.player.tracker.pending_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_item_disappears_even_if_refetch_fails() {
        let mut h = started(FakeApi::with_playlist(three_items()), false).await;
        h.api.fail_playlist(true);

        h.realtime(RealtimeEvent::PlaylistItemDeleted(ItemDeleted {
            playlist_id: Some(5),
            item_id: 1,
        }))
        .await;

        assert_eq!(h.queue_ids("main"), vec![2, 3]);
        assert_eq!(h.showing("main"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_deletion_removes_every_reference() {
        let mut list = three_items();
        list.items[2].content.id = 100;
        list.items[2].content_id = Some(100);
        let mut h = started(FakeApi::with_playlist(list), false).await;
        h.api.update_playlist(|p| {
            p.remove_content(100);
        });

        h.realtime(RealtimeEvent::ContentDeletedFromPlaylist(ContentDeleted {
            playlist_id: Some(5),
            content_id: 100,
        }))
        .await;

        assert_eq!(h.queue_ids("main"), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_other_playlists_are_ignored() {
        let mut h = started(FakeApi::with_playlist(three_items()), false).await;
        h.run_for(10).await;

        h.realtime(RealtimeEvent::PlaylistItemDeleted(ItemDeleted {
            playlist_id: Some(99),
            item_id: 2,
        }))
        .await;
        h.realtime(RealtimeEvent::PlaylistContentUpdated(PlaylistRef {
            playlist_id: Some(99),
        }))
        .await;

        assert_eq!(h.queue_ids("main"), vec![1, 2, 3]);
        assert_eq!(h.player.tracker.current_index("main"), Some(1));
        assert_eq!(h.api.playlist_fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_layout_change_regroups_zones() {
        let items = vec![
            item(1, "main", 0),
            item(2, "top_left", 0),
            item(3, "top_right", 0),
            item(4, "bottom_left", 0),
            item(5, "bottom_right", 0),
        ];
        let mut h = started(
            FakeApi::with_playlist(playlist(5, Layout::SingleZone, items)),
            false,
        )
        .await;
        assert_eq!(h.queue_ids("main"), vec![1]);

        h.api.update_playlist(|p| p.layout = Layout::Grid2x2);
        h.realtime(RealtimeEvent::PlaylistContentUpdated(PlaylistRef {
            playlist_id: Some(5),
        }))
        .await;

        let screen = h.screen();
        let names: Vec<&str> = screen.zones.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, ["top_left", "top_right", "bottom_left", "bottom_right"]);
        for zone in h.player.tracker.zones() {
            assert_eq!(zone.current_index(), 0);
        }
        assert_eq!(h.showing("top_right"), Some(3));
        // The "main" item is parked, not lost
        assert!(h.player.tracker.zone("main").is_none());
        assert_eq!(h.player.tracker.pending_timers(), 4);

        h.api.update_playlist(|p| p.layout = Layout::SingleZone);
        h.realtime(RealtimeEvent::PlaylistContentUpdated(PlaylistRef { playlist_id: None }))
            .await;
        assert_eq!(h.showing("main"), Some(1));
        assert_eq!(h.player.tracker.pending_timers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_control_is_filtered_by_screen() {
        let mut h = started(FakeApi::with_playlist(three_items()), false).await;
        h.run_for(10).await;

        h.realtime(RealtimeEvent::PlaybackControl(PlaybackControl {
            screen_id: Some(2),
            action: PlaybackAction::Stop,
        }))
        .await;
        assert!(!h.player.tracker.is_paused());
        assert_eq!(h.player.tracker.current_index("main"), Some(1));

        h.realtime(RealtimeEvent::PlaybackControl(PlaybackControl {
            screen_id: Some(SCREEN),
            action: PlaybackAction::Pause,
        }))
        .await;
        assert!(h.screen().paused);
        h.run_for(30).await;
        assert_eq!(h.player.tracker.current_index("main"), Some(1));
        assert_eq!(h.player.report.read().await.status, "paused");

        h.realtime(RealtimeEvent::PlaybackControl(PlaybackControl {
            screen_id: None,
            action: PlaybackAction::Play,
        }))
        .await;
        h.run_for(10).await;
        assert_eq!(h.player.tracker.current_index("main"), Some(2));

        h.realtime(RealtimeEvent::PlaybackControl(PlaybackControl {
            screen_id: Some(SCREEN),
            action: PlaybackAction::Stop,
        }))
        .await;
        assert_eq!(h.player.tracker.current_index("main"), Some(0));
        assert_eq!(h.player.tracker.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_assignment_reloads_everything() {
        let api = FakeApi::with_playlist(three_items());
        api.set_alerts(vec![alert(1, 0, false)]);
        let mut h = started(api, false).await;
        assert!(h.screen().content_occluded());
        let old_heartbeat = h.player.heartbeat.clone().unwrap();

        h.api.set_playlist(Some(playlist(
            6,
            Layout::SplitVertical,
            vec![item(7, "left", 0), item(8, "right", 0)],
        )));
        h.api.set_alerts(vec![]);
        h.realtime(RealtimeEvent::PlaylistChange(PlaylistAssignment {
            screen_id: Some(SCREEN),
            playlist_id: Some(6),
        }))
        .await;

        let screen = h.screen();
        assert_eq!(screen.playlist_id, 6);
        assert!(!screen.content_occluded());
        assert_eq!(h.showing("left"), Some(7));
        assert_eq!(
            h.channel.subscriptions(),
            vec![Subscription::Screen(SCREEN), Subscription::Playlist(6)]
        );
        assert!(old_heartbeat.is_cancelled());
        assert!(!h.player.heartbeat.as_ref().unwrap().is_cancelled());
        assert_eq!(h.player.tracker.pending_timers(), 2);
        assert_eq!(h.player.alerts.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_assignment_is_a_soft_refresh() {
        let mut h = started(FakeApi::with_playlist(three_items()), false).await;
        h.run_for(10).await;
        let heartbeat = h.player.heartbeat.clone().unwrap();

        h.realtime(RealtimeEvent::ScreenPlaylistUpdated(PlaylistAssignment {
            screen_id: Some(SCREEN),
            playlist_id: Some(5),
        }))
        .await;

        assert!(!heartbeat.is_cancelled());
        assert_eq!(h.player.tracker.current_index("main"), Some(0));
        assert_eq!(h.api.playlist_fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_playlist_assigned() {
        let mut h = started(FakeApi::new(), false).await;
        assert_eq!(h.display.last(), Some(Frame::NoPlaylist));
        assert_eq!(h.channel.subscriptions(), vec![Subscription::Screen(SCREEN)]);

        h.api.set_playlist(Some(three_items()));
        h.realtime(RealtimeEvent::ScreenPlaylistUpdated(PlaylistAssignment {
            screen_id: Some(SCREEN),
            playlist_id: Some(5),
        }))
        .await;
        assert_eq!(h.showing("main"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_shows_error_and_retries() {
        let api = FakeApi::with_playlist(three_items());
        api.fail_playlist(true);
        let mut h = started(api, false).await;

        assert_eq!(
            h.display.last(),
            Some(Frame::Error {
                message: "Playlist could not be loaded".to_string(),
                retry_in_secs: 30,
            })
        );

        h.api.fail_playlist(false);
        h.run_for(29).await;
        assert_eq!(h.api.playlist_fetches(), 1);

        h.run_for(1).await;
        assert_eq!(h.api.playlist_fetches(), 2);
        assert_eq!(h.showing("main"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_falls_back_to_demo_content() {
        let api = FakeApi::new();
        api.fail_playlist(true);
        let h = started(api, true).await;

        let screen = h.screen();
        assert_eq!(screen.playlist_id, Playlist::demo().id);
        assert!(h.showing("main").is_some());
        assert_eq!(h.channel.subscriptions(), vec![Subscription::Screen(SCREEN)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_keeps_playback_when_unchanged() {
        let mut h = started(FakeApi::with_playlist(three_items()), false).await;
        h.run_for(10).await;

        h.player.handle_event(PlayerEvent::ChannelReconnected).await;
        assert_eq!(h.player.tracker.current_index("main"), Some(1));

        h.api.update_playlist(|p| p.items.push(item(4, "main", 3)));
        h.player.handle_event(PlayerEvent::ChannelReconnected).await;
        assert_eq!(h.player.tracker.current_index("main"), Some(0));
        assert_eq!(h.queue_ids("main"), vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_occludes_until_it_expires() {
        let mut h = started(FakeApi::with_playlist(three_items()), false).await;

        h.realtime(RealtimeEvent::Alert(alert(7, 5, false))).await;
        assert!(h.screen().content_occluded());

        h.run_for(5).await;
        assert!(!h.screen().content_occluded());
        tokio::task::yield_now().await;
        assert_eq!(h.api.expired_alerts(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_alert_stays_until_dismissed() {
        let mut h = started(FakeApi::with_playlist(three_items()), false).await;
        h.realtime(RealtimeEvent::Alert(alert(8, 0, false))).await;
        h.realtime(RealtimeEvent::Alert(alert(9, 0, false))).await;

        h.run_for(600).await;
        let ids: Vec<i64> = h.screen().alerts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![9, 8]);

        h.realtime(RealtimeEvent::AlertDeleted(AlertRef { alert_id: 9 }))
            .await;
        h.realtime(RealtimeEvent::AlertDismissed(AlertRef { alert_id: 8 }))
            .await;
        assert!(!h.screen().content_occluded());
        tokio::task::yield_now().await;
        assert_eq!(h.api.expired_alerts(), vec![8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_widgets_refresh_for_this_screen_only() {
        let mut h = started(FakeApi::with_playlist(three_items()), false).await;
        let clock = Widget {
            id: 1,
            widget_type: WidgetType::Clock,
            position: WidgetPosition::TopRight,
            is_enabled: true,
            settings: None,
        };

        h.api.set_widgets(vec![clock.clone()]);
        h.realtime(RealtimeEvent::WidgetsUpdated(ScreenRef {
            screen_id: Some(SCREEN),
        }))
        .await;
        assert_eq!(h.screen().widgets.len(), 1);

        h.api.set_widgets(vec![clock.clone(), Widget { id: 2, ..clock }]);
        h.realtime(RealtimeEvent::WidgetsUpdated(ScreenRef { screen_id: Some(2) }))
            .await;
        assert_eq!(h.screen().widgets.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_end_advances_before_timer() {
        let list = playlist(
            5,
            Layout::SingleZone,
            vec![video(1, "main", 0, 20), item(2, "main", 1)],
        );
        let mut h = started(FakeApi::with_playlist(list), false).await;
        h.run_for(15).await;

        let cycle = h.screen().zone("main").unwrap().cycle;
        h.player
            .handle_event(PlayerEvent::VideoEnded {
                zone: "main".to_string(),
                cycle,
            })
            .await;
        assert_eq!(h.showing("main"), Some(2));

        // A late report for the same cycle changes nothing
        h.player
            .handle_event(PlayerEvent::VideoEnded {
                zone: "main".to_string(),
                cycle,
            })
            .await;
        assert_eq!(h.showing("main"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_the_loop() {
        let mut h = started(FakeApi::with_playlist(three_items()), false).await;
        assert!(!h.player.handle_event(PlayerEvent::Shutdown).await);
        assert!(h.display.count() >= 2);
    }
}
