use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::layout::ZoneRect;
use crate::models::PlaylistItem;
use crate::player::PlayerEvent;
use crate::timers::TimerSet;
use crate::zones::ZoneQueues;

/// Cursor into one zone's queue.
#[derive(Debug, Clone)]
pub struct ZoneTracker {
    pub name: String,
    pub rect: ZoneRect,
    pub queue: Vec<PlaylistItem>,
    current_index: usize,
    /// Bumped every time an item (re)starts; end-of-video reports must match it.
    cycle: u64,
}

impl ZoneTracker {
    pub fn current_index(&self) -> usize {
        if self.current_index < self.queue.len() {
            self.current_index
        } else {
            0
        }
    }

    pub fn current(&self) -> Option<&PlaylistItem> {
        self.queue.get(self.current_index())
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

/// Advances every zone on its own timer.
pub struct PlaybackTracker {
    zones: Vec<ZoneTracker>,
    timers: TimerSet<String>,
    paused: bool,
    default_duration: Duration,
    next_cycle: u64,
    events: UnboundedSender<PlayerEvent>,
}

impl PlaybackTracker {
    pub fn new(default_duration: Duration, events: UnboundedSender<PlayerEvent>) -> Self {
        Self {
            zones: Vec::new(),
            timers: TimerSet::new(),
            paused: false,
            default_duration,
            next_cycle: 1,
            events,
        }
    }

    /// Replaces every zone with the new queues. All cursors start at 0.
    pub fn rebuild(&mut self, queues: &ZoneQueues) {
        self.timers.cancel_all();
        self.zones = queues
            .zones
            .iter()
            .map(|queue| ZoneTracker {
                name: queue.name.clone(),
                rect: queue.rect,
                queue: queue.items.clone(),
                current_index: 0,
                cycle: 0,
            })
            .collect();

        tracing::debug!(
            "Rebuilt {} zone tracker(s), paused={}",
            self.zones.len(),
            self.paused
        );

        for idx in 0..self.zones.len() {
            self.start_zone(idx);
        }
    }

    /// Rewinds every zone to its first item without touching the queues.
    pub fn reset_indices(&mut self) {
        self.timers.cancel_all();
        for idx in 0..self.zones.len() {
            self.zones[idx].current_index = 0;
            self.start_zone(idx);
        }
    }

    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.timers.cancel_all();
        tracing::info!("Playback paused");
    }

    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        tracing::info!("Playback resumed");
        for idx in 0..self.zones.len() {
            self.start_zone(idx);
        }
    }

    /// Pauses and rewinds.
    pub fn stop(&mut self) {
        self.paused = true;
        self.timers.cancel_all();
        for zone in &mut self.zones {
            zone.current_index = 0;
        }
        tracing::info!("Playback stopped");
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Handles an elapsed duration timer. Returns true if the zone advanced.
    pub fn on_timer(&mut self, zone: &str, generation: u64) -> bool {
        if !self.timers.fire(&zone.to_string(), generation) {
            tracing::trace!("Ignoring stale timer for zone '{}'", zone);
            return false;
        }
        if self.paused {
            return false;
        }
        match self.zone_index(zone) {
            Some(idx) => {
                self.advance(idx);
                true
            }
            None => false,
        }
    }

    /// Natural end of a video. Wins over the duration timer, which is cancelled.
    pub fn on_video_ended(&mut self, zone: &str, cycle: u64) -> bool {
        if self.paused {
            return false;
        }
        let Some(idx) = self.zone_index(zone) else {
            return false;
        };

        let tracker = &self.zones[idx];
        if tracker.cycle != cycle || !tracker.current().map(|i| i.is_video()).unwrap_or(false) {
            tracing::trace!("Ignoring stale video end for zone '{}'", zone);
            return false;
        }

        self.timers.cancel(&tracker.name);
        self.advance(idx);
        true
    }

    /// Cancels every timer and forgets all zones.
    pub fn teardown(&mut self) {
        self.timers.cancel_all();
        self.zones.clear();
    }

    pub fn zones(&self) -> &[ZoneTracker] {
        &self.zones
    }

    pub fn zone(&self, name: &str) -> Option<&ZoneTracker> {
        self.zones.iter().find(|z| z.name == name)
    }

    pub fn current_index(&self, zone: &str) -> Option<usize> {
        self.zone(zone).map(|z| z.current_index())
    }

    pub fn current_item(&self, zone: &str) -> Option<&PlaylistItem> {
        self.zone(zone).and_then(|z| z.current())
    }

    pub fn has_timer(&self, zone: &str) -> bool {
        self.timers.is_armed(&zone.to_string())
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    fn zone_index(&self, zone: &str) -> Option<usize> {
        self.zones.iter().position(|z| z.name == zone)
    }

    fn advance(&mut self, idx: usize) {
        let tracker = &mut self.zones[idx];
        let len = tracker.queue.len();
        if len == 0 {
            return;
        }
        tracker.current_index = (tracker.current_index() + 1) % len;
        tracing::debug!(
            "Zone '{}' advanced to {}/{}",
            tracker.name,
            tracker.current_index + 1,
            len
        );
        self.start_zone(idx);
    }

    fn start_zone(&mut self, idx: usize) {
        let cycle = self.next_cycle;
        self.next_cycle += 1;

        let tracker = &mut self.zones[idx];
        tracker.cycle = cycle;

        if self.paused {
            return;
        }
        let Some(item) = tracker.current() else {
            return;
        };

        let delay = item.effective_duration(self.default_duration);
        let zone = tracker.name.clone();
        tracing::trace!("Zone '{}' item {} for {:?}", zone, item.id, delay);

        self.timers
            .arm(zone.clone(), delay, &self.events, |generation| {
                PlayerEvent::ZoneElapsed { zone, generation }
            });
    }
}
