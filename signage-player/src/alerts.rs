use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::api::ContentApi;
use crate::models::Alert;
use crate::player::PlayerEvent;
use crate::timers::TimerSet;

#[derive(Debug, Clone)]
struct ActiveAlert {
    alert: Alert,
    /// Activation order, used to render the newest alert first.
    seq: u64,
}

/// Full-screen alerts layered above zone playback.
pub struct AlertOverlay {
    active: HashMap<i64, ActiveAlert>,
    timers: TimerSet<i64>,
    next_seq: u64,
    preview: bool,
    api: Arc<dyn ContentApi>,
    events: UnboundedSender<PlayerEvent>,
}

impl AlertOverlay {
    pub fn new(api: Arc<dyn ContentApi>, preview: bool, events: UnboundedSender<PlayerEvent>) -> Self {
        Self {
            active: HashMap::new(),
            timers: TimerSet::new(),
            next_seq: 1,
            preview,
            api,
            events,
        }
    }

    pub fn upsert(&mut self, alert: Alert) {
        let id = alert.id;

        if !alert.is_active {
            // An inactive push is never added; one already showing is withdrawn
            if !self.delete(id) {
                tracing::debug!("Ignoring inactive alert {}", id);
            }
            return;
        }

        if alert.auto_expires() {
            let delay = Duration::from_secs(alert.duration);
            self.timers.arm(id, delay, &self.events, |generation| {
                PlayerEvent::AlertElapsed {
                    alert_id: id,
                    generation,
                }
            });
        } else {
            self.timers.cancel(&id);
        }

        match self.active.get_mut(&id) {
            Some(existing) => {
                tracing::info!("Alert {} updated", id);
                existing.alert = alert;
            }
            None => {
                tracing::info!(
                    "Alert {} activated (duration={}s, fixed={})",
                    id,
                    alert.duration,
                    alert.is_fixed
                );
                let seq = self.next_seq;
                self.next_seq += 1;
                self.active.insert(id, ActiveAlert { alert, seq });
            }
        }
    }

    /// Handles an elapsed expiry timer.
    pub fn on_timer(&mut self, alert_id: i64, generation: u64) -> bool {
        if !self.timers.fire(&alert_id, generation) {
            tracing::trace!("Ignoring stale expiry for alert {}", alert_id);
            return false;
        }
        self.expire(alert_id)
    }

    /// Removes the alert and tells the content API it expired.
    pub fn expire(&mut self, alert_id: i64) -> bool {
        self.timers.cancel(&alert_id);
        if self.active.remove(&alert_id).is_none() {
            return false;
        }
        tracing::info!("Alert {} expired", alert_id);

        if !self.preview {
            let api = self.api.clone();
            tokio::spawn(async move {
                if let Err(e) = api.mark_alert_expired(alert_id).await {
                    tracing::warn!("Failed to mark alert {} expired: {}", alert_id, e);
                }
            });
        }
        true
    }

    /// Operator dismissal; same bookkeeping as an expiry.
    pub fn dismiss(&mut self, alert_id: i64) -> bool {
        self.expire(alert_id)
    }

    /// The alert was deleted upstream, so nothing is reported back.
    pub fn delete(&mut self, alert_id: i64) -> bool {
        self.timers.cancel(&alert_id);
        let removed = self.active.remove(&alert_id).is_some();
        if removed {
            tracing::info!("Alert {} deleted", alert_id);
        }
        removed
    }

    /// Replaces the active set with a fresh fetch.
    pub fn replace_all(&mut self, alerts: Vec<Alert>) {
        self.clear();
        for alert in alerts {
            self.upsert(alert);
        }
    }

    /// Reconciles with a fresh fetch without restarting running timers.
    pub fn sync(&mut self, alerts: Vec<Alert>) {
        let stale: Vec<i64> = self
            .active
            .keys()
            .filter(|id| !alerts.iter().any(|a| a.id == **id && a.is_active))
            .copied()
            .collect();
        for id in stale {
            self.delete(id);
        }

        for alert in alerts {
            match self.active.get(&alert.id) {
                Some(existing) if existing.alert == alert => {}
                _ => self.upsert(alert),
            }
        }
    }

    pub fn clear(&mut self) {
        self.timers.cancel_all();
        self.active.clear();
    }

    /// Newest first.
    pub fn active(&self) -> Vec<&Alert> {
        let mut alerts: Vec<&ActiveAlert> = self.active.values().collect();
        alerts.sort_by(|a, b| b.seq.cmp(&a.seq));
        alerts.into_iter().map(|a| &a.alert).collect()
    }

    pub fn is_active(&self, alert_id: i64) -> bool {
        self.active.contains_key(&alert_id)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn has_timer(&self, alert_id: i64) -> bool {
        self.timers.is_armed(&alert_id)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}
