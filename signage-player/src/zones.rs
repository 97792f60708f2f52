use crate::layout::{resolve_zones, ZoneRect, ZoneSpec};
use crate::models::{Playlist, PlaylistItem, DEFAULT_ZONE};

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneQueue {
    pub name: String,
    pub rect: ZoneRect,
    pub items: Vec<PlaylistItem>,
}

/// Per-zone ordered queues, in the layout's render order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZoneQueues {
    pub zones: Vec<ZoneQueue>,
    /// Set when a custom layout config was unusable and everything was put in "main".
    pub degraded: bool,
}

impl ZoneQueues {
    pub fn get(&self, zone: &str) -> Option<&ZoneQueue> {
        self.zones.iter().find(|q| q.name == zone)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.zones.iter().map(|q| q.name.as_str())
    }

    pub fn scheduled_len(&self) -> usize {
        self.zones.iter().map(|q| q.items.len()).sum()
    }
}

/// Groups a playlist's items into the zones of its layout.
///
/// Items tagged with a zone the layout doesn't know are left out of this pass;
/// they come back if the layout changes to one that has the zone.
pub fn partition(playlist: &Playlist) -> ZoneQueues {
    let (specs, degraded) =
        match resolve_zones(playlist.layout, playlist.custom_layout_config.as_ref()) {
            Ok(specs) => (specs, false),
            Err(e) => {
                tracing::warn!(
                    "Playlist {} custom layout unusable, falling back to single zone: {}",
                    playlist.id,
                    e
                );
                (
                    vec![ZoneSpec {
                        name: DEFAULT_ZONE.to_string(),
                        rect: ZoneRect::FULL,
                    }],
                    true,
                )
            }
        };

    let mut zones: Vec<ZoneQueue> = specs
        .into_iter()
        .map(|spec| ZoneQueue {
            name: spec.name,
            rect: spec.rect,
            items: Vec::new(),
        })
        .collect();

    let mut orphaned = 0;
    for item in &playlist.items {
        let target = if degraded {
            DEFAULT_ZONE
        } else {
            item.zone_name()
        };

        match zones.iter_mut().find(|q| q.name == target) {
            Some(queue) => queue.items.push(item.clone()),
            None => orphaned += 1,
        }
    }

    for queue in &mut zones {
        // sort_by_key is stable, so equal orders keep playlist order
        queue.items.sort_by_key(|item| item.order);
    }

    if orphaned > 0 {
        tracing::debug!(
            "Playlist {}: {} item(s) target zones outside layout {:?}",
            playlist.id,
            orphaned,
            playlist.layout
        );
    }

    ZoneQueues { zones, degraded }
}
