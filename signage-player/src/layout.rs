use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Zone topology of a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    #[default]
    SingleZone,
    SplitVertical,
    SplitHorizontal,
    PipBottomRight,
    #[serde(rename = "grid_2x2")]
    Grid2x2,
    #[serde(rename = "grid_3x3")]
    Grid3x3,
    SidebarLeft,
    SidebarRight,
    HeaderFooter,
    TripleVertical,
    TripleHorizontal,
    Carousel,
    WebScroll,
    CustomLayout,
}

/// Rectangle in percent of the screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ZoneRect {
    pub const FULL: ZoneRect = ZoneRect::new(0.0, 0.0, 100.0, 100.0);

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSpec {
    pub name: String,
    pub rect: ZoneRect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomLayoutConfig {
    #[serde(default)]
    pub zones: Vec<CustomZone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomZone {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default = "full_extent")]
    pub width: f32,
    #[serde(default = "full_extent")]
    pub height: f32,
}

fn full_extent() -> f32 {
    100.0
}

impl CustomLayoutConfig {
    /// Accepts the config either as JSON text or as an embedded object.
    pub fn parse(raw: Option<&serde_json::Value>) -> Result<Self> {
        let config: CustomLayoutConfig = match raw {
            None | Some(serde_json::Value::Null) => {
                return Err(anyhow!("custom layout has no zone configuration"))
            }
            Some(serde_json::Value::String(text)) => serde_json::from_str(text)?,
            Some(value) => serde_json::from_value(value.clone())?,
        };

        if config.zones.is_empty() {
            return Err(anyhow!("custom layout configuration defines no zones"));
        }

        Ok(config)
    }
}

const THIRD: f32 = 100.0 / 3.0;

impl Layout {
    /// Fixed zone table. `CustomLayout` has no static zones; see [`resolve_zones`].
    pub fn zone_specs(self) -> Vec<ZoneSpec> {
        match self {
            Layout::SingleZone | Layout::Carousel | Layout::WebScroll | Layout::CustomLayout => {
                named(&[("main", ZoneRect::FULL)])
            }
            Layout::SplitVertical => named(&[
                ("left", ZoneRect::new(0.0, 0.0, 50.0, 100.0)),
                ("right", ZoneRect::new(50.0, 0.0, 50.0, 100.0)),
            ]),
            Layout::SplitHorizontal => named(&[
                ("top", ZoneRect::new(0.0, 0.0, 100.0, 50.0)),
                ("bottom", ZoneRect::new(0.0, 50.0, 100.0, 50.0)),
            ]),
            Layout::PipBottomRight => named(&[
                ("main", ZoneRect::FULL),
                ("pip", ZoneRect::new(70.0, 70.0, 25.0, 25.0)),
            ]),
            Layout::Grid2x2 => named(&[
                ("top_left", ZoneRect::new(0.0, 0.0, 50.0, 50.0)),
                ("top_right", ZoneRect::new(50.0, 0.0, 50.0, 50.0)),
                ("bottom_left", ZoneRect::new(0.0, 50.0, 50.0, 50.0)),
                ("bottom_right", ZoneRect::new(50.0, 50.0, 50.0, 50.0)),
            ]),
            Layout::Grid3x3 => grid_3x3(),
            Layout::SidebarLeft => named(&[
                ("sidebar", ZoneRect::new(0.0, 0.0, 25.0, 100.0)),
                ("main", ZoneRect::new(25.0, 0.0, 75.0, 100.0)),
            ]),
            Layout::SidebarRight => named(&[
                ("main", ZoneRect::new(0.0, 0.0, 75.0, 100.0)),
                ("sidebar", ZoneRect::new(75.0, 0.0, 25.0, 100.0)),
            ]),
            Layout::HeaderFooter => named(&[
                ("header", ZoneRect::new(0.0, 0.0, 100.0, 15.0)),
                ("main", ZoneRect::new(0.0, 15.0, 100.0, 70.0)),
                ("footer", ZoneRect::new(0.0, 85.0, 100.0, 15.0)),
            ]),
            Layout::TripleVertical => named(&[
                ("left", ZoneRect::new(0.0, 0.0, THIRD, 100.0)),
                ("center", ZoneRect::new(THIRD, 0.0, THIRD, 100.0)),
                ("right", ZoneRect::new(2.0 * THIRD, 0.0, THIRD, 100.0)),
            ]),
            Layout::TripleHorizontal => named(&[
                ("top", ZoneRect::new(0.0, 0.0, 100.0, THIRD)),
                ("middle", ZoneRect::new(0.0, THIRD, 100.0, THIRD)),
                ("bottom", ZoneRect::new(0.0, 2.0 * THIRD, 100.0, THIRD)),
            ]),
        }
    }
}

fn named(specs: &[(&str, ZoneRect)]) -> Vec<ZoneSpec> {
    specs
        .iter()
        .map(|(name, rect)| ZoneSpec {
            name: name.to_string(),
            rect: *rect,
        })
        .collect()
}

fn grid_3x3() -> Vec<ZoneSpec> {
    (0..9)
        .map(|i| ZoneSpec {
            name: format!("grid_{}", i + 1),
            rect: ZoneRect::new((i % 3) as f32 * THIRD, (i / 3) as f32 * THIRD, THIRD, THIRD),
        })
        .collect()
}

/// Zones for a playlist layout. An `Err` means a custom layout whose config is
/// unusable; callers degrade to the single "main" zone.
pub fn resolve_zones(
    layout: Layout,
    custom_config: Option<&serde_json::Value>,
) -> Result<Vec<ZoneSpec>> {
    if layout != Layout::CustomLayout {
        return Ok(layout.zone_specs());
    }

    let config = CustomLayoutConfig::parse(custom_config)?;
    let mut specs: Vec<ZoneSpec> = Vec::with_capacity(config.zones.len());
    for zone in config.zones {
        // Duplicate names would split one queue across two regions
        if specs.iter().any(|s| s.name == zone.id) {
            tracing::warn!("Custom layout repeats zone '{}', keeping the first", zone.id);
            continue;
        }
        specs.push(ZoneSpec {
            name: zone.id,
            rect: ZoneRect::new(zone.x, zone.y, zone.width, zone.height),
        });
    }

    Ok(specs)
}
