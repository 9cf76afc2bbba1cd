use anyhow::{Context, Result};
use bevy::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::game_logic::{DEFAULT_ROAD_HALF_WIDTH, DEFAULT_TRIGGER_RADIUS, PowerUpKind};

pub type RouteId = i32;

/// Throttle reduction applied to AI cars that pass a waypoint.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SlowDown {
    pub active: bool,
    /// Normalized throttle while the slowdown runs, in (0, 1].
    pub factor: f32,
    /// Seconds.
    pub duration: f32,
}

impl Default for SlowDown {
    fn default() -> Self {
        Self {
            active: false,
            factor: 1.0,
            duration: 1.0,
        }
    }
}

/// A waypoint marker as placed in the track file. Indices are only a sort key
/// and may contain gaps or duplicates.
#[derive(Clone, Debug, Deserialize)]
pub struct WaypointMarker {
    #[serde(default)]
    pub route_id: RouteId,
    pub index: i32,
    pub position: [f32; 3],
    #[serde(default = "default_start_height")]
    pub start_height: f32,
    #[serde(default)]
    pub slow_down: SlowDown,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_start_height() -> f32 {
    4.0
}

fn default_active() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq)]
pub struct Waypoint {
    pub route_id: RouteId,
    /// Dense 0-based position within the route.
    pub index: usize,
    pub position: Vec3,
    /// Height a car is placed at when it is reset onto this waypoint.
    pub start_height: f32,
    pub slow_down: SlowDown,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StartPosition {
    pub position: [f32; 3],
    #[serde(default)]
    pub yaw_deg: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PickupSpawn {
    pub kind: PowerUpKind,
    pub position: [f32; 3],
}

/// Pickup placements of the loaded track.
#[derive(Resource, Clone, Debug, Default)]
pub struct TrackPickups(pub Vec<PickupSpawn>);

/// Everything a track file describes.
#[derive(Clone, Debug, Deserialize)]
pub struct TrackFile {
    #[serde(default)]
    pub name: String,
    pub markers: Vec<WaypointMarker>,
    #[serde(default)]
    pub start_positions: Vec<StartPosition>,
    #[serde(default)]
    pub pickups: Vec<PickupSpawn>,
    #[serde(default = "default_trigger_radius")]
    pub trigger_radius: f32,
    #[serde(default = "default_road_half_width")]
    pub road_half_width: f32,
}

fn default_trigger_radius() -> f32 {
    DEFAULT_TRIGGER_RADIUS
}

fn default_road_half_width() -> f32 {
    DEFAULT_ROAD_HALF_WIDTH
}

pub fn load_track_file(path: impl AsRef<Path>) -> Result<TrackFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read track file {}", path.display()))?;
    let track: TrackFile = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse track file {}", path.display()))?;
    Ok(track)
}

/// Read-only waypoint lookup shared by every car. Built once before the race.
#[derive(Resource, Clone, Debug, Default)]
pub struct TrackGraph {
    routes: BTreeMap<RouteId, Vec<Waypoint>>,
    pub trigger_radius: f32,
    pub road_half_width: f32,
}

impl TrackGraph {
    /// Groups active markers by route, stable sorts each group by its marker
    /// index and re-stamps the index as the position inside the group.
    pub fn build(markers: &[WaypointMarker]) -> Self {
        let mut grouped: BTreeMap<RouteId, Vec<&WaypointMarker>> = BTreeMap::new();
        for marker in markers.iter().filter(|m| m.active) {
            grouped.entry(marker.route_id).or_default().push(marker);
        }

        let routes = grouped
            .into_iter()
            .map(|(route_id, mut group)| {
                group.sort_by_key(|m| m.index);
                let waypoints = group
                    .into_iter()
                    .enumerate()
                    .map(|(index, m)| Waypoint {
                        route_id,
                        index,
                        position: Vec3::from_array(m.position),
                        start_height: m.start_height,
                        slow_down: m.slow_down,
                    })
                    .collect();
                (route_id, waypoints)
            })
            .collect();

        Self {
            routes,
            trigger_radius: DEFAULT_TRIGGER_RADIUS,
            road_half_width: DEFAULT_ROAD_HALF_WIDTH,
        }
    }

    pub fn from_track_file(track: &TrackFile) -> Self {
        let mut graph = Self::build(&track.markers);
        graph.trigger_radius = track.trigger_radius;
        graph.road_half_width = track.road_half_width;
        graph
    }

    /// Waypoints of a route in driving order. Unknown routes are empty.
    pub fn route(&self, route_id: RouteId) -> &[Waypoint] {
        self.routes
            .get(&route_id)
            .map(|r| r.as_slice())
            .unwrap_or(&[])
    }

    pub fn route_ids(&self) -> impl Iterator<Item = RouteId> + '_ {
        self.routes.keys().copied()
    }

    pub fn route_len(&self, route_id: RouteId) -> usize {
        self.route(route_id).len()
    }

    pub fn waypoint(&self, route_id: RouteId, index: usize) -> Option<&Waypoint> {
        self.route(route_id).get(index)
    }

    pub fn is_valid_index(&self, route_id: RouteId, index: i64) -> bool {
        index >= 0 && (index as usize) < self.route_len(route_id)
    }

    /// Index after `index`, wrapping to the first waypoint past the end.
    pub fn next_index_wrapping(&self, route_id: RouteId, index: usize) -> usize {
        let next = index + 1;
        if next < self.route_len(route_id) { next } else { 0 }
    }
}
