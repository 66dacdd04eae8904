use crate::math::Point3d;
use crate::{WaypointId, WaypointSet};
use cgmath::MetricSpace;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// The road-network coordinates of a waypoint: the triple that names a
/// single lane of a single road section.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct GeoIds {
    pub road: u32,
    pub section: u32,
    pub lane: i32,
}

/// A node in the directed waypoint graph.
///
/// Nodes are owned by the [WaypointMap] arena and referenced by
/// [WaypointId] handles, which keeps the graph cheap to traverse and safe
/// to cycle (loops, roundabouts).
#[derive(Clone, Serialize, Deserialize)]
pub struct Waypoint {
    /// The world location of the node.
    pub location: Point3d,
    /// The lane the node belongs to.
    pub geo: GeoIds,
    /// Whether the node is part of an intersection.
    pub is_junction: bool,
    /// Stable node id from the source map; feeds the divergence choice.
    pub uid: u64,
    /// The successor nodes. More than one marks a divergence.
    pub next: SmallVec<[WaypointId; 2]>,
    /// The lateral sibling on the left, if the lane has one.
    pub left: Option<WaypointId>,
    /// The lateral sibling on the right, if the lane has one.
    pub right: Option<WaypointId>,
}

/// The attributes of a waypoint.
pub struct WaypointAttributes {
    /// The world location of the node.
    pub location: Point3d,
    /// The lane the node belongs to.
    pub geo: GeoIds,
    /// Whether the node is part of an intersection.
    pub is_junction: bool,
    /// Stable node id from the source map.
    pub uid: u64,
}

/// An in-memory snapshot of the map's waypoint graph.
///
/// The embedder populates the arena once at startup; the pipeline holds it
/// behind an `Arc` and never mutates it.
#[derive(Default, Serialize, Deserialize)]
pub struct WaypointMap {
    waypoints: WaypointSet,
}

impl WaypointMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a waypoint to the map.
    pub fn insert(&mut self, attribs: WaypointAttributes) -> WaypointId {
        self.waypoints.insert(Waypoint {
            location: attribs.location,
            geo: attribs.geo,
            is_junction: attribs.is_junction,
            uid: attribs.uid,
            next: SmallVec::new(),
            left: None,
            right: None,
        })
    }

    /// Connects `from` to its successor `to`.
    pub fn link(&mut self, from: WaypointId, to: WaypointId) {
        self.waypoints[from].next.push(to);
    }

    /// Records `left` as the left lateral sibling of `of`.
    pub fn set_left(&mut self, of: WaypointId, left: WaypointId) {
        self.waypoints[of].left = Some(left);
    }

    /// Records `right` as the right lateral sibling of `of`.
    pub fn set_right(&mut self, of: WaypointId, right: WaypointId) {
        self.waypoints[of].right = Some(right);
    }

    /// Flags a waypoint as belonging to an intersection.
    pub fn set_junction(&mut self, of: WaypointId, is_junction: bool) {
        self.waypoints[of].is_junction = is_junction;
    }

    /// Finds the waypoint closest to the given location,
    /// or `None` if the map is empty.
    pub fn closest_waypoint(&self, location: Point3d) -> Option<WaypointId> {
        self.waypoints
            .iter()
            .min_by(|(_, a), (_, b)| {
                let da = a.location.distance2(location);
                let db = b.location.distance2(location);
                da.total_cmp(&db)
            })
            .map(|(id, _)| id)
    }

    /// The number of waypoints in the map.
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Returns true if the map holds no waypoints.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

impl std::ops::Index<WaypointId> for WaypointMap {
    type Output = Waypoint;

    fn index(&self, id: WaypointId) -> &Waypoint {
        &self.waypoints[id]
    }
}
