//! Shared scaffolding: a scripted world and straight-road map builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use traffic_manager::math::{Point3d, Vector3d};
use traffic_manager::{
    ActorId, DataPacket, Frame, GeoIds, LightState, Messenger, VehicleState, WaypointAttributes,
    WaypointId, WaypointMap, World,
};

/// A world whose vehicles and lights are set directly by the test.
#[derive(Default)]
pub struct MockWorld {
    vehicles: Mutex<HashMap<ActorId, VehicleState>>,
    lights: Mutex<HashMap<ActorId, LightState>>,
}

impl MockWorld {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn put_vehicle(&self, actor: ActorId, state: VehicleState) {
        self.vehicles.lock().unwrap().insert(actor, state);
    }

    pub fn set_light(&self, actor: ActorId, state: LightState) {
        self.lights.lock().unwrap().insert(actor, state);
    }
}

impl World for MockWorld {
    fn vehicle(&self, actor: ActorId) -> Option<VehicleState> {
        self.vehicles.lock().unwrap().get(&actor).copied()
    }

    fn actors(&self) -> Vec<ActorId> {
        self.vehicles.lock().unwrap().keys().copied().collect()
    }

    fn light_state(&self, actor: ActorId) -> LightState {
        self.lights
            .lock()
            .unwrap()
            .get(&actor)
            .copied()
            .unwrap_or(LightState::Green)
    }
}

/// A vehicle at `(x, y)` heading along +x.
pub fn vehicle(x: f64, y: f64, speed: f64, speed_limit: f64) -> VehicleState {
    vehicle_heading(x, y, (1.0, 0.0), speed, speed_limit)
}

/// A vehicle at `(x, y)` with an explicit planar heading.
pub fn vehicle_heading(
    x: f64,
    y: f64,
    (fx, fy): (f64, f64),
    speed: f64,
    speed_limit: f64,
) -> VehicleState {
    VehicleState {
        location: Point3d::new(x, y, 0.0),
        velocity: Vector3d::new(fx * speed, fy * speed, 0.0),
        forward: Vector3d::new(fx, fy, 0.0),
        bounding_box_extent: Vector3d::new(2.4, 1.0, 0.8),
        speed_limit,
    }
}

/// Distance between adjacent lane centre lines, in m.
pub const LANE_WIDTH: f64 = 3.0;

/// Spacing between consecutive waypoints, in m.
pub const WAYPOINT_SPACING: f64 = 1.0;

/// Builds a straight lane along +x at `y` starting from `start_x`,
/// one waypoint per metre, and returns the nodes in order.
pub fn straight_lane(
    map: &mut WaypointMap,
    lane: i32,
    y: f64,
    start_x: f64,
    count: usize,
    uid_base: u64,
) -> Vec<WaypointId> {
    let nodes: Vec<WaypointId> = (0..count)
        .map(|i| {
            map.insert(WaypointAttributes {
                location: Point3d::new(start_x + i as f64 * WAYPOINT_SPACING, y, 0.0),
                geo: GeoIds {
                    road: 0,
                    section: 0,
                    lane,
                },
                is_junction: false,
                uid: uid_base + i as u64,
            })
        })
        .collect();
    for pair in nodes.windows(2) {
        map.link(pair[0], pair[1]);
    }
    nodes
}

/// Marks `left` as the left sibling of every node in `of`, index-wise.
pub fn set_left_siblings(map: &mut WaypointMap, of: &[WaypointId], left: &[WaypointId]) {
    for (a, b) in of.iter().zip(left) {
        map.set_left(*a, *b);
    }
}

/// A consumer on one planner-side messenger edge, tracking the state
/// counter the way an embedder would.
pub struct Feed<T> {
    messenger: Arc<Messenger<Arc<Frame<T>>>>,
    state: i64,
}

impl<T: Clone> Feed<T> {
    pub fn new(messenger: Arc<Messenger<Arc<Frame<T>>>>) -> Self {
        // Messengers start counting at zero; the producer may already have
        // pushed its first frame by the time the consumer attaches.
        Self {
            messenger,
            state: 0,
        }
    }

    /// Receives the next frame; panics if the pipeline stopped.
    pub fn recv(&mut self) -> Arc<Frame<T>> {
        let packet = self
            .messenger
            .receive(self.state)
            .expect("messenger stopped");
        self.state = packet.id;
        packet.data
    }
}

/// A producer on one messenger edge, for driving a stage by hand.
pub struct Source<T> {
    messenger: Arc<Messenger<Arc<Frame<T>>>>,
    state: i64,
}

impl<T: Clone> Source<T> {
    pub fn new(messenger: Arc<Messenger<Arc<Frame<T>>>>) -> Self {
        let state = messenger.state() - 1;
        Self { messenger, state }
    }

    pub fn send(&mut self, frame: Arc<Frame<T>>) {
        self.state = self.messenger.send(DataPacket {
            id: self.state,
            data: frame,
        });
    }
}
