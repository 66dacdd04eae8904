use crate::frame::{BufferHandle, Frame};
use crate::grid::VicinityGrid;
use crate::map::WaypointMap;
use crate::math::{flat_unit, flatten, ConvexPolygon, Point2d, Vector2d};
use crate::messages::{
    CollisionToPlanner, CollisionToPlannerMessenger, LocalizationToCollision,
    LocalizationToCollisionMessenger,
};
use crate::messenger::DataPacket;
use crate::options::Options;
use crate::stage::Stage;
use crate::util::lock;
use crate::world::{VehicleState, World};
use crate::ActorId;
use cgmath::InnerSpace;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shortest trajectory extrusion, in m, so even a stopped vehicle claims
/// the road directly ahead of its bumper.
const MINIMUM_BOUNDARY_LENGTH: f64 = 3.0;

/// Seconds of travel covered by the trajectory extrusion.
const BOUNDARY_TIME_HORIZON: f64 = 2.0;

/// Lateral clearance added around the vehicle's own half width, in m.
const BOUNDARY_WIDTH_MARGIN: f64 = 0.5;

/// How often the world is re-scanned for vehicles outside management.
const WORLD_REFRESH_PERIOD: Duration = Duration::from_secs(1);

struct MessengerStates {
    localization: i64,
    planner: i64,
}

/// The stage that predicts trajectory-level collisions by overlapping
/// geodesic boundaries, i.e. footprints extruded forward along each
/// vehicle's waypoint buffer.
pub struct CollisionStage {
    world: Arc<dyn World>,
    map: Arc<WaypointMap>,
    /// Slot index of every managed actor.
    index_of: HashMap<ActorId, usize>,
    collision_radius: f64,

    localization_messenger: Arc<LocalizationToCollisionMessenger>,
    planner_messenger: Arc<CollisionToPlannerMessenger>,
    planner_frames: [Arc<Frame<CollisionToPlanner>>; 2],
    frame_selector: AtomicBool,
    messenger_states: Mutex<MessengerStates>,

    /// The localization frame being worked this tick.
    input: Mutex<Option<Arc<Frame<LocalizationToCollision>>>>,

    grid: VicinityGrid,
    /// Actors present in the world but not under management, refreshed at
    /// most once per [WORLD_REFRESH_PERIOD].
    unregistered: Mutex<HashMap<ActorId, VehicleState>>,
    last_world_refresh: Mutex<Option<Instant>>,
}

impl CollisionStage {
    pub fn new(
        world: Arc<dyn World>,
        map: Arc<WaypointMap>,
        actors: &[ActorId],
        localization_messenger: Arc<LocalizationToCollisionMessenger>,
        planner_messenger: Arc<CollisionToPlannerMessenger>,
        options: &Options,
    ) -> Self {
        let vehicles = actors.len();
        let index_of = actors
            .iter()
            .enumerate()
            .map(|(index, actor)| (*actor, index))
            .collect();
        let messenger_states = MessengerStates {
            localization: localization_messenger.state() - 1,
            planner: planner_messenger.state() - 1,
        };
        Self {
            world,
            map,
            index_of,
            collision_radius: options.collision_radius,
            localization_messenger,
            planner_messenger,
            planner_frames: [Arc::new(Frame::new(vehicles)), Arc::new(Frame::new(vehicles))],
            frame_selector: AtomicBool::new(true),
            messenger_states: Mutex::new(messenger_states),
            input: Mutex::new(None),
            grid: VicinityGrid::new(options.vicinity_cell_edge),
            unregistered: Mutex::new(HashMap::new()),
            last_world_refresh: Mutex::new(None),
        }
    }

    /// Re-scans the world for unmanaged vehicles, walltime-thresholded so
    /// the full actor listing is not pulled every tick.
    fn refresh_unregistered(&self) {
        let mut last = lock(&self.last_world_refresh);
        let now = Instant::now();
        if let Some(instant) = *last {
            if now.duration_since(instant) < WORLD_REFRESH_PERIOD {
                return;
            }
        }
        *last = Some(now);
        drop(last);

        let mut snapshot = HashMap::new();
        for actor in self.world.actors() {
            if self.index_of.contains_key(&actor) {
                continue;
            }
            if let Some(state) = self.world.vehicle(actor) {
                self.grid.update(actor, state.location);
                snapshot.insert(actor, state);
            }
        }
        let mut unregistered = lock(&self.unregistered);
        for actor in unregistered.keys() {
            if !snapshot.contains_key(actor) {
                self.grid.remove(*actor);
            }
        }
        *unregistered = snapshot;
    }

    fn process_vehicle(&self, input: &Frame<LocalizationToCollision>, index: usize) {
        let Some(message) = input.get(index) else {
            return;
        };
        let actor = message.actor;
        let Some(state) = self.world.vehicle(actor) else {
            return;
        };
        self.grid.update(actor, state.location);

        let boundary = self.geodesic_boundary(&state, &message.buffer);
        #[cfg(feature = "debug")]
        crate::debug::debug_polygon("geodesic", boundary.verts().iter().copied());

        let mut hazard = false;
        for other in self.grid.neighbors(state.location, self.collision_radius) {
            if other == actor {
                continue;
            }
            if let Some(&other_index) = self.index_of.get(&other) {
                let Some(other_message) = input.get(other_index) else {
                    continue;
                };
                let Some(other_state) = self.world.vehicle(other) else {
                    continue;
                };
                let other_boundary =
                    self.geodesic_boundary(&other_state, &other_message.buffer);
                // Symmetric overlap: the lower id yields so exactly one
                // side of every deadlocked pair brakes.
                if boundary.overlaps(&other_boundary) && actor < other {
                    hazard = true;
                    break;
                }
            } else {
                let Some(other_state) = lock(&self.unregistered).get(&other).copied() else {
                    continue;
                };
                if boundary.overlaps(&footprint(&other_state)) {
                    hazard = true;
                    break;
                }
            }
        }

        let selector = self.frame_selector.load(Ordering::SeqCst) as usize;
        self.planner_frames[selector].set(index, CollisionToPlanner { actor, hazard });
    }

    /// The vehicle's footprint extruded forward along its buffer: a
    /// quadrilateral from the axle to the point where the buffer has
    /// covered the speed-scaled horizon.
    fn geodesic_boundary(&self, state: &VehicleState, buffer: &BufferHandle) -> ConvexPolygon {
        let length = (state.speed() * BOUNDARY_TIME_HORIZON).max(MINIMUM_BOUNDARY_LENGTH);
        let half_width = state.bounding_box_extent.y + BOUNDARY_WIDTH_MARGIN;
        let back = flatten(state.location);

        let front = buffer.with(|buffer| {
            let mut covered = 0.0;
            let mut reached = back;
            for &waypoint in buffer {
                let location = flatten(self.map[waypoint].location);
                covered += (location - reached).magnitude();
                reached = location;
                if covered >= length {
                    break;
                }
            }
            reached
        });

        let axis = front - back;
        if axis.magnitude() > 2.0 * f64::EPSILON {
            quad(back, front, axis.normalize(), half_width)
        } else {
            // No usable trajectory: fall back to the straight-ahead
            // extrusion, or the parked footprint if the heading is gone.
            match flat_unit(state.forward) {
                Some(direction) => quad(back, back + length * direction, direction, half_width),
                None => footprint(state),
            }
        }
    }
}

/// A quadrilateral of the given half width spanning `back` to `front`.
fn quad(back: Point2d, front: Point2d, direction: Vector2d, half_width: f64) -> ConvexPolygon {
    let lateral = half_width * Vector2d::new(-direction.y, direction.x);
    ConvexPolygon::new([back + lateral, back - lateral, front - lateral, front + lateral])
}

/// The plain bounding-box footprint of a vehicle, used for actors whose
/// trajectory is unknown.
fn footprint(state: &VehicleState) -> ConvexPolygon {
    let centre = flatten(state.location);
    let forward = flat_unit(state.forward).unwrap_or(Vector2d::new(1.0, 0.0));
    let lateral = Vector2d::new(-forward.y, forward.x);
    let x = state.bounding_box_extent.x;
    let y = state.bounding_box_extent.y;
    ConvexPolygon::new([
        centre - x * forward - y * lateral,
        centre + x * forward - y * lateral,
        centre + x * forward + y * lateral,
        centre - x * forward + y * lateral,
    ])
}

impl Stage for CollisionStage {
    fn name(&self) -> &'static str {
        "collision"
    }

    fn receive(&self) {
        let localization_state = lock(&self.messenger_states).localization;
        if let Some(packet) = self.localization_messenger.receive(localization_state) {
            lock(&self.messenger_states).localization = packet.id;
            *lock(&self.input) = Some(packet.data);
        }
        self.refresh_unregistered();
    }

    fn action(&self, range: Range<usize>) {
        let Some(input) = lock(&self.input).clone() else {
            return;
        };
        for index in range {
            self.process_vehicle(&input, index);
        }
    }

    fn send(&self) {
        let mut states = lock(&self.messenger_states);
        let selector = self.frame_selector.load(Ordering::SeqCst) as usize;
        let packet = DataPacket {
            id: states.planner,
            data: self.planner_frames[selector].clone(),
        };
        self.frame_selector.store(selector == 0, Ordering::SeqCst);
        states.planner = self.planner_messenger.send(packet);
    }

    fn stop_messengers(&self) {
        self.localization_messenger.stop();
        self.planner_messenger.stop();
    }
}
