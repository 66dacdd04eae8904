use crate::distribution::TrafficDistribution;
use crate::frame::{Buffer, BufferHandle, BufferList, Frame};
use crate::map::WaypointMap;
use crate::math::{deviation_cross, deviation_dot, Point3d};
use crate::messages::{
    LocalizationToCollision, LocalizationToCollisionMessenger, LocalizationToPlanner,
    LocalizationToPlannerMessenger, LocalizationToTrafficLight, LocalizationToTrafficLightMessenger,
};
use crate::messenger::DataPacket;
use crate::options::Options;
use crate::stage::Stage;
use crate::util::lock;
use crate::world::World;
use crate::ActorId;
use cgmath::MetricSpace;
use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

mod lane_change;

/// Post-send messenger states, touched only by the sender thread.
struct MessengerStates {
    planner: i64,
    collision: i64,
    traffic_light: i64,
}

/// The stage that keeps every vehicle's waypoint buffer current and
/// derives the steering deviation, lane changes, and the inputs the
/// collision and traffic-light stages work from.
pub struct LocalizationStage {
    world: Arc<dyn World>,
    map: Arc<WaypointMap>,
    actors: Vec<ActorId>,
    index_of: HashMap<ActorId, usize>,
    options: Options,

    /// Double-buffered waypoint buffers; the collision selector picks the
    /// half being written this tick, the other half is what the collision
    /// stage last received.
    buffers: [Arc<BufferList>; 2],
    planner_frames: [Arc<Frame<LocalizationToPlanner>>; 2],
    collision_frames: [Arc<Frame<LocalizationToCollision>>; 2],
    traffic_light_frames: [Arc<Frame<LocalizationToTrafficLight>>; 2],
    planner_selector: AtomicBool,
    collision_selector: AtomicBool,
    traffic_light_selector: AtomicBool,

    planner_messenger: Arc<LocalizationToPlannerMessenger>,
    collision_messenger: Arc<LocalizationToCollisionMessenger>,
    traffic_light_messenger: Arc<LocalizationToTrafficLightMessenger>,
    messenger_states: Mutex<MessengerStates>,

    distribution: TrafficDistribution,
    /// Stable per-vehicle bias applied at divergences.
    divergence_choice: Vec<u64>,
    /// Where each vehicle last switched lanes. Recorded for parity with
    /// the planner's debugging overlays; nothing gates on it.
    last_lane_change_location: Mutex<Vec<Point3d>>,
    skipped: AtomicU64,
}

impl LocalizationStage {
    pub fn new(
        world: Arc<dyn World>,
        map: Arc<WaypointMap>,
        actors: Vec<ActorId>,
        planner_messenger: Arc<LocalizationToPlannerMessenger>,
        collision_messenger: Arc<LocalizationToCollisionMessenger>,
        traffic_light_messenger: Arc<LocalizationToTrafficLightMessenger>,
        options: &Options,
    ) -> Self {
        let vehicles = actors.len();
        let index_of = actors
            .iter()
            .enumerate()
            .map(|(index, actor)| (*actor, index))
            .collect();
        let mut rng = match options.divergence_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let divergence_choice = (0..vehicles).map(|_| rng.gen()).collect();
        let last_lane_change_location = actors
            .iter()
            .map(|actor| {
                world
                    .vehicle(*actor)
                    .map(|state| state.location)
                    .unwrap_or_else(|| Point3d::new(0.0, 0.0, 0.0))
            })
            .collect();
        let messenger_states = MessengerStates {
            planner: planner_messenger.state() - 1,
            collision: collision_messenger.state() - 1,
            traffic_light: traffic_light_messenger.state() - 1,
        };

        Self {
            world,
            map,
            actors,
            index_of,
            options: options.clone(),
            buffers: [
                Arc::new(BufferList::new(vehicles)),
                Arc::new(BufferList::new(vehicles)),
            ],
            planner_frames: [Arc::new(Frame::new(vehicles)), Arc::new(Frame::new(vehicles))],
            collision_frames: [Arc::new(Frame::new(vehicles)), Arc::new(Frame::new(vehicles))],
            traffic_light_frames: [
                Arc::new(Frame::new(vehicles)),
                Arc::new(Frame::new(vehicles)),
            ],
            planner_selector: AtomicBool::new(true),
            collision_selector: AtomicBool::new(true),
            traffic_light_selector: AtomicBool::new(true),
            planner_messenger,
            collision_messenger,
            traffic_light_messenger,
            messenger_states: Mutex::new(messenger_states),
            distribution: TrafficDistribution::new(),
            divergence_choice,
            last_lane_change_location: Mutex::new(last_lane_change_location),
            skipped: AtomicU64::new(0),
        }
    }

    /// Ticks a stage's worth of work has been dropped because a vehicle
    /// could not be placed on the map.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    fn process_vehicle(&self, index: usize) {
        let actor = self.actors[index];
        let Some(state) = self.world.vehicle(actor) else {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            warn!("vehicle {actor} unavailable this tick; keeping last hints");
            return;
        };
        let speed = state.speed();
        let horizon = (self.options.waypoint_time_horizon * speed)
            .max(self.options.minimum_horizon_length);

        let collision_selector = self.collision_selector.load(Ordering::SeqCst) as usize;
        let current = &self.buffers[collision_selector];
        let other = &self.buffers[collision_selector ^ 1];

        // Sync a lane change decided last tick from the other buffer half,
        // then drop waypoints the vehicle has already passed.
        let front = {
            let mut buffer = current.slot(index);
            let other_buffer = other.slot(index);
            if let (Some(&own_front), Some(&other_front)) = (buffer.front(), other_buffer.front())
            {
                let own = self.map[own_front].geo;
                let sibling = self.map[other_front].geo;
                if own.lane != sibling.lane || own.section != sibling.section {
                    buffer.clear();
                    buffer.extend(other_buffer.iter().copied());
                    lock(&self.last_lane_change_location)[index] = state.location;
                }
            }
            drop(other_buffer);

            while let Some(&front) = buffer.front() {
                let dot = deviation_dot(state.forward, state.location, self.map[front].location);
                if dot <= 0.0 {
                    buffer.pop_front();
                } else {
                    break;
                }
            }

            if buffer.is_empty() {
                match self.map.closest_waypoint(state.location) {
                    Some(waypoint) => buffer.push_back(waypoint),
                    None => {
                        self.skipped.fetch_add(1, Ordering::SeqCst);
                        warn!("vehicle {actor} is off the map; keeping last hints");
                        return;
                    }
                }
            }
            *buffer.front().expect("buffer reseeded above")
        };

        let front_geo = self.map[front].geo;
        self.distribution.update_vehicle(actor, front_geo);

        // Lane changes are never initiated from inside a junction.
        let reseed = if !self.map[front].is_junction {
            self.assign_lane_change(index, actor, &state, front, front_geo, collision_selector)
        } else {
            None
        };

        let mut buffer = current.slot(index);
        if let Some(change_over_point) = reseed {
            buffer.clear();
            buffer.push_back(change_over_point);
        }
        self.extend_buffer(&mut buffer, index, horizon);

        let front = *buffer.front().expect("buffer is never empty here");
        let back = *buffer.back().expect("buffer is never empty here");

        // Steering target: a velocity-scaled index into the buffer.
        let target_index = ((speed * self.options.target_waypoint_time_horizon).ceil() as usize)
            .max(self.options.target_waypoint_horizon_length)
            .min(buffer.len() - 1);
        let target = self.map[buffer[target_index]].location;
        let dot = deviation_dot(state.forward, state.location, target);
        let cross = deviation_cross(state.forward, state.location, target);
        let mut deviation = 1.0 - dot;
        if cross < 0.0 {
            deviation *= -1.0;
        }

        // Junction look-ahead, with the highway false-junction filter:
        // above the speed threshold only a real divergence on the way
        // there counts.
        let look_ahead_index = ((2.0 * speed).floor() as usize)
            .max(self.options.minimum_junction_look_ahead);
        let look_ahead = if buffer.len() > look_ahead_index {
            buffer[look_ahead_index]
        } else {
            back
        };
        let mut approaching_junction = false;
        if self.map[look_ahead].is_junction && !self.map[front].is_junction {
            if state.speed_limit > self.options.highway_speed_threshold {
                approaching_junction = buffer
                    .iter()
                    .take(look_ahead_index)
                    .any(|&waypoint| self.map[waypoint].next.len() > 1);
            } else {
                approaching_junction = true;
            }
        }

        #[cfg(feature = "debug")]
        crate::debug::debug_polyline(
            "buffer",
            buffer
                .iter()
                .take(5)
                .map(|&waypoint| crate::math::flatten(self.map[waypoint].location)),
        );
        drop(buffer);

        let planner_selector = self.planner_selector.load(Ordering::SeqCst) as usize;
        self.planner_frames[planner_selector].set(
            index,
            LocalizationToPlanner {
                actor,
                deviation,
                approaching_true_junction: approaching_junction,
            },
        );
        self.collision_frames[collision_selector].set(
            index,
            LocalizationToCollision {
                actor,
                buffer: BufferHandle::new(current.clone(), index),
            },
        );
        let traffic_light_selector = self.traffic_light_selector.load(Ordering::SeqCst) as usize;
        self.traffic_light_frames[traffic_light_selector].set(
            index,
            LocalizationToTrafficLight {
                actor,
                closest_waypoint: front,
                junction_look_ahead: look_ahead,
            },
        );
    }

    /// Appends successors until the buffer spans the horizon or the map
    /// runs out of road. Divergences are resolved with the vehicle's
    /// stable bias so its route preference does not flicker across ticks.
    fn extend_buffer(&self, buffer: &mut Buffer, index: usize, horizon: f64) {
        loop {
            let front = self.map[*buffer.front().expect("extend on empty buffer")].location;
            let back = *buffer.back().expect("extend on empty buffer");
            if self.map[back].location.distance(front) > horizon {
                return;
            }
            let next = &self.map[back].next;
            let choice = match next.len() {
                0 => return,
                1 => 0,
                fanout => {
                    let bias = self.divergence_choice[index]
                        .wrapping_mul(1 + self.map[back].uid);
                    (bias % fanout as u64) as usize
                }
            };
            let successor = next[choice];
            buffer.push_back(successor);
        }
    }
}

impl Stage for LocalizationStage {
    fn name(&self) -> &'static str {
        "localization"
    }

    /// Localization has no upstream stage; its tick rate is set entirely
    /// by how fast the planner drains the output messenger.
    fn receive(&self) {}

    fn action(&self, range: Range<usize>) {
        for index in range {
            self.process_vehicle(index);
        }
    }

    fn send(&self) {
        let mut states = lock(&self.messenger_states);

        // The planner edge always carries the freshest frame.
        let selector = self.planner_selector.load(Ordering::SeqCst) as usize;
        let packet = DataPacket {
            id: states.planner,
            data: self.planner_frames[selector].clone(),
        };
        self.planner_selector
            .store(selector == 0, Ordering::SeqCst);
        states.planner = self.planner_messenger.send(packet);

        // The collision and traffic-light edges only hand off when the
        // downstream stage has consumed the previous frame; otherwise the
        // workers keep refreshing the unpublished half and the slower
        // stage picks up the latest state whenever it next receives.
        if self.collision_messenger.state() != states.collision {
            let selector = self.collision_selector.load(Ordering::SeqCst) as usize;
            let packet = DataPacket {
                id: states.collision,
                data: self.collision_frames[selector].clone(),
            };
            states.collision = self.collision_messenger.send(packet);
            self.collision_selector
                .store(selector == 0, Ordering::SeqCst);
        }

        if self.traffic_light_messenger.state() != states.traffic_light {
            let selector = self.traffic_light_selector.load(Ordering::SeqCst) as usize;
            let packet = DataPacket {
                id: states.traffic_light,
                data: self.traffic_light_frames[selector].clone(),
            };
            states.traffic_light = self.traffic_light_messenger.send(packet);
            self.traffic_light_selector
                .store(selector == 0, Ordering::SeqCst);
        }
    }

    fn stop_messengers(&self) {
        self.planner_messenger.stop();
        self.collision_messenger.stop();
        self.traffic_light_messenger.stop();
    }
}
