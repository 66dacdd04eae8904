//! Scenario tests for the localization stage, driven tick by tick on the
//! current thread so buffer contents stay deterministic.

mod common;

use common::*;
use std::sync::Arc;
use traffic_manager::{
    ActorId, Frame, LocalizationStage, LocalizationToCollision, LocalizationToPlanner,
    LocalizationToTrafficLight, Messenger, Options, Stage, WaypointMap,
};

fn options() -> Options {
    Options {
        pool_size: 1,
        divergence_seed: Some(7),
        ..Default::default()
    }
}

struct Harness {
    stage: LocalizationStage,
    planner: Feed<LocalizationToPlanner>,
    collision: Feed<LocalizationToCollision>,
    traffic_light: Feed<LocalizationToTrafficLight>,
    vehicles: usize,
}

struct Tick {
    planner: Arc<Frame<LocalizationToPlanner>>,
    collision: Arc<Frame<LocalizationToCollision>>,
    traffic_light: Arc<Frame<LocalizationToTrafficLight>>,
}

impl Harness {
    fn new(world: Arc<MockWorld>, map: Arc<WaypointMap>, actors: Vec<ActorId>) -> Self {
        let planner_messenger = Arc::new(Messenger::new());
        let collision_messenger = Arc::new(Messenger::new());
        let traffic_light_messenger = Arc::new(Messenger::new());
        let vehicles = actors.len();
        let stage = LocalizationStage::new(
            world,
            map,
            actors,
            planner_messenger.clone(),
            collision_messenger.clone(),
            traffic_light_messenger.clone(),
            &options(),
        );
        Self {
            stage,
            planner: Feed::new(planner_messenger),
            collision: Feed::new(collision_messenger),
            traffic_light: Feed::new(traffic_light_messenger),
            vehicles,
        }
    }

    fn tick(&mut self) -> Tick {
        self.stage.receive();
        self.stage.action(0..self.vehicles);
        self.stage.send();
        Tick {
            planner: self.planner.recv(),
            collision: self.collision.recv(),
            traffic_light: self.traffic_light.recv(),
        }
    }
}

/// The span in metres covered by one vehicle's buffer.
fn buffer_span(tick: &Tick, map: &WaypointMap, index: usize) -> f64 {
    tick.collision
        .get(index)
        .expect("collision frame written")
        .buffer
        .with(|buffer| {
            let front = map[*buffer.front().unwrap()].location;
            let back = map[*buffer.back().unwrap()].location;
            back.x - front.x
        })
}

/// The lane and x position of one vehicle's buffer front.
fn front_lane_and_x(tick: &Tick, map: &WaypointMap, index: usize) -> (i32, f64) {
    let front = tick
        .collision
        .get(index)
        .expect("collision frame written")
        .buffer
        .front()
        .expect("buffer is non-empty after a tick");
    (map[front].geo.lane, map[front].location.x)
}

/// A lone vehicle on a straight junction-free lane drives dead ahead:
/// no deviation, no junction warning, and a buffer covering the full
/// velocity-scaled horizon.
#[test]
fn solo_straight_highway() {
    let world = Arc::new(MockWorld::new());
    world.put_vehicle(1, vehicle(0.0, 0.0, 30.0, 30.0));
    let mut map = WaypointMap::new();
    straight_lane(&mut map, 1, 0.0, 0.0, 200, 0);
    let map = Arc::new(map);

    let mut harness = Harness::new(world, map.clone(), vec![1]);
    let tick = harness.tick();

    let hint = tick.planner.get(0).expect("planner frame written");
    assert!(hint.deviation.abs() < 1e-9);
    assert!(!hint.approaching_true_junction);

    // Horizon is 3 s at 30 m/s.
    assert!(buffer_span(&tick, &map, 0) >= 90.0);

    // Every remaining node is ahead of the vehicle.
    let (_, front_x) = front_lane_and_x(&tick, &map, 0);
    assert!(front_x > 0.0);
}

/// The deviation is bounded by [-2, 2], grows with the heading error, and
/// carries the sign of the side the target lies on.
#[test]
fn deviation_is_monotone_in_heading_error() {
    let world = Arc::new(MockWorld::new());
    world.put_vehicle(1, vehicle(0.0, 0.0, 10.0, 14.0));
    let mut map = WaypointMap::new();
    straight_lane(&mut map, 1, 0.0, 0.0, 60, 0);
    let map = Arc::new(map);

    let mut harness = Harness::new(world.clone(), map, vec![1]);

    let mut last_magnitude = -1.0;
    for angle in [0.0, 0.5, 1.0, 2.0, 3.0f64] {
        world.put_vehicle(
            1,
            vehicle_heading(0.0, 0.0, (angle.cos(), angle.sin()), 10.0, 14.0),
        );
        let tick = harness.tick();
        let deviation = tick.planner.get(0).unwrap().deviation;

        assert!((-2.0..=2.0).contains(&deviation));
        if angle > 0.0 {
            // Target is to the vehicle's right once it yaws left.
            assert!(deviation <= 0.0);
        }
        assert!(deviation.abs() > last_magnitude);
        last_magnitude = deviation.abs();
    }
}

/// A follower stuck behind a slow leader moves to an empty left lane,
/// reseeding its buffer from the sibling waypoint walked forward by the
/// change-over distance.
#[test]
fn lane_change_into_empty_left_lane() {
    let world = Arc::new(MockWorld::new());
    world.put_vehicle(10, vehicle(0.0, 0.0, 10.0, 14.0));
    world.put_vehicle(11, vehicle(15.0, 0.0, 2.0, 14.0));

    let mut map = WaypointMap::new();
    let lane_1 = straight_lane(&mut map, 1, 0.0, 0.0, 60, 0);
    let lane_2 = straight_lane(&mut map, 2, LANE_WIDTH, 0.0, 60, 1000);
    set_left_siblings(&mut map, &lane_1, &lane_2);
    let map = Arc::new(map);

    let mut harness = Harness::new(world, map.clone(), vec![10, 11]);
    let mut last = None;
    for _ in 0..4 {
        last = Some(harness.tick());
    }
    let tick = last.unwrap();

    // The follower crossed over: front on the left lane, five waypoints
    // (the minimum change-over distance) past the sibling at x = 1.
    let (lane, x) = front_lane_and_x(&tick, &map, 0);
    assert_eq!(lane, 2);
    assert!((x - 6.0).abs() < 1e-9);

    // The leader had nothing to overtake and stayed put.
    let (lane, _) = front_lane_and_x(&tick, &map, 1);
    assert_eq!(lane, 1);
}

/// Same congestion, but a trailing vehicle on the left lane would reach
/// the merge point later than the follower does, so the change is
/// abandoned and the buffer stays on the original lane.
#[test]
fn lane_change_blocked_by_target_lane_hazard() {
    let world = Arc::new(MockWorld::new());
    world.put_vehicle(10, vehicle(0.0, 0.0, 10.0, 14.0));
    world.put_vehicle(11, vehicle(15.0, 0.0, 2.0, 14.0));
    world.put_vehicle(12, vehicle(-5.0, LANE_WIDTH, 12.0, 14.0));

    let mut map = WaypointMap::new();
    let lane_1 = straight_lane(&mut map, 1, 0.0, 0.0, 60, 0);
    // The left lane starts further back so the hazard vehicle sits on it.
    let lane_2 = straight_lane(&mut map, 2, LANE_WIDTH, -20.0, 61, 1000);
    set_left_siblings(&mut map, &lane_1, &lane_2[20..]);
    let map = Arc::new(map);

    let mut harness = Harness::new(world, map.clone(), vec![10, 11, 12]);
    for _ in 0..4 {
        let tick = harness.tick();
        let (lane, _) = front_lane_and_x(&tick, &map, 0);
        assert_eq!(lane, 1, "hazard on the target lane must veto the change");
    }
}

/// On a highway, a junction at the look-ahead index is ignored unless a
/// real divergence sits on the way there.
#[test]
fn highway_junction_without_divergence_is_filtered() {
    let world = Arc::new(MockWorld::new());
    world.put_vehicle(1, vehicle(0.0, 0.0, 20.0, 25.0));
    let mut map = WaypointMap::new();
    let nodes = straight_lane(&mut map, 1, 0.0, 0.0, 80, 0);
    // Look-ahead index is 2 * 20 = 40; the front is the node at x = 1,
    // so the look-ahead lands at x = 41.
    for node in &nodes[41..61] {
        map.set_junction(*node, true);
    }
    let map = Arc::new(map);

    let mut harness = Harness::new(world, map, vec![1]);
    let tick = harness.tick();
    assert!(!tick.planner.get(0).unwrap().approaching_true_junction);
}

/// Below the highway threshold the same junction gates unconditionally.
#[test]
fn urban_junction_is_always_flagged() {
    let world = Arc::new(MockWorld::new());
    world.put_vehicle(1, vehicle(0.0, 0.0, 10.0, 10.0));
    let mut map = WaypointMap::new();
    let nodes = straight_lane(&mut map, 1, 0.0, 0.0, 60, 0);
    // Look-ahead index is 20; the front is at x = 1.
    for node in &nodes[21..41] {
        map.set_junction(*node, true);
    }
    let map = Arc::new(map);

    let mut harness = Harness::new(world, map.clone(), vec![1]);
    let tick = harness.tick();
    assert!(tick.planner.get(0).unwrap().approaching_true_junction);

    // The traffic-light stage gets the same look-ahead node.
    let message = tick.traffic_light.get(0).unwrap();
    assert!(map[message.junction_look_ahead].is_junction);
    assert!(!map[message.closest_waypoint].is_junction);
}

/// A stopped vehicle still gets a full minimum-length buffer and a
/// steering hint.
#[test]
fn zero_velocity_uses_minimum_horizons() {
    let world = Arc::new(MockWorld::new());
    world.put_vehicle(1, vehicle(0.0, 0.0, 0.0, 14.0));
    let mut map = WaypointMap::new();
    straight_lane(&mut map, 1, 0.0, 0.0, 60, 0);
    let map = Arc::new(map);

    let mut harness = Harness::new(world, map.clone(), vec![1]);
    let tick = harness.tick();

    assert!(tick.planner.get(0).unwrap().deviation.abs() < 1e-9);
    assert!(buffer_span(&tick, &map, 0) >= 25.0);
}

/// A map that ends early clamps the target index instead of running off
/// the buffer.
#[test]
fn short_map_clamps_target_index() {
    let world = Arc::new(MockWorld::new());
    world.put_vehicle(1, vehicle(0.0, 0.0, 10.0, 14.0));
    let mut map = WaypointMap::new();
    straight_lane(&mut map, 1, 0.0, 0.0, 2, 0);
    let map = Arc::new(map);

    let mut harness = Harness::new(world, map.clone(), vec![1]);
    for _ in 0..2 {
        let tick = harness.tick();
        assert!(tick.planner.get(0).unwrap().deviation.abs() < 1e-9);
        let nodes = tick
            .collision
            .get(0)
            .unwrap()
            .buffer
            .with(|buffer| buffer.len());
        assert!(nodes >= 1);
    }
}
