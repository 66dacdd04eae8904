use crate::math::{Point3d, Vector3d};
use crate::ActorId;
use cgmath::InnerSpace;
use serde::{Deserialize, Serialize};

/// A momentary snapshot of one vehicle's pose and dynamics,
/// as reported by the external simulator.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VehicleState {
    /// The world location of the vehicle's axle.
    pub location: Point3d,
    /// The vehicle's velocity vector in m/s.
    pub velocity: Vector3d,
    /// Unit vector in the direction the vehicle is facing.
    pub forward: Vector3d,
    /// Half-extents of the vehicle's bounding box in m.
    pub bounding_box_extent: Vector3d,
    /// The speed limit the vehicle is subject to, in m/s.
    pub speed_limit: f64,
}

impl VehicleState {
    /// The vehicle's scalar speed in m/s.
    pub fn speed(&self) -> f64 {
        self.velocity.magnitude()
    }
}

/// The state of a traffic light.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum LightState {
    Red,
    Amber,
    Green,
}

/// The external world the pipeline observes.
///
/// Implementations wrap the simulator's actor API. All methods are pull
/// queries made from stage worker threads, so implementations must be
/// cheap and thread-safe.
pub trait World: Send + Sync {
    /// The momentary state of an actor, or `None` if the simulator
    /// no longer knows it.
    fn vehicle(&self, actor: ActorId) -> Option<VehicleState>;

    /// Every vehicle actor currently in the world,
    /// including ones not under management.
    fn actors(&self) -> Vec<ActorId>;

    /// The state of the traffic light currently affecting an actor.
    fn light_state(&self, actor: ActorId) -> LightState;
}
