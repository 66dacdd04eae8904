//! The typed payloads flowing along the pipeline's five messenger edges.

use crate::frame::{BufferHandle, Frame};
use crate::messenger::Messenger;
use crate::{ActorId, WaypointId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Steering hint for one vehicle: how far its heading deviates from the
/// target waypoint, and whether a real junction is coming up.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LocalizationToPlanner {
    pub actor: ActorId,
    /// Signed heading error in [-2, 2]: `(1 - cos θ) · sign(cross_z)`.
    pub deviation: f64,
    pub approaching_true_junction: bool,
}

/// One vehicle's published trajectory, handed to the collision stage.
#[derive(Clone)]
pub struct LocalizationToCollision {
    pub actor: ActorId,
    /// View of the vehicle's buffer slot in the published buffer list.
    pub buffer: BufferHandle,
}

/// The waypoints the traffic-light stage gates on.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LocalizationToTrafficLight {
    pub actor: ActorId,
    pub closest_waypoint: WaypointId,
    pub junction_look_ahead: WaypointId,
}

/// Collision hazard verdict for one vehicle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CollisionToPlanner {
    pub actor: ActorId,
    pub hazard: bool,
}

/// Traffic-light verdict for one vehicle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrafficLightToPlanner {
    pub actor: ActorId,
    pub must_stop: bool,
}

pub type LocalizationToPlannerMessenger = Messenger<Arc<Frame<LocalizationToPlanner>>>;
pub type LocalizationToCollisionMessenger = Messenger<Arc<Frame<LocalizationToCollision>>>;
pub type LocalizationToTrafficLightMessenger = Messenger<Arc<Frame<LocalizationToTrafficLight>>>;
pub type CollisionToPlannerMessenger = Messenger<Arc<Frame<CollisionToPlanner>>>;
pub type TrafficLightToPlannerMessenger = Messenger<Arc<Frame<TrafficLightToPlanner>>>;
