use slotmap::{new_key_type, SlotMap};

pub mod math;

mod collision;
#[cfg(feature = "debug")]
mod debug;
mod distribution;
mod error;
mod frame;
mod grid;
mod localization;
mod map;
mod messages;
mod messenger;
mod options;
mod pipeline;
mod stage;
mod traffic_light;
mod util;
mod world;

pub use collision::CollisionStage;
#[cfg(feature = "debug")]
pub use debug::take_debug_frame;
pub use distribution::TrafficDistribution;
pub use error::PipelineError;
pub use frame::{Buffer, BufferHandle, BufferList, Frame};
pub use grid::VicinityGrid;
pub use localization::LocalizationStage;
pub use map::{GeoIds, Waypoint, WaypointAttributes, WaypointMap};
pub use messages::{
    CollisionToPlanner, CollisionToPlannerMessenger, LocalizationToCollision,
    LocalizationToCollisionMessenger, LocalizationToPlanner, LocalizationToPlannerMessenger,
    LocalizationToTrafficLight, LocalizationToTrafficLightMessenger, TrafficLightToPlanner,
    TrafficLightToPlannerMessenger,
};
pub use messenger::{DataPacket, Messenger};
pub use options::Options;
pub use pipeline::Pipeline;
pub use stage::{Stage, StageRunner};
pub use traffic_light::TrafficLightStage;
pub use world::{LightState, VehicleState, World};

new_key_type! {
    pub struct WaypointId;
}

/// Stable identifier assigned to each vehicle by the external simulator.
pub type ActorId = u64;

type WaypointSet = SlotMap<WaypointId, Waypoint>;
