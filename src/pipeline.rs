use crate::collision::CollisionStage;
use crate::error::PipelineError;
use crate::localization::LocalizationStage;
use crate::map::WaypointMap;
use crate::messages::{
    CollisionToPlannerMessenger, LocalizationToPlannerMessenger, TrafficLightToPlannerMessenger,
};
use crate::messenger::Messenger;
use crate::options::Options;
use crate::stage::StageRunner;
use crate::traffic_light::TrafficLightStage;
use crate::world::World;
use crate::ActorId;
use log::debug;
use std::sync::Arc;

/// The running decision core: three stages wired through five messengers.
///
/// The embedder constructs one per fixed set of managed vehicles, drains
/// the three planner-side messengers every simulation tick, and calls
/// [stop](Self::stop) to tear everything down.
pub struct Pipeline {
    localization: StageRunner,
    collision: StageRunner,
    traffic_light: StageRunner,
    localization_stage: Arc<LocalizationStage>,
    planner_output: Arc<LocalizationToPlannerMessenger>,
    collision_output: Arc<CollisionToPlannerMessenger>,
    traffic_light_output: Arc<TrafficLightToPlannerMessenger>,
}

impl Pipeline {
    /// Wires the messengers, builds the stages, and starts their threads.
    ///
    /// The vehicle set is fixed for the lifetime of the pipeline.
    pub fn start(
        world: Arc<dyn World>,
        map: Arc<WaypointMap>,
        actors: Vec<ActorId>,
        options: Options,
    ) -> Result<Self, PipelineError> {
        options.validate()?;
        if actors.is_empty() {
            return Err(PipelineError::NoVehicles);
        }
        if map.is_empty() {
            return Err(PipelineError::EmptyMap);
        }

        let planner_output = Arc::new(Messenger::new());
        let collision_output = Arc::new(Messenger::new());
        let traffic_light_output = Arc::new(Messenger::new());
        let to_collision = Arc::new(Messenger::new());
        let to_traffic_light = Arc::new(Messenger::new());

        let localization_stage = Arc::new(LocalizationStage::new(
            world.clone(),
            map.clone(),
            actors.clone(),
            planner_output.clone(),
            to_collision.clone(),
            to_traffic_light.clone(),
            &options,
        ));
        let collision_stage = Arc::new(CollisionStage::new(
            world.clone(),
            map.clone(),
            &actors,
            to_collision,
            collision_output.clone(),
            &options,
        ));
        let traffic_light_stage = Arc::new(TrafficLightStage::new(
            world,
            map,
            &actors,
            to_traffic_light,
            traffic_light_output.clone(),
        ));

        let vehicles = actors.len();
        let pool_size = options.pool_size;
        let localization = StageRunner::start(localization_stage.clone(), pool_size, vehicles)?;
        let collision = match StageRunner::start(collision_stage, pool_size, vehicles) {
            Ok(runner) => runner,
            Err(err) => {
                let _ = localization.stop();
                return Err(err);
            }
        };
        let traffic_light = match StageRunner::start(traffic_light_stage, pool_size, vehicles) {
            Ok(runner) => runner,
            Err(err) => {
                let _ = localization.stop();
                let _ = collision.stop();
                return Err(err);
            }
        };

        debug!("pipeline started with {vehicles} vehicles");
        Ok(Self {
            localization,
            collision,
            traffic_light,
            localization_stage,
            planner_output,
            collision_output,
            traffic_light_output,
        })
    }

    /// The steering-hint messenger the planner receives from.
    pub fn localization_output(&self) -> Arc<LocalizationToPlannerMessenger> {
        self.planner_output.clone()
    }

    /// The collision-hazard messenger the planner receives from.
    pub fn collision_output(&self) -> Arc<CollisionToPlannerMessenger> {
        self.collision_output.clone()
    }

    /// The traffic-light messenger the planner receives from.
    pub fn traffic_light_output(&self) -> Arc<TrafficLightToPlannerMessenger> {
        self.traffic_light_output.clone()
    }

    /// How many per-vehicle ticks localization has dropped because the
    /// vehicle could not be placed on the map.
    pub fn skipped_ticks(&self) -> u64 {
        self.localization_stage.skipped()
    }

    /// Stops every messenger and stage and joins all threads.
    ///
    /// Returns the first stage failure, if any thread panicked while the
    /// pipeline was running.
    pub fn stop(self) -> Result<(), PipelineError> {
        let results = [
            self.localization.stop(),
            self.collision.stop(),
            self.traffic_light.stop(),
        ];
        debug!("pipeline stopped");
        results.into_iter().collect()
    }
}
