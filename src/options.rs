use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Tuning options for a [Pipeline](crate::Pipeline).
///
/// The defaults reproduce the stock behavior; embedders usually only
/// touch `pool_size` and, in tests, `divergence_seed`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Options {
    /// Worker threads per stage.
    pub pool_size: usize,
    /// Seconds of travel the waypoint buffer must stay ahead of the vehicle.
    pub waypoint_time_horizon: f64,
    /// Lower bound on the buffer horizon in m, for slow or stopped vehicles.
    pub minimum_horizon_length: f64,
    /// Seconds of travel used to pick the steering target waypoint.
    pub target_waypoint_time_horizon: f64,
    /// Lower bound on the steering target index.
    pub target_waypoint_horizon_length: usize,
    /// Lower bound on the junction look-ahead index.
    pub minimum_junction_look_ahead: usize,
    /// Speed limit in m/s above which a road counts as a highway for the
    /// junction-approach filter.
    pub highway_speed_threshold: f64,
    /// Edge length of the vicinity grid's cells in m. Should be at least
    /// the largest vehicle diameter plus a safety margin.
    pub vicinity_cell_edge: f64,
    /// Radius of the collision stage's neighbor query in m.
    pub collision_radius: f64,
    /// Whether a hazardous left lane change falls back to trying the
    /// right sibling. Off reproduces the stock left-first behavior.
    pub lane_change_both_sides: bool,
    /// Seed for the per-vehicle divergence bias. `None` draws one from the
    /// thread RNG; tests that need determinism set it explicitly.
    pub divergence_seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            pool_size: 4,
            waypoint_time_horizon: 3.0,
            minimum_horizon_length: 25.0,
            target_waypoint_time_horizon: 0.5,
            target_waypoint_horizon_length: 2,
            minimum_junction_look_ahead: 5,
            highway_speed_threshold: 50.0 / 3.6,
            vicinity_cell_edge: 4.0,
            collision_radius: 15.0,
            lane_change_both_sides: false,
            divergence_seed: None,
        }
    }
}

impl Options {
    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        if self.pool_size == 0 {
            return Err(PipelineError::InvalidPoolSize);
        }
        let positive = [
            ("waypoint_time_horizon", self.waypoint_time_horizon),
            ("minimum_horizon_length", self.minimum_horizon_length),
            (
                "target_waypoint_time_horizon",
                self.target_waypoint_time_horizon,
            ),
            ("highway_speed_threshold", self.highway_speed_threshold),
            ("vicinity_cell_edge", self.vicinity_cell_edge),
            ("collision_radius", self.collision_radius),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(PipelineError::NonPositiveOption { name });
            }
        }
        Ok(())
    }
}
