use super::LocalizationStage;
use crate::map::GeoIds;
use crate::math::deviation_dot;
use crate::world::VehicleState;
use crate::{ActorId, WaypointId};
use cgmath::MetricSpace;
use std::collections::HashSet;

/// Distance within which a slower co-lane leader counts as blocking, in m.
const BLOCKER_DISTANCE: f64 = 20.0;

/// Cosine of 135 degrees: a trailing vehicle bearing wider than this off
/// our heading is already committed across the merge point.
const REAR_BEARING_LIMIT: f64 = -std::f64::consts::FRAC_1_SQRT_2;

/// Gap kept clear ahead of the merge point, before accounting for the
/// change-over run and the vehicle's own length.
const MERGE_FRONT_MARGIN: f64 = 1.0;

impl LocalizationStage {
    /// Decides whether the vehicle should leave its lane this tick and, if
    /// the move is hazard-free, returns the waypoint to reseed the buffer
    /// from: the chosen sibling walked `change_over_distance` successors
    /// forward so the crossing happens at speed.
    ///
    /// The left sibling is preferred; the right is only considered when no
    /// left sibling exists, or after a hazardous left when
    /// `lane_change_both_sides` is set.
    pub(super) fn assign_lane_change(
        &self,
        index: usize,
        actor: ActorId,
        state: &VehicleState,
        front: WaypointId,
        front_geo: GeoIds,
        selector: usize,
    ) -> Option<WaypointId> {
        let co_lane = self.distribution.vehicles_on(front_geo);
        if co_lane.len() < 2 {
            return None;
        }

        let left = self.map[front].left;
        let right = self.map[front].right;
        let current = &self.buffers[selector];

        let mut direction_left = None;
        for &other in &co_lane {
            if other == actor {
                continue;
            }
            let Some(&other_index) = self.index_of.get(&other) else {
                continue;
            };
            let Some(other_front) = current.front(other_index) else {
                continue;
            };
            let other_location = self.map[other_front].location;
            let ahead = deviation_dot(state.forward, state.location, other_location) > 0.0;
            if !ahead || other_location.distance(state.location) >= BLOCKER_DISTANCE {
                continue;
            }

            // A blocker ahead: move over only if the sibling lane is
            // meaningfully emptier than ours.
            if let Some(sibling) = left {
                if self.lane_is_emptier(front_geo, sibling, co_lane.len()) {
                    direction_left = Some(true);
                    break;
                }
            } else if let Some(sibling) = right {
                if self.lane_is_emptier(front_geo, sibling, co_lane.len()) {
                    direction_left = Some(false);
                    break;
                }
            }
        }
        let direction_left = direction_left?;

        let change_over_distance = ((0.5 * state.speed()).ceil() as usize).max(5);

        let mut candidates: Vec<WaypointId> = Vec::with_capacity(2);
        if direction_left {
            candidates.extend(left);
            if self.options.lane_change_both_sides {
                candidates.extend(right);
            }
        } else {
            candidates.extend(right);
        }

        for change_over_point in candidates {
            let target_lane = self.map[change_over_point].geo.lane;
            let target_geo = GeoIds {
                lane: target_lane,
                ..front_geo
            };
            let on_target = self.distribution.vehicles_on(target_geo);
            if self.target_lane_hazard(
                actor,
                state,
                change_over_point,
                target_lane,
                &on_target,
                change_over_distance,
                selector,
            ) {
                continue;
            }
            return Some(self.walk_forward(change_over_point, change_over_distance));
        }
        None
    }

    /// True when moving to `sibling`'s lane relieves the congestion:
    /// our lane must hold more than one extra vehicle.
    fn lane_is_emptier(&self, front_geo: GeoIds, sibling: WaypointId, co_lane: usize) -> bool {
        let sibling_geo = GeoIds {
            lane: self.map[sibling].geo.lane,
            ..front_geo
        };
        let sibling_count = self.distribution.vehicles_on(sibling_geo).len();
        co_lane as i64 - sibling_count as i64 > 1
    }

    /// Scans the target lane for a vehicle that would make the merge
    /// unsafe. Trailing vehicles are hazards when their bearing has
    /// already swung past the rear limit or when they would take longer
    /// to reach the merge point than we do; leading vehicles are hazards
    /// when they sit within the clearance envelope ahead of it.
    #[allow(clippy::too_many_arguments)]
    fn target_lane_hazard(
        &self,
        actor: ActorId,
        state: &VehicleState,
        change_over_point: WaypointId,
        target_lane: i32,
        on_target: &HashSet<ActorId>,
        change_over_distance: usize,
        selector: usize,
    ) -> bool {
        let current = &self.buffers[selector];
        let merge_location = self.map[change_over_point].location;
        let change_over = change_over_distance as f64;

        for &other in on_target {
            if other == actor {
                continue;
            }
            let Some(&other_index) = self.index_of.get(&other) else {
                continue;
            };
            let Some(other_front) = current.front(other_index) else {
                continue;
            };
            if self.map[other_front].geo.lane != target_lane {
                continue;
            }
            let Some(other_state) = self.world.vehicle(other) else {
                continue;
            };
            let other_location = self.map[other_front].location;
            let relative = deviation_dot(state.forward, state.location, other_location);

            if relative < 0.0 {
                let time_other = (merge_location.distance(other_location) + change_over)
                    / other_state.speed();
                let time_self =
                    (merge_location.distance(state.location) + change_over) / state.speed();
                if relative > REAR_BEARING_LIMIT || time_other > time_self {
                    return true;
                }
            } else {
                let clearance =
                    MERGE_FRONT_MARGIN + change_over + 2.0 * state.bounding_box_extent.x;
                if merge_location.distance(other_location) < clearance {
                    return true;
                }
            }
        }
        false
    }

    /// Follows first successors for `steps` nodes. An exhausted successor
    /// list means the sibling lane merges; the walk stops there.
    fn walk_forward(&self, from: WaypointId, steps: usize) -> WaypointId {
        let mut point = from;
        for _ in 0..steps {
            match self.map[point].next.first() {
                Some(&next) => point = next,
                None => break,
            }
        }
        point
    }
}
