use crate::map::GeoIds;
use crate::util::lock;
use crate::ActorId;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Reverse index from road coordinates to the vehicles currently on them,
/// maintained by the localization workers and read back by the
/// lane-change decision.
///
/// Same locking discipline as [VicinityGrid](crate::VicinityGrid): one
/// short interior lock, writers on disjoint vehicles.
pub struct TrafficDistribution {
    state: Mutex<DistributionState>,
}

#[derive(Default)]
struct DistributionState {
    by_lane: HashMap<GeoIds, HashSet<ActorId>>,
    lane_of: HashMap<ActorId, GeoIds>,
}

impl Default for TrafficDistribution {
    fn default() -> Self {
        Self {
            state: Mutex::new(DistributionState::default()),
        }
    }
}

impl TrafficDistribution {
    /// Creates an empty distribution.
    pub fn new() -> Self {
        Default::default()
    }

    /// Records that a vehicle's buffer front now lies on `ids`.
    pub fn update_vehicle(&self, actor: ActorId, ids: GeoIds) {
        let mut state = lock(&self.state);
        if state.lane_of.get(&actor) == Some(&ids) {
            return;
        }
        if let Some(old) = state.lane_of.insert(actor, ids) {
            if let Some(actors) = state.by_lane.get_mut(&old) {
                actors.remove(&actor);
                if actors.is_empty() {
                    state.by_lane.remove(&old);
                }
            }
        }
        state.by_lane.entry(ids).or_default().insert(actor);
    }

    /// The vehicles currently assigned to `ids`.
    pub fn vehicles_on(&self, ids: GeoIds) -> HashSet<ActorId> {
        lock(&self.state)
            .by_lane
            .get(&ids)
            .cloned()
            .unwrap_or_default()
    }

    /// The number of vehicles the index currently tracks. Each vehicle
    /// appears in exactly one lane bucket.
    pub fn len(&self) -> usize {
        lock(&self.state).lane_of.len()
    }

    /// Returns true if no vehicle has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lane(road: u32, lane: i32) -> GeoIds {
        GeoIds {
            road,
            section: 0,
            lane,
        }
    }

    #[test]
    fn vehicle_lives_in_one_bucket() {
        let distribution = TrafficDistribution::new();
        distribution.update_vehicle(1, lane(0, -1));
        distribution.update_vehicle(1, lane(0, -2));
        assert!(distribution.vehicles_on(lane(0, -1)).is_empty());
        assert_eq!(distribution.vehicles_on(lane(0, -2)).len(), 1);
        assert_eq!(distribution.len(), 1);
    }

    #[test]
    fn co_lane_vehicles_share_a_bucket() {
        let distribution = TrafficDistribution::new();
        distribution.update_vehicle(1, lane(3, -1));
        distribution.update_vehicle(2, lane(3, -1));
        let on_lane = distribution.vehicles_on(lane(3, -1));
        assert!(on_lane.contains(&1) && on_lane.contains(&2));
    }
}
