use crate::math::Point3d;
use crate::util::lock;
use crate::ActorId;
use itertools::iproduct;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// A uniform 2-D grid over actor positions, used to keep the collision
/// stage's neighbor queries away from an all-pairs scan.
///
/// Guarded by a single short-lived interior lock; the collision workers
/// touch disjoint vehicles per tick, so the lock is never held long.
pub struct VicinityGrid {
    edge: f64,
    state: Mutex<GridState>,
}

#[derive(Default)]
struct GridState {
    cells: HashMap<(i64, i64), HashSet<ActorId>>,
    cell_of: HashMap<ActorId, (i64, i64)>,
}

impl VicinityGrid {
    /// Creates an empty grid with the given cell edge length in m.
    pub fn new(edge: f64) -> Self {
        Self {
            edge,
            state: Mutex::new(GridState::default()),
        }
    }

    fn cell(&self, location: Point3d) -> (i64, i64) {
        (
            (location.x / self.edge).floor() as i64,
            (location.y / self.edge).floor() as i64,
        )
    }

    /// Moves an actor to the cell covering `location`.
    pub fn update(&self, actor: ActorId, location: Point3d) {
        let cell = self.cell(location);
        let mut state = lock(&self.state);
        if state.cell_of.get(&actor) == Some(&cell) {
            return;
        }
        if let Some(old) = state.cell_of.insert(actor, cell) {
            if let Some(actors) = state.cells.get_mut(&old) {
                actors.remove(&actor);
                if actors.is_empty() {
                    state.cells.remove(&old);
                }
            }
        }
        state.cells.entry(cell).or_default().insert(actor);
    }

    /// Drops an actor from the grid.
    pub fn remove(&self, actor: ActorId) {
        let mut state = lock(&self.state);
        if let Some(cell) = state.cell_of.remove(&actor) {
            if let Some(actors) = state.cells.get_mut(&cell) {
                actors.remove(&actor);
                if actors.is_empty() {
                    state.cells.remove(&cell);
                }
            }
        }
    }

    /// Every actor within the square of cells covering `radius` around
    /// `location`. The caller filters out the querying actor itself.
    pub fn neighbors(&self, location: Point3d, radius: f64) -> HashSet<ActorId> {
        let (cx, cy) = self.cell(location);
        let reach = (radius / self.edge).ceil() as i64;
        let state = lock(&self.state);
        iproduct!(-reach..=reach, -reach..=reach)
            .filter_map(|(dx, dy)| state.cells.get(&(cx + dx, cy + dy)))
            .flatten()
            .copied()
            .collect()
    }
}
