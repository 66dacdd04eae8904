use crate::util::lock;
use crate::WaypointId;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// One vehicle's look-ahead path: waypoint handles ordered front
/// (nearest ahead) to back (farthest ahead).
pub type Buffer = VecDeque<WaypointId>;

/// The waypoint buffers of every managed vehicle, indexed by vehicle slot.
///
/// Each slot has its own lock. Localization workers write disjoint slots,
/// so the locks only ever contend with the short peeks that the
/// lane-change decision and the collision stage make at other slots.
pub struct BufferList {
    slots: Vec<Mutex<Buffer>>,
}

impl BufferList {
    /// Creates a list of empty buffers, one per vehicle slot.
    pub fn new(vehicles: usize) -> Self {
        Self {
            slots: (0..vehicles).map(|_| Mutex::new(Buffer::new())).collect(),
        }
    }

    /// Locks one vehicle's buffer.
    pub(crate) fn slot(&self, index: usize) -> MutexGuard<'_, Buffer> {
        lock(&self.slots[index])
    }

    /// The front waypoint of one vehicle's buffer.
    pub fn front(&self, index: usize) -> Option<WaypointId> {
        self.slot(index).front().copied()
    }
}

/// A non-owning view of one vehicle's buffer slot, carried by the frames
/// the collision stage consumes. Cloning is cheap; the underlying list is
/// the one the localization stage published for this tick.
#[derive(Clone)]
pub struct BufferHandle {
    list: Arc<BufferList>,
    index: usize,
}

impl BufferHandle {
    pub(crate) fn new(list: Arc<BufferList>, index: usize) -> Self {
        Self { list, index }
    }

    /// The front waypoint of the buffer, if any.
    pub fn front(&self) -> Option<WaypointId> {
        self.list.front(self.index)
    }

    /// Runs a closure against the buffer under its slot lock.
    pub fn with<R>(&self, f: impl FnOnce(&Buffer) -> R) -> R {
        f(&self.list.slot(self.index))
    }
}

/// A per-vehicle output frame: one slot per managed vehicle, each behind
/// its own short-lived lock so workers on disjoint ranges never contend.
///
/// Slots start empty; a slot left unwritten for a tick (a skipped vehicle)
/// simply carries no fresher hint than the previous frame did.
pub struct Frame<T> {
    slots: Vec<Mutex<Option<T>>>,
}

impl<T: Clone> Frame<T> {
    /// Creates a frame of empty slots.
    pub fn new(vehicles: usize) -> Self {
        Self {
            slots: (0..vehicles).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Overwrites one vehicle's slot.
    pub fn set(&self, index: usize, value: T) {
        *lock(&self.slots[index]) = Some(value);
    }

    /// Reads one vehicle's slot.
    pub fn get(&self, index: usize) -> Option<T> {
        lock(&self.slots[index]).clone()
    }
}
