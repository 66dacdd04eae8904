use crate::util::lock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// How long a blocked sender or receiver sleeps between re-checks of the
/// state counter and the stop flag.
const WAIT_RECHECK: Duration = Duration::from_millis(1);

/// A payload stamped with the state counter its producer last observed.
#[derive(Clone, Debug)]
pub struct DataPacket<T> {
    pub id: i64,
    pub data: T,
}

/// A single-slot rendezvous between one producer and one consumer.
///
/// The slot carries a monotonic state counter that advances once on every
/// send and once on every receive, so a completed handoff moves it by
/// exactly two. A producer that remembers the post-send value and a
/// consumer that remembers the post-receive value each block until the
/// *other* side has made the next move, which is what bounds every edge of
/// the pipeline to one frame in flight.
pub struct Messenger<T> {
    data: Mutex<Option<T>>,
    state: AtomicI64,
    send_condition: Condvar,
    receive_condition: Condvar,
    stop: AtomicBool,
}

impl<T> Default for Messenger<T> {
    fn default() -> Self {
        Self {
            data: Mutex::new(None),
            state: AtomicI64::new(0),
            send_condition: Condvar::new(),
            receive_condition: Condvar::new(),
            stop: AtomicBool::new(false),
        }
    }
}

impl<T: Clone> Messenger<T> {
    /// Creates a messenger with an empty slot and a zero state counter.
    pub fn new() -> Self {
        Default::default()
    }

    /// Stores a payload in the slot and returns the new state.
    ///
    /// Blocks while the counter still equals `packet.id`, i.e. until the
    /// consumer has taken the previous payload. A stopped messenger
    /// returns the current state without touching the slot.
    pub fn send(&self, packet: DataPacket<T>) -> i64 {
        let mut data = lock(&self.data);
        while self.state.load(Ordering::SeqCst) == packet.id {
            if self.stop.load(Ordering::SeqCst) {
                return self.state.load(Ordering::SeqCst);
            }
            data = self.wait(&self.send_condition, data);
        }
        if self.stop.load(Ordering::SeqCst) {
            return self.state.load(Ordering::SeqCst);
        }
        *data = Some(packet.data);
        let state = self.state.fetch_add(1, Ordering::SeqCst) + 1;
        self.receive_condition.notify_one();
        state
    }

    /// Takes the latest payload out of the slot.
    ///
    /// Blocks while the counter still equals `old_state`, i.e. until the
    /// producer has stored a fresh payload. Returns `None` once the
    /// messenger is stopped, like a disconnected channel.
    pub fn receive(&self, old_state: i64) -> Option<DataPacket<T>> {
        let mut data = lock(&self.data);
        while self.state.load(Ordering::SeqCst) == old_state {
            if self.stop.load(Ordering::SeqCst) {
                return None;
            }
            data = self.wait(&self.receive_condition, data);
        }
        let payload = data.clone()?;
        let state = self.state.fetch_add(1, Ordering::SeqCst) + 1;
        self.send_condition.notify_one();
        Some(DataPacket {
            id: state,
            data: payload,
        })
    }

    /// Snapshot read of the state counter.
    pub fn state(&self) -> i64 {
        self.state.load(Ordering::SeqCst)
    }

    /// Makes every blocked and future send or receive return promptly.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.send_condition.notify_all();
        self.receive_condition.notify_all();
    }

    /// Whether [stop](Self::stop) has been called.
    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// A short timed wait, so a missed wakeup can never wedge a caller
    /// past the next re-check.
    fn wait<'a>(
        &self,
        condition: &Condvar,
        guard: MutexGuard<'a, Option<T>>,
    ) -> MutexGuard<'a, Option<T>> {
        match condition.wait_timeout(guard, WAIT_RECHECK) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handoff_advances_state_by_two() {
        let messenger = Messenger::new();
        let before = messenger.state();
        messenger.send(DataPacket {
            id: before - 1,
            data: 7u32,
        });
        let packet = messenger.receive(before).unwrap();
        assert_eq!(packet.data, 7);
        assert_eq!(packet.id, before + 2);
        assert_eq!(messenger.state(), before + 2);
    }

    #[test]
    fn stopped_receive_returns_none() {
        let messenger: Messenger<u32> = Messenger::new();
        messenger.stop();
        assert!(messenger.receive(messenger.state()).is_none());
    }
}
