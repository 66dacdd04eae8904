use crate::error::PipelineError;
use crate::util::lock;
use log::{debug, error};
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// How long a parked stage thread sleeps between re-checks of the run flag.
const WAIT_RECHECK: Duration = Duration::from_millis(1);

/// One stage of the pipeline.
///
/// A stage receives an input frame, fans the vehicle index space out over
/// a worker pool, and sends an output frame, with exactly one tick in
/// flight at a time. Implementations keep their per-tick state behind
/// interior mutability: `receive` and `send` run on dedicated threads and
/// never overlap each other or the workers.
pub trait Stage: Send + Sync + 'static {
    /// The stage name used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// Pulls this tick's input, typically a blocking messenger receive.
    fn receive(&self);

    /// Processes one contiguous range of vehicle slots.
    fn action(&self, range: Range<usize>);

    /// Pushes this tick's output, typically a blocking messenger send.
    fn send(&self);

    /// Stops every messenger the stage holds, unblocking its threads.
    fn stop_messengers(&self);
}

/// Coordination state shared by a stage's threads.
///
/// `tick` counts completed receives and `sent` counts completed sends;
/// workers and the sender each remember the last tick they served, which
/// makes the per-tick barrier reusable without re-arming.
struct SyncState {
    run: bool,
    tick: u64,
    sent: u64,
    finished: usize,
}

struct StageSync {
    state: Mutex<SyncState>,
    wake_receiver: Condvar,
    wake_action: Condvar,
    wake_sender: Condvar,
}

impl StageSync {
    fn new() -> Self {
        Self {
            state: Mutex::new(SyncState {
                run: true,
                tick: 0,
                sent: 0,
                finished: 0,
            }),
            wake_receiver: Condvar::new(),
            wake_action: Condvar::new(),
            wake_sender: Condvar::new(),
        }
    }

    fn wait<'a>(
        &self,
        condition: &Condvar,
        guard: MutexGuard<'a, SyncState>,
    ) -> MutexGuard<'a, SyncState> {
        match condition.wait_timeout(guard, WAIT_RECHECK) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    /// Drops the run flag and wakes every parked thread.
    fn halt(&self) {
        lock(&self.state).run = false;
        self.wake_receiver.notify_all();
        self.wake_action.notify_all();
        self.wake_sender.notify_all();
    }
}

/// Owns the threads of one running stage: a receiver, a sender, and a
/// pool of workers over contiguous vehicle ranges (the last range absorbs
/// the remainder).
pub struct StageRunner {
    stage: Arc<dyn Stage>,
    sync: Arc<StageSync>,
    threads: Vec<JoinHandle<()>>,
    failed: Arc<AtomicBool>,
}

fn spawn_thread(
    label: String,
    body: impl FnOnce() + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name(label).spawn(body)
}

impl StageRunner {
    /// Spawns the stage's threads and starts ticking.
    pub fn start(
        stage: Arc<dyn Stage>,
        pool_size: usize,
        vehicles: usize,
    ) -> Result<Self, PipelineError> {
        let sync = Arc::new(StageSync::new());
        let failed = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::with_capacity(pool_size + 2);

        match Self::spawn_all(&stage, &sync, &failed, pool_size, vehicles, &mut threads) {
            Ok(()) => {}
            Err(err) => {
                // Unwind the partially started stage before surfacing.
                stage.stop_messengers();
                sync.halt();
                for thread in threads {
                    let _ = thread.join();
                }
                return Err(err.into());
            }
        }

        debug!(
            "{} stage started: {} workers over {} vehicles",
            stage.name(),
            pool_size,
            vehicles
        );
        Ok(Self {
            stage,
            sync,
            threads,
            failed,
        })
    }

    fn spawn_all(
        stage: &Arc<dyn Stage>,
        sync: &Arc<StageSync>,
        failed: &Arc<AtomicBool>,
        pool_size: usize,
        vehicles: usize,
        threads: &mut Vec<JoinHandle<()>>,
    ) -> std::io::Result<()> {
        {
            let (stage, sync, failed) = (stage.clone(), sync.clone(), failed.clone());
            threads.push(spawn_thread(format!("{}-receiver", stage.name()), move || {
                run_receiver(&*stage, &sync, &failed)
            })?);
        }
        {
            let (stage, sync, failed) = (stage.clone(), sync.clone(), failed.clone());
            threads.push(spawn_thread(format!("{}-sender", stage.name()), move || {
                run_sender(&*stage, &sync, pool_size, &failed)
            })?);
        }
        let base = vehicles / pool_size;
        for index in 0..pool_size {
            let start = index * base;
            let end = if index + 1 == pool_size {
                vehicles
            } else {
                (index + 1) * base
            };
            let (stage, sync, failed) = (stage.clone(), sync.clone(), failed.clone());
            threads.push(spawn_thread(
                format!("{}-worker-{}", stage.name(), index),
                move || run_worker(&*stage, &sync, start..end, pool_size, &failed),
            )?);
        }
        Ok(())
    }

    /// Stops the stage's messengers, parks the tick loop, and joins every
    /// thread. Surfaces one aggregated error if any thread panicked.
    pub fn stop(mut self) -> Result<(), PipelineError> {
        self.stage.stop_messengers();
        self.sync.halt();
        let mut join_failed = false;
        for thread in self.threads.drain(..) {
            join_failed |= thread.join().is_err();
        }
        debug!("{} stage stopped", self.stage.name());
        if join_failed || self.failed.load(Ordering::SeqCst) {
            Err(PipelineError::StageFailed {
                stage: self.stage.name(),
            })
        } else {
            Ok(())
        }
    }
}

/// Runs one phase callback, shutting the whole stage down if it panics.
fn guarded(stage: &dyn Stage, sync: &StageSync, failed: &AtomicBool, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(_) => {
            error!("{} stage thread panicked; stopping stage", stage.name());
            failed.store(true, Ordering::SeqCst);
            stage.stop_messengers();
            sync.halt();
            false
        }
    }
}

fn run_receiver(stage: &dyn Stage, sync: &StageSync, failed: &AtomicBool) {
    loop {
        let mut state = lock(&sync.state);
        while state.run && state.sent < state.tick {
            state = sync.wait(&sync.wake_receiver, state);
        }
        if !state.run {
            return;
        }
        drop(state);

        if !guarded(stage, sync, failed, || stage.receive()) {
            return;
        }

        let mut state = lock(&sync.state);
        if !state.run {
            return;
        }
        state.finished = 0;
        state.tick += 1;
        drop(state);
        sync.wake_action.notify_all();
    }
}

fn run_worker(
    stage: &dyn Stage,
    sync: &StageSync,
    range: Range<usize>,
    pool_size: usize,
    failed: &AtomicBool,
) {
    let mut my_tick = 0;
    loop {
        let mut state = lock(&sync.state);
        while state.run && state.tick == my_tick {
            state = sync.wait(&sync.wake_action, state);
        }
        if !state.run {
            return;
        }
        my_tick = state.tick;
        drop(state);

        if !guarded(stage, sync, failed, || stage.action(range.clone())) {
            return;
        }

        let mut state = lock(&sync.state);
        state.finished += 1;
        if state.finished == pool_size {
            drop(state);
            sync.wake_sender.notify_one();
        }
    }
}

fn run_sender(stage: &dyn Stage, sync: &StageSync, pool_size: usize, failed: &AtomicBool) {
    let mut my_tick = 0;
    loop {
        let mut state = lock(&sync.state);
        while state.run && !(state.tick > my_tick && state.finished == pool_size) {
            state = sync.wait(&sync.wake_sender, state);
        }
        if !state.run {
            return;
        }
        my_tick = state.tick;
        drop(state);

        if !guarded(stage, sync, failed, || stage.send()) {
            return;
        }

        let mut state = lock(&sync.state);
        state.sent = my_tick;
        drop(state);
        sync.wake_receiver.notify_one();
    }
}
