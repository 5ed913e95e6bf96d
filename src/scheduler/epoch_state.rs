//! The epoch state machine.  Collections are identified by monotonically
//! increasing epochs; each epoch progresses through a fixed lifecycle
//! (`Scheduled -> Started -> Finished -> Finalized`) and every transition is
//! observable through a blocking wait.

use crate::util::epoch::Epoch;
use std::sync::{Condvar, Mutex};

/// The synchronized part of `EpochStates`.
///
/// Because transitions are one-way and epochs are totally ordered, the
/// per-epoch record is represented as three watermarks instead of a map of
/// records: an epoch `e` is in `Started` (or later) iff `e <= last_started`,
/// and so on.  `finished(e)` implying `started(e')` for all `e' <= e` then
/// holds by construction.
struct EpochsSync {
    /// The epoch `schedule` hands out next, when nothing is pending.
    next: Epoch,
    /// The scheduled-but-not-started epoch, if any.  `schedule` collapses
    /// into this; `start` clears it.
    pending: Option<Epoch>,
    last_started: Epoch,
    last_finished: Epoch,
    last_finalized: Epoch,
    /// Terminal state.  All waits return immediately once set.
    shutdown: bool,
}

/// The process-wide owner of epoch lifecycles.  One instance per
/// [`crate::PMCS`].
///
/// All transitions are infallible once entered; the only failure mode is
/// shutdown, which moves the whole machine to a terminal "unblocked" state.
pub struct EpochStates {
    sync: Mutex<EpochsSync>,
    /// The controller waits on this for the next pending epoch.
    scheduled: Condvar,
    /// External consumers wait on this for `finish`/`finalized` watermarks.
    progress: Condvar,
}

impl EpochStates {
    pub fn new() -> Self {
        EpochStates {
            sync: Mutex::new(EpochsSync {
                next: Epoch::FIRST,
                pending: None,
                last_started: Epoch::ZERO,
                last_finished: Epoch::ZERO,
                last_finalized: Epoch::ZERO,
                shutdown: false,
            }),
            scheduled: Condvar::new(),
            progress: Condvar::new(),
        }
    }

    /// Schedule a collection.  If an epoch is already scheduled but not yet
    /// started, returns that epoch; otherwise allocates a new one and wakes
    /// the controller.  Never blocks.
    pub fn schedule(&self) -> Epoch {
        let mut sync = self.sync.lock().unwrap();
        if let Some(pending) = sync.pending {
            return pending;
        }
        let epoch = sync.next;
        sync.next = epoch.next();
        sync.pending = Some(epoch);
        trace!("Scheduled collection epoch {}", epoch);
        self.scheduled.notify_all();
        epoch
    }

    /// Block until an epoch is scheduled, or shutdown is requested.  Called
    /// by the controller's main loop; `None` means terminate.
    ///
    /// The pending epoch is intentionally not consumed here: it stays pending
    /// until [`EpochStates::start`], so that `schedule` calls arriving while
    /// the controller is waking up still collapse into it.
    pub fn wait_scheduled(&self) -> Option<Epoch> {
        let mut sync = self.sync.lock().unwrap();
        loop {
            if sync.shutdown {
                return None;
            }
            if let Some(pending) = sync.pending {
                return Some(pending);
            }
            sync = self.scheduled.wait(sync).unwrap();
        }
    }

    /// Transition `epoch` to `Started`.  From this point on, `schedule`
    /// allocates the next epoch number.
    pub fn start(&self, epoch: Epoch) {
        let mut sync = self.sync.lock().unwrap();
        assert_eq!(
            sync.pending,
            Some(epoch),
            "start({}) without a matching schedule",
            epoch
        );
        assert_eq!(sync.last_started.next(), epoch, "epochs must start in order");
        sync.pending = None;
        sync.last_started = epoch;
        self.progress.notify_all();
    }

    /// Transition `epoch` to `Finished` and unblock its waiters.
    pub fn finish(&self, epoch: Epoch) {
        let mut sync = self.sync.lock().unwrap();
        assert_eq!(sync.last_started, epoch, "finish({}) before start", epoch);
        assert_eq!(
            sync.last_finished.next(),
            epoch,
            "epochs must finish in order"
        );
        sync.last_finished = epoch;
        self.progress.notify_all();
    }

    /// Transition `epoch` to `Finalized` and unblock its waiters.  Called
    /// from the finalizer thread (or inline, for epochs with no finalizable
    /// garbage).
    pub fn finalized(&self, epoch: Epoch) {
        let mut sync = self.sync.lock().unwrap();
        assert!(
            epoch <= sync.last_finished,
            "finalized({}) before finish",
            epoch
        );
        assert_eq!(
            sync.last_finalized.next(),
            epoch,
            "epochs must finalize in order"
        );
        sync.last_finalized = epoch;
        self.progress.notify_all();
    }

    /// Block until `epoch` is in `Finished` or later, or shutdown occurred.
    pub fn wait_epoch_finished(&self, epoch: Epoch) {
        let mut sync = self.sync.lock().unwrap();
        while sync.last_finished < epoch && !sync.shutdown {
            sync = self.progress.wait(sync).unwrap();
        }
    }

    /// Block until `epoch` is `Finalized`, or shutdown occurred.
    pub fn wait_epoch_finalized(&self, epoch: Epoch) {
        let mut sync = self.sync.lock().unwrap();
        while sync.last_finalized < epoch && !sync.shutdown {
            sync = self.progress.wait(sync).unwrap();
        }
    }

    /// Move the state machine to its terminal state: all current and future
    /// `wait_scheduled` calls return `None`, and all epoch waits unblock.
    /// Called once, on teardown; calling it twice is a programmer error.
    pub fn shutdown(&self) {
        let mut sync = self.sync.lock().unwrap();
        assert!(!sync.shutdown, "EpochStates::shutdown called twice");
        sync.shutdown = true;
        self.scheduled.notify_all();
        self.progress.notify_all();
    }

    /// Has shutdown been requested?
    pub fn is_shutdown(&self) -> bool {
        self.sync.lock().unwrap().shutdown
    }

    /// The highest epoch that has finished.
    pub fn last_finished(&self) -> Epoch {
        self.sync.lock().unwrap().last_finished
    }

    /// The highest epoch that has finalized.
    pub fn last_finalized(&self) -> Epoch {
        self.sync.lock().unwrap().last_finalized
    }
}

impl Default for EpochStates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn schedule_collapses_consecutive_requests() {
        let states = EpochStates::new();
        let e1 = states.schedule();
        assert_eq!(states.schedule(), e1);
        assert_eq!(states.schedule(), e1);
        // Once started, the next request allocates a new epoch.
        states.start(e1);
        let e2 = states.schedule();
        assert_eq!(e2, e1.next());
    }

    #[test]
    fn epochs_are_strictly_increasing_across_threads() {
        let states = Arc::new(EpochStates::new());
        let max_seen = AtomicU64::new(0);
        let completed = AtomicU64::new(0);

        std::thread::scope(|scope| {
            // Drive the lifecycle concurrently so new epochs can be handed out.
            {
                let states = states.clone();
                let completed = &completed;
                scope.spawn(move || {
                    while let Some(e) = states.wait_scheduled() {
                        states.start(e);
                        states.finish(e);
                        states.finalized(e);
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
            let schedulers: Vec<_> = (0..8)
                .map(|_| {
                    let states = states.clone();
                    let max_seen = &max_seen;
                    scope.spawn(move || {
                        for _ in 0..100 {
                            let epoch = states.schedule();
                            max_seen.fetch_max(epoch.number(), Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for scheduler in schedulers {
                scheduler.join().unwrap();
            }
            states.shutdown();
        });

        // At most one pending epoch at a time means the number of distinct
        // epochs is bounded by completed collections + 1.
        assert!(max_seen.load(Ordering::SeqCst) <= completed.load(Ordering::SeqCst) + 1);
    }

    #[test]
    fn wait_finished_returns_after_finish() {
        let states = Arc::new(EpochStates::new());
        let e = states.schedule();
        std::thread::scope(|scope| {
            let waiter = {
                let states = states.clone();
                scope.spawn(move || states.wait_epoch_finished(e))
            };
            states.start(e);
            states.finish(e);
            waiter.join().unwrap();
        });
        assert_eq!(states.last_finished(), e);
    }

    #[test]
    fn shutdown_unblocks_all_waiters() {
        let states = Arc::new(EpochStates::new());
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let states = states.clone();
                scope.spawn(move || {
                    states.wait_epoch_finalized(Epoch::from_number(42));
                });
            }
            {
                // Nothing is ever scheduled, so this can only return through
                // the shutdown path.
                let states = states.clone();
                scope.spawn(move || {
                    assert!(states.wait_scheduled().is_none());
                });
            }
            states.shutdown();
        });
        assert!(states.is_shutdown());
    }

    #[test]
    #[should_panic(expected = "called twice")]
    fn double_shutdown_is_a_programmer_error() {
        let states = EpochStates::new();
        states.shutdown();
        states.shutdown();
    }

    #[test]
    #[should_panic(expected = "before start")]
    fn finish_before_start_is_a_programmer_error() {
        let states = EpochStates::new();
        let e = states.schedule();
        states.finish(e);
    }
}
