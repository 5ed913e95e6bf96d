//! This module contains `MarkMonitor`, the synchronization hub of a marking
//! phase.  Its purposes include:
//!
//! -   arming markers for an epoch and letting them park between epochs,
//! -   counting active markers so the last one to run dry can detect
//!     termination, and
//! -   waking parked markers when new work is pushed.

use crate::util::epoch::Epoch;
use std::sync::{Condvar, Mutex};

/// What a worker should do next, as told by `MarkMonitor::wait_for_work`.
pub(crate) enum WorkerSignal {
    /// Mark for the given epoch.  The worker is already counted as an active
    /// marker when it receives this.
    Mark(Epoch),
    /// Exit the run loop.  Sent when the pool is being rebuilt or torn down.
    Exit,
}

/// The result of `MarkMonitor::park_marker`.
pub(crate) enum ParkResult {
    /// The marking phase is over; stop draining.
    Finished,
    /// More work may be available; retry popping.  The caller is counted as
    /// an active marker again.
    Retry,
}

/// The synchronized part of `MarkMonitor`.
struct MarkMonitorSync {
    /// The epoch markers are currently armed for, if any.
    armed: Option<Epoch>,
    /// Set by the last marker to deactivate with an empty queue; cleared when
    /// the next epoch is armed.
    mark_done: bool,
    /// The last epoch whose marking phase completed.  Lets late arrivals
    /// (cooperating mutators) tell a finished phase from one that has not
    /// been armed yet.
    completed: Epoch,
    /// Number of markers currently holding or searching for work.  A marker
    /// in flight may still push work, so the phase cannot end while this is
    /// non-zero.
    active_markers: usize,
    /// Set when the worker pool is being torn down.
    exit_requested: bool,
}

/// A data structure for synchronizing markers with each other and with the
/// controller.  There is one instance per worker pool; rebuilding the pool
/// rebuilds the monitor.
pub(crate) struct MarkMonitor {
    sync: Mutex<MarkMonitorSync>,
    /// Markers wait on this when idle.  Notified when work is pushed, when an
    /// epoch is armed, when the phase completes, and on exit requests.
    work_available: Condvar,
}

impl MarkMonitor {
    pub fn new() -> Self {
        Self {
            sync: Mutex::new(MarkMonitorSync {
                armed: None,
                mark_done: false,
                completed: Epoch::ZERO,
                active_markers: 0,
                exit_requested: false,
            }),
            work_available: Condvar::new(),
        }
    }

    /// Arm the markers for `epoch` and wake all workers.  Called by the
    /// controller once every mutator is parked.
    ///
    /// The controller is counted as the initial active marker.  This must
    /// happen inside `arm`: if workers could wake, find the queue empty and
    /// deactivate before the controller has scanned a single root, they would
    /// declare the phase over prematurely.  With the controller pre-counted,
    /// the count cannot reach zero until the controller itself parks.
    pub fn arm(&self, epoch: Epoch) {
        let mut sync = self.sync.lock().unwrap();
        debug_assert!(sync.armed.is_none(), "marking epoch armed twice");
        debug_assert_eq!(sync.active_markers, 0);
        sync.armed = Some(epoch);
        sync.mark_done = false;
        sync.active_markers = 1;
        self.work_available.notify_all();
    }

    /// Disarm after a completed phase.  Workers go back to waiting for the
    /// next epoch.
    pub fn disarm(&self, epoch: Epoch) {
        let mut sync = self.sync.lock().unwrap();
        debug_assert_eq!(sync.armed, Some(epoch));
        debug_assert!(sync.mark_done, "disarm before the phase completed");
        debug_assert_eq!(sync.active_markers, 0);
        sync.armed = None;
    }

    /// Ask all workers of this pool to exit their run loops.  Must not be
    /// called while an epoch is armed.
    pub fn request_exit(&self) {
        let mut sync = self.sync.lock().unwrap();
        debug_assert!(sync.armed.is_none(), "exit requested during marking");
        sync.exit_requested = true;
        self.work_available.notify_all();
    }

    /// Block until there is an epoch to mark for, or an exit request.  On
    /// `WorkerSignal::Mark` the caller is counted as an active marker.
    pub fn wait_for_work(&self) -> WorkerSignal {
        let mut sync = self.sync.lock().unwrap();
        loop {
            if sync.exit_requested {
                return WorkerSignal::Exit;
            }
            if let Some(epoch) = sync.armed {
                if !sync.mark_done {
                    sync.active_markers += 1;
                    return WorkerSignal::Mark(epoch);
                }
            }
            sync = self.work_available.wait(sync).unwrap();
        }
    }

    /// Wait until the phase for `epoch` is armed, then join it as an active
    /// marker.  Used by cooperating mutators, which park at their safepoint
    /// before the controller arms the phase.  Returns false without
    /// activating if the phase already completed (or the pool is exiting),
    /// so a late arrival simply skips assisting.
    #[cfg(feature = "cooperative_marking")]
    pub fn wait_for_assist(&self, epoch: Epoch) -> bool {
        let mut sync = self.sync.lock().unwrap();
        loop {
            if sync.exit_requested || sync.completed >= epoch {
                return false;
            }
            if let Some(armed) = sync.armed {
                if armed != epoch {
                    // A stale call from a different epoch's window.
                    return false;
                }
                sync.active_markers += 1;
                return true;
            }
            sync = self.work_available.wait(sync).unwrap();
        }
    }

    /// Deactivate the calling marker after it failed to pop any work.
    ///
    /// If this was the last active marker and `queue_is_empty` confirms the
    /// shared queues are drained, the phase is over: `mark_done` is set and
    /// every parked marker is woken to observe it.  Termination detection is
    /// sound because a marker can only create work while it is counted
    /// active; once the count reaches zero with empty queues, no work can
    /// appear.
    ///
    /// The emptiness check runs under the monitor lock.  Work is pushed
    /// without holding the lock, so a pusher may add work right after a
    /// marker observes empty queues and before it blocks -- but the pusher is
    /// itself an active marker, and the last active marker re-checks the
    /// queues here before declaring the phase over, so nothing is missed.
    pub fn park_marker(&self, queue_is_empty: impl Fn() -> bool) -> ParkResult {
        let mut sync = self.sync.lock().unwrap();
        debug_assert!(sync.active_markers > 0);
        debug_assert!(!sync.mark_done);
        sync.active_markers -= 1;

        if sync.active_markers == 0 {
            if queue_is_empty() {
                sync.mark_done = true;
                sync.completed = sync.armed.expect("phase completed while not armed");
                self.work_available.notify_all();
                return ParkResult::Finished;
            }
            // Work appeared between our failed pop and the deactivation.
            // Take the active slot back and retry.
            sync.active_markers += 1;
            return ParkResult::Retry;
        }

        sync = self.work_available.wait(sync).unwrap();
        if sync.mark_done {
            ParkResult::Finished
        } else {
            // Woken for new work, or spuriously.  Either way, reactivate and
            // let the caller retry popping; it will park again if there is
            // nothing to do.
            sync.active_markers += 1;
            ParkResult::Retry
        }
    }

    /// Wake parked markers because work was pushed.
    ///
    /// The lock is taken so the notification cannot fall between a marker's
    /// deactivation and its wait.
    pub fn notify_work_available(&self, all: bool) {
        let _guard = self.sync.lock().unwrap();
        if all {
            self.work_available.notify_all();
        } else {
            self.work_available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::epoch::Epoch;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// One unit of emulated marking work: process an item, possibly pushing
    /// two more, or park when the queue is dry.
    fn drain_emulated(
        monitor: &MarkMonitor,
        queue: &Mutex<Vec<u32>>,
        processed: &AtomicUsize,
    ) {
        loop {
            let item = queue.lock().unwrap().pop();
            if let Some(depth) = item {
                processed.fetch_add(1, Ordering::SeqCst);
                if depth > 0 {
                    let mut q = queue.lock().unwrap();
                    q.push(depth - 1);
                    q.push(depth - 1);
                    drop(q);
                    monitor.notify_work_available(false);
                }
                continue;
            }
            match monitor.park_marker(|| queue.lock().unwrap().is_empty()) {
                ParkResult::Finished => return,
                ParkResult::Retry => continue,
            }
        }
    }

    /// Emulate a marking phase over a shared "queue" of units that each spawn
    /// two more.  Every marker follows the pop / process / park protocol; the
    /// main thread plays the controller, which `arm` pre-counts as active.
    /// The phase must terminate with all work done and every worker observing
    /// `Finished`.
    #[test]
    fn phase_terminates_only_when_drained() {
        let monitor = Arc::new(MarkMonitor::new());
        let queue: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let processed = AtomicUsize::new(0);
        let number_threads = 3;

        std::thread::scope(|scope| {
            for _ in 0..number_threads {
                let monitor = monitor.clone();
                let queue = queue.clone();
                let processed = &processed;
                scope.spawn(move || {
                    let WorkerSignal::Mark(epoch) = monitor.wait_for_work() else {
                        panic!("expected a marking epoch");
                    };
                    assert_eq!(epoch, Epoch::FIRST);
                    drain_emulated(&monitor, &queue, processed);
                });
            }
            monitor.arm(Epoch::FIRST);
            // The controller publishes the roots after arming, exactly like
            // the real root scan, then participates in the drain.
            queue.lock().unwrap().extend([3, 3, 3, 3]);
            monitor.notify_work_available(true);
            drain_emulated(&monitor, &queue, &processed);
        });

        // 4 roots of depth 3, each expanding into 2^4 - 1 units.
        assert_eq!(processed.load(Ordering::SeqCst), 4 * 15);
        assert!(queue.lock().unwrap().is_empty());
        monitor.disarm(Epoch::FIRST);
    }

    #[test]
    fn exit_request_unblocks_waiting_workers() {
        let monitor = Arc::new(MarkMonitor::new());
        std::thread::scope(|scope| {
            for _ in 0..3 {
                let monitor = monitor.clone();
                scope.spawn(move || {
                    assert!(matches!(monitor.wait_for_work(), WorkerSignal::Exit));
                });
            }
            monitor.request_exit();
        });
    }
}
