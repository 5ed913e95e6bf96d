use crate::scheduler::marking;
use crate::scheduler::work_queue::{LocalQueue, MarkQueue};
use crate::scheduler::worker_monitor::{MarkMonitor, WorkerSignal};
use crate::util::opaque_pointer::*;
use crate::vm::{ThreadRegistry, VMBinding};
use std::sync::{Arc, Condvar, Mutex};

/// An auxiliary mark worker.  Pure marker: it spins between epochs waiting
/// for the monitor to arm, claims unclaimed root sets, drains the mark queue,
/// and goes back to sleep.  The binding owns the OS thread (spawned through
/// [`crate::vm::Collection::spawn_gc_thread`]); PMCS owns this struct.
pub struct GCWorker<VM: VMBinding> {
    /// The worker's index within its pool.
    pub ordinal: usize,
    local: LocalQueue,
    monitor: Arc<MarkMonitor>,
    queue: Arc<MarkQueue>,
    group: Arc<WorkerGroup>,
    phantom: std::marker::PhantomData<VM>,
}

impl<VM: VMBinding> GCWorker<VM> {
    pub(crate) fn new(
        ordinal: usize,
        local: LocalQueue,
        monitor: Arc<MarkMonitor>,
        queue: Arc<MarkQueue>,
        group: Arc<WorkerGroup>,
    ) -> Self {
        Self {
            ordinal,
            local,
            monitor,
            queue,
            group,
            phantom: std::marker::PhantomData,
        }
    }

    /// The worker thread's entry point.  Returns when the pool is being
    /// rebuilt or torn down; the last worker out wakes anyone waiting in
    /// [`WorkerGroup::wait_all_exited`].
    pub fn run(&mut self, tls: VMWorkerThread) {
        debug_assert!(
            !VM::VMThreadRegistry::is_mutator(tls.0),
            "a GC worker must not be a registered mutator"
        );
        loop {
            match self.monitor.wait_for_work() {
                WorkerSignal::Mark(epoch) => {
                    trace!("Worker {} marking for epoch {}", self.ordinal, epoch);
                    marking::claim_root_sets::<VM>(&self.queue, &self.monitor);
                    marking::drain::<VM>(&self.queue, &self.monitor, &self.local);
                    trace!("Worker {} done with epoch {}", self.ordinal, epoch);
                }
                WorkerSignal::Exit => break,
            }
        }
        debug!("Worker {} exiting", self.ordinal);
        self.group.surrender();
    }
}

/// Tracks how many workers of a pool are still alive, so the pool can be
/// rebuilt (or the process torn down) only after every worker thread has
/// actually left its run loop.
pub(crate) struct WorkerGroup {
    worker_count: usize,
    alive: Mutex<usize>,
    all_exited: Condvar,
}

impl WorkerGroup {
    pub fn new(worker_count: usize) -> Arc<Self> {
        Arc::new(Self {
            worker_count,
            alive: Mutex::new(worker_count),
            all_exited: Condvar::new(),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Called by a worker as the last thing it does.
    fn surrender(&self) {
        let mut alive = self.alive.lock().unwrap();
        debug_assert!(*alive > 0);
        *alive -= 1;
        if *alive == 0 {
            debug!("All {} workers surrendered.", self.worker_count);
            self.all_exited.notify_all();
        }
    }

    /// Block until every worker of this pool has left its run loop.
    pub fn wait_all_exited(&self) {
        let mut alive = self.alive.lock().unwrap();
        while *alive > 0 {
            alive = self.all_exited.wait(alive).unwrap();
        }
    }
}
