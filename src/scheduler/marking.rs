//! The mark dispatcher: coordinates a parallel mark phase whose
//! stop-the-world footprint is minimized by (a) letting mutators scan their
//! own roots while they suspend and (b) parallelizing the heap traversal
//! across the controller, the auxiliary workers, and (optionally)
//! cooperating mutators.

use crate::global_state::GlobalState;
use crate::mutator::MutatorContext;
use crate::scheduler::work_queue::{LocalQueue, MarkQueue};
use crate::scheduler::worker::{GCWorker, WorkerGroup};
use crate::scheduler::worker_monitor::{MarkMonitor, ParkResult};
use crate::util::epoch::Epoch;
use crate::util::opaque_pointer::*;
use crate::util::options::Options;
use crate::util::ObjectReference;
use crate::vm::{
    Collection, GCThreadContext, ObjectModel, RootsWorkFactory, Scanning, ThreadRegistry,
    VMBinding,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Everything tied to one generation of the worker pool.  `reset` replaces
/// the whole bundle: workers hold clones of these `Arc`s, so a retiring pool
/// keeps functioning until its last worker has surrendered.
struct MarkerPool<VM: VMBinding> {
    monitor: Arc<MarkMonitor>,
    queue: Arc<MarkQueue>,
    group: Arc<WorkerGroup>,
    /// Worker structs built but not yet handed to the binding for spawning.
    pending_spawn: Vec<Box<GCWorker<VM>>>,
}

/// The stop-the-world rendezvous: counts mutators that are parked (at a
/// safepoint, or implicitly suspended in a blocking wait) and lets the
/// controller wait until the count covers every registered mutator.  The
/// count is persistent across epochs -- a mutator blocked in `on_oom` stays
/// parked into the next epoch -- and the target is re-read on every wakeup
/// so mid-STW thread de-registration is handled.
pub(crate) struct StwRendezvous {
    parked: Mutex<usize>,
    changed: Condvar,
}

impl StwRendezvous {
    fn new() -> Self {
        Self {
            parked: Mutex::new(0),
            changed: Condvar::new(),
        }
    }

    pub fn mutator_parked(&self) {
        let mut parked = self.parked.lock().unwrap();
        *parked += 1;
        self.changed.notify_all();
    }

    pub fn mutator_resumed(&self) {
        let mut parked = self.parked.lock().unwrap();
        debug_assert!(*parked > 0);
        *parked -= 1;
    }

    /// A thread registered or de-registered; re-evaluate the target count.
    pub fn registry_changed(&self) {
        let _parked = self.parked.lock().unwrap();
        self.changed.notify_all();
    }

    fn wait_all_parked(&self, target: impl Fn() -> usize) {
        let mut parked = self.parked.lock().unwrap();
        while *parked < target() {
            parked = self.changed.wait(parked).unwrap();
        }
    }
}

/// The mark dispatcher.  Owns the worker pool and the per-epoch marking
/// protocol; the controller drives it and mutators enter it through their
/// safepoint hooks.
pub struct MarkDispatcher<VM: VMBinding> {
    state: Arc<GlobalState>,
    pool: Mutex<MarkerPool<VM>>,
    pub(crate) rendezvous: StwRendezvous,
    /// Number of mutators currently assisting with marking.
    cooperating: AtomicUsize,
    /// Upper bound on concurrent markers (controller + workers + assisting
    /// mutators).  Mutable through `reset`.
    max_parallelism: AtomicUsize,
    /// Whether mutators may assist.  Mutable through `reset`.
    mutators_cooperate: AtomicBool,
    /// The configured auxiliary worker count; pool rebuilds clamp it to
    /// `max_parallelism - 1`.
    aux_threads: usize,
}

impl<VM: VMBinding> MarkDispatcher<VM> {
    pub fn new(options: &Options, state: Arc<GlobalState>) -> Arc<Self> {
        let max_parallelism = *options.max_parallelism;
        let aux_threads = (*options.threads).min(max_parallelism.saturating_sub(1));
        #[cfg(feature = "single_worker")]
        assert_eq!(
            aux_threads, 0,
            "auxiliary mark workers are not allowed under single_worker"
        );
        Arc::new(Self {
            state,
            pool: Mutex::new(Self::build_pool(aux_threads)),
            rendezvous: StwRendezvous::new(),
            cooperating: AtomicUsize::new(0),
            max_parallelism: AtomicUsize::new(max_parallelism),
            mutators_cooperate: AtomicBool::new(*options.mutators_cooperate),
            aux_threads,
        })
    }

    fn build_pool(aux_threads: usize) -> MarkerPool<VM> {
        let (queue, locals) = MarkQueue::new(aux_threads);
        let queue = Arc::new(queue);
        let monitor = Arc::new(MarkMonitor::new());
        let group = WorkerGroup::new(aux_threads);
        let pending_spawn = locals
            .into_iter()
            .enumerate()
            .map(|(ordinal, local)| {
                Box::new(GCWorker::new(
                    ordinal,
                    local,
                    monitor.clone(),
                    queue.clone(),
                    group.clone(),
                ))
            })
            .collect();
        MarkerPool {
            monitor,
            queue,
            group,
            pending_spawn,
        }
    }

    /// Hand the not-yet-spawned workers of the current pool to the binding.
    /// Called from `initialize_collection` and at the end of `reset`.
    pub fn spawn_gc_threads(&self, tls: VMThread) {
        let mut pool = self.pool.lock().unwrap();
        for worker in pool.pending_spawn.drain(..) {
            VM::VMCollection::spawn_gc_thread(tls, GCThreadContext::Worker(worker));
        }
    }

    fn current_pool(&self) -> (Arc<MarkMonitor>, Arc<MarkQueue>) {
        let pool = self.pool.lock().unwrap();
        (pool.monitor.clone(), pool.queue.clone())
    }

    /// The number of auxiliary workers in the current pool.
    pub fn num_workers(&self) -> usize {
        self.pool.lock().unwrap().group.worker_count()
    }

    /// Begin a marking epoch: reset every mutator's per-epoch flags and
    /// publish "marking is active for `epoch`" so that safepoint hooks start
    /// claiming root sets (and, if enabled, assisting).  Called by the
    /// controller before it requests suspension.
    pub(crate) fn begin_marking_epoch(&self, epoch: Epoch) {
        debug_assert!(!self.state.is_marking_active());
        {
            let _guard = VM::VMThreadRegistry::lock_for_iter();
            for mutator in VM::VMThreadRegistry::mutators() {
                mutator.clear_mark_flags();
            }
        }
        self.cooperating.store(0, Ordering::Relaxed);
        self.state
            .marking_epoch
            .store(epoch.number(), Ordering::Relaxed);
        self.state.marking_active.store(true, Ordering::Release);
    }

    /// The suspension hook.  Runs on the mutator's own thread, once, while
    /// it is parking for the current epoch.
    ///
    /// Whoever wins the CAS on the mutator's root-set lock -- this mutator
    /// here, or a GC thread in `claim_root_sets` -- scans that mutator's
    /// roots and publishes its allocation buffer.  Losing the CAS means the
    /// roots are already taken care of; the mutator just proceeds to park.
    /// Scanning one's own roots here is sound: the mutator is at its
    /// safepoint and stays parked until the epoch's resume, so its stack
    /// cannot change after the scan.
    pub fn on_mutator_suspension(&self, mutator: &MutatorContext<VM>) {
        if !self.state.is_marking_active() {
            return;
        }
        let (monitor, queue) = self.current_pool();
        if mutator.try_lock_root_set() {
            trace!("Mutator {:?} scanning its own roots", mutator.tls());
            scan_mutator_roots::<VM>(mutator, &queue, &monitor);
            mutator.publish_object_factory();
        }
    }

    /// Let a parked mutator help drain the mark queue, if the marker budget
    /// allows.  Called between the rendezvous and the binding-level park, so
    /// the assist overlaps the armed phase only -- every mutator is already
    /// at a safepoint and the heap is a stable snapshot.  Records the
    /// assistance in the mutator's `cooperative` flag.
    #[cfg(feature = "cooperative_marking")]
    pub(crate) fn assist_while_parked(&self, mutator: &MutatorContext<VM>) {
        if !self.mutators_cooperate.load(Ordering::Relaxed) || !self.state.is_marking_active() {
            return;
        }
        let epoch = Epoch::from_number(self.state.marking_epoch.load(Ordering::Relaxed));
        if epoch == Epoch::ZERO {
            return;
        }
        let budget = self.max_parallelism.load(Ordering::Relaxed);
        let fixed_markers = 1 + self.num_workers();
        loop {
            let assisting = self.cooperating.load(Ordering::Relaxed);
            if fixed_markers + assisting >= budget {
                return;
            }
            if self
                .cooperating
                .compare_exchange_weak(
                    assisting,
                    assisting + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break;
            }
        }
        let (monitor, queue) = self.current_pool();
        if monitor.wait_for_assist(epoch) {
            mutator.set_cooperative();
            trace!("Mutator {:?} assisting with marking", mutator.tls());
            let local = LocalQueue::new_fifo();
            drain::<VM>(&queue, &monitor, &local);
        }
        self.cooperating.fetch_sub(1, Ordering::Relaxed);
    }

    /// Raise the suspension flag, deliver the request through the binding,
    /// and wait until every registered mutator is parked.
    pub(crate) fn request_stw(&self, tls: VMWorkerThread) {
        debug_assert!(!self.state.is_stw_requested());
        self.state.set_stw_requested(true);
        VM::VMCollection::request_threads_suspension(tls);
        self.rendezvous
            .wait_all_parked(VM::VMThreadRegistry::number_of_mutators);
        debug!(
            "All {} mutators parked",
            VM::VMThreadRegistry::number_of_mutators()
        );
    }

    /// Clear the suspension flag and resume every parked mutator.
    pub(crate) fn resume_mutators(&self, tls: VMWorkerThread) {
        debug_assert!(self.state.is_stw_requested());
        self.state.set_stw_requested(false);
        VM::VMCollection::resume_threads(tls);
    }

    /// The controller's share of the stop-the-world mark: scan VM-specific
    /// roots, claim any root set no one else has claimed, then traverse
    /// alongside the workers until termination is detected.
    ///
    /// `arm` pre-counts the controller as an active marker, so workers waking
    /// up to an empty queue cannot declare the phase over before the roots
    /// are in.
    pub(crate) fn run_main_in_stw(&self, _tls: VMWorkerThread, epoch: Epoch) {
        let (monitor, queue) = self.current_pool();
        monitor.arm(epoch);

        let mut factory = QueueRootsFactory::<VM> {
            queue: &queue,
            monitor: &monitor,
            discovered: 0,
            phantom: std::marker::PhantomData,
        };
        VM::VMScanning::scan_vm_specific_roots(&mut factory);
        trace!("{} VM-specific roots discovered", factory.discovered);

        claim_root_sets::<VM>(&queue, &monitor);

        let local = LocalQueue::new_fifo();
        drain::<VM>(&queue, &monitor, &local);
    }

    /// Acknowledge end-of-mark: disarm the workers and clear the "marking
    /// active" flag.  The queue must be drained.
    pub(crate) fn end_marking_epoch(&self, epoch: Epoch) {
        let (monitor, queue) = self.current_pool();
        debug_assert!(queue.is_empty(), "mark queue not drained at end of epoch");
        monitor.disarm(epoch);
        self.state.marking_active.store(false, Ordering::Release);
        self.state.marking_epoch.store(0, Ordering::Relaxed);
    }

    /// Rebuild the worker pool with a new marker budget.  The caller must
    /// hold the GC mutex, so no epoch is in `Started`.  `on_teardown` runs
    /// exactly once, after every worker of the old pool has exited and before
    /// the new pool spawns.
    pub(crate) fn reset(
        &self,
        tls: VMThread,
        max_parallelism: usize,
        mutators_cooperate: bool,
        on_teardown: impl FnOnce(),
    ) {
        assert!(max_parallelism >= 1, "at least the controller must mark");
        assert!(
            !self.state.is_marking_active(),
            "reset called during a marking epoch"
        );
        let new_aux = self.aux_threads.min(max_parallelism.saturating_sub(1));
        debug!(
            "Rebuilding worker pool: {} auxiliary workers, max parallelism {}, cooperate: {}",
            new_aux, max_parallelism, mutators_cooperate
        );
        {
            let mut pool = self.pool.lock().unwrap();
            pool.monitor.request_exit();
            pool.group.wait_all_exited();
            on_teardown();
            *pool = Self::build_pool(new_aux);
        }
        self.max_parallelism.store(max_parallelism, Ordering::Relaxed);
        self.mutators_cooperate
            .store(mutators_cooperate, Ordering::Relaxed);
        self.spawn_gc_threads(tls);
    }

    /// Stop the worker pool for good.  Called by the controller on teardown.
    pub(crate) fn stop_workers(&self) {
        let pool = self.pool.lock().unwrap();
        pool.monitor.request_exit();
        pool.group.wait_all_exited();
    }
}

/// Feed roots into the mark queue: mark each root and push the winners for
/// field scanning.
struct QueueRootsFactory<'a, VM: VMBinding> {
    queue: &'a MarkQueue,
    monitor: &'a MarkMonitor,
    discovered: usize,
    phantom: std::marker::PhantomData<VM>,
}

impl<VM: VMBinding> RootsWorkFactory for QueueRootsFactory<'_, VM> {
    fn create_process_roots_work(&mut self, roots: Vec<ObjectReference>) {
        let mut pushed = 0;
        for root in roots {
            self.discovered += 1;
            if VM::VMObjectModel::try_mark(root) {
                self.queue.push(root);
                pushed += 1;
            }
        }
        if pushed > 0 {
            self.monitor.notify_work_available(pushed > 1);
        }
    }
}

/// Scan one mutator's roots into the queue.  The caller must have won that
/// mutator's root-set lock.
fn scan_mutator_roots<VM: VMBinding>(
    mutator: &MutatorContext<VM>,
    queue: &MarkQueue,
    monitor: &MarkMonitor,
) {
    let mut factory = QueueRootsFactory::<VM> {
        queue,
        monitor,
        discovered: 0,
        phantom: std::marker::PhantomData,
    };
    VM::VMScanning::scan_roots_in_mutator_thread(mutator, &mut factory);
    trace!(
        "{} roots discovered in mutator {:?}",
        factory.discovered,
        mutator.tls()
    );
}

/// Iterate the thread registry and claim every root set no one has claimed
/// yet.  Any GC thread may do this; the CAS guarantees exactly one scanner
/// per (epoch, mutator).
pub(crate) fn claim_root_sets<VM: VMBinding>(queue: &MarkQueue, monitor: &MarkMonitor) {
    let _guard = VM::VMThreadRegistry::lock_for_iter();
    for mutator in VM::VMThreadRegistry::mutators() {
        if mutator.try_lock_root_set() {
            scan_mutator_roots::<VM>(mutator, queue, monitor);
            mutator.publish_object_factory();
        }
    }
}

/// Scan one object's fields, marking and queueing the children that were not
/// already marked.  The object itself was marked by whoever pushed it.
fn process_object<VM: VMBinding>(object: ObjectReference, local: &LocalQueue, monitor: &MarkMonitor) {
    let mut pushed = 0usize;
    VM::VMScanning::scan_object(object, &mut |child: ObjectReference| {
        if VM::VMObjectModel::try_mark(child) {
            local.push(child);
            pushed += 1;
        }
    });
    if pushed > 0 {
        monitor.notify_work_available(pushed > 1);
    }
}

/// A marker's drain loop: pop and scan until termination is detected.  The
/// caller must already be counted as an active marker.
pub(crate) fn drain<VM: VMBinding>(queue: &MarkQueue, monitor: &MarkMonitor, local: &LocalQueue) {
    loop {
        while let Some(object) = queue.pop(local) {
            process_object::<VM>(object, local, monitor);
        }
        match monitor.park_marker(|| queue.is_empty()) {
            ParkResult::Finished => return,
            ParkResult::Retry => continue,
        }
    }
}
