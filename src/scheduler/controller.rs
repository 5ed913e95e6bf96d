//! The GC controller thread: the dedicated main GC thread that waits for
//! scheduled epochs and drives each collection from start to finish.

use crate::pmcs::PMCS;
use crate::sweep;
use crate::util::epoch::{Epoch, GCHandle};
use crate::util::opaque_pointer::*;
use crate::vm::{Allocation, ThreadRegistry, VMBinding};
#[cfg(feature = "concurrent_weak_sweep")]
use crate::vm::WeakRefBarriers;
use std::sync::{Condvar, Mutex};

/// Lets `shutdown_gc` block until the controller has fully torn down (worker
/// pool stopped, finalizer thread joined).
pub(crate) struct ControllerExit {
    exited: Mutex<bool>,
    cv: Condvar,
}

impl ControllerExit {
    pub fn new() -> Self {
        Self {
            exited: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn signal_exited(&self) {
        let mut exited = self.exited.lock().unwrap();
        *exited = true;
        self.cv.notify_all();
    }

    pub fn wait_exited(&self) {
        let mut exited = self.exited.lock().unwrap();
        while !*exited {
            exited = self.cv.wait(exited).unwrap();
        }
    }
}

/// The main GC thread.  Spawned once from `initialize_collection` through
/// [`crate::vm::Collection::spawn_gc_thread`].
pub struct GCController<VM: VMBinding> {
    pmcs: &'static PMCS<VM>,
}

impl<VM: VMBinding> GCController<VM> {
    pub(crate) fn new(pmcs: &'static PMCS<VM>) -> Box<GCController<VM>> {
        Box::new(Self { pmcs })
    }

    /// The controller's run loop: wait for an epoch, collect, repeat; on
    /// shutdown, let the in-flight epoch complete, then tear everything down.
    pub fn run(&mut self, tls: VMWorkerThread) {
        // The controller must never be subject to its own stop-the-world
        // request, so it must not be a registered mutator.
        assert!(
            !VM::VMThreadRegistry::is_mutator(tls.0),
            "the GC controller thread is a registered mutator"
        );
        loop {
            debug!("[GCController: Waiting for request...]");
            let Some(epoch) = self.pmcs.epoch_states.wait_scheduled() else {
                break;
            };
            debug!("[GCController: Request received.]");
            self.perform_full_gc(tls, epoch);
            debug!("[GCController: Collection {} complete.]", epoch);
        }
        debug!("[GCController: Shutting down.]");
        self.pmcs.scheduler.stop_workers();
        self.pmcs.finalizer.stop_finalizer_thread();
        self.pmcs.controller_exit.signal_exited();
    }

    /// One full collection.  Serialized against `reconfigure` by the GC
    /// mutex, which is released before the finalizer handoff (starting the
    /// finalizer thread may block on OS primitives that themselves take
    /// library-global locks).
    fn perform_full_gc(&mut self, tls: VMWorkerThread, epoch: Epoch) {
        let pmcs = self.pmcs;
        let (handle, queue) = {
            let _gc_guard = pmcs.gc_lock.lock().unwrap();
            let mut handle = GCHandle::new(epoch);
            {
                let mut gc_start_time = pmcs.state.gc_start_time.borrow_mut();
                assert!(gc_start_time.is_none(), "GC already started?");
                *gc_start_time = Some(std::time::Instant::now());
            }

            VM::VMAllocation::prepare_for_gc();
            pmcs.scheduler.begin_marking_epoch(epoch);
            pmcs.scheduler.request_stw(tls);
            pmcs.requester.clear_request();

            pmcs.hooks.on_gc_start(pmcs);
            pmcs.epoch_states.start(epoch);

            pmcs.scheduler.run_main_in_stw(tls, epoch);
            pmcs.scheduler.end_marking_epoch(epoch);

            #[cfg(feature = "concurrent_weak_sweep")]
            self.concurrent_weak_sweep(tls, epoch);

            // Make every mutator's allocation buffer visible to the sweep,
            // and take the factory iteration lock before the world restarts.
            self.publish_all_mutators();
            let factory_lock = VM::VMAllocation::lock_object_factory();
            pmcs.scheduler.resume_mutators(tls);

            // The sweep runs concurrently with the resumed mutators.
            let queue = sweep::sweep::<VM>(pmcs, epoch, &mut handle, factory_lock);

            pmcs.hooks
                .on_gc_finish(pmcs, epoch, VM::VMAllocation::allocated_bytes());
            pmcs.state.reset_allocation_bytes();
            pmcs.state.increment_gc_count();
            pmcs.epoch_states.finish(epoch);

            handle.finalizer_count = queue.len();
            let start_time = {
                let mut gc_start_time = pmcs.state.gc_start_time.borrow_mut();
                gc_start_time.take().expect("GC not started yet?")
            };
            info!(
                "End of GC {} ({} reclaimed, {} finalizable, took {} ms)",
                epoch,
                handle.reclaimed,
                handle.finalizer_count,
                start_time.elapsed().as_millis()
            );
            (handle, queue)
        };
        // GC mutex released: hand the finalizer batch over.
        pmcs.finalizer.schedule_tasks(pmcs, queue, handle.epoch);
    }

    /// Enable the weak-reference barriers, let mutators run while weak
    /// references are examined against this epoch's marks, then briefly
    /// re-suspend to disable the barriers again.
    #[cfg(feature = "concurrent_weak_sweep")]
    fn concurrent_weak_sweep(&self, tls: VMWorkerThread, epoch: Epoch) {
        let pmcs = self.pmcs;
        pmcs.state.set_weak_barriers_armed(true);
        VM::VMWeakBarriers::enable(epoch);
        pmcs.scheduler.resume_mutators(tls);

        pmcs.extra_objects.process_weak_refs();

        pmcs.scheduler.request_stw(tls);
        VM::VMWeakBarriers::disable();
        pmcs.state.set_weak_barriers_armed(false);
    }

    /// Publish the object factory of every mutator that has not published
    /// yet (mutators whose roots they scanned themselves already have).
    fn publish_all_mutators(&self) {
        let _guard = VM::VMThreadRegistry::lock_for_iter();
        for mutator in VM::VMThreadRegistry::mutators() {
            mutator.publish_object_factory();
        }
    }
}
