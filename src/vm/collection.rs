use crate::finalizer::FinalizerThread;
use crate::scheduler::{GCController, GCWorker};
use crate::util::opaque_pointer::*;
use crate::vm::{NullSchedulerHooks, SchedulerHooks, VMBinding};

/// Thread context for a newly created GC thread.  The binding owns the OS
/// thread; PMCS owns the context and its run loop.  The binding's
/// [`Collection::spawn_gc_thread`] must create a thread and call the
/// context's `run` method with that thread's [`VMWorkerThread`].
pub enum GCThreadContext<VM: VMBinding> {
    /// The main GC thread, which drives every collection.  There is exactly
    /// one per PMCS instance.
    Controller(Box<GCController<VM>>),
    /// An auxiliary mark worker.
    Worker(Box<GCWorker<VM>>),
    /// The finalizer thread.  Spawned lazily, the first time an epoch
    /// produces finalizable garbage (or explicitly by the runtime).
    Finalizer(Box<FinalizerThread<VM>>),
}

/// Errors handed to [`Collection::out_of_memory`] when an allocation request
/// cannot be satisfied even after a forced collection.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AllocationError {
    /// The heap is exhausted: a collection ran and the allocator still could
    /// not satisfy the request.
    HeapExhausted,
    /// The request can never be satisfied, e.g. an array length whose byte
    /// size overflows.
    TooLarge,
}

/// VM-specific methods for stopping and resuming the world, creating GC
/// threads, and surfacing allocation failure.
pub trait Collection<VM: VMBinding> {
    /// Ask every registered mutator to come to a safepoint.  The binding must
    /// deliver the request, e.g. by arming compiler-inserted safepoint polls
    /// or interrupting blocking calls; mutators then park themselves through
    /// [`crate::memory_manager::on_safe_point`].  PMCS has already raised its
    /// global suspension flag when this is called.  Called by the controller;
    /// `tls` is the controller thread.
    fn request_threads_suspension(tls: VMWorkerThread);

    /// Unpark every mutator parked by the current suspension request.  PMCS
    /// has already cleared its suspension flag when this is called.
    fn resume_threads(tls: VMWorkerThread);

    /// Park the current mutator until [`Collection::resume_threads`].  Called
    /// by PMCS from the safepoint slow path, after the mutator has run its
    /// suspension hook and been counted by the stop-the-world rendezvous.
    fn park_for_gc(tls: VMMutatorThread);

    /// Ask the binding to create a GC thread running the given context.  The
    /// new thread must call `run` on the context, passing its own
    /// [`VMWorkerThread`].  The thread must never be registered as a mutator.
    fn spawn_gc_thread(tls: VMThread, ctx: GCThreadContext<VM>);

    /// Inform the binding that an allocation could not be satisfied even
    /// after a forced collection.  The allocator, not PMCS, decides what the
    /// failure ultimately looks like to the application.
    fn out_of_memory(_tls: VMThread, err_kind: AllocationError) {
        panic!("Out of memory with {:?}!", err_kind);
    }

    /// Create the scheduler hooks for this instance.  The external GC
    /// scheduler decides *when* to request collections; PMCS only reports
    /// collection boundaries through these hooks.
    fn create_scheduler_hooks() -> Box<dyn SchedulerHooks<VM>> {
        Box::new(NullSchedulerHooks)
    }
}
